//! Query parser.
//!
//! Parses a token stream into a query AST using recursive descent.
//!
//! # Grammar
//!
//! ```text
//! query      → or_expr
//! or_expr    → and_expr ("OR" and_expr)*
//! and_expr   → unary ("AND"? unary)*
//! unary      → ("-" | "NOT") unary | primary
//! primary    → (TERM | PHRASE | REGEX | field_expr | "(" or_expr ")") suffix*
//! field_expr → FIELD_PREFIX (TERM | PHRASE | REGEX | range | "(" or_expr ")")
//! range      → ("[" | "{") bound "TO" bound ("]" | "}")
//! suffix     → "~" N? | "^" N
//! ```
//!
//! Adjacent clauses combine with AND; ranges are only legal under a field
//! qualifier because their bounds take their meaning from the field's data
//! type.

use std::mem;

use crate::{
    ast::{QueryExpr, RangeBound},
    error::QueryError,
    lexer::{Spanned, Token, tokenize},
};

/// Maximum Levenshtein distance a fuzzy suffix may request.
const MAX_FUZZY_DISTANCE: u8 = 2;

/// Fuzzy distance used for a bare `~` suffix.
const DEFAULT_FUZZY_DISTANCE: u8 = 2;

/// Recursive descent parser for query expressions.
struct Parser<'a> {
    /// The original input, for error context.
    input: &'a str,
    /// Token stream to parse.
    tokens: Vec<Spanned>,
    /// Current position in the token stream.
    position: usize,
}

impl<'a> Parser<'a> {
    /// Creates a new parser over a token stream.
    fn new(input: &'a str, tokens: Vec<Spanned>) -> Self {
        Self {
            input,
            tokens,
            position: 0,
        }
    }

    /// Byte offset of the current token (or end of input).
    fn offset(&self) -> usize {
        self.tokens
            .get(self.position)
            .map_or(self.input.len(), |s| s.offset)
    }

    /// Builds a syntax error at the current token.
    fn error_here(&self, message: impl Into<String>) -> QueryError {
        QueryError::syntax(message, self.offset()).with_query(self.input)
    }

    /// Parses the token stream into a query expression.
    fn parse(mut self) -> Result<Option<QueryExpr>, QueryError> {
        if self.tokens.is_empty() {
            return Ok(None);
        }

        let expr = self.parse_or_expr()?;

        if self.position < self.tokens.len() {
            return Err(self.error_here(format!(
                "unexpected token: {:?}",
                self.tokens[self.position].token
            )));
        }

        Ok(Some(expr))
    }

    /// Parses: or_expr → and_expr ("OR" and_expr)*
    fn parse_or_expr(&mut self) -> Result<QueryExpr, QueryError> {
        let mut left = self.parse_and_expr()?;

        while self.check(&Token::Or) {
            self.advance();
            let right = self.parse_and_expr()?;
            left = QueryExpr::or(vec![left, right]);
        }

        Ok(left)
    }

    /// Parses: and_expr → unary ("AND"? unary)*
    fn parse_and_expr(&mut self) -> Result<QueryExpr, QueryError> {
        let mut exprs = vec![self.parse_unary()?];

        loop {
            if self.check(&Token::And) {
                self.advance();
                exprs.push(self.parse_unary()?);
            } else if self.can_start_unary() {
                exprs.push(self.parse_unary()?);
            } else {
                break;
            }
        }

        Ok(QueryExpr::and(exprs))
    }

    /// Checks whether the current token can start a unary expression.
    fn can_start_unary(&self) -> bool {
        matches!(
            self.peek(),
            Some(Token::Term(_))
                | Some(Token::Phrase(_))
                | Some(Token::Regex(_))
                | Some(Token::Not)
                | Some(Token::LParen)
                | Some(Token::FieldPrefix(_))
                // Routed into primary so a floating range gets a clear error.
                | Some(Token::RangeOpen { .. })
        )
    }

    /// Parses: unary → ("-" | "NOT") unary | primary
    fn parse_unary(&mut self) -> Result<QueryExpr, QueryError> {
        if self.check(&Token::Not) {
            self.advance();
            let expr = self.parse_unary()?;
            return Ok(QueryExpr::Not(Box::new(expr)));
        }

        self.parse_primary()
    }

    /// Parses a primary expression and applies any `~`/`^` suffixes.
    fn parse_primary(&mut self) -> Result<QueryExpr, QueryError> {
        let expr = match self.peek().cloned() {
            Some(Token::Term(text)) => {
                self.advance();
                self.classify_term(&text)?
            }

            Some(Token::Phrase(text)) => {
                self.advance();
                phrase_expr(&text)
            }

            Some(Token::Regex(pattern)) => {
                self.advance();
                QueryExpr::Regex(pattern)
            }

            Some(Token::FieldPrefix(name)) => {
                self.advance();
                self.parse_field_expr(name)?
            }

            Some(Token::LParen) => self.parse_group("expected closing parenthesis")?,

            Some(Token::RangeOpen { .. }) => {
                return Err(self.error_here("a range requires a field qualifier, e.g. Rating:[1 TO 10]"));
            }

            Some(Token::RParen) => {
                return Err(self.error_here("unexpected closing parenthesis"));
            }

            Some(Token::Or) => {
                return Err(self.error_here("unexpected OR (needs an expression before it)"));
            }

            Some(Token::And) => {
                return Err(self.error_here("unexpected AND (needs an expression before it)"));
            }

            Some(Token::Boost(_)) => {
                return Err(self.error_here("unexpected boost (needs an expression before it)"));
            }

            Some(Token::Fuzzy(_)) => {
                return Err(self.error_here("unexpected '~' (needs a term before it)"));
            }

            Some(Token::To) | Some(Token::RangeClose { .. }) => {
                return Err(self.error_here("range syntax outside a range"));
            }

            Some(Token::Not) => {
                // parse_unary consumes Not; reaching it here is a bug guard.
                return Err(self.error_here("unexpected negation"));
            }

            None => {
                return Err(self.error_here("unexpected end of query"));
            }
        };

        let expr = self.maybe_apply_fuzzy(expr)?;
        Ok(self.maybe_apply_boost(expr))
    }

    /// Parses the expression after a field prefix.
    fn parse_field_expr(&mut self, name: String) -> Result<QueryExpr, QueryError> {
        let expr = match self.peek().cloned() {
            Some(Token::Term(text)) => {
                self.advance();
                let inner = self.classify_term(&text)?;
                self.maybe_apply_fuzzy(inner)?
            }
            Some(Token::Phrase(text)) => {
                self.advance();
                phrase_expr(&text)
            }
            Some(Token::Regex(pattern)) => {
                self.advance();
                QueryExpr::Regex(pattern)
            }
            Some(Token::RangeOpen { inclusive }) => {
                self.advance();
                self.parse_range(inclusive)?
            }
            Some(Token::LParen) => {
                self.parse_group("expected closing parenthesis after field expression")?
            }
            _ => {
                return Err(
                    self.error_here(format!("expected term, phrase, range, or group after '{name}:'"))
                );
            }
        };

        // `*:*` is the canonical match-all, not a field query.
        if name == "*" && expr == QueryExpr::All {
            return Ok(QueryExpr::All);
        }

        Ok(QueryExpr::Field {
            name,
            expr: Box::new(expr),
        })
    }

    /// Parses the inside of a range after its opener.
    fn parse_range(&mut self, lower_inclusive: bool) -> Result<QueryExpr, QueryError> {
        let lower = self.parse_bound(lower_inclusive)?;

        if !self.check(&Token::To) {
            return Err(self.error_here("expected TO between range bounds"));
        }
        self.advance();

        // The closer's bracket decides the upper bound's inclusivity, so
        // parse the literal first and patch it below.
        let mut upper = self.parse_bound(true)?;

        match self.peek().cloned() {
            Some(Token::RangeClose { inclusive }) => {
                self.advance();
                upper.inclusive = inclusive;
            }
            _ => return Err(self.error_here("expected ']' or '}' to close the range")),
        }

        Ok(QueryExpr::Range { lower, upper })
    }

    /// Parses one range bound: a literal, a quoted literal, or `*`.
    fn parse_bound(&mut self, inclusive: bool) -> Result<RangeBound, QueryError> {
        match self.peek().cloned() {
            Some(Token::Term(text)) => {
                self.advance();
                if text == "*" {
                    Ok(RangeBound {
                        value: None,
                        inclusive,
                    })
                } else {
                    Ok(RangeBound::literal(text, inclusive))
                }
            }
            Some(Token::Phrase(text)) => {
                self.advance();
                Ok(RangeBound::literal(text, inclusive))
            }
            _ => Err(self.error_here("expected a range bound")),
        }
    }

    /// Turns a raw term into its AST form, validating wildcard placement.
    ///
    /// `*` alone is the match-all sentinel; a trailing `*` is a prefix
    /// query; a `*` or `?` anywhere else is unsupported.
    fn classify_term(&self, text: &str) -> Result<QueryExpr, QueryError> {
        if text == "*" {
            return Ok(QueryExpr::All);
        }
        if let Some(stem) = text.strip_suffix('*') {
            if stem.contains(['*', '?']) {
                return Err(QueryError::unsupported(format!(
                    "wildcard pattern {text:?} is not supported; only a trailing '*' is"
                ))
                .with_query(self.input));
            }
            if stem.is_empty() {
                return Ok(QueryExpr::All);
            }
            return Ok(QueryExpr::Prefix(stem.to_string()));
        }
        if text.contains(['*', '?']) {
            return Err(QueryError::unsupported(format!(
                "wildcard pattern {text:?} is not supported; only a trailing '*' is"
            ))
            .with_query(self.input));
        }
        Ok(QueryExpr::Term(text.to_string()))
    }

    /// Applies a pending `~` suffix, which is only valid on a plain term.
    fn maybe_apply_fuzzy(&mut self, expr: QueryExpr) -> Result<QueryExpr, QueryError> {
        let Some(Token::Fuzzy(distance)) = self.peek().cloned() else {
            return Ok(expr);
        };
        self.advance();

        match expr {
            QueryExpr::Term(term) => Ok(QueryExpr::Fuzzy {
                term,
                distance: distance
                    .unwrap_or(DEFAULT_FUZZY_DISTANCE)
                    .min(MAX_FUZZY_DISTANCE),
            }),
            QueryExpr::Phrase(_) => Err(QueryError::unsupported(
                "proximity searches ('\"…\"~N') are not supported",
            )
            .with_query(self.input)),
            _ => Err(QueryError::unsupported("'~' requires a plain term").with_query(self.input)),
        }
    }

    /// Applies a pending `^` boost suffix.
    fn maybe_apply_boost(&mut self, expr: QueryExpr) -> QueryExpr {
        if let Some(Token::Boost(factor)) = self.peek().cloned() {
            self.advance();
            QueryExpr::boost(expr, factor)
        } else {
            expr
        }
    }

    /// Parses a parenthesized group, consuming both parentheses.
    fn parse_group(&mut self, missing_rparen_msg: &str) -> Result<QueryExpr, QueryError> {
        self.advance(); // consume (
        let inner = self.parse_or_expr()?;

        if !self.check(&Token::RParen) {
            return Err(self.error_here(missing_rparen_msg));
        }
        self.advance(); // consume )

        Ok(inner)
    }

    /// Returns the current token without consuming it.
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position).map(|s| &s.token)
    }

    /// Checks the current token's discriminant.
    fn check(&self, token: &Token) -> bool {
        self.peek()
            .map(|t| mem::discriminant(t) == mem::discriminant(token))
            .unwrap_or(false)
    }

    /// Advances to the next token.
    fn advance(&mut self) {
        if self.position < self.tokens.len() {
            self.position += 1;
        }
    }
}

/// Splits quoted phrase content into words.
fn phrase_expr(text: &str) -> QueryExpr {
    let words: Vec<String> = text.split_whitespace().map(String::from).collect();
    if words.is_empty() {
        QueryExpr::Term(String::new())
    } else {
        QueryExpr::Phrase(words)
    }
}

/// Parses a query string into an AST.
///
/// Returns `Ok(None)` for an empty or blank query (callers rewrite that to
/// match-all), `Ok(Some(expr))` for a valid query, or an error carrying the
/// offending position.
pub fn parse(input: &str) -> Result<Option<QueryExpr>, QueryError> {
    let tokens = tokenize(input).map_err(|e| e.with_query(input))?;
    Parser::new(input, tokens).parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn term(s: &str) -> QueryExpr {
        QueryExpr::Term(s.into())
    }

    fn phrase(words: &[&str]) -> QueryExpr {
        QueryExpr::Phrase(words.iter().map(|s| s.to_string()).collect())
    }

    fn not(e: QueryExpr) -> QueryExpr {
        QueryExpr::Not(Box::new(e))
    }

    fn and(exprs: Vec<QueryExpr>) -> QueryExpr {
        QueryExpr::and(exprs)
    }

    fn or(exprs: Vec<QueryExpr>) -> QueryExpr {
        QueryExpr::or(exprs)
    }

    fn field(name: &str, e: QueryExpr) -> QueryExpr {
        QueryExpr::Field {
            name: name.into(),
            expr: Box::new(e),
        }
    }

    #[test]
    fn empty_query() {
        assert_eq!(parse("").unwrap(), None);
        assert_eq!(parse("   ").unwrap(), None);
    }

    #[test]
    fn single_term() {
        assert_eq!(parse("galaxy").unwrap(), Some(term("galaxy")));
    }

    #[test]
    fn implicit_and() {
        assert_eq!(
            parse("hitchhiker galaxy").unwrap(),
            Some(and(vec![term("hitchhiker"), term("galaxy")]))
        );
    }

    #[test]
    fn explicit_and() {
        assert_eq!(
            parse("hitchhiker AND galaxy").unwrap(),
            Some(and(vec![term("hitchhiker"), term("galaxy")]))
        );
    }

    #[test]
    fn explicit_not() {
        assert_eq!(
            parse("galaxy NOT drama").unwrap(),
            Some(and(vec![term("galaxy"), not(term("drama"))]))
        );
    }

    #[test]
    fn or_over_and_precedence() {
        // "a b OR c" = (a AND b) OR c
        assert_eq!(
            parse("a b OR c").unwrap(),
            Some(or(vec![and(vec![term("a"), term("b")]), term("c")]))
        );
    }

    #[test]
    fn quoted_phrase() {
        assert_eq!(
            parse("\"grand theme\"").unwrap(),
            Some(phrase(&["grand", "theme"]))
        );
    }

    #[test]
    fn grouping() {
        assert_eq!(
            parse("(a OR b) c").unwrap(),
            Some(and(vec![or(vec![term("a"), term("b")]), term("c")]))
        );
    }

    #[test]
    fn field_with_term() {
        assert_eq!(
            parse("Author:Douglas").unwrap(),
            Some(field("Author", term("Douglas")))
        );
    }

    #[test]
    fn field_with_phrase() {
        assert_eq!(
            parse("Title:\"grand theme\"").unwrap(),
            Some(field("Title", phrase(&["grand", "theme"])))
        );
    }

    #[test]
    fn field_with_group() {
        assert_eq!(
            parse("Author:(Douglas OR Terry)").unwrap(),
            Some(field("Author", or(vec![term("Douglas"), term("Terry")])))
        );
    }

    #[test]
    fn negated_field() {
        assert_eq!(
            parse("-Category:Drama").unwrap(),
            Some(not(field("Category", term("Drama"))))
        );
    }

    #[test]
    fn inclusive_range() {
        assert_eq!(
            parse("Rating:[1 TO 100]").unwrap(),
            Some(field(
                "Rating",
                QueryExpr::Range {
                    lower: RangeBound::literal("1", true),
                    upper: RangeBound::literal("100", true),
                }
            ))
        );
    }

    #[test]
    fn exclusive_range() {
        assert_eq!(
            parse("Rating:{1 TO 100}").unwrap(),
            Some(field(
                "Rating",
                QueryExpr::Range {
                    lower: RangeBound::literal("1", false),
                    upper: RangeBound::literal("100", false),
                }
            ))
        );
    }

    #[test]
    fn half_open_range() {
        assert_eq!(
            parse("Rating:[7 TO *]").unwrap(),
            Some(field(
                "Rating",
                QueryExpr::Range {
                    lower: RangeBound::literal("7", true),
                    upper: RangeBound {
                        value: None,
                        inclusive: true
                    },
                }
            ))
        );
    }

    #[test]
    fn mixed_bracket_range() {
        // Lucene allows mixing: inclusive below, exclusive above.
        assert_eq!(
            parse("Rating:[1 TO 10}").unwrap(),
            Some(field(
                "Rating",
                QueryExpr::Range {
                    lower: RangeBound::literal("1", true),
                    upper: RangeBound::literal("10", false),
                }
            ))
        );
    }

    #[test]
    fn datetime_range_survives() {
        let parsed = parse("PublishDate:[1979-10-12T12:00:00Z TO 1980-01-01]").unwrap();
        let Some(QueryExpr::Field { expr, .. }) = parsed else {
            panic!("expected field");
        };
        let QueryExpr::Range { lower, upper } = *expr else {
            panic!("expected range");
        };
        assert_eq!(lower.value.as_deref(), Some("1979-10-12T12:00:00Z"));
        assert_eq!(upper.value.as_deref(), Some("1980-01-01"));
    }

    #[test]
    fn range_without_field_errors() {
        let err = parse("[1 TO 2]").unwrap_err();
        assert!(err.message().contains("field qualifier"));
    }

    #[test]
    fn range_missing_to_errors() {
        let err = parse("Rating:[1 2]").unwrap_err();
        assert!(err.message().contains("expected TO"));
    }

    #[test]
    fn range_unclosed_errors() {
        let err = parse("Rating:[1 TO 2").unwrap_err();
        assert!(err.message().contains("close the range"));
    }

    #[test]
    fn fuzzy_default_distance() {
        assert_eq!(
            parse("galaxy~").unwrap(),
            Some(QueryExpr::Fuzzy {
                term: "galaxy".into(),
                distance: 2
            })
        );
    }

    #[test]
    fn fuzzy_explicit_distance() {
        assert_eq!(
            parse("galaxy~1").unwrap(),
            Some(QueryExpr::Fuzzy {
                term: "galaxy".into(),
                distance: 1
            })
        );
    }

    #[test]
    fn fuzzy_distance_is_capped() {
        assert_eq!(
            parse("galaxy~9").unwrap(),
            Some(QueryExpr::Fuzzy {
                term: "galaxy".into(),
                distance: 2
            })
        );
    }

    #[test]
    fn fuzzy_in_field() {
        assert_eq!(
            parse("Author:Duglas~1").unwrap(),
            Some(field(
                "Author",
                QueryExpr::Fuzzy {
                    term: "Duglas".into(),
                    distance: 1
                }
            ))
        );
    }

    #[test]
    fn fuzzy_on_phrase_errors() {
        let err = parse("\"grand theme\"~2").unwrap_err();
        assert!(err.message().contains("roximity"));
    }

    #[test]
    fn prefix_term() {
        assert_eq!(parse("hitch*").unwrap(), Some(QueryExpr::Prefix("hitch".into())));
    }

    #[test]
    fn prefix_in_field() {
        assert_eq!(
            parse("Title:hitch*").unwrap(),
            Some(field("Title", QueryExpr::Prefix("hitch".into())))
        );
    }

    #[test]
    fn match_all_sentinels() {
        assert_eq!(parse("*").unwrap(), Some(QueryExpr::All));
        assert_eq!(parse("*:*").unwrap(), Some(QueryExpr::All));
    }

    #[test]
    fn field_star_is_field_scoped() {
        assert_eq!(parse("Title:*").unwrap(), Some(field("Title", QueryExpr::All)));
    }

    #[test]
    fn inner_wildcards_are_unsupported() {
        assert!(parse("hi*ch").is_err());
        assert!(parse("hi?ch").is_err());
    }

    #[test]
    fn regex_expression() {
        assert_eq!(
            parse("/gal.xy/").unwrap(),
            Some(QueryExpr::Regex("gal.xy".into()))
        );
        assert_eq!(
            parse("Title:/gal.xy/").unwrap(),
            Some(field("Title", QueryExpr::Regex("gal.xy".into())))
        );
    }

    #[test]
    fn boost_on_term_and_field() {
        assert_eq!(
            parse("galaxy^2.5").unwrap(),
            Some(QueryExpr::boost(term("galaxy"), 2.5))
        );
        assert_eq!(
            parse("Author:Douglas^2").unwrap(),
            Some(QueryExpr::boost(field("Author", term("Douglas")), 2.0))
        );
    }

    #[test]
    fn fuzzy_then_boost() {
        assert_eq!(
            parse("galaxy~1^2").unwrap(),
            Some(QueryExpr::boost(
                QueryExpr::Fuzzy {
                    term: "galaxy".into(),
                    distance: 1
                },
                2.0
            ))
        );
    }

    #[test]
    fn error_or_at_start() {
        let err = parse("OR galaxy").unwrap_err();
        assert!(err.message().contains("OR"));
    }

    #[test]
    fn error_trailing_or() {
        let err = parse("galaxy OR").unwrap_err();
        assert!(err.message().contains("end of query"));
    }

    #[test]
    fn error_field_without_value() {
        let err = parse("Title:").unwrap_err();
        assert!(err.message().contains("expected"));
    }

    #[test]
    fn error_unclosed_paren() {
        let err = parse("(a b").unwrap_err();
        assert!(err.message().contains("closing parenthesis"));
    }

    #[test]
    fn error_positions_point_into_query() {
        let err = parse("galaxy OR").unwrap_err();
        assert_eq!(err.position(), Some("galaxy OR".len()));
    }

    #[test]
    fn complex_query() {
        assert_eq!(
            parse("Author:Douglas AND Rating:[7 TO *] -Category:Drama").unwrap(),
            Some(and(vec![
                field("Author", term("Douglas")),
                field(
                    "Rating",
                    QueryExpr::Range {
                        lower: RangeBound::literal("7", true),
                        upper: RangeBound {
                            value: None,
                            inclusive: true
                        },
                    }
                ),
                not(field("Category", term("Drama"))),
            ]))
        );
    }

    #[test]
    fn null_token_is_an_ordinary_term_here() {
        // The compiler gives `_null_` its meaning; the parser passes it
        // through untouched.
        assert_eq!(
            parse("X:_null_").unwrap(),
            Some(field("X", term("_null_")))
        );
    }
}
