//! Query lexer (tokenizer).
//!
//! Converts a query string into a stream of position-tagged tokens for the
//! parser. The lexer is mildly stateful: between `[`/`{` and `]`/`}` it
//! switches into range mode, where `:`, `-`, `~`, `^`, and `/` are ordinary
//! term characters (range bounds are dates and signed numbers) and the `TO`
//! keyword becomes significant.

use std::{iter::Peekable, str::Chars};

use crate::error::QueryError;

/// A token in the query language.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    /// A bare word (search term, may carry a trailing `*`).
    Term(String),

    /// A quoted phrase (quotes stripped, content preserved).
    Phrase(String),

    /// The OR keyword.
    Or,

    /// The AND keyword (also the implicit combinator).
    And,

    /// Negation: the NOT keyword or a leading `-`.
    Not,

    /// The TO keyword inside a range.
    To,

    /// Left parenthesis.
    LParen,

    /// Right parenthesis.
    RParen,

    /// Field qualifier (e.g. `Author:` produces `FieldPrefix("Author")`).
    FieldPrefix(String),

    /// Boost suffix (`^2.5` produces `Boost(2.5)`).
    Boost(f32),

    /// Fuzzy suffix (`~` or `~1`); the distance is optional.
    Fuzzy(Option<u8>),

    /// A `/pattern/` regular expression (delimiters stripped).
    Regex(String),

    /// Range opener: `[` (inclusive) or `{` (exclusive).
    RangeOpen {
        /// True for `[`.
        inclusive: bool,
    },

    /// Range closer: `]` (inclusive) or `}` (exclusive).
    RangeClose {
        /// True for `]`.
        inclusive: bool,
    },
}

/// A token plus the byte offset where it starts.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Spanned {
    /// The token.
    pub(crate) token: Token,
    /// Byte offset into the input.
    pub(crate) offset: usize,
}

/// Tokenizes a query string.
struct Lexer<'a> {
    /// Character iterator with one-character lookahead.
    chars: Peekable<Chars<'a>>,
    /// Current byte position in the input.
    position: usize,
    /// True between a range opener and its closer.
    in_range: bool,
}

impl<'a> Lexer<'a> {
    /// Creates a new lexer for the given input.
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
            position: 0,
            in_range: false,
        }
    }

    /// Tokenizes the entire input.
    fn tokenize(mut self) -> Result<Vec<Spanned>, QueryError> {
        let mut tokens = Vec::new();
        while let Some(spanned) = self.next_token()? {
            tokens.push(spanned);
        }
        Ok(tokens)
    }

    /// Returns the next token, or None at end of input.
    fn next_token(&mut self) -> Result<Option<Spanned>, QueryError> {
        self.skip_whitespace();

        let offset = self.position;
        let Some(&ch) = self.chars.peek() else {
            return Ok(None);
        };

        let token = match ch {
            '"' => Some(self.read_phrase(offset)?),
            '(' => {
                self.advance();
                Some(Token::LParen)
            }
            ')' => {
                self.advance();
                Some(Token::RParen)
            }
            '[' | '{' => {
                self.advance();
                self.in_range = true;
                Some(Token::RangeOpen {
                    inclusive: ch == '[',
                })
            }
            ']' | '}' => {
                self.advance();
                self.in_range = false;
                Some(Token::RangeClose {
                    inclusive: ch == ']',
                })
            }
            '-' if !self.in_range => {
                self.advance();
                Some(Token::Not)
            }
            '+' if !self.in_range => {
                // A required-clause marker; AND is already the default.
                self.advance();
                None
            }
            '^' if !self.in_range => Some(self.read_boost(offset)?),
            '~' if !self.in_range => Some(self.read_fuzzy(offset)?),
            '/' if !self.in_range => Some(self.read_regex(offset)?),
            _ => self.read_term(),
        };

        match token {
            Some(token) => Ok(Some(Spanned { token, offset })),
            // A skipped character ('+'); carry on with whatever follows.
            None => self.next_token(),
        }
    }

    /// Reads a quoted phrase. `\"` escapes a quote inside the phrase.
    fn read_phrase(&mut self, start: usize) -> Result<Token, QueryError> {
        self.advance(); // consume opening quote

        let mut content = String::new();
        loop {
            match self.chars.peek() {
                Some(&'"') => {
                    self.advance();
                    return Ok(Token::Phrase(content));
                }
                Some(&'\\') => {
                    self.advance();
                    if let Some(&escaped) = self.chars.peek() {
                        content.push(escaped);
                        self.advance();
                    }
                }
                Some(&ch) => {
                    content.push(ch);
                    self.advance();
                }
                None => return Err(QueryError::syntax("unclosed quote", start)),
            }
        }
    }

    /// Reads a `/pattern/` regular expression.
    ///
    /// `\/` escapes the delimiter; every other backslash sequence is kept
    /// verbatim so character classes survive.
    fn read_regex(&mut self, start: usize) -> Result<Token, QueryError> {
        self.advance(); // consume opening slash

        let mut pattern = String::new();
        loop {
            match self.chars.peek() {
                Some(&'/') => {
                    self.advance();
                    return Ok(Token::Regex(pattern));
                }
                Some(&'\\') => {
                    self.advance();
                    match self.chars.peek() {
                        Some(&'/') => {
                            pattern.push('/');
                            self.advance();
                        }
                        Some(&other) => {
                            pattern.push('\\');
                            pattern.push(other);
                            self.advance();
                        }
                        None => return Err(QueryError::syntax("unclosed regex", start)),
                    }
                }
                Some(&ch) => {
                    pattern.push(ch);
                    self.advance();
                }
                None => return Err(QueryError::syntax("unclosed regex", start)),
            }
        }
    }

    /// Reads a term, keyword, or field prefix.
    fn read_term(&mut self) -> Option<Token> {
        let mut word = String::new();

        while let Some(&ch) = self.chars.peek() {
            let breaks = ch.is_whitespace()
                || matches!(ch, '(' | ')' | '"' | '[' | '{' | ']' | '}')
                || (!self.in_range && matches!(ch, '^' | '~'));
            if breaks {
                break;
            }

            if ch == '\\' {
                self.advance();
                if let Some(&escaped) = self.chars.peek() {
                    word.push(escaped);
                    self.advance();
                }
                continue;
            }

            // A colon ends a field name; inside a range it is part of a
            // timestamp bound.
            if ch == ':' && !self.in_range {
                self.advance();
                if word.is_empty() {
                    continue;
                }
                return Some(Token::FieldPrefix(word));
            }

            word.push(ch);
            self.advance();
        }

        if word.is_empty() {
            return None;
        }

        if word.eq_ignore_ascii_case("OR") {
            return Some(Token::Or);
        }
        if word.eq_ignore_ascii_case("AND") {
            return Some(Token::And);
        }
        if word.eq_ignore_ascii_case("NOT") {
            return Some(Token::Not);
        }
        if self.in_range && word.eq_ignore_ascii_case("TO") {
            return Some(Token::To);
        }

        Some(Token::Term(word))
    }

    /// Reads a boost suffix (`^N` or `^N.N`).
    fn read_boost(&mut self, start: usize) -> Result<Token, QueryError> {
        self.advance(); // consume '^'

        let mut number = String::new();
        while let Some(&ch) = self.chars.peek() {
            if ch.is_ascii_digit() || (ch == '.' && !number.contains('.')) {
                number.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        if number.is_empty() {
            return Err(QueryError::syntax("expected number after '^'", start));
        }
        number
            .parse::<f32>()
            .map(Token::Boost)
            .map_err(|_| QueryError::syntax(format!("invalid boost value: {number}"), start))
    }

    /// Reads a fuzzy suffix (`~` or `~N`).
    fn read_fuzzy(&mut self, start: usize) -> Result<Token, QueryError> {
        self.advance(); // consume '~'

        let mut number = String::new();
        while let Some(&ch) = self.chars.peek() {
            if ch.is_ascii_digit() {
                number.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        if number.is_empty() {
            return Ok(Token::Fuzzy(None));
        }
        number
            .parse::<u8>()
            .map(|d| Token::Fuzzy(Some(d)))
            .map_err(|_| QueryError::syntax(format!("invalid fuzzy distance: {number}"), start))
    }

    /// Skips whitespace characters.
    fn skip_whitespace(&mut self) {
        while let Some(&ch) = self.chars.peek() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Advances to the next character.
    fn advance(&mut self) {
        if let Some(ch) = self.chars.next() {
            self.position += ch.len_utf8();
        }
    }
}

/// Tokenizes a query string.
pub(crate) fn tokenize(input: &str) -> Result<Vec<Spanned>, QueryError> {
    Lexer::new(input).tokenize()
}
