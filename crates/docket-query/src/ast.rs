//! Query abstract syntax tree.
//!
//! Represents parsed query expressions before they are compiled against a
//! collection schema. Literals are uninterpreted strings at this stage; the
//! compiler coerces them to the target field's data type.

use std::fmt;

/// One bound of a range expression.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeBound {
    /// The literal, or `None` for an open (`*`) bound.
    pub value: Option<String>,
    /// Whether the bound itself is included (`[`/`]` vs `{`/`}`).
    pub inclusive: bool,
}

impl RangeBound {
    /// Creates a bound from a literal.
    pub fn literal(value: impl Into<String>, inclusive: bool) -> Self {
        Self {
            value: Some(value.into()),
            inclusive,
        }
    }

    /// Creates an open bound.
    pub fn open() -> Self {
        Self {
            value: None,
            inclusive: true,
        }
    }
}

/// A parsed query expression.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryExpr {
    /// Matches every document (`*` or `*:*`, or an empty query).
    All,

    /// A single search term.
    Term(String),

    /// An exact phrase (sequence of words).
    Phrase(Vec<String>),

    /// A trailing-`*` prefix term.
    Prefix(String),

    /// A `~`-suffixed term with a Levenshtein distance.
    Fuzzy {
        /// The base term.
        term: String,
        /// Maximum edit distance (capped at 2).
        distance: u8,
    },

    /// A `/pattern/` regular expression.
    Regex(String),

    /// A `[a TO b]` / `{a TO b}` range. Only valid under a field qualifier.
    Range {
        /// Lower bound.
        lower: RangeBound,
        /// Upper bound.
        upper: RangeBound,
    },

    /// Negation: results must NOT match this expression.
    Not(Box<Self>),

    /// Conjunction: all sub-expressions must match.
    And(Vec<Self>),

    /// Disjunction: at least one sub-expression must match.
    Or(Vec<Self>),

    /// Field-scoped query: match only within a named field.
    Field {
        /// Full dotted field name.
        name: String,
        /// Expression to match within that field.
        expr: Box<Self>,
    },

    /// Boosted query: multiplies the score of the inner expression.
    Boost {
        /// The expression to boost.
        expr: Box<Self>,
        /// Score multiplier.
        factor: f32,
    },
}

impl QueryExpr {
    /// Creates an And expression, flattening nested Ands and unwrapping
    /// single elements.
    pub fn and(exprs: Vec<Self>) -> Self {
        let flattened: Vec<Self> = exprs
            .into_iter()
            .flat_map(|e| match e {
                Self::And(inner) => inner,
                other => vec![other],
            })
            .collect();

        match flattened.len() {
            0 => Self::And(vec![]),
            1 => flattened.into_iter().next().unwrap(),
            _ => Self::And(flattened),
        }
    }

    /// Creates an Or expression, flattening nested Ors and unwrapping
    /// single elements.
    pub fn or(exprs: Vec<Self>) -> Self {
        let flattened: Vec<Self> = exprs
            .into_iter()
            .flat_map(|e| match e {
                Self::Or(inner) => inner,
                other => vec![other],
            })
            .collect();

        match flattened.len() {
            0 => Self::Or(vec![]),
            1 => flattened.into_iter().next().unwrap(),
            _ => Self::Or(flattened),
        }
    }

    /// Creates a boosted expression.
    pub fn boost(expr: Self, factor: f32) -> Self {
        Self::Boost {
            expr: Box::new(expr),
            factor,
        }
    }

    /// Formats the expression as an indented tree.
    fn fmt_tree(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        let prefix = "  ".repeat(indent);
        match self {
            Self::All => writeln!(f, "{prefix}All"),
            Self::Term(s) => writeln!(f, "{prefix}Term({s:?})"),
            Self::Phrase(words) => writeln!(f, "{prefix}Phrase({words:?})"),
            Self::Prefix(s) => writeln!(f, "{prefix}Prefix({s:?})"),
            Self::Fuzzy { term, distance } => {
                writeln!(f, "{prefix}Fuzzy({term:?}, {distance})")
            }
            Self::Regex(pattern) => writeln!(f, "{prefix}Regex({pattern:?})"),
            Self::Range { lower, upper } => {
                writeln!(
                    f,
                    "{prefix}Range({:?} {} TO {:?} {})",
                    lower.value,
                    if lower.inclusive { "incl" } else { "excl" },
                    upper.value,
                    if upper.inclusive { "incl" } else { "excl" },
                )
            }
            Self::Not(inner) => {
                writeln!(f, "{prefix}Not")?;
                inner.fmt_tree(f, indent + 1)
            }
            Self::And(exprs) => {
                writeln!(f, "{prefix}And")?;
                for expr in exprs {
                    expr.fmt_tree(f, indent + 1)?;
                }
                Ok(())
            }
            Self::Or(exprs) => {
                writeln!(f, "{prefix}Or")?;
                for expr in exprs {
                    expr.fmt_tree(f, indent + 1)?;
                }
                Ok(())
            }
            Self::Field { name, expr } => {
                writeln!(f, "{prefix}Field({name:?})")?;
                expr.fmt_tree(f, indent + 1)
            }
            Self::Boost { expr, factor } => {
                writeln!(f, "{prefix}Boost({factor})")?;
                expr.fmt_tree(f, indent + 1)
            }
        }
    }
}

impl fmt::Display for QueryExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_tree(f, 0)
    }
}
