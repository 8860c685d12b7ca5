use std::fmt;

use regex::Regex;

/// Name of a comparison a condition can use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PredicateKind {
    Eq,
    Ne,
    /// Lexicographic greater-than. Parsed but not allowed for any current subject.
    Gt,
    Matches,
}

impl PredicateKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "eq" => Some(Self::Eq),
            "ne" => Some(Self::Ne),
            "gt" => Some(Self::Gt),
            "matches" => Some(Self::Matches),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Gt => "gt",
            Self::Matches => "matches",
        }
    }
}

impl fmt::Display for PredicateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A compiled comparison between an extracted request value and the
/// expected value of a condition.
///
/// `matches` patterns are compiled once when the condition is parsed.
#[derive(Debug, Clone)]
pub enum Predicate {
    Eq,
    Ne,
    Gt,
    Matches(Regex),
}

impl Predicate {
    /// Builds the predicate for `kind`, compiling `expected` when it is a pattern.
    pub fn compile(kind: PredicateKind, expected: &str) -> Result<Self, regex::Error> {
        Ok(match kind {
            PredicateKind::Eq => Self::Eq,
            PredicateKind::Ne => Self::Ne,
            PredicateKind::Gt => Self::Gt,
            PredicateKind::Matches => Self::Matches(Regex::new(expected)?),
        })
    }

    pub fn kind(&self) -> PredicateKind {
        match self {
            Self::Eq => PredicateKind::Eq,
            Self::Ne => PredicateKind::Ne,
            Self::Gt => PredicateKind::Gt,
            Self::Matches(_) => PredicateKind::Matches,
        }
    }

    /// `matches` ignores `expected` and searches `actual` with the compiled pattern.
    pub fn test(&self, actual: &str, expected: &str) -> bool {
        match self {
            Self::Eq => actual == expected,
            Self::Ne => actual != expected,
            Self::Gt => actual > expected,
            Self::Matches(re) => re.is_match(actual),
        }
    }
}
