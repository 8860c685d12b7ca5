use std::borrow::Cow;
use std::fmt;

use crate::limits::predicate::PredicateKind;
use crate::limits::request::RequestView;

const HEADER_PREDICATES: &[PredicateKind] =
    &[PredicateKind::Eq, PredicateKind::Ne, PredicateKind::Matches];
const CLIENT_IP_PREDICATES: &[PredicateKind] = &[PredicateKind::Eq, PredicateKind::Ne];
const PATH_PREDICATES: &[PredicateKind] =
    &[PredicateKind::Eq, PredicateKind::Ne, PredicateKind::Matches];
const TRUE_PREDICATES: &[PredicateKind] = &[PredicateKind::Eq];

/// Part of a request a condition inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subject {
    /// `header <name>`: value of the named header, looked up case-insensitively.
    Header,
    /// `client_ip`: the client IP attached to the request view.
    ClientIp,
    /// `path`: URL path without the query string.
    Path,
    /// `true`: always the literal `"true"`.
    True,
}

impl Subject {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "header" => Some(Self::Header),
            "client_ip" => Some(Self::ClientIp),
            "path" => Some(Self::Path),
            "true" => Some(Self::True),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Header => "header",
            Self::ClientIp => "client_ip",
            Self::Path => "path",
            Self::True => "true",
        }
    }

    /// Number of parameters written between the subject and the predicate.
    pub fn parameter_count(self) -> usize {
        match self {
            Self::Header => 1,
            Self::ClientIp | Self::Path | Self::True => 0,
        }
    }

    pub fn allowed_predicates(self) -> &'static [PredicateKind] {
        match self {
            Self::Header => HEADER_PREDICATES,
            Self::ClientIp => CLIENT_IP_PREDICATES,
            Self::Path => PATH_PREDICATES,
            Self::True => TRUE_PREDICATES,
        }
    }

    pub fn allows(self, predicate: PredicateKind) -> bool {
        self.allowed_predicates().contains(&predicate)
    }

    /// Extracts the value this subject refers to, `None` when the request lacks it.
    pub fn extract<'a>(
        self,
        request: &RequestView<'a>,
        parameters: &[String],
    ) -> Option<Cow<'a, str>> {
        match self {
            Self::Header => parameters.first().and_then(|name| request.header(name)),
            Self::ClientIp => request.client_ip.map(Cow::Borrowed),
            Self::Path => Some(Cow::Borrowed(request.path())),
            Self::True => Some(Cow::Borrowed("true")),
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
