use std::fmt;

use serde_json::Value;
use thiserror::Error;

use crate::limits::predicate::{Predicate, PredicateKind};
use crate::limits::request::RequestView;
use crate::limits::subject::Subject;

/// Malformed condition in a limits configuration.
#[derive(Debug, Error)]
pub enum ConditionError {
    #[error("condition must be an array of strings")]
    NotAnArray,

    #[error("condition element {index} is not a string")]
    NotAString { index: usize },

    #[error("condition has no subject")]
    MissingSubject,

    #[error("invalid subject: {0}")]
    UnknownSubject(String),

    #[error("expected {expected} elements for subject {subject} but got {actual}")]
    WrongArity { subject: Subject, expected: usize, actual: usize },

    #[error("invalid predicate: {0}")]
    UnknownPredicate(String),

    #[error("predicate {predicate} not usable for subject {subject}")]
    PredicateNotAllowed { predicate: PredicateKind, subject: Subject },

    #[error("invalid pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// A single `[subject, params..., predicate, expected]` test on a request.
#[derive(Debug, Clone)]
pub struct Condition {
    subject: Subject,
    parameters: Vec<String>,
    predicate: Predicate,
    expected: String,
}

impl Condition {
    /// Parses the flat string form, e.g. `["header", "X-Class", "eq", "batch"]`.
    ///
    /// Header names are stored lowercased.
    pub fn parse<S: AsRef<str>>(parts: &[S]) -> Result<Self, ConditionError> {
        let first = parts.first().ok_or(ConditionError::MissingSubject)?.as_ref();
        let subject = Subject::from_name(first)
            .ok_or_else(|| ConditionError::UnknownSubject(first.to_string()))?;

        let param_count = subject.parameter_count();
        let expected_len = param_count.saturating_add(3);
        if parts.len() != expected_len {
            return Err(ConditionError::WrongArity {
                subject,
                expected: expected_len,
                actual: parts.len(),
            });
        }

        let parameters: Vec<String> = parts[1..=param_count]
            .iter()
            .map(|p| match subject {
                Subject::Header => p.as_ref().to_ascii_lowercase(),
                _ => p.as_ref().to_string(),
            })
            .collect();

        let predicate_name = parts[param_count + 1].as_ref();
        let kind = PredicateKind::from_name(predicate_name)
            .ok_or_else(|| ConditionError::UnknownPredicate(predicate_name.to_string()))?;
        if !subject.allows(kind) {
            return Err(ConditionError::PredicateNotAllowed { predicate: kind, subject });
        }

        let expected = parts[param_count + 2].as_ref().to_string();
        let predicate = Predicate::compile(kind, &expected).map_err(|source| {
            ConditionError::InvalidPattern { pattern: expected.clone(), source }
        })?;

        Ok(Self { subject, parameters, predicate, expected })
    }

    /// Parses a condition from its JSON form.
    pub fn from_value(value: &Value) -> Result<Self, ConditionError> {
        let items = value.as_array().ok_or(ConditionError::NotAnArray)?;
        let parts = items
            .iter()
            .enumerate()
            .map(|(index, item)| item.as_str().ok_or(ConditionError::NotAString { index }))
            .collect::<Result<Vec<&str>, _>>()?;
        Self::parse(&parts)
    }

    /// A subject with no value in the request never satisfies the condition.
    pub fn evaluate(&self, request: &RequestView<'_>) -> bool {
        self.subject
            .extract(request, &self.parameters)
            .is_some_and(|actual| self.predicate.test(&actual, &self.expected))
    }

    pub fn subject(&self) -> Subject {
        self.subject
    }

    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }

    pub fn predicate(&self) -> PredicateKind {
        self.predicate.kind()
    }

    pub fn expected(&self) -> &str {
        &self.expected
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.subject.name())?;
        for p in &self.parameters {
            write!(f, "[{p}]")?;
        }
        write!(f, " {} {:?}", self.predicate.kind(), self.expected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderMap, HeaderValue, Uri};
    use serde_json::json;

    fn view<'a>(uri: &'a Uri, headers: &'a HeaderMap) -> RequestView<'a> {
        RequestView::new(uri, headers).with_client_ip(Some("1.2.3.4"))
    }

    #[test]
    fn rejects_non_array() {
        assert!(matches!(
            Condition::from_value(&json!("not an array")),
            Err(ConditionError::NotAnArray)
        ));
        assert!(matches!(
            Condition::from_value(&json!(["path", 1, "/x"])),
            Err(ConditionError::NotAString { index: 1 })
        ));
    }

    #[test]
    fn rejects_unknown_subject() {
        let err = Condition::parse(&["invalid"]).err();
        assert!(matches!(err, Some(ConditionError::UnknownSubject(s)) if s == "invalid"));
        assert!(matches!(
            Condition::parse::<&str>(&[]),
            Err(ConditionError::MissingSubject)
        ));
    }

    #[test]
    fn rejects_wrong_arity() {
        let err = Condition::parse(&["header", "eq", "test"]).err();
        assert!(matches!(
            err,
            Some(ConditionError::WrongArity { expected: 4, actual: 3, .. })
        ));
    }

    #[test]
    fn rejects_unknown_and_disallowed_predicates() {
        assert!(matches!(
            Condition::parse(&["header", "test", "invalid predicate", "test"]),
            Err(ConditionError::UnknownPredicate(_))
        ));
        let err = Condition::parse(&["header", "test", "gt", "test"]).err();
        assert_eq!(
            err.map(|e| e.to_string()),
            Some("predicate gt not usable for subject header".to_string())
        );
    }

    #[test]
    fn rejects_bad_pattern_at_parse_time() {
        assert!(matches!(
            Condition::parse(&["path", "matches", "(unclosed"]),
            Err(ConditionError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn keeps_parsed_parts() -> Result<(), ConditionError> {
        let c = Condition::parse(&["header", "TestHeader", "eq", "testvalue"])?;
        assert_eq!(c.subject(), Subject::Header);
        assert_eq!(c.parameters(), ["testheader".to_string()]);
        assert_eq!(c.predicate(), PredicateKind::Eq);
        assert_eq!(c.expected(), "testvalue");
        Ok(())
    }

    #[test]
    fn evaluates_against_request() -> Result<(), Box<dyn std::error::Error>> {
        let uri: Uri = "/test?a=b".parse()?;
        let mut headers = HeaderMap::new();
        headers.insert("test", HeaderValue::from_static("FIXME"));
        let req = view(&uri, &headers);

        assert!(Condition::parse(&["header", "test", "eq", "FIXME"])?.evaluate(&req));
        assert!(!Condition::parse(&["header", "test", "eq", "other"])?.evaluate(&req));
        assert!(Condition::parse(&["client_ip", "eq", "1.2.3.4"])?.evaluate(&req));
        assert!(Condition::parse(&["path", "eq", "/test"])?.evaluate(&req));
        assert!(Condition::parse(&["true", "eq", "true"])?.evaluate(&req));
        assert!(Condition::parse(&["header", "test", "matches", "^FIXM.$"])?.evaluate(&req));
        assert!(!Condition::parse(&["header", "test", "matches", "^FIXM.{2}$"])?.evaluate(&req));
        Ok(())
    }

    #[test]
    fn missing_header_never_matches() -> Result<(), Box<dyn std::error::Error>> {
        let uri: Uri = "/".parse()?;
        let mut headers = HeaderMap::new();
        headers.insert("random-header", HeaderValue::from_static("v"));
        let req = view(&uri, &headers);

        assert!(!Condition::parse(&["header", "test", "matches", ".*"])?.evaluate(&req));
        assert!(!Condition::parse(&["header", "test", "ne", "x"])?.evaluate(&req));
        Ok(())
    }

    #[test]
    fn repeated_header_matches_joined_value() -> Result<(), Box<dyn std::error::Error>> {
        let uri: Uri = "/".parse()?;
        let mut headers = HeaderMap::new();
        headers.append("x-class", HeaderValue::from_static("batch"));
        headers.append("x-class", HeaderValue::from_static("reuse"));
        let req = view(&uri, &headers);

        assert!(Condition::parse(&["header", "X-Class", "eq", "batch, reuse"])?.evaluate(&req));
        assert!(!Condition::parse(&["header", "X-Class", "eq", "batch"])?.evaluate(&req));
        assert!(Condition::parse(&["header", "X-Class", "matches", "reuse$"])?.evaluate(&req));
        Ok(())
    }

    #[test]
    fn display_is_readable() -> Result<(), ConditionError> {
        let c = Condition::parse(&["header", "X-A", "ne", "b"])?;
        assert_eq!(c.to_string(), "header[x-a] ne \"b\"");
        Ok(())
    }
}
