//! Admission control: request classification into buckets, in-flight
//! accounting and the allow/reject decision.

pub mod bucket;
pub mod condition;
pub mod config;
pub mod counter;
pub mod evaluator;
pub mod loader;
pub mod predicate;
pub mod request;
pub mod subject;

pub use bucket::Bucket;
pub use condition::{Condition, ConditionError};
pub use config::{LimitsConfigError, LimitsConfiguration, RawBucket, RawBucketLimits, RawLimitsConfig};
pub use counter::CounterStore;
pub use evaluator::{
    Admission, ClientIpSource, Decision, EvaluationError, EvaluatorOptions, InFlight,
    LimitsEvaluator, Rejection,
};
pub use loader::{
    limits_source_for, FileLimitsSource, HttpLimitsSource, LimitsConfigLoader, LimitsSource,
    LoaderError,
};
pub use predicate::{Predicate, PredicateKind};
pub use request::RequestView;
pub use subject::Subject;
