//! Error types for evaluation
//!
//! Every variant is caught at the evaluation boundary and turned into a
//! `Verdict`; none of them reach the caller as a failure.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EvalError>;

/// Failure raised by a checker, the sandbox or the document harness
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    /// Actual output did not deep-equal the expected output
    #[error("Expected values to be strictly deep-equal (case {case}): actual {actual}, expected {expected}")]
    Validation {
        case: usize,
        actual: String,
        expected: String,
    },

    /// A required element is missing from the submitted markup
    #[error("{message}")]
    Structural { selector: String, message: String },

    /// A required declaration, or the rule block itself, is missing
    #[error("{message}")]
    StyleRule { selector: String, message: String },

    /// Learner source could not be turned into a callable
    #[error("{0}")]
    Materialization(String),

    /// Learner code threw while running a test vector
    #[error("{0}")]
    Runtime(String),

    /// Wall-clock budget exhausted
    #[error("Time limit exceeded ({limit_ms}ms)")]
    Timeout { limit_ms: u64 },

    /// Learner code exhausted the sandbox heap
    #[error("Memory limit exceeded ({limit_bytes} bytes)")]
    MemoryLimit { limit_bytes: usize },

    #[error("Submission is {size} bytes, limit is {limit} bytes")]
    SourceTooLarge { size: usize, limit: usize },

    #[error("Invalid selector `{selector}`: {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("Problem `{slug}` expects {expected} code, got {actual} code")]
    SubmissionMismatch {
        slug: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Unknown problem: {0}")]
    UnknownProblem(String),
}

impl EvalError {
    pub fn is_validation(&self) -> bool {
        matches!(self, EvalError::Validation { .. })
    }
}

/// Catalog construction failure
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to parse catalog: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to read catalog {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Duplicate problem slug: {0}")]
    DuplicateSlug(String),

    #[error("Problem `{slug}` is invalid: {reason}")]
    InvalidProblem { slug: String, reason: String },
}
