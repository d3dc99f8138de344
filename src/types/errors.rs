//! Application error types.
//!
//! All errors use `thiserror` for automatic Error trait derivation and provide
//! clear error messages with context.

use thiserror::Error;

use crate::expression::EvaluationError;

/// Application result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error enum for the BPMN engine.
#[derive(Error, Debug)]
pub enum Error {
    /// Expression parse/evaluation failure (parse error, undefined variable,
    /// type mismatch).
    #[error("expression evaluation failed: {0}")]
    Evaluation(#[from] EvaluationError),

    /// Exclusive gateway with no satisfied condition and no default flow.
    #[error("no outgoing flow matched at gateway '{gateway_id}' and no default flow exists")]
    NoMatchingFlow { gateway_id: String },

    /// Input or output mapping of a task could not be evaluated.
    #[error("mapping of '{target}' at element '{element_id}' failed: {source}")]
    MappingEvaluation {
        element_id: String,
        target: String,
        source: EvaluationError,
    },

    /// A task handler reported failure.
    #[error("job at element '{element_id}' failed: {reason}")]
    JobFailed { element_id: String, reason: String },

    /// A single run walked more elements than allowed.
    #[error("instance {instance_key} exceeded {limit} steps in one run")]
    StepLimitExceeded { instance_key: i64, limit: u32 },

    /// Invalid process definition or request.
    #[error("validation error: {0}")]
    Validation(String),

    /// Unknown process, instance or element.
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid state transition.
    #[error("state transition error: {0}")]
    StateTransition(String),

    /// Internal errors.
    #[error("internal error: {0}")]
    Internal(String),

    /// Serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for errors caused by expression evaluation, either raised directly
    /// (gateway conditions) or wrapped by a task mapping.
    pub fn is_evaluation(&self) -> bool {
        matches!(
            self,
            Error::Evaluation(_) | Error::MappingEvaluation { .. }
        )
    }

    /// The underlying evaluation error, if any.
    pub fn evaluation_error(&self) -> Option<&EvaluationError> {
        match self {
            Error::Evaluation(e) => Some(e),
            Error::MappingEvaluation { source, .. } => Some(source),
            _ => None,
        }
    }
}

// Convenience constructors
impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn state_transition(msg: impl Into<String>) -> Self {
        Self::StateTransition(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn mapping(
        element_id: impl Into<String>,
        target: impl Into<String>,
        source: EvaluationError,
    ) -> Self {
        Self::MappingEvaluation {
            element_id: element_id.into(),
            target: target.into(),
            source,
        }
    }
}
