//! The closed error taxonomy every pipeline entry point funnels failures
//! into, and the internal error types the individual steps raise before
//! being enveloped by an orchestrator.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use snafu::Snafu;

/// One of the five closed failure classes a pipeline can terminate with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClass {
    Validation,
    Step1,
    Step2,
    Step3,
    Step4,
}

/// A terminal, three-field error value. Any component returning an
/// `Envelope` means the pipeline aborts; no partial artifact set is ever
/// emitted alongside one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub error: ErrorClass,
    pub reason: String,
    #[serde(default)]
    pub details: Map<String, Value>,
}

impl Envelope {
    pub fn new(error: ErrorClass, reason: impl Into<String>, details: Map<String, Value>) -> Self {
        Self { error, reason: reason.into(), details }
    }

    /// Shorthand for the common `{"stage": "..."}` details shape.
    pub fn with_stage(error: ErrorClass, reason: impl Into<String>, stage: &str) -> Self {
        let mut details = Map::new();
        details.insert("stage".to_string(), Value::String(stage.to_string()));
        Self::new(error, reason, details)
    }

    /// Shorthand for `{"section": "..."}`, used by the Validation class.
    pub fn with_section(reason: impl Into<String>, section: &str) -> Self {
        let mut details = Map::new();
        details.insert("section".to_string(), Value::String(section.to_string()));
        Self::new(ErrorClass::Validation, reason, details)
    }
}

/// Internal failure raised by validation and the steps before it has been
/// wrapped in an [`Envelope`] by an orchestrator. Kept separate from
/// `Envelope` so that callers deep in the algebra never need to know which
/// step they are running in.
#[derive(Debug, Snafu)]
pub enum CoreError {
    #[snafu(display("{message}"))]
    Validation { message: String },

    #[snafu(display("missing required field: {field}"))]
    Runtime { field: String },

    #[snafu(display("ABIE dependency graph has a cycle"))]
    Cycle,
}

impl CoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        CoreError::Validation { message: message.into() }
    }

    pub fn runtime(field: impl Into<String>) -> Self {
        CoreError::Runtime { field: field.into() }
    }

    /// The `details.stage` an envelope built from this error should carry.
    pub fn stage(&self) -> &'static str {
        match self {
            CoreError::Validation { .. } => "validation",
            CoreError::Runtime { .. } => "runtime",
            CoreError::Cycle => "cycle",
        }
    }
}

/// Result alias used throughout the semantic-validation layer, where the
/// failure is always a plain message destined for an [`Envelope`]'s
/// `reason` field.
pub type VResult<T> = Result<T, String>;

pub(crate) fn ensure(condition: bool, message: impl Into<String>) -> VResult<()> {
    if condition {
        Ok(())
    } else {
        Err(message.into())
    }
}
