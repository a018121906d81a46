//! Error taxonomy for the live form runtime.
//!
//! Compile errors come from parsing or lowering a transformed body. Runtime
//! errors come from executing it. Neither escapes `Executor::render_source`:
//! both are turned into an inert error-display node at that boundary.

use thiserror::Error;

use crate::value::Value;

#[derive(Debug, Clone, Error)]
pub enum CompileError {
    /// The rewritten text is not valid source.
    #[error("SyntaxError: {0}")]
    Parse(String),
    /// Valid source that uses a construct outside the supported subset.
    #[error("Unsupported syntax: {0}")]
    Unsupported(String),
}

#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error("TypeError: {0}")]
    Type(String),
    #[error("ReferenceError: {0}")]
    Reference(String),
    /// A length or size outside what the runtime will allocate.
    #[error("RangeError: {0}")]
    Range(String),
    /// A value raised by `throw` in authored code.
    #[error("Uncaught {message}")]
    Thrown { message: String, value: Value },
    #[error("Execution exceeded the step budget of {0}")]
    StepLimit(u64),
    #[error("Maximum call depth of {0} exceeded")]
    CallDepth(usize),
    #[error("{0} can only be called while rendering")]
    OutsideRender(String),
    #[error("Whole-form source did not assign `{0}`")]
    MissingBinding(String),
}

impl RuntimeError {
    pub fn type_error(message: impl Into<String>) -> Self {
        RuntimeError::Type(message.into())
    }

    pub fn range_error(message: impl Into<String>) -> Self {
        RuntimeError::Range(message.into())
    }

    /// Budget errors abort the whole unit and cannot be caught by `try`.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RuntimeError::StepLimit(_) | RuntimeError::CallDepth(_))
    }
}
