//! Error types raised by story engines.

use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Faults a story engine can raise.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// Compiled content could not be parsed.
    #[error("invalid story content: {0}")]
    InvalidContent(String),

    /// A knot or path does not exist.
    #[error("path not found: {0}")]
    PathNotFound(String),

    /// A variable was read or written without being declared.
    #[error("variable not declared: {0}")]
    UnknownVariable(String),

    /// Choice index outside the presented choices.
    #[error("invalid choice index: {0}")]
    InvalidChoice(usize),

    /// An external function was called with the wrong arguments, or failed.
    #[error("external function '{name}': {reason}")]
    ExternalFunction {
        /// Function name as seen by the narrative.
        name: String,
        /// What went wrong.
        reason: String,
    },

    /// The narrative called a function nothing is bound to.
    #[error("function not found: {0}")]
    FunctionNotFound(String),

    /// `cont` was called while the engine could not continue.
    #[error("cannot continue: no more content")]
    CannotContinue,

    /// Serialized state could not be applied.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Any other runtime fault in the narrative logic.
    #[error("runtime error: {0}")]
    Runtime(String),
}
