//! Error types for the flow controller.

use fab_core::EngineError;
use thiserror::Error;

/// Result type for controller operations.
pub type FlowResult<T> = Result<T, FlowError>;

/// Failures the controller reports to its caller.
///
/// Runtime faults during continuation are never reported here; they are
/// turned into story text instead.
#[derive(Debug, Error)]
pub enum FlowError {
    /// The content reference has nothing attached or the engine rejected it.
    #[error("story '{id}' is not valid: {reason}")]
    InvalidStory {
        /// Resource identifier of the rejected content.
        id: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The operation needs a loaded story.
    #[error("no story loaded")]
    NoStoryLoaded,

    /// Jumping to a path failed.
    #[error("cannot go to '{path}': {source}")]
    Navigation {
        /// Requested path.
        path: String,
        /// Engine fault.
        source: EngineError,
    },

    /// Engine fault propagated to the caller.
    #[error("{0}")]
    Engine(#[from] EngineError),

    /// Storage provider failure other than a missing save.
    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// Configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),
}
