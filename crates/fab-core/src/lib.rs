//! Story engine boundary for Fabula.
//!
//! Defines what a narrative controller needs from the interpreter it drives:
//! the [`StoryEngine`] trait, the values that flow across it, references to
//! compiled content, and the native callbacks a narrative can call.

/// Compiled content references.
pub mod content;
/// The story engine trait and its companion types.
pub mod engine;
/// Engine fault types.
pub mod error;
/// Engine and host values.
pub mod value;

pub use content::StoryContent;
pub use engine::{Choice, ExternalFunction, FunctionOutput, StoryEngine, VariableChange};
pub use error::{EngineError, EngineResult};
pub use value::{FromValue, IntoValue, Primitive, Value};
