//! Narrative flow controller for Fabula.
//!
//! Drives a [`fab_core::StoryEngine`] step by step and reports progression
//! as events: produced text, choices waiting for the player, and the end of
//! the story. Also keeps native variable listeners and external function
//! bindings across story loads, and saves and restores story progress
//! through a pluggable storage provider.

/// External function bindings.
pub mod binding;
/// Controller configuration.
pub mod config;
/// The flow controller state machine.
pub mod controller;
/// Error types for the controller.
pub mod error;
/// Progression events.
pub mod event;
/// Variable observation.
pub mod observe;
/// Save locations and storage providers.
pub mod persist;

pub use binding::{BindingRegistry, IntoExternalFunction};
pub use config::FlowConfig;
pub use controller::{Evaluation, FlowState, StoryController};
pub use error::{FlowError, FlowResult};
pub use event::{EventQueue, StoryEvent};
pub use observe::{VariableListener, VariableRegistry, VariableSubscription};
pub use persist::{FsStorage, MemoryStorage, PersistenceCodec, StorageAddress, StorageProvider};
