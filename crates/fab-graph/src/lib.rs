//! A minimal story-graph engine for Fabula.
//!
//! Plays a JSON graph of knots made of lines, assignments, external calls,
//! choices and diverts. There is no expression language: the graph is
//! expected to be produced by a compiler that has already resolved logic into
//! these steps.

/// A [`fab_core::StoryEngine`] over a story graph.
pub mod engine;
/// The compiled graph format.
pub mod graph;
/// Serializable progress.
pub mod state;

pub use engine::GraphEngine;
pub use graph::{ChoiceSpec, Knot, Operand, Step, StoryGraph};
pub use state::Progress;
