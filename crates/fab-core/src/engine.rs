//! The story engine boundary.
//!
//! A [`StoryEngine`] interprets compiled narrative content. Controllers only
//! orchestrate calls into it; they never re-implement narrative semantics.

use std::fmt;
use std::rc::Rc;

use crate::error::EngineResult;
use crate::value::Value;

/// A choice currently presented by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Choice {
    /// Position in the current choice list.
    pub index: usize,
    /// Display text.
    pub text: String,
    /// Tags attached to the choice.
    pub tags: Vec<String>,
}

/// A variable assignment observed by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableChange {
    /// Variable name.
    pub name: String,
    /// Value after the assignment.
    pub value: Value,
}

/// Result of evaluating a narrative function.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FunctionOutput {
    /// Returned value, if the function returned one.
    pub value: Option<Value>,
    /// Text the function produced while running.
    pub text: String,
}

type NativeFn = dyn Fn(&[Value]) -> EngineResult<Option<Value>>;

/// A native callback the narrative can invoke by name.
#[derive(Clone)]
pub struct ExternalFunction(Rc<NativeFn>);

impl ExternalFunction {
    /// Wrap a callback taking the raw argument slice.
    pub fn new(f: impl Fn(&[Value]) -> EngineResult<Option<Value>> + 'static) -> Self {
        Self(Rc::new(f))
    }

    /// Invoke the callback.
    pub fn call(&self, args: &[Value]) -> EngineResult<Option<Value>> {
        (self.0)(args)
    }
}

impl fmt::Debug for ExternalFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ExternalFunction")
    }
}

/// An interpreter for compiled narrative content.
///
/// Variable observation is queue based: after [`observe_variable`] the engine
/// records every change of that variable, and the owner drains them with
/// [`drain_variable_changes`] after each call that may run narrative logic.
///
/// [`observe_variable`]: StoryEngine::observe_variable
/// [`drain_variable_changes`]: StoryEngine::drain_variable_changes
pub trait StoryEngine {
    /// Build an engine from compiled content.
    fn from_compiled(content: &str) -> EngineResult<Self>
    where
        Self: Sized;

    /// Whether another unit of text can be produced.
    fn can_continue(&self) -> bool;

    /// Produce the next unit of text.
    fn cont(&mut self) -> EngineResult<String>;

    /// Text produced by the last step.
    fn current_text(&self) -> String;

    /// Tags attached to the last step.
    fn current_tags(&self) -> Vec<String>;

    /// Choices currently presented, in index order.
    fn current_choices(&self) -> Vec<Choice>;

    /// Tags attached to the story as a whole.
    fn global_tags(&self) -> Vec<String>;

    /// Commit to one of the current choices.
    fn choose_choice_index(&mut self, index: usize) -> EngineResult<()>;

    /// Jump to a named path.
    fn choose_path_string(&mut self, path: &str) -> EngineResult<()>;

    /// How many times the content at `path` has been visited.
    fn visit_count_at_path(&self, path: &str) -> EngineResult<u32>;

    /// Tags at the start of the content at `path`.
    fn tags_for_content_at_path(&self, path: &str) -> EngineResult<Vec<String>>;

    /// Read a global variable.
    fn variable(&self, name: &str) -> Option<Value>;

    /// Assign a global variable.
    fn set_variable(&mut self, name: &str, value: Value) -> EngineResult<()>;

    /// Start recording changes of `name`.
    fn observe_variable(&mut self, name: &str);

    /// Stop recording changes of `name`.
    fn remove_variable_observer(&mut self, name: &str);

    /// Take all changes recorded since the last drain, in order.
    fn drain_variable_changes(&mut self) -> Vec<VariableChange>;

    /// Make `function` callable from the narrative as `name`.
    fn bind_external_function(&mut self, name: &str, function: ExternalFunction);

    /// Remove a previously bound function.
    fn unbind_external_function(&mut self, name: &str);

    /// Run a narrative function without moving the story position.
    fn evaluate_function(&mut self, name: &str, args: &[Value]) -> EngineResult<FunctionOutput>;

    /// Serialize the complete story progress.
    fn state_to_json(&self) -> EngineResult<String>;

    /// Replace the story progress with a serialized state.
    fn load_state_json(&mut self, state: &str) -> EngineResult<()>;
}
