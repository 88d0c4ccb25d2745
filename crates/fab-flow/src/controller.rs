//! The narrative flow controller.
//!
//! `StoryController` owns one story engine at a time and drives it through
//! `Unloaded → Ready → Advancing → AwaitingChoice | Ended`. Progression is
//! reported as [`StoryEvent`]s that the presentation layer drains; variable
//! changes go to per-name listeners.

use std::fmt;

use fab_core::{ExternalFunction, Primitive, StoryContent, StoryEngine, Value};

use crate::binding::{BindingRegistry, IntoExternalFunction};
use crate::config::FlowConfig;
use crate::error::{FlowError, FlowResult};
use crate::event::{EventQueue, StoryEvent};
use crate::observe::{VariableRegistry, VariableSubscription};
use crate::persist::{FsStorage, PersistenceCodec, StorageAddress, StorageProvider};

/// Where the controller is in the story.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    /// No story loaded.
    Unloaded,
    /// Story loaded; nothing presented since the last load, jump or restore.
    Ready,
    /// Producing text.
    Advancing,
    /// Choices presented; waiting for `select_choice`.
    AwaitingChoice,
    /// The story ended. `Ended` is reported once per arrival.
    Ended,
}

/// Result of evaluating a narrative function, projected to host values.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// Returned value. Engine composites become `None`.
    pub value: Option<Primitive>,
    /// Text produced while the function ran.
    pub text: String,
}

type Deferred = Box<dyn FnOnce()>;

/// Drives a story engine and reports progression.
pub struct StoryController<E: StoryEngine> {
    config: FlowConfig,
    story: Option<E>,
    content_id: Option<String>,
    state: FlowState,
    events: EventQueue,
    variables: VariableRegistry,
    bindings: BindingRegistry,
    codec: PersistenceCodec,
    deferred: Vec<Deferred>,
}

impl<E: StoryEngine> fmt::Debug for StoryController<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoryController")
            .field("content_id", &self.content_id)
            .field("state", &self.state)
            .field("events", &self.events.len())
            .field("variables", &self.variables)
            .field("bindings", &self.bindings)
            .field("deferred", &self.deferred.len())
            .finish()
    }
}

impl<E: StoryEngine> Default for StoryController<E> {
    fn default() -> Self {
        Self::new(FlowConfig::default())
    }
}

impl<E: StoryEngine> StoryController<E> {
    /// Create a controller with filesystem storage rooted per `config`.
    pub fn new(config: FlowConfig) -> Self {
        let storage = Box::new(FsStorage::from_config(&config));
        Self::with_storage(config, storage)
    }

    /// Create a controller over a custom storage provider.
    pub fn with_storage(config: FlowConfig, storage: Box<dyn StorageProvider>) -> Self {
        Self {
            events: EventQueue::new(config.max_events),
            config,
            story: None,
            content_id: None,
            state: FlowState::Unloaded,
            variables: VariableRegistry::new(),
            bindings: BindingRegistry::new(),
            codec: PersistenceCodec::new(storage),
            deferred: Vec::new(),
        }
    }

    /// Create a controller and load `content` right away.
    pub fn with_story(config: FlowConfig, content: &StoryContent) -> FlowResult<Self> {
        let mut controller = Self::new(config);
        controller.load_story(content)?;
        Ok(controller)
    }

    /// The configuration in use.
    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    /// The current state.
    pub fn flow_state(&self) -> FlowState {
        self.state
    }

    /// Identifier of the loaded content.
    pub fn content_id(&self) -> Option<&str> {
        self.content_id.as_deref()
    }

    /// The loaded engine.
    pub fn story(&self) -> Option<&E> {
        self.story.as_ref()
    }

    /// Whether a story is loaded.
    pub fn is_loaded(&self) -> bool {
        self.story.is_some()
    }

    // -----------------------------------------------------------------------
    // Loading
    // -----------------------------------------------------------------------

    /// Load a story. Invalid content is rejected without touching the
    /// current story.
    pub fn load_story(&mut self, content: &StoryContent) -> FlowResult<()> {
        let id = content.id().to_string();
        let Some(compiled) = content.compiled() else {
            log::error!("story '{id}' has no compiled content attached");
            return Err(FlowError::InvalidStory {
                id,
                reason: "no compiled content attached".to_string(),
            });
        };
        let mut engine = E::from_compiled(compiled).map_err(|e| {
            log::error!("story '{id}' was rejected: {e}");
            FlowError::InvalidStory {
                id: id.clone(),
                reason: e.to_string(),
            }
        })?;

        self.reset();
        self.bindings.apply(&mut engine);
        self.story = Some(engine);
        self.state = FlowState::Ready;
        log::info!("loaded story '{id}'");
        self.content_id = Some(id);
        Ok(())
    }

    /// Load a story from raw compiled content.
    pub fn load_story_from_str(&mut self, compiled: &str) -> FlowResult<()> {
        self.load_story(&StoryContent::inline(compiled))
    }

    /// Load a story from raw content, then restore `state`. Nothing is
    /// restored if loading fails.
    pub fn load_story_and_set_state(&mut self, compiled: &str, state: &str) -> FlowResult<()> {
        self.load_story_from_str(compiled)?;
        self.set_state_json(state)
    }

    /// Drop the story and every variable subscription. Bindings are kept.
    pub fn unload(&mut self) {
        self.reset();
    }

    fn reset(&mut self) {
        self.variables.clear(self.story.as_mut());
        if let Some(id) = self.content_id.take() {
            log::debug!("unloading story '{id}'");
        }
        self.story = None;
        self.state = FlowState::Unloaded;
        self.events.clear();
    }

    // -----------------------------------------------------------------------
    // Progression
    // -----------------------------------------------------------------------

    /// Advance one step.
    ///
    /// Returns the produced text, or `None` if nothing was produced. Engine
    /// faults are reported as ordinary text. Reaching the end emits
    /// [`StoryEvent::Ended`] once; further calls do nothing.
    pub fn continue_story(&mut self) -> Option<String> {
        if self.state == FlowState::Ended {
            return None;
        }
        let story = self.story.as_mut()?;

        if !story.can_continue() {
            let choices = choice_texts(story);
            if !choices.is_empty() {
                // Choices reached by a jump or restore that were never shown.
                if self.state != FlowState::AwaitingChoice {
                    self.present(choices);
                }
            } else {
                self.finish();
            }
            return None;
        }

        self.state = FlowState::Advancing;
        let (text, tags, faulted) = match story.cont() {
            Ok(text) => (text, story.current_tags(), false),
            Err(fault) => {
                log::warn!("narrative fault: {fault}");
                (fault.to_string(), Vec::new(), true)
            }
        };
        let changes = story.drain_variable_changes();
        let choices = choice_texts(story);
        let can_continue = story.can_continue();

        self.events.push(StoryEvent::Continued {
            text: text.clone(),
            tags,
        });
        self.variables.dispatch(changes);

        if !choices.is_empty() {
            self.present(choices);
        } else if !can_continue && !faulted {
            self.finish();
        }
        Some(text)
    }

    /// Continue while the engine can, then queue `settle` to run on the next
    /// [`end_frame`](Self::end_frame). Returns the number of steps taken.
    pub fn continue_maximally_then(&mut self, settle: impl FnOnce() + 'static) -> usize {
        let steps = self.drain_continuation();
        self.deferred.push(Box::new(settle));
        steps
    }

    /// Continue while the engine can. Returns the number of steps taken.
    pub fn continue_maximally(&mut self) -> usize {
        self.drain_continuation()
    }

    fn drain_continuation(&mut self) -> usize {
        let cap = self.config.max_continuation_steps;
        let mut steps = 0;
        while self.can_continue() {
            if cap > 0 && steps >= cap {
                log::warn!("stopped continuing after {cap} steps");
                return steps;
            }
            self.continue_story();
            steps += 1;
        }
        if matches!(self.state, FlowState::Ready | FlowState::Advancing) {
            // Settle on choices or the end.
            self.continue_story();
        }
        steps
    }

    /// Run everything deferred since the last frame. Returns how many
    /// actions ran.
    pub fn end_frame(&mut self) -> usize {
        let deferred = std::mem::take(&mut self.deferred);
        let count = deferred.len();
        for action in deferred {
            action();
        }
        count
    }

    /// Pick one of the presented choices and continue. Indices outside the
    /// current choice list are ignored.
    pub fn select_choice(&mut self, index: usize) {
        let Some(story) = self.story.as_mut() else {
            return;
        };
        let count = story.current_choices().len();
        if index >= count {
            log::debug!("ignoring choice {index} of {count}");
            return;
        }
        match story.choose_choice_index(index) {
            Ok(()) => {
                let changes = story.drain_variable_changes();
                self.state = FlowState::Advancing;
                self.variables.dispatch(changes);
                self.continue_story();
            }
            Err(fault) => {
                log::warn!("narrative fault while choosing {index}: {fault}");
                self.events.push(StoryEvent::Continued {
                    text: fault.to_string(),
                    tags: Vec::new(),
                });
            }
        }
    }

    /// Jump to `path`. Failures leave the story where it was.
    pub fn choose_path_string(&mut self, path: &str) -> FlowResult<()> {
        let story = self.story.as_mut().ok_or(FlowError::NoStoryLoaded)?;
        if let Err(source) = story.choose_path_string(path) {
            log::error!("cannot go to '{path}': {source}");
            return Err(FlowError::Navigation {
                path: path.to_string(),
                source,
            });
        }
        let changes = story.drain_variable_changes();
        self.state = FlowState::Ready;
        self.variables.dispatch(changes);
        Ok(())
    }

    fn present(&mut self, choices: Vec<String>) {
        log::debug!("presenting {} choices", choices.len());
        self.state = FlowState::AwaitingChoice;
        self.events.push(StoryEvent::Choices(choices));
    }

    fn finish(&mut self) {
        log::debug!("story ended");
        self.state = FlowState::Ended;
        self.events.push(StoryEvent::Ended);
    }

    /// Take every event emitted since the last drain.
    pub fn drain_events(&mut self) -> Vec<StoryEvent> {
        self.events.drain()
    }

    // -----------------------------------------------------------------------
    // Current step
    // -----------------------------------------------------------------------

    /// Text of the last step.
    pub fn current_text(&self) -> String {
        self.story
            .as_ref()
            .map(StoryEngine::current_text)
            .unwrap_or_default()
    }

    /// Tags of the last step.
    pub fn current_tags(&self) -> Vec<String> {
        self.story
            .as_ref()
            .map(StoryEngine::current_tags)
            .unwrap_or_default()
    }

    /// Texts of the current choices, in index order.
    pub fn current_choices(&self) -> Vec<String> {
        self.story.as_ref().map(choice_texts).unwrap_or_default()
    }

    /// Tags of the whole story.
    pub fn global_tags(&self) -> Vec<String> {
        self.story
            .as_ref()
            .map(StoryEngine::global_tags)
            .unwrap_or_default()
    }

    /// Whether the engine can produce more text.
    pub fn can_continue(&self) -> bool {
        self.story.as_ref().is_some_and(StoryEngine::can_continue)
    }

    /// Whether choices are waiting.
    pub fn has_choices(&self) -> bool {
        self.story
            .as_ref()
            .is_some_and(|s| !s.current_choices().is_empty())
    }

    /// Visits of the content at `path`; 0 without a story or for unknown
    /// paths.
    pub fn visit_count_at_path(&self, path: &str) -> u32 {
        let Some(story) = self.story.as_ref() else {
            return 0;
        };
        story.visit_count_at_path(path).unwrap_or_else(|e| {
            log::debug!("visit count for '{path}': {e}");
            0
        })
    }

    /// Tags at `path`; empty without a story or for unknown paths.
    pub fn tags_for_content_at_path(&self, path: &str) -> Vec<String> {
        let Some(story) = self.story.as_ref() else {
            return Vec::new();
        };
        story.tags_for_content_at_path(path).unwrap_or_else(|e| {
            log::debug!("tags for '{path}': {e}");
            Vec::new()
        })
    }

    // -----------------------------------------------------------------------
    // Variables
    // -----------------------------------------------------------------------

    /// Read a story variable. Values with no host representation read as
    /// `None`.
    pub fn variable(&self, name: &str) -> Option<Primitive> {
        self.story.as_ref()?.variable(name)?.to_primitive()
    }

    /// Write a story variable. Observers are notified.
    pub fn set_variable(&mut self, name: &str, value: impl Into<Primitive>) -> FlowResult<()> {
        let story = self.story.as_mut().ok_or(FlowError::NoStoryLoaded)?;
        let result = story.set_variable(name, Value::from(value.into()));
        let changes = story.drain_variable_changes();
        self.variables.dispatch(changes);
        Ok(result?)
    }

    /// Observe a story variable. `None` without a story; observing twice
    /// returns the same subscription.
    pub fn observe_variable(&mut self, name: &str) -> Option<VariableSubscription> {
        let story = self.story.as_mut()?;
        Some(self.variables.observe(name, story))
    }

    /// Attach a listener to an observed variable. Returns `false` if the
    /// subscription is no longer active.
    pub fn on_variable_changed(
        &mut self,
        subscription: &VariableSubscription,
        listener: impl FnMut(&str, Option<&Primitive>) + 'static,
    ) -> bool {
        self.variables.listen(subscription, listener)
    }

    /// Stop observing `name` and drop its listeners.
    pub fn unobserve_variable(&mut self, name: &str) -> bool {
        match self.story.as_mut() {
            Some(story) => self.variables.unobserve(name, story),
            None => false,
        }
    }

    /// The variable registry.
    pub fn variables(&self) -> &VariableRegistry {
        &self.variables
    }

    // -----------------------------------------------------------------------
    // External functions
    // -----------------------------------------------------------------------

    /// Make a native closure callable from the narrative as `name`,
    /// replacing any previous binding. Kept across story loads.
    pub fn bind_function<Args>(&mut self, name: &str, function: impl IntoExternalFunction<Args>) {
        self.bind_external(name, function.into_external(name));
    }

    /// Bind a closure that takes the raw argument list.
    pub fn bind_general_function(
        &mut self,
        name: &str,
        function: impl Fn(&[Value]) -> Option<Value> + 'static,
    ) {
        self.bind_external(name, ExternalFunction::new(move |args| Ok(function(args))));
    }

    fn bind_external(&mut self, name: &str, function: ExternalFunction) {
        if let Some(story) = self.story.as_mut() {
            story.bind_external_function(name, function.clone());
        }
        self.bindings.bind(name, function);
    }

    /// Remove the binding for `name`.
    pub fn unbind_function(&mut self, name: &str) -> bool {
        if let Some(story) = self.story.as_mut() {
            story.unbind_external_function(name);
        }
        self.bindings.unbind(name)
    }

    /// Remove every binding.
    pub fn clear_bindings(&mut self) {
        if let Some(story) = self.story.as_mut() {
            for name in self.bindings.names() {
                story.unbind_external_function(name);
            }
        }
        self.bindings.clear();
    }

    /// The binding registry.
    pub fn bindings(&self) -> &BindingRegistry {
        &self.bindings
    }

    /// Evaluate a narrative function and return its value. `Ok(None)` without
    /// a story; engine faults are returned as errors.
    pub fn evaluate_function(
        &mut self,
        name: &str,
        args: &[Primitive],
    ) -> FlowResult<Option<Primitive>> {
        Ok(self
            .evaluate_function_with_output(name, args)?
            .and_then(|e| e.value))
    }

    /// Evaluate a narrative function and return its value together with the
    /// text it produced.
    pub fn evaluate_function_with_output(
        &mut self,
        name: &str,
        args: &[Primitive],
    ) -> FlowResult<Option<Evaluation>> {
        let Some(story) = self.story.as_mut() else {
            return Ok(None);
        };
        let args: Vec<Value> = args.iter().cloned().map(Value::from).collect();
        let output = story.evaluate_function(name, &args);
        let changes = story.drain_variable_changes();
        self.variables.dispatch(changes);
        let output = output?;
        Ok(Some(Evaluation {
            value: output.value.and_then(|v| v.to_primitive()),
            text: output.text,
        }))
    }

    // -----------------------------------------------------------------------
    // State
    // -----------------------------------------------------------------------

    /// Serialize the story progress.
    pub fn state_json(&self) -> FlowResult<String> {
        let story = self.story.as_ref().ok_or(FlowError::NoStoryLoaded)?;
        Ok(story.state_to_json()?)
    }

    /// Replace the story progress. Pending choices are presented by the next
    /// `continue_story`.
    pub fn set_state_json(&mut self, state: &str) -> FlowResult<()> {
        let story = self.story.as_mut().ok_or(FlowError::NoStoryLoaded)?;
        story.load_state_json(state)?;
        self.state = FlowState::Ready;
        Ok(())
    }

    /// Save progress to `location` (a bare name or a qualified address).
    pub fn save_state(&mut self, location: &str) -> FlowResult<StorageAddress> {
        let address = self.codec.resolve(location);
        self.save_state_to(&address)?;
        Ok(address)
    }

    /// Save progress to an already qualified address.
    pub fn save_state_to(&mut self, address: &StorageAddress) -> FlowResult<()> {
        let state = self.state_json()?;
        self.codec.write(address, &state)?;
        log::info!("saved story state to {address}");
        Ok(())
    }

    /// Restore progress from `location`. Returns the applied state, or `None`
    /// if nothing was saved there.
    pub fn load_state(&mut self, location: &str) -> FlowResult<Option<String>> {
        let address = self.codec.resolve(location);
        self.load_state_from(&address)
    }

    /// Restore progress from an already qualified address.
    pub fn load_state_from(&mut self, address: &StorageAddress) -> FlowResult<Option<String>> {
        if self.story.is_none() {
            return Err(FlowError::NoStoryLoaded);
        }
        let Some(state) = self.codec.read(address)? else {
            return Ok(None);
        };
        self.set_state_json(&state)?;
        log::info!("restored story state from {address}");
        Ok(Some(state))
    }
}

fn choice_texts<E: StoryEngine + ?Sized>(story: &E) -> Vec<String> {
    story
        .current_choices()
        .into_iter()
        .map(|c| c.text)
        .collect()
}

#[cfg(test)]
mod tests {
    use fab_graph::GraphEngine;

    use super::*;
    use crate::persist::MemoryStorage;

    const TWO_LINES: &str = r#"{
        "start": "a",
        "knots": {"a": {"steps": [
            {"line": {"text": "One.", "tags": ["t1"]}},
            {"line": {"text": "Two."}}
        ]}}
    }"#;

    fn controller() -> StoryController<GraphEngine> {
        StoryController::with_storage(FlowConfig::default(), Box::new(MemoryStorage::new()))
    }

    #[test]
    fn starts_unloaded_with_neutral_queries() {
        let mut c = controller();
        assert_eq!(c.flow_state(), FlowState::Unloaded);
        assert_eq!(c.current_text(), "");
        assert!(c.current_tags().is_empty());
        assert!(c.current_choices().is_empty());
        assert!(c.global_tags().is_empty());
        assert!(!c.can_continue());
        assert!(!c.has_choices());
        assert_eq!(c.visit_count_at_path("a"), 0);
        assert!(c.tags_for_content_at_path("a").is_empty());
        assert_eq!(c.variable("gold"), None);
        assert_eq!(c.continue_story(), None);
        assert!(c.observe_variable("gold").is_none());
        assert!(matches!(c.state_json(), Err(FlowError::NoStoryLoaded)));
        assert!(matches!(
            c.choose_path_string("a"),
            Err(FlowError::NoStoryLoaded)
        ));
        assert_eq!(c.evaluate_function("f", &[]).unwrap(), None);
        assert!(c.drain_events().is_empty());
    }

    #[test]
    fn load_transitions_to_ready() {
        let mut c = controller();
        c.load_story_from_str(TWO_LINES).unwrap();
        assert_eq!(c.flow_state(), FlowState::Ready);
        assert_eq!(c.content_id(), Some(StoryContent::INLINE_ID));
        assert!(c.can_continue());
    }

    #[test]
    fn continue_step_by_step() {
        let mut c = controller();
        c.load_story_from_str(TWO_LINES).unwrap();

        assert_eq!(c.continue_story().as_deref(), Some("One."));
        assert_eq!(c.flow_state(), FlowState::Advancing);
        assert_eq!(
            c.drain_events(),
            vec![StoryEvent::Continued {
                text: "One.".to_string(),
                tags: vec!["t1".to_string()]
            }]
        );

        assert_eq!(c.continue_story().as_deref(), Some("Two."));
        assert_eq!(c.flow_state(), FlowState::Ended);
        assert_eq!(
            c.drain_events(),
            vec![
                StoryEvent::Continued {
                    text: "Two.".to_string(),
                    tags: vec![]
                },
                StoryEvent::Ended
            ]
        );

        assert_eq!(c.continue_story(), None);
        assert!(c.drain_events().is_empty());
    }

    #[test]
    fn settle_runs_on_next_frame() {
        use std::cell::Cell;
        use std::rc::Rc;

        let mut c = controller();
        c.load_story_from_str(TWO_LINES).unwrap();
        let settled = Rc::new(Cell::new(false));
        let flag = Rc::clone(&settled);

        assert_eq!(c.continue_maximally_then(move || flag.set(true)), 2);
        assert!(!settled.get());
        assert_eq!(c.end_frame(), 1);
        assert!(settled.get());
        assert_eq!(c.end_frame(), 0);
    }

    #[test]
    fn continuation_cap() {
        let mut c = StoryController::<GraphEngine>::with_storage(
            FlowConfig::default().with_max_continuation_steps(1),
            Box::new(MemoryStorage::new()),
        );
        c.load_story_from_str(TWO_LINES).unwrap();
        assert_eq!(c.continue_maximally(), 1);
        assert!(c.can_continue());
        assert_eq!(c.flow_state(), FlowState::Advancing);
    }

    #[test]
    fn empty_story_ends_on_first_continue() {
        let mut c = controller();
        c.load_story_from_str(r#"{"start": "a", "knots": {"a": {"steps": ["end"]}}}"#)
            .unwrap();
        assert_eq!(c.continue_story(), None);
        assert_eq!(c.flow_state(), FlowState::Ended);
        assert_eq!(c.drain_events(), vec![StoryEvent::Ended]);
    }

    #[test]
    fn unload_keeps_bindings() {
        let mut c = controller();
        c.bind_function("roll", || 4i64);
        c.load_story_from_str(TWO_LINES).unwrap();
        c.unload();
        assert_eq!(c.flow_state(), FlowState::Unloaded);
        assert!(!c.is_loaded());
        assert!(c.bindings().contains("roll"));
    }

    #[test]
    fn with_story_loads() {
        let content = StoryContent::inline(TWO_LINES);
        let c = StoryController::<GraphEngine>::with_story(FlowConfig::default(), &content)
            .unwrap();
        assert!(c.is_loaded());
        assert!(
            StoryController::<GraphEngine>::with_story(
                FlowConfig::default(),
                &StoryContent::empty("x")
            )
            .is_err()
        );
    }

    #[test]
    fn set_variable_without_story() {
        let mut c = controller();
        assert!(matches!(
            c.set_variable("gold", 1),
            Err(FlowError::NoStoryLoaded)
        ));
    }

    #[test]
    fn save_requires_story() {
        let mut c = controller();
        assert!(matches!(c.save_state("slot"), Err(FlowError::NoStoryLoaded)));
        assert!(matches!(c.load_state("slot"), Err(FlowError::NoStoryLoaded)));
    }
}
