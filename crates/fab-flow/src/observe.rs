//! Variable observation registry.
//!
//! Each observed variable name owns an explicit list of native listeners.
//! The engine is asked to record changes of a name once, the first time it is
//! observed; recorded changes are dispatched here and forwarded only while the
//! name is still observed.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use fab_core::{Primitive, StoryEngine, VariableChange};

/// A native callback for changes of one variable. Engine values without a
/// host representation arrive as `None`.
pub type VariableListener = Box<dyn FnMut(&str, Option<&Primitive>)>;

/// Identity of the change event for one observed variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariableSubscription {
    name: String,
}

impl VariableSubscription {
    /// The observed variable.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for VariableSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "variable_changed-{}", self.name)
    }
}

/// Tracks observed variable names and their listeners.
#[derive(Default)]
pub struct VariableRegistry {
    observed: BTreeSet<String>,
    listeners: HashMap<String, Vec<VariableListener>>,
}

impl fmt::Debug for VariableRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VariableRegistry")
            .field("observed", &self.observed)
            .field(
                "listeners",
                &self.listeners.values().map(Vec::len).sum::<usize>(),
            )
            .finish()
    }
}

impl VariableRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe `name`. The engine subscription is created only the first
    /// time; later calls return an equal subscription.
    pub fn observe<E: StoryEngine + ?Sized>(
        &mut self,
        name: &str,
        engine: &mut E,
    ) -> VariableSubscription {
        if self.observed.insert(name.to_string()) {
            log::debug!("observing variable '{name}'");
            engine.observe_variable(name);
        }
        VariableSubscription {
            name: name.to_string(),
        }
    }

    /// Attach a listener to an observed variable. Returns `false` (and drops
    /// the listener) if the variable is not observed.
    pub fn listen(
        &mut self,
        subscription: &VariableSubscription,
        listener: impl FnMut(&str, Option<&Primitive>) + 'static,
    ) -> bool {
        if !self.observed.contains(&subscription.name) {
            return false;
        }
        self.listeners
            .entry(subscription.name.clone())
            .or_default()
            .push(Box::new(listener));
        true
    }

    /// Stop observing `name` and drop its listeners. Other names are not
    /// touched. Returns `false` if `name` was not observed.
    pub fn unobserve<E: StoryEngine + ?Sized>(&mut self, name: &str, engine: &mut E) -> bool {
        if !self.observed.remove(name) {
            return false;
        }
        log::debug!("no longer observing variable '{name}'");
        engine.remove_variable_observer(name);
        self.listeners.remove(name);
        true
    }

    /// Whether `name` is observed.
    pub fn is_observed(&self, name: &str) -> bool {
        self.observed.contains(name)
    }

    /// Observed names in sorted order.
    pub fn observed(&self) -> impl Iterator<Item = &str> {
        self.observed.iter().map(String::as_str)
    }

    /// Number of listeners attached to `name`.
    pub fn listener_count(&self, name: &str) -> usize {
        self.listeners.get(name).map_or(0, Vec::len)
    }

    /// Forward engine changes to listeners. Changes for names that are no
    /// longer observed are dropped. Returns how many changes were forwarded.
    pub fn dispatch(&mut self, changes: Vec<VariableChange>) -> usize {
        let mut forwarded = 0;
        for change in changes {
            if !self.observed.contains(&change.name) {
                log::trace!("dropping stale change of '{}'", change.name);
                continue;
            }
            let value = change.value.to_primitive();
            if let Some(listeners) = self.listeners.get_mut(&change.name) {
                for listener in listeners.iter_mut() {
                    listener(&change.name, value.as_ref());
                }
            }
            forwarded += 1;
        }
        forwarded
    }

    /// Tear down every subscription. With an engine, its observers are
    /// removed as well.
    pub fn clear<E: StoryEngine + ?Sized>(&mut self, engine: Option<&mut E>) {
        if let Some(engine) = engine {
            for name in &self.observed {
                engine.remove_variable_observer(name);
            }
        }
        self.observed.clear();
        self.listeners.clear();
    }
}
