//! Progression events emitted to the presentation layer.

use std::collections::VecDeque;

/// Something the presentation layer should show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoryEvent {
    /// A unit of text was produced. Runtime faults arrive here too, with the
    /// fault description as text.
    Continued {
        /// Produced text.
        text: String,
        /// Tags on that text.
        tags: Vec<String>,
    },
    /// Choices are waiting; index into this list for `select_choice`.
    Choices(Vec<String>),
    /// The story reached its end.
    Ended,
}

/// Events waiting to be drained by the presentation layer.
#[derive(Debug, Default)]
pub struct EventQueue {
    events: VecDeque<StoryEvent>,
    max_events: usize,
}

impl EventQueue {
    /// Create a queue with the given capacity (0 = unlimited).
    pub fn new(max_events: usize) -> Self {
        Self {
            events: VecDeque::new(),
            max_events,
        }
    }

    /// Append an event, dropping the oldest when over capacity.
    pub fn push(&mut self, event: StoryEvent) {
        self.events.push_back(event);
        if self.max_events > 0 && self.events.len() > self.max_events {
            let overflow = self.events.len() - self.max_events;
            self.events.drain(..overflow);
        }
    }

    /// Take every queued event, oldest first.
    pub fn drain(&mut self) -> Vec<StoryEvent> {
        self.events.drain(..).collect()
    }

    /// Discard every queued event.
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Number of queued events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
