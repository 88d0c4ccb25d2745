//! References to compiled story content.

use std::fmt;
use std::path::Path;

/// An opaque resource identifier paired with the compiled content attached to
/// it, if any.
///
/// A reference without content is invalid; loading it fails without touching
/// the current story.
#[derive(Clone, PartialEq, Eq)]
pub struct StoryContent {
    id: String,
    compiled: Option<String>,
}

impl StoryContent {
    /// Identifier used for content that did not come from a resource.
    pub const INLINE_ID: &'static str = "<inline>";

    /// A reference with compiled content attached.
    pub fn new(id: impl Into<String>, compiled: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            compiled: Some(compiled.into()),
        }
    }

    /// A reference with nothing attached.
    pub fn empty(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            compiled: None,
        }
    }

    /// A synthetic reference around raw compiled content.
    pub fn inline(compiled: impl Into<String>) -> Self {
        Self::new(Self::INLINE_ID, compiled)
    }

    /// Read compiled content from a file. Unreadable or empty files yield an
    /// invalid reference rather than an error.
    pub fn from_file(path: &Path) -> Self {
        let id = path.display().to_string();
        match std::fs::read_to_string(path) {
            Ok(text) if !text.trim().is_empty() => Self::new(id, text),
            _ => Self::empty(id),
        }
    }

    /// The resource identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The compiled content, if attached.
    pub fn compiled(&self) -> Option<&str> {
        self.compiled.as_deref()
    }

    /// Whether compiled content is attached.
    pub fn is_valid(&self) -> bool {
        self.compiled.is_some()
    }
}

impl fmt::Debug for StoryContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoryContent")
            .field("id", &self.id)
            .field("bytes", &self.compiled.as_ref().map(String::len))
            .finish()
    }
}
