//! Serializable story progress.

use std::collections::BTreeMap;

use fab_core::Value;
use serde::{Deserialize, Serialize};

use crate::graph::ChoiceSpec;

/// Everything needed to resume a story: position, output, choices,
/// variables and visit counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    /// Knot the cursor is in.
    pub knot: String,
    /// Index of the next step to run.
    pub step: usize,
    /// Whether the story has ended.
    pub ended: bool,
    /// Text of the last produced line.
    pub text: String,
    /// Tags of the last produced line.
    pub tags: Vec<String>,
    /// Choices waiting for a selection.
    pub choices: Vec<ChoiceSpec>,
    /// Global variable values.
    pub variables: BTreeMap<String, Value>,
    /// Visit count per knot.
    pub visits: BTreeMap<String, u32>,
}

impl Progress {
    /// Fresh progress at the start of `knot`.
    pub fn start(knot: &str, variables: BTreeMap<String, Value>) -> Self {
        let mut visits = BTreeMap::new();
        visits.insert(knot.to_string(), 1);
        Self {
            knot: knot.to_string(),
            step: 0,
            ended: false,
            text: String::new(),
            tags: Vec::new(),
            choices: Vec::new(),
            variables,
            visits,
        }
    }
}
