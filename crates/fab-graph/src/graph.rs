//! The compiled story graph format.
//!
//! ```json
//! {
//!   "tags": ["title: The Vault"],
//!   "variables": { "gold": 0 },
//!   "start": "intro",
//!   "knots": {
//!     "intro": {
//!       "steps": [
//!         { "line": { "text": "A door." } },
//!         { "choices": [ { "text": "Open it", "to": "open" } ] }
//!       ]
//!     },
//!     "open": { "steps": [ { "line": { "text": "It creaks." } }, "end" ] }
//!   }
//! }
//! ```

use std::collections::BTreeMap;

use fab_core::{EngineError, EngineResult, Value};
use serde::{Deserialize, Serialize};

/// A parsed story graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryGraph {
    /// Tags attached to the whole story.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Declared global variables and their initial values.
    #[serde(default)]
    pub variables: BTreeMap<String, Value>,
    /// Knot the story starts in.
    pub start: String,
    /// All knots by name.
    pub knots: BTreeMap<String, Knot>,
}

/// A named section of the story. Knots with `params` can be evaluated as
/// functions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Knot {
    /// Tags at the start of the knot.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Parameter names when the knot is evaluated as a function.
    #[serde(default)]
    pub params: Vec<String>,
    /// Steps executed in order.
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// A literal value or a reference to a variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Operand {
    /// Read a variable (function parameters shadow globals).
    Var {
        /// Variable name.
        var: String,
    },
    /// A literal value.
    Literal(Value),
}

/// A choice as written in the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceSpec {
    /// Display text.
    pub text: String,
    /// Knot to divert to when chosen.
    pub to: String,
    /// Tags attached to the choice.
    #[serde(default)]
    pub tags: Vec<String>,
}

/// One instruction in a knot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Produce a line of text.
    Line {
        /// The text.
        text: String,
        /// Tags on the line.
        #[serde(default)]
        tags: Vec<String>,
    },
    /// Assign a variable.
    Set {
        /// Variable name.
        var: String,
        /// New value.
        value: Operand,
    },
    /// Add to an integer variable.
    Add {
        /// Variable name.
        var: String,
        /// Amount to add.
        by: i64,
    },
    /// Call a bound external function.
    Call {
        /// Function name.
        function: String,
        /// Arguments.
        #[serde(default)]
        args: Vec<Operand>,
        /// Variable receiving the return value.
        #[serde(default)]
        into: Option<String>,
    },
    /// Present choices and wait.
    Choices(Vec<ChoiceSpec>),
    /// Jump to another knot.
    Divert {
        /// Target knot.
        to: String,
    },
    /// Return from a function evaluation.
    Return(Operand),
    /// End the story.
    End,
}

impl StoryGraph {
    /// Parse and check a compiled graph.
    pub fn parse(json: &str) -> EngineResult<Self> {
        let graph: Self =
            serde_json::from_str(json).map_err(|e| EngineError::InvalidContent(e.to_string()))?;
        if !graph.knots.contains_key(&graph.start) {
            return Err(EngineError::InvalidContent(format!(
                "start knot '{}' does not exist",
                graph.start
            )));
        }
        Ok(graph)
    }

    /// Look up a knot by name.
    pub fn knot(&self, name: &str) -> EngineResult<&Knot> {
        self.knots
            .get(name)
            .ok_or_else(|| EngineError::PathNotFound(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_graph() {
        let graph = StoryGraph::parse(
            r#"{"start": "a", "knots": {"a": {"steps": [{"line": {"text": "Hi"}}, "end"]}}}"#,
        )
        .unwrap();
        assert_eq!(graph.start, "a");
        assert_eq!(
            graph.knots["a"].steps,
            vec![
                Step::Line {
                    text: "Hi".to_string(),
                    tags: vec![]
                },
                Step::End
            ]
        );
    }

    #[test]
    fn parse_operands() {
        let graph = StoryGraph::parse(
            r#"{"start": "a", "variables": {"gold": 1}, "knots": {"a": {"steps": [
                {"set": {"var": "gold", "value": {"var": "gold"}}},
                {"set": {"var": "gold", "value": 7}},
                {"return": {"list": ["x"]}}
            ]}}}"#,
        )
        .unwrap();
        let steps = &graph.knots["a"].steps;
        assert_eq!(
            steps[0],
            Step::Set {
                var: "gold".to_string(),
                value: Operand::Var {
                    var: "gold".to_string()
                }
            }
        );
        assert_eq!(
            steps[1],
            Step::Set {
                var: "gold".to_string(),
                value: Operand::Literal(Value::Int(7))
            }
        );
        assert_eq!(
            steps[2],
            Step::Return(Operand::Literal(Value::List {
                list: vec!["x".to_string()]
            }))
        );
    }

    #[test]
    fn missing_start_is_invalid() {
        let err = StoryGraph::parse(r#"{"start": "nowhere", "knots": {}}"#).unwrap_err();
        assert!(matches!(err, EngineError::InvalidContent(_)));
    }

    #[test]
    fn malformed_json_is_invalid() {
        let err = StoryGraph::parse("not json").unwrap_err();
        assert!(matches!(err, EngineError::InvalidContent(_)));
    }
}
