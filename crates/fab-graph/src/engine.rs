//! A [`StoryEngine`] that walks a [`StoryGraph`].

use std::collections::{BTreeMap, BTreeSet, HashMap};

use fab_core::{
    Choice, EngineError, EngineResult, ExternalFunction, FunctionOutput, StoryEngine, Value,
    VariableChange,
};

use crate::graph::{Operand, Step, StoryGraph};
use crate::state::Progress;

/// Walks a story graph one line at a time.
///
/// After every produced line the engine looks ahead through diverts, so
/// choices and the end of the story are known as soon as the last line
/// before them has been returned.
#[derive(Debug)]
pub struct GraphEngine {
    graph: StoryGraph,
    progress: Progress,
    observed: BTreeSet<String>,
    changes: Vec<VariableChange>,
    functions: HashMap<String, ExternalFunction>,
}

impl GraphEngine {
    /// Build an engine from an already parsed graph.
    pub fn new(graph: StoryGraph) -> EngineResult<Self> {
        let progress = Progress::start(&graph.start, graph.variables.clone());
        let mut engine = Self {
            graph,
            progress,
            observed: BTreeSet::new(),
            changes: Vec::new(),
            functions: HashMap::new(),
        };
        engine.look_ahead()?;
        Ok(engine)
    }

    /// The graph being played.
    pub fn graph(&self) -> &StoryGraph {
        &self.graph
    }

    /// Current progress.
    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    fn current_step(&self) -> Option<Step> {
        self.graph
            .knots
            .get(&self.progress.knot)
            .and_then(|k| k.steps.get(self.progress.step))
            .cloned()
    }

    fn enter(&mut self, knot: &str) -> EngineResult<()> {
        self.graph.knot(knot)?;
        log::trace!("entering knot '{knot}'");
        self.progress.knot = knot.to_string();
        self.progress.step = 0;
        *self.progress.visits.entry(knot.to_string()).or_insert(0) += 1;
        Ok(())
    }

    /// Follow diverts and pick up choices or the end of the story without
    /// running any step that has side effects.
    ///
    /// On failure the progress is left exactly as it was, so the divert that
    /// failed is reported once, when a later step runs it.
    fn look_ahead(&mut self) -> EngineResult<()> {
        if self.progress.ended || !self.progress.choices.is_empty() {
            return Ok(());
        }
        let saved = self.progress.clone();
        let followed = self.follow_diverts();
        if followed.is_err() {
            self.progress = saved;
        }
        followed
    }

    /// Look ahead after a produced step. A failing divert stays in place.
    fn settle(&mut self) {
        if let Err(fault) = self.look_ahead() {
            log::trace!("look-ahead stopped: {fault}");
        }
    }

    fn follow_diverts(&mut self) -> EngineResult<()> {
        let mut entered = BTreeSet::new();
        if self.progress.step == 0 {
            entered.insert(self.progress.knot.clone());
        }
        loop {
            match self.current_step() {
                Some(Step::Divert { to }) => {
                    if !entered.insert(to.clone()) {
                        return Err(EngineError::InvalidContent(format!(
                            "divert loop through knot '{to}' has no content"
                        )));
                    }
                    self.enter(&to)?;
                }
                Some(Step::Choices(choices)) => {
                    self.progress.step += 1;
                    self.progress.choices = choices;
                    return Ok(());
                }
                Some(Step::End) | None => {
                    self.progress.ended = true;
                    return Ok(());
                }
                Some(_) => return Ok(()),
            }
        }
    }

    fn read(&self, operand: &Operand, locals: &BTreeMap<String, Value>) -> EngineResult<Value> {
        match operand {
            Operand::Literal(value) => Ok(value.clone()),
            Operand::Var { var } => locals
                .get(var)
                .or_else(|| self.progress.variables.get(var))
                .cloned()
                .ok_or_else(|| EngineError::UnknownVariable(var.clone())),
        }
    }

    fn assign(&mut self, name: &str, value: Value) -> EngineResult<()> {
        let slot = self
            .progress
            .variables
            .get_mut(name)
            .ok_or_else(|| EngineError::UnknownVariable(name.to_string()))?;
        if *slot == value {
            return Ok(());
        }
        *slot = value.clone();
        if self.observed.contains(name) {
            self.changes.push(VariableChange {
                name: name.to_string(),
                value,
            });
        }
        Ok(())
    }

    fn add(&mut self, name: &str, by: i64) -> EngineResult<()> {
        match self.progress.variables.get(name) {
            Some(Value::Int(current)) => {
                let sum = checked_sum(name, *current, by)?;
                self.assign(name, Value::Int(sum))
            }
            Some(other) => Err(EngineError::Runtime(format!(
                "cannot add to {} variable '{name}'",
                other.kind()
            ))),
            None => Err(EngineError::UnknownVariable(name.to_string())),
        }
    }

    fn call(
        &mut self,
        function: &str,
        args: &[Operand],
        locals: &BTreeMap<String, Value>,
    ) -> EngineResult<Option<Value>> {
        let callback = self
            .functions
            .get(function)
            .cloned()
            .ok_or_else(|| EngineError::FunctionNotFound(function.to_string()))?;
        let values = args
            .iter()
            .map(|a| self.read(a, locals))
            .collect::<EngineResult<Vec<_>>>()?;
        callback.call(&values)
    }

    /// Run steps until one produces text, choices or the end.
    fn advance(&mut self) -> EngineResult<String> {
        self.progress.text.clear();
        self.progress.tags.clear();
        let mut no_locals = BTreeMap::new();
        let mut visited = BTreeSet::new();

        while let Some(step) = self.current_step() {
            if !visited.insert((self.progress.knot.clone(), self.progress.step)) {
                self.progress.ended = true;
                return Err(EngineError::InvalidContent(format!(
                    "knot '{}' loops without producing text",
                    self.progress.knot
                )));
            }
            // Move past the step first so a fault never repeats forever.
            self.progress.step += 1;
            match step {
                Step::Line { text, tags } => {
                    self.progress.text = text;
                    self.progress.tags = tags;
                    self.settle();
                    return Ok(self.progress.text.clone());
                }
                Step::Set { var, value } => {
                    let value = self.read(&value, &no_locals)?;
                    self.store(&var, value, &mut no_locals)?;
                }
                Step::Add { var, by } => self.add(&var, by)?,
                Step::Call {
                    function,
                    args,
                    into,
                } => {
                    let result = self.call(&function, &args, &no_locals)?;
                    if let (Some(into), Some(value)) = (into, result) {
                        self.assign(&into, value)?;
                    }
                }
                Step::Divert { to } => {
                    self.enter(&to)?;
                }
                Step::Choices(choices) => {
                    self.progress.choices = choices;
                    return Ok(String::new());
                }
                Step::Return(_) | Step::End => {
                    self.progress.ended = true;
                    return Ok(String::new());
                }
            }
            self.settle();
            if !self.can_continue() {
                return Ok(String::new());
            }
        }
        self.progress.ended = true;
        Ok(String::new())
    }

    /// Jump to the start of a knot, leaving the progress untouched on failure.
    fn jump(&mut self, path: &str) -> EngineResult<()> {
        let saved = self.progress.clone();
        let jumped = self.enter(path).and_then(|()| {
            self.progress.choices.clear();
            self.progress.ended = false;
            self.progress.text.clear();
            self.progress.tags.clear();
            self.look_ahead()
        });
        if jumped.is_err() {
            self.progress = saved;
        }
        jumped
    }

    /// Store into a local if one exists, otherwise into a global.
    fn store(
        &mut self,
        name: &str,
        value: Value,
        locals: &mut BTreeMap<String, Value>,
    ) -> EngineResult<()> {
        if let Some(slot) = locals.get_mut(name) {
            *slot = value;
            Ok(())
        } else {
            self.assign(name, value)
        }
    }
}

impl StoryEngine for GraphEngine {
    fn from_compiled(content: &str) -> EngineResult<Self> {
        Self::new(StoryGraph::parse(content)?)
    }

    fn can_continue(&self) -> bool {
        !self.progress.ended && self.progress.choices.is_empty()
    }

    fn cont(&mut self) -> EngineResult<String> {
        if !self.can_continue() {
            return Err(EngineError::CannotContinue);
        }
        let produced = self.advance();
        if produced.is_err() {
            self.settle();
        }
        produced
    }

    fn current_text(&self) -> String {
        self.progress.text.clone()
    }

    fn current_tags(&self) -> Vec<String> {
        self.progress.tags.clone()
    }

    fn current_choices(&self) -> Vec<Choice> {
        self.progress
            .choices
            .iter()
            .enumerate()
            .map(|(index, c)| Choice {
                index,
                text: c.text.clone(),
                tags: c.tags.clone(),
            })
            .collect()
    }

    fn global_tags(&self) -> Vec<String> {
        self.graph.tags.clone()
    }

    fn choose_choice_index(&mut self, index: usize) -> EngineResult<()> {
        let target = self
            .progress
            .choices
            .get(index)
            .map(|c| c.to.clone())
            .ok_or(EngineError::InvalidChoice(index))?;
        self.enter(&target)?;
        self.progress.choices.clear();
        self.settle();
        Ok(())
    }

    fn choose_path_string(&mut self, path: &str) -> EngineResult<()> {
        self.jump(path)
    }

    fn visit_count_at_path(&self, path: &str) -> EngineResult<u32> {
        self.graph.knot(path)?;
        Ok(self.progress.visits.get(path).copied().unwrap_or(0))
    }

    fn tags_for_content_at_path(&self, path: &str) -> EngineResult<Vec<String>> {
        Ok(self.graph.knot(path)?.tags.clone())
    }

    fn variable(&self, name: &str) -> Option<Value> {
        self.progress.variables.get(name).cloned()
    }

    fn set_variable(&mut self, name: &str, value: Value) -> EngineResult<()> {
        self.assign(name, value)
    }

    fn observe_variable(&mut self, name: &str) {
        self.observed.insert(name.to_string());
    }

    fn remove_variable_observer(&mut self, name: &str) {
        self.observed.remove(name);
        self.changes.retain(|c| c.name != name);
    }

    fn drain_variable_changes(&mut self) -> Vec<VariableChange> {
        std::mem::take(&mut self.changes)
    }

    fn bind_external_function(&mut self, name: &str, function: ExternalFunction) {
        self.functions.insert(name.to_string(), function);
    }

    fn unbind_external_function(&mut self, name: &str) {
        self.functions.remove(name);
    }

    fn evaluate_function(&mut self, name: &str, args: &[Value]) -> EngineResult<FunctionOutput> {
        let knot = self
            .graph
            .knots
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::FunctionNotFound(name.to_string()))?;
        if knot.params.len() != args.len() {
            return Err(EngineError::Runtime(format!(
                "function '{name}' expects {} arguments, got {}",
                knot.params.len(),
                args.len()
            )));
        }

        let mut locals: BTreeMap<String, Value> =
            knot.params.iter().cloned().zip(args.iter().cloned()).collect();
        let mut output = FunctionOutput::default();

        for step in knot.steps {
            match step {
                Step::Line { text, .. } => {
                    output.text.push_str(&text);
                    output.text.push('\n');
                }
                Step::Set { var, value } => {
                    let value = self.read(&value, &locals)?;
                    self.store(&var, value, &mut locals)?;
                }
                Step::Add { var, by } => match locals.get_mut(&var) {
                    Some(Value::Int(current)) => *current = checked_sum(&var, *current, by)?,
                    Some(other) => {
                        return Err(EngineError::Runtime(format!(
                            "cannot add to {} variable '{var}'",
                            other.kind()
                        )));
                    }
                    None => self.add(&var, by)?,
                },
                Step::Call {
                    function,
                    args,
                    into,
                } => {
                    let result = self.call(&function, &args, &locals)?;
                    if let (Some(into), Some(value)) = (into, result) {
                        self.store(&into, value, &mut locals)?;
                    }
                }
                Step::Return(operand) => {
                    output.value = Some(self.read(&operand, &locals)?);
                    break;
                }
                Step::End => break,
                Step::Divert { .. } | Step::Choices(_) => {
                    return Err(EngineError::Runtime(format!(
                        "function '{name}' cannot divert or present choices"
                    )));
                }
            }
        }
        Ok(output)
    }

    fn state_to_json(&self) -> EngineResult<String> {
        serde_json::to_string(&self.progress).map_err(|e| EngineError::Runtime(e.to_string()))
    }

    fn load_state_json(&mut self, state: &str) -> EngineResult<()> {
        let progress: Progress =
            serde_json::from_str(state).map_err(|e| EngineError::InvalidState(e.to_string()))?;
        if !self.graph.knots.contains_key(&progress.knot) {
            return Err(EngineError::InvalidState(format!(
                "unknown knot '{}'",
                progress.knot
            )));
        }
        self.progress = progress;
        self.changes.clear();
        Ok(())
    }
}

fn checked_sum(name: &str, current: i64, by: i64) -> EngineResult<i64> {
    current
        .checked_add(by)
        .ok_or_else(|| EngineError::Runtime(format!("adding {by} to '{name}' overflows")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_LINES: &str = r#"{
        "tags": ["title: Two"],
        "start": "a",
        "knots": {"a": {"steps": [
            {"line": {"text": "One.", "tags": ["first"]}},
            {"line": {"text": "Two."}}
        ]}}
    }"#;

    const BRANCH: &str = r#"{
        "variables": {"gold": 0},
        "start": "hub",
        "knots": {
            "hub": {"tags": ["place: hub"], "steps": [
                {"line": {"text": "Pick."}},
                {"choices": [{"text": "Left", "to": "left"}, {"text": "Right", "to": "right"}]}
            ]},
            "left": {"steps": [{"add": {"var": "gold", "by": 2}}, {"line": {"text": "Went left."}}, "end"]},
            "right": {"steps": [{"line": {"text": "Went right."}}, {"divert": {"to": "hub"}}]}
        }
    }"#;

    fn engine(json: &str) -> GraphEngine {
        GraphEngine::from_compiled(json).unwrap()
    }

    #[test]
    fn lines_then_end() {
        let mut e = engine(TWO_LINES);
        assert!(e.can_continue());
        assert_eq!(e.cont().unwrap(), "One.");
        assert_eq!(e.current_tags(), vec!["first".to_string()]);
        assert!(e.can_continue());
        assert_eq!(e.cont().unwrap(), "Two.");
        assert!(!e.can_continue());
        assert!(e.current_choices().is_empty());
        assert_eq!(e.cont(), Err(EngineError::CannotContinue));
    }

    #[test]
    fn choices_known_after_last_line() {
        let mut e = engine(BRANCH);
        assert_eq!(e.cont().unwrap(), "Pick.");
        assert!(!e.can_continue());
        let texts: Vec<_> = e.current_choices().into_iter().map(|c| c.text).collect();
        assert_eq!(texts, vec!["Left", "Right"]);
    }

    #[test]
    fn choose_and_divert_back() {
        let mut e = engine(BRANCH);
        e.cont().unwrap();
        e.choose_choice_index(1).unwrap();
        assert_eq!(e.cont().unwrap(), "Went right.");
        // The divert back to the hub is followed eagerly.
        assert_eq!(e.visit_count_at_path("hub").unwrap(), 2);
        assert_eq!(e.cont().unwrap(), "Pick.");
        assert_eq!(e.current_choices().len(), 2);
    }

    #[test]
    fn invalid_choice_index() {
        let mut e = engine(BRANCH);
        e.cont().unwrap();
        assert_eq!(e.choose_choice_index(5), Err(EngineError::InvalidChoice(5)));
        assert_eq!(e.current_choices().len(), 2);
    }

    #[test]
    fn observed_changes_are_queued() {
        let mut e = engine(BRANCH);
        e.observe_variable("gold");
        e.cont().unwrap();
        e.choose_choice_index(0).unwrap();
        assert_eq!(e.cont().unwrap(), "Went left.");
        assert_eq!(
            e.drain_variable_changes(),
            vec![VariableChange {
                name: "gold".to_string(),
                value: Value::Int(2)
            }]
        );
        assert!(e.drain_variable_changes().is_empty());
    }

    #[test]
    fn unobserved_changes_are_not_queued() {
        let mut e = engine(BRANCH);
        e.set_variable("gold", Value::Int(9)).unwrap();
        assert!(e.drain_variable_changes().is_empty());
        assert_eq!(e.variable("gold"), Some(Value::Int(9)));
    }

    #[test]
    fn undeclared_variable_faults() {
        let mut e = engine(BRANCH);
        assert_eq!(
            e.set_variable("silver", Value::Int(1)),
            Err(EngineError::UnknownVariable("silver".to_string()))
        );
    }

    #[test]
    fn path_queries() {
        let e = engine(BRANCH);
        assert_eq!(e.visit_count_at_path("hub").unwrap(), 1);
        assert_eq!(e.visit_count_at_path("left").unwrap(), 0);
        assert_eq!(
            e.tags_for_content_at_path("hub").unwrap(),
            vec!["place: hub".to_string()]
        );
        assert!(e.tags_for_content_at_path("nowhere").is_err());
    }

    #[test]
    fn choose_path_unknown_keeps_position() {
        let mut e = engine(BRANCH);
        e.cont().unwrap();
        assert!(e.choose_path_string("nowhere").is_err());
        assert_eq!(e.current_choices().len(), 2);
    }

    #[test]
    fn external_function_call() {
        let json = r#"{
            "variables": {"greeting": ""},
            "start": "a",
            "knots": {"a": {"steps": [
                {"call": {"function": "greet", "args": ["Ana"], "into": "greeting"}},
                {"line": {"text": "Done."}}
            ]}}
        }"#;
        let mut e = engine(json);
        e.bind_external_function(
            "greet",
            ExternalFunction::new(|args| Ok(Some(Value::Str(format!("Hello, {}", args[0]))))),
        );
        assert_eq!(e.cont().unwrap(), "Done.");
        assert_eq!(e.variable("greeting"), Some(Value::Str("Hello, Ana".to_string())));
    }

    #[test]
    fn unbound_function_faults_once() {
        let json = r#"{
            "start": "a",
            "knots": {"a": {"steps": [
                {"call": {"function": "missing"}},
                {"line": {"text": "After."}}
            ]}}
        }"#;
        let mut e = engine(json);
        assert_eq!(
            e.cont(),
            Err(EngineError::FunctionNotFound("missing".to_string()))
        );
        assert_eq!(e.cont().unwrap(), "After.");
    }

    #[test]
    fn fault_on_last_step_reaches_end() {
        let json = r#"{
            "start": "a",
            "knots": {"a": {"steps": [
                {"line": {"text": "Before."}},
                {"call": {"function": "missing"}}
            ]}}
        }"#;
        let mut e = engine(json);
        assert_eq!(e.cont().unwrap(), "Before.");
        assert!(e.can_continue());
        assert!(e.cont().is_err());
        assert!(!e.can_continue());
    }

    #[test]
    fn evaluate_function_with_params() {
        let json = r#"{
            "variables": {"gold": 1},
            "start": "a",
            "knots": {
                "a": {"steps": ["end"]},
                "double": {"params": ["x"], "steps": [
                    {"line": {"text": "doubling"}},
                    {"add": {"var": "gold", "by": 1}},
                    {"return": {"var": "x"}}
                ]}
            }
        }"#;
        let mut e = engine(json);
        let out = e.evaluate_function("double", &[Value::Int(4)]).unwrap();
        assert_eq!(out.value, Some(Value::Int(4)));
        assert_eq!(out.text, "doubling\n");
        assert_eq!(e.variable("gold"), Some(Value::Int(2)));
        assert!(e.evaluate_function("double", &[]).is_err());
        assert_eq!(
            e.evaluate_function("nope", &[]),
            Err(EngineError::FunctionNotFound("nope".to_string()))
        );
    }

    #[test]
    fn state_round_trip() {
        let mut e = engine(BRANCH);
        e.cont().unwrap();
        let saved = e.state_to_json().unwrap();

        let mut fresh = engine(BRANCH);
        fresh.load_state_json(&saved).unwrap();
        assert_eq!(fresh.current_text(), "Pick.");
        assert_eq!(fresh.current_choices(), e.current_choices());
        assert!(fresh.load_state_json("{}").is_err());
    }

    #[test]
    fn failed_jump_leaves_progress_alone() {
        let json = r#"{
            "start": "a",
            "knots": {
                "a": {"steps": [{"line": {"text": "Start."}}, {"line": {"text": "Next."}}]},
                "bad": {"steps": [{"divert": {"to": "nowhere"}}]}
            }
        }"#;
        let mut e = engine(json);
        e.cont().unwrap();
        let before = e.progress().clone();
        assert_eq!(
            e.choose_path_string("bad"),
            Err(EngineError::PathNotFound("nowhere".to_string()))
        );
        assert_eq!(e.progress(), &before);
        assert_eq!(e.cont().unwrap(), "Next.");
    }

    #[test]
    fn divert_cycle_is_invalid_content() {
        let json = r#"{
            "start": "a",
            "knots": {
                "a": {"steps": [{"divert": {"to": "b"}}]},
                "b": {"steps": [{"divert": {"to": "a"}}]}
            }
        }"#;
        assert!(matches!(
            GraphEngine::from_compiled(json),
            Err(EngineError::InvalidContent(_))
        ));
    }

    #[test]
    fn loop_without_text_ends_story() {
        let json = r#"{
            "variables": {"gold": 0},
            "start": "a",
            "knots": {
                "a": {"steps": [
                    {"line": {"text": "Start."}},
                    {"choices": [{"text": "Spin", "to": "spin"}]}
                ]},
                "spin": {"steps": [{"add": {"var": "gold", "by": 1}}, {"divert": {"to": "spin"}}]}
            }
        }"#;
        let mut e = engine(json);
        e.cont().unwrap();
        e.choose_choice_index(0).unwrap();
        assert!(matches!(e.cont(), Err(EngineError::InvalidContent(_))));
        assert!(!e.can_continue());
        assert_eq!(e.variable("gold"), Some(Value::Int(1)));
    }

    #[test]
    fn line_before_bad_divert_keeps_text() {
        let json = r#"{
            "start": "a",
            "knots": {"a": {"steps": [
                {"line": {"text": "Hello."}},
                {"divert": {"to": "nowhere"}}
            ]}}
        }"#;
        let mut e = engine(json);
        assert_eq!(e.cont().unwrap(), "Hello.");
        assert!(e.can_continue());
        assert_eq!(
            e.cont(),
            Err(EngineError::PathNotFound("nowhere".to_string()))
        );
        assert!(!e.can_continue());
    }

    #[test]
    fn overflow_is_a_fault() {
        let json = r#"{
            "variables": {"gold": 1},
            "start": "a",
            "knots": {
                "a": {"steps": [
                    {"add": {"var": "gold", "by": 9223372036854775807}},
                    {"line": {"text": "Rich."}}
                ]},
                "bump": {"params": ["x"], "steps": [
                    {"add": {"var": "x", "by": 9223372036854775807}},
                    {"return": {"var": "x"}}
                ]}
            }
        }"#;
        let mut e = engine(json);
        assert!(matches!(e.cont(), Err(EngineError::Runtime(_))));
        assert_eq!(e.variable("gold"), Some(Value::Int(1)));
        assert_eq!(e.cont().unwrap(), "Rich.");
        assert!(matches!(
            e.evaluate_function("bump", &[Value::Int(1)]),
            Err(EngineError::Runtime(_))
        ));
    }

    #[test]
    fn global_tags() {
        assert_eq!(engine(TWO_LINES).global_tags(), vec!["title: Two".to_string()]);
    }
}
