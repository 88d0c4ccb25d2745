use std::path::Path;

use colored::Colorize;

use fab_flow::FlowConfig;
use fab_graph::{Operand, Step, StoryGraph};

pub fn run(story: &Path) -> Result<(), String> {
    let controller = super::load_controller(story, FlowConfig::default())?;
    let graph = super::read_graph(story)?;

    let problems = problems(&graph);
    for problem in &problems {
        eprintln!("  {} {problem}", "error:".red());
    }
    if !problems.is_empty() {
        return Err(format!("{} problems found", problems.len()));
    }

    let name = super::title(&controller.global_tags(), story);
    println!("  All checks passed for '{name}'.");
    println!(
        "  {} knots, {} variables",
        graph.knots.len(),
        graph.variables.len()
    );

    Ok(())
}

/// Targets and variables that would only fail once the story reaches them.
fn problems(graph: &StoryGraph) -> Vec<String> {
    let mut problems = Vec::new();
    for (name, knot) in &graph.knots {
        let declared =
            |var: &str| graph.variables.contains_key(var) || knot.params.iter().any(|p| p == var);
        let mut target = |to: &str| {
            if !graph.knots.contains_key(to) {
                problems.push(format!("knot '{name}' diverts to unknown knot '{to}'"));
            }
        };
        let mut used = Vec::new();
        for step in &knot.steps {
            match step {
                Step::Divert { to } => target(to),
                Step::Choices(choices) => choices.iter().for_each(|c| target(&c.to)),
                Step::Set { var, value } => {
                    used.push(var.clone());
                    if let Operand::Var { var } = value {
                        used.push(var.clone());
                    }
                }
                Step::Add { var, .. } => used.push(var.clone()),
                Step::Call { args, into, .. } => {
                    for arg in args {
                        if let Operand::Var { var } = arg {
                            used.push(var.clone());
                        }
                    }
                    used.extend(into.iter().cloned());
                }
                Step::Return(Operand::Var { var }) => used.push(var.clone()),
                Step::Line { .. } | Step::Return(_) | Step::End => {}
            }
        }
        for var in used.iter().filter(|v| !declared(v.as_str())) {
            problems.push(format!("knot '{name}' uses undeclared variable '{var}'"));
        }
    }
    problems
}
