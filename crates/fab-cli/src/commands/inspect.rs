use std::path::Path;

use colored::Colorize;
use comfy_table::{ContentArrangement, Table};

use fab_flow::FlowConfig;

pub fn run(story: &Path) -> Result<(), String> {
    let controller = super::load_controller(story, FlowConfig::default())?;
    let graph = super::read_graph(story)?;

    let tags = controller.global_tags();
    println!("  {}", super::title(&tags, story).bold());
    for tag in &tags {
        println!("  {}", format!("# {tag}").dimmed());
    }
    println!("  Starts at '{}'", graph.start);
    println!();

    let mut knots = Table::new();
    knots.set_content_arrangement(ContentArrangement::Dynamic);
    knots.set_header(vec!["Knot", "Params", "Steps", "Visits", "Tags"]);
    for (name, knot) in &graph.knots {
        let params = if knot.params.is_empty() {
            "—".to_string()
        } else {
            knot.params.join(", ")
        };
        knots.add_row(vec![
            name.clone(),
            params,
            knot.steps.len().to_string(),
            controller.visit_count_at_path(name).to_string(),
            controller.tags_for_content_at_path(name).join(", "),
        ]);
    }
    println!("{knots}");

    if graph.variables.is_empty() {
        println!("\n  No variables declared.");
        return Ok(());
    }

    let mut variables = Table::new();
    variables.set_content_arrangement(ContentArrangement::Dynamic);
    variables.set_header(vec!["Variable", "Type", "Initial"]);
    for (name, value) in &graph.variables {
        variables.add_row(vec![name.clone(), value.kind().to_string(), value.to_string()]);
    }
    println!();
    println!("{variables}");
    println!();
    println!(
        "  {} knots, {} variables",
        graph.knots.len(),
        graph.variables.len()
    );

    Ok(())
}
