pub mod check;
pub mod inspect;
pub mod play;

use std::fs;
use std::path::{Path, PathBuf};

use fab_core::StoryContent;
use fab_flow::{FlowConfig, StoryController};
use fab_graph::{GraphEngine, StoryGraph};

/// Build the controller configuration from a file plus command-line overrides.
pub fn settings(
    config: Option<&Path>,
    save_dir: Option<PathBuf>,
    max_steps: Option<usize>,
) -> Result<FlowConfig, String> {
    let mut settings = match config {
        Some(path) => FlowConfig::from_toml_file(path)
            .map_err(|e| format!("cannot read config '{}': {e}", path.display()))?,
        None => FlowConfig::default(),
    };
    if let Some(dir) = save_dir {
        settings = settings.with_user_data_dir(dir);
    }
    if let Some(steps) = max_steps {
        settings = settings.with_max_continuation_steps(steps);
    }
    Ok(settings)
}

/// Load a story file into a fresh controller.
fn load_controller(
    story: &Path,
    config: FlowConfig,
) -> Result<StoryController<GraphEngine>, String> {
    let mut controller = StoryController::new(config);
    controller
        .load_story(&StoryContent::from_file(story))
        .map_err(|e| e.to_string())?;
    Ok(controller)
}

/// Parse a story file as a graph.
fn read_graph(story: &Path) -> Result<StoryGraph, String> {
    let text = fs::read_to_string(story)
        .map_err(|e| format!("cannot read '{}': {e}", story.display()))?;
    StoryGraph::parse(&text).map_err(|e| e.to_string())
}

/// Title from a `title: ...` global tag, falling back to the file name.
fn title(tags: &[String], story: &Path) -> String {
    tags.iter()
        .find_map(|t| t.strip_prefix("title:"))
        .map(|t| t.trim().to_string())
        .unwrap_or_else(|| story.display().to_string())
}
