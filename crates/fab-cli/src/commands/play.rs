use std::io::{self, BufRead, Write};
use std::path::Path;

use colored::Colorize;

use fab_flow::{FlowConfig, FlowState, StoryController, StoryEvent};
use fab_graph::GraphEngine;

const QUICKSAVE: &str = "quicksave";

pub fn run(story: &Path, config: FlowConfig, resume: Option<&str>) -> Result<(), String> {
    let mut controller = super::load_controller(story, config)?;
    let title = super::title(&controller.global_tags(), story);

    println!("  {} {title}", "Playing".bold());
    println!("  Enter a choice number, 'save [slot]', 'load [slot]', or 'quit'.\n");

    if let Some(slot) = resume {
        restore(&mut controller, slot)?;
    }

    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let mut line = String::new();

    loop {
        controller.continue_maximally_then(|| {
            if let Err(e) = io::stdout().flush() {
                log::warn!("cannot flush output: {e}");
            }
        });
        render(&controller.drain_events());
        controller.end_frame();

        match controller.flow_state() {
            FlowState::Ended | FlowState::Unloaded => break,
            FlowState::AwaitingChoice => {}
            // Stopped by the step limit; keep going.
            FlowState::Ready | FlowState::Advancing => continue,
        }

        print!("> ");
        io::stdout().flush().map_err(|e| e.to_string())?;

        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) => break, // EOF
            Err(e) => return Err(e.to_string()),
            _ => {}
        }

        let input = line.trim();
        let (command, arg) = match input.split_once(' ') {
            Some((command, arg)) => (command, arg.trim()),
            None => (input, ""),
        };
        let slot = if arg.is_empty() { QUICKSAVE } else { arg };

        match command.to_lowercase().as_str() {
            "" => {}
            "quit" | "q" => break,
            "save" => match controller.save_state(slot) {
                Ok(address) => println!("  Saved to {address}\n"),
                Err(e) => println!("{}\n", e.to_string().yellow()),
            },
            "load" => {
                if let Err(e) = restore(&mut controller, slot) {
                    println!("{}\n", e.yellow());
                }
            }
            number => match number.parse::<usize>() {
                Ok(n) if (1..=controller.current_choices().len()).contains(&n) => {
                    controller.select_choice(n - 1);
                    println!("{}", "---".dimmed());
                }
                _ => println!("{}\n", format!("Unknown input '{input}'").yellow()),
            },
        }
    }

    Ok(())
}

fn restore(controller: &mut StoryController<GraphEngine>, slot: &str) -> Result<(), String> {
    match controller.load_state(slot).map_err(|e| e.to_string())? {
        Some(_) => {
            log::debug!("restored '{slot}'");
            println!("  Restored '{slot}'.\n");
        }
        None => println!("  No save named '{slot}'.\n"),
    }
    Ok(())
}

fn render(events: &[StoryEvent]) {
    for event in events {
        match event {
            StoryEvent::Continued { text, tags } => {
                if !text.is_empty() {
                    println!("{text}");
                }
                for tag in tags {
                    println!("  {}", format!("# {tag}").dimmed());
                }
            }
            StoryEvent::Choices(choices) => {
                println!();
                for (i, choice) in choices.iter().enumerate() {
                    println!("  {} {choice}", format!("{}.", i + 1).cyan());
                }
            }
            StoryEvent::Ended => println!("\n  {}", "THE END".bold()),
        }
    }
}
