//! CLI frontend for the Fabula narrative flow controller.

mod commands;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "fab",
    about = "Fabula: play, check and inspect compiled story graphs",
    version,
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play a story in the terminal
    Play {
        /// Compiled story file (.json)
        story: PathBuf,

        /// TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Directory for saves (overrides the configuration)
        #[arg(long)]
        save_dir: Option<PathBuf>,

        /// Restore this save before playing
        #[arg(short, long)]
        resume: Option<String>,

        /// Maximum steps per continuation, 0 for no limit (overrides the configuration)
        #[arg(long)]
        max_steps: Option<usize>,
    },

    /// Validate a story file
    Check {
        /// Compiled story file (.json)
        story: PathBuf,
    },

    /// Show tags, knots and variables of a story
    Inspect {
        /// Compiled story file (.json)
        story: PathBuf,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Play {
            story,
            config,
            save_dir,
            resume,
            max_steps,
        } => commands::settings(config.as_deref(), save_dir, max_steps)
            .and_then(|config| commands::play::run(&story, config, resume.as_deref())),
        Commands::Check { story } => commands::check::run(&story),
        Commands::Inspect { story } => commands::inspect::run(&story),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        process::exit(1);
    }
}
