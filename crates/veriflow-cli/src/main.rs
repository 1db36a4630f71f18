mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::checkpoint::CheckpointArgs;
use std::path::PathBuf;
use std::process::ExitCode;

/// Exit status for Ctrl-C, as shells report SIGINT.
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser)]
#[command(
    name = "veriflow",
    about = "V-Model sprint orchestrator: drive agents through gated stages with checkpoints",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .veriflow/ or .git/)
    #[arg(long, global = true, env = "VERIFLOW_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create .veriflow/ with a default config and fresh state
    Init {
        /// Directory to initialize (default: the project root)
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Seed config.yaml from this file instead of the defaults
        #[arg(long)]
        config: Option<PathBuf>,

        /// Overwrite an existing config.yaml
        #[arg(long)]
        force: bool,
    },

    /// Record a sprint plan for a feature (runs the planning stage)
    Plan {
        /// Feature description, or a JSON story object
        feature: String,
    },

    /// Run one story through every stage of the V
    Sprint {
        /// Story text, or a JSON story object
        #[arg(long)]
        story: String,
    },

    /// Show the current stage, sprint, and completed stages
    Status,

    /// Check config.yaml for mistakes
    Validate,

    /// Create, list, restore, and compare checkpoints
    #[command(args_conflicts_with_subcommands = true)]
    Checkpoint(CheckpointArgs),
}

fn debug_enabled() -> bool {
    std::env::var_os("VERIFLOW_DEBUG").is_some_and(|v| !v.is_empty() && v != "0")
}

fn main() -> ExitCode {
    // clap exits with status 2 on usage errors.
    let cli = Cli::parse();
    let debug = debug_enabled();

    let default_level = if debug {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init { dir, config, force } => {
            let target = dir.unwrap_or_else(|| root.clone());
            cmd::init::run(&target, config.as_deref(), force, cli.json)
        }
        Commands::Plan { feature } => cmd::plan::run(&root, &feature, cli.json),
        Commands::Sprint { story } => match cmd::sprint::run(&root, &story, cli.json) {
            Err(e) if e.is::<cmd::Interrupted>() => {
                output::print_error("interrupted");
                return ExitCode::from(EXIT_INTERRUPTED);
            }
            other => other,
        },
        Commands::Status => cmd::status::run(&root, cli.json),
        Commands::Validate => cmd::validate::run(&root, cli.json),
        Commands::Checkpoint(args) => cmd::checkpoint::run(&root, args, cli.json),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::print_error(&output::user_facing_error(&e, debug));
            ExitCode::FAILURE
        }
    }
}
