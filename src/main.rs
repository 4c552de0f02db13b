//! Refine CLI - terminal coaching sessions
//!
//! The application logic is contained in lib.rs, and this file is responsible
//! for parsing arguments and handling top-level errors.

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use refine::{logging, ui, Config};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "refine")]
#[command(author, version, about = "Terminal life-improvement coach", long_about = None)]
struct Cli {
    /// Path to a config file (defaults to refine.toml in cwd or ~/.config/refine)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a coaching session (default)
    Chat,
    /// Print shell completions
    Completions {
        /// Target shell
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Err(e) = logging::init(cli.verbose) {
        eprintln!("Warning: failed to initialise logging: {}", e);
    }

    match cli.command {
        Some(Commands::Completions { shell }) => {
            clap_complete::generate(shell, &mut Cli::command(), "refine", &mut std::io::stdout());
        }
        Some(Commands::Chat) | None => {
            let config = match &cli.config {
                Some(path) => Config::load_from(path)?,
                None => Config::load()?,
            };
            ui::run(&config).await?;
        }
    }

    Ok(())
}
