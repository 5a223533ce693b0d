use clap::{Parser, Subcommand};
use smartsort::cli::{CliContext, Command, OrganizeArgs, RunStatus, install_interrupt_handler, run};
use smartsort::config::AppConfig;
use smartsort::i18n::Language;
use smartsort::logging::init_logging;
use smartsort::output::OutputFormatter;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

#[derive(Parser)]
#[command(name = "smartsort", version, about = "Organize a directory with AI-assisted categorization")]
struct Cli {
    /// Language for messages
    #[arg(long, global = true, value_enum, default_value_t = Language::En)]
    language: Language,

    /// Configuration file (defaults to ./smartsort.toml, then ~/.config/smartsort/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Organize files into <dir>/organized/<category>/
    Organize {
        #[arg(long, default_value = ".")]
        dir: PathBuf,
        /// AI provider name from [ai_providers]
        #[arg(long)]
        provider: Option<String>,
        /// Show the plan without moving anything
        #[arg(long)]
        preview: bool,
        /// Descend into subdirectories (default)
        #[arg(long, overrides_with = "no_recursive")]
        recursive: bool,
        /// Only organize the top level of <dir>
        #[arg(long = "no-recursive", overrides_with = "recursive")]
        no_recursive: bool,
        /// Confirm each move
        #[arg(long)]
        interactive: bool,
        /// Do not ask for confirmation
        #[arg(long, short = 'y')]
        yes: bool,
    },
    /// Classify one file and print the suggestion
    Analyze {
        file: PathBuf,
        #[arg(long)]
        provider: Option<String>,
    },
    /// Revert the most recent organization
    Undo {
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },
    /// Show the summary of a logged transaction
    Stats {
        #[arg(long, default_value = ".")]
        dir: PathBuf,
        /// Transaction ID (defaults to the latest)
        #[arg(long)]
        id: Option<String>,
    },
}

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    let config = match AppConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            OutputFormatter::error(&format!("Error loading configuration: {}", e));
            return ExitCode::from(2);
        }
    };

    let command = match cli.command {
        Commands::Organize {
            dir,
            provider,
            preview,
            recursive: _,
            no_recursive,
            interactive,
            yes,
        } => Command::Organize(OrganizeArgs {
            dir,
            provider,
            preview,
            recursive: !no_recursive,
            interactive,
            yes,
        }),
        Commands::Analyze { file, provider } => Command::Analyze { file, provider },
        Commands::Undo { dir } => Command::Undo { dir },
        Commands::Stats { dir, id } => Command::Stats { dir, id },
    };

    let cancel = Arc::new(AtomicBool::new(false));
    if let Err(e) = install_interrupt_handler(&cancel) {
        OutputFormatter::warning(&format!("Ctrl-C will not stop cleanly: {}", e));
    }
    let ctx = CliContext {
        config,
        language: cli.language,
        cancel,
    };

    match run(command, &ctx) {
        Ok(RunStatus::Success) => ExitCode::SUCCESS,
        Ok(RunStatus::Partial) => ExitCode::from(1),
        Err(e) => {
            OutputFormatter::error(&format!("Error: {}", e));
            ExitCode::from(2)
        }
    }
}
