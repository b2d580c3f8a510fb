//! proctor CLI — run and administer proctored assessments from a terminal.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;
mod lockdown;

#[derive(Parser)]
#[command(name = "proctor", version, about = "Timed, proctored multiple-choice assessments")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sit an assessment as a candidate
    Run {
        /// Candidate username
        #[arg(long)]
        username: String,

        /// Candidate password
        #[arg(long)]
        password: String,

        /// Only check that the capture device can be opened
        #[arg(long)]
        check_only: bool,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Check credentials against the roster and show the resolved role
    Login {
        #[arg(long)]
        username: String,

        #[arg(long)]
        password: String,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// List recent session records
    Sessions {
        /// Maximum number of sessions to show
        #[arg(long, default_value = "20")]
        limit: usize,

        /// Output format: table, json
        #[arg(long, default_value = "table")]
        format: String,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Validate question-bank TOML files
    Validate {
        /// Path to question-bank file or directory
        #[arg(long)]
        bank: PathBuf,
    },

    /// Create starter config, roster and question bank
    Init,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("proctor=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            username,
            password,
            check_only,
            config,
        } => commands::run::execute(username, password, check_only, config).await,
        Commands::Login {
            username,
            password,
            config,
        } => commands::login::execute(username, password, config).await,
        Commands::Sessions {
            limit,
            format,
            config,
        } => commands::sessions::execute(limit, format, config).await,
        Commands::Validate { bank } => commands::validate::execute(bank),
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
