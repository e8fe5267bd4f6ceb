//! devserver CLI tool.

use clap::{Parser, Subcommand};
use devserver_core::ActionKind;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "devserver")]
#[command(about = "Run devserver builds and tests from the command line", long_about = None)]
struct Cli {
    /// Path to the server configuration
    #[arg(
        long,
        env = "DEVSERVER_CONFIG",
        default_value = "/var/lib/devserver/config.kdl"
    )]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the configuration and list its projects
    Validate,
    /// Build every descriptor of a clone
    Build {
        /// Repository name as configured
        git_name: String,
    },
    /// Test every descriptor of a clone
    Test {
        /// Repository name as configured
        git_name: String,
    },
    /// Build then test every configured clone
    FullPass,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let ok = match cli.command {
        Commands::Validate => commands::validate(&cli.config)?,
        Commands::Build { git_name } => {
            commands::run(&cli.config, &git_name, ActionKind::Build).await?
        }
        Commands::Test { git_name } => {
            commands::run(&cli.config, &git_name, ActionKind::Test).await?
        }
        Commands::FullPass => commands::full_pass(&cli.config).await?,
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}
