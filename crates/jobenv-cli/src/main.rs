//! jobenv CLI tool.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "jobenv")]
#[command(about = "Resolve the environment variables of a CI job", long_about = None)]
struct Cli {
    /// Resolver settings (KDL)
    #[arg(long, env = "JOBENV_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Cluster agent server written into generated kubeconfigs
    #[arg(long, env = "JOBENV_AGENT_SERVER", global = true, default_value = "https://kas.example.com")]
    agent_server: url::Url,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the effective variables of a job
    Resolve {
        /// Path to the job context file
        context: PathBuf,
        /// Deployment environment (overrides the context)
        #[arg(long)]
        environment: Option<String>,
        /// Include dependency outputs
        #[arg(long)]
        dependencies: bool,
        /// Print secret values instead of hiding them
        #[arg(long)]
        reveal: bool,
        /// Print JSON instead of KEY=value lines
        #[arg(long)]
        json: bool,
    },
    /// Report which masked variables can be redacted from job logs
    MaskCheck {
        /// Path to the job context file
        context: PathBuf,
        /// Deployment environment (overrides the context)
        #[arg(long)]
        environment: Option<String>,
    },
    /// Check an environment scope pattern against an environment name
    Match {
        /// Scope pattern, e.g. `review/*`
        pattern: String,
        /// Environment name
        environment: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = commands::Settings::load(cli.config.as_deref(), cli.agent_server)?;

    match cli.command {
        Commands::Resolve {
            context,
            environment,
            dependencies,
            reveal,
            json,
        } => {
            let options = commands::resolve::Options {
                environment,
                dependencies,
                reveal,
                json,
            };
            commands::resolve::run(&settings, &context, options).await?;
        }
        Commands::MaskCheck {
            context,
            environment,
        } => {
            commands::mask_check::run(&settings, &context, environment).await?;
        }
        Commands::Match {
            pattern,
            environment,
        } => {
            commands::scope_match(&pattern, &environment);
        }
    }

    Ok(())
}
