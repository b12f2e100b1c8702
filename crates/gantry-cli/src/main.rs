mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "gantry",
    about = "Package workflow projects and build one container image per task pattern"
)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build (and optionally publish) images for every dependency group
    Build {
        /// Target environment directory (must contain a Dockerfile)
        env_name: String,
        /// Halt successfully after this stage: 'build' or 'push'
        #[arg(long, value_name = "STAGE")]
        until: Option<String>,
        /// Skip the image status check and capability probe
        #[arg(long)]
        skip_tests: bool,
        /// Select sources by scanning instead of from git tracking state
        #[arg(long)]
        ignore_git: bool,
        /// Workflow entry point inside the image
        #[arg(long, default_value = "pipeline.yaml")]
        entry_point: String,
        /// Print the task pattern → image mapping as JSON
        #[arg(long)]
        json: bool,
    },
    /// Scaffold gantry.toml and an environment directory with a Dockerfile
    Init {
        /// Name of the environment directory to create
        env_name: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            env_name,
            until,
            skip_tests,
            ignore_git,
            entry_point,
            json,
        } => {
            commands::build(
                &env_name,
                until.as_deref(),
                skip_tests,
                ignore_git,
                &entry_point,
                json,
            )
            .await?
        }
        Commands::Init { env_name } => commands::init(&env_name)?,
    }

    Ok(())
}
