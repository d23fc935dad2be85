//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod cache;
mod generate;
mod job;
mod stubs;

pub use cache::CacheCommands;
pub use generate::GenerateArgs;
pub use job::JobCommands;

use anyhow::{Context, Result};
use clap::Subcommand;
use docforge_runner::Config;
use docforge_runner::repository::JsonFileJobRepository;
use docforge_runner::service::JobManager;
use std::path::PathBuf;
use std::sync::Arc;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Generate a document from a template
    Generate(GenerateArgs),
    /// Job management
    Job {
        #[command(subcommand)]
        command: JobCommands,
    },
    /// Enhancement cache management
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
    /// Write LuaLS stubs and .luarc.json for artifact authors
    Stubs {
        /// Output directory for generated files
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Generate only the stub file
        #[arg(long)]
        stubs_only: bool,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Generate(args) => generate::handle_generate(args, config).await,
        Commands::Job { command } => job::handle_job_command(command, config).await,
        Commands::Cache { command } => cache::handle_cache_command(command, config).await,
        Commands::Stubs { output, stubs_only } => stubs::write_stubs(&output, stubs_only),
    }
}

/// Opens the job record described by `config`
async fn open_jobs(config: &Config) -> Result<Arc<JobManager>> {
    let repository = JsonFileJobRepository::new(config.jobs_file());
    let jobs = JobManager::open(Arc::new(repository), config.max_jobs)
        .await
        .with_context(|| format!("Failed to open job record {}", config.jobs_file().display()))?;
    Ok(Arc::new(jobs))
}
