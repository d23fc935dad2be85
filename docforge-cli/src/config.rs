//! Configuration module
//!
//! Global flags, each with an environment fallback, layered over the runner's
//! defaults.

use anyhow::{Context, Result};
use clap::Args;
use docforge_runner::Config;
use std::path::PathBuf;
use std::time::Duration;

/// Flags shared by every command
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Directory holding jobs.json and generated output
    #[arg(long, global = true, env = "DOCFORGE_DATA_DIR", default_value = ".docforge")]
    pub data_dir: PathBuf,

    /// Directory generated files are written to (default: <data dir>/output)
    #[arg(long, global = true, env = "DOCFORGE_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Root of the template store
    #[arg(long, global = true, env = "DOCFORGE_TEMPLATE_ROOT", default_value = "templates")]
    pub template_root: PathBuf,

    /// Completion service base URL
    #[arg(long, global = true, env = "DOCFORGE_COMPLETION_URL")]
    pub completion_url: Option<String>,

    /// Wall-clock budget of one artifact execution, in seconds
    #[arg(long, global = true, env = "DOCFORGE_EXECUTION_TIMEOUT")]
    pub timeout: Option<u64>,

    /// Lifetime of an enhanced artifact, in seconds
    #[arg(long, global = true, env = "DOCFORGE_CACHE_TTL")]
    pub cache_ttl: Option<u64>,

    /// Number of jobs kept in the job record
    #[arg(long, global = true, env = "DOCFORGE_MAX_JOBS")]
    pub max_jobs: Option<usize>,

    /// Max generations running at the same time
    #[arg(long, global = true, env = "DOCFORGE_MAX_PARALLEL_JOBS")]
    pub max_parallel_jobs: Option<usize>,

    /// Memory limit of one Lua state, in MiB
    #[arg(long, global = true, env = "DOCFORGE_MEMORY_LIMIT_MB")]
    pub memory_limit_mb: Option<usize>,
}

impl GlobalArgs {
    /// Runner configuration with every given flag applied
    pub fn to_config(&self) -> Result<Config> {
        let mut config = Config::new(self.data_dir.clone(), self.template_root.clone());

        if let Some(output_dir) = &self.output_dir {
            config.output_dir = output_dir.clone();
        }
        config.completion_url = self.completion_url.clone().filter(|url| !url.trim().is_empty());
        if let Some(secs) = self.timeout {
            config.execution_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.cache_ttl {
            config.cache_ttl = Duration::from_secs(secs);
        }
        if let Some(max_jobs) = self.max_jobs {
            config.max_jobs = max_jobs;
        }
        if let Some(max_parallel_jobs) = self.max_parallel_jobs {
            config.max_parallel_jobs = max_parallel_jobs;
        }
        if let Some(mb) = self.memory_limit_mb {
            config.memory_limit_mb = mb;
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}
