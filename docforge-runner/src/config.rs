//! Runner configuration
//!
//! Defines where jobs, outputs and templates live, the completion service
//! endpoint and the execution budgets applied to every artifact.

use docforge_core::domain::artifact::DEFAULT_CACHE_TTL;
use std::path::PathBuf;
use std::time::Duration;

/// Default wall-clock budget of one artifact execution
pub const DEFAULT_EXECUTION_TIMEOUT: Duration = Duration::from_secs(600);

/// Runner configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the job record (`jobs.json`)
    pub data_dir: PathBuf,

    /// Directory generated files are written to
    pub output_dir: PathBuf,

    /// Root of the directory template store
    pub template_root: PathBuf,

    /// Completion service base URL (e.g., "http://localhost:8090")
    pub completion_url: Option<String>,

    /// Maximum time an artifact may run
    pub execution_timeout: Duration,

    /// Lifetime of an enhanced artifact in the cache
    pub cache_ttl: Duration,

    /// Number of jobs kept in the job record
    pub max_jobs: usize,

    /// Max generations running at the same time
    pub max_parallel_jobs: usize,

    /// Memory limit of one Lua state, in MiB
    pub memory_limit_mb: usize,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new(data_dir: PathBuf, template_root: PathBuf) -> Self {
        Self {
            output_dir: data_dir.join("output"),
            data_dir,
            template_root,
            completion_url: None,
            execution_timeout: DEFAULT_EXECUTION_TIMEOUT,
            cache_ttl: DEFAULT_CACHE_TTL,
            max_jobs: 200,
            max_parallel_jobs: 4,
            memory_limit_mb: 256,
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - DOCFORGE_TEMPLATE_ROOT (required)
    /// - DOCFORGE_DATA_DIR (optional, default: .docforge)
    /// - DOCFORGE_OUTPUT_DIR (optional, default: <data dir>/output)
    /// - DOCFORGE_COMPLETION_URL (optional)
    /// - DOCFORGE_EXECUTION_TIMEOUT (optional, seconds, default: 600)
    /// - DOCFORGE_CACHE_TTL (optional, seconds, default: 900)
    /// - DOCFORGE_MAX_JOBS (optional, default: 200)
    /// - DOCFORGE_MAX_PARALLEL_JOBS (optional, default: 4)
    /// - DOCFORGE_MEMORY_LIMIT_MB (optional, default: 256)
    pub fn from_env() -> anyhow::Result<Self> {
        let template_root = std::env::var("DOCFORGE_TEMPLATE_ROOT")
            .map_err(|_| anyhow::anyhow!("DOCFORGE_TEMPLATE_ROOT environment variable not set"))?;

        let data_dir = std::env::var("DOCFORGE_DATA_DIR").unwrap_or_else(|_| ".docforge".to_string());
        let mut config = Self::new(PathBuf::from(data_dir), PathBuf::from(template_root));

        if let Ok(output_dir) = std::env::var("DOCFORGE_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(output_dir);
        }

        config.completion_url = std::env::var("DOCFORGE_COMPLETION_URL")
            .ok()
            .filter(|url| !url.is_empty());

        if let Some(timeout) = env_parse::<u64>("DOCFORGE_EXECUTION_TIMEOUT") {
            config.execution_timeout = Duration::from_secs(timeout);
        }

        if let Some(ttl) = env_parse::<u64>("DOCFORGE_CACHE_TTL") {
            config.cache_ttl = Duration::from_secs(ttl);
        }

        if let Some(max_jobs) = env_parse("DOCFORGE_MAX_JOBS") {
            config.max_jobs = max_jobs;
        }

        if let Some(max_parallel_jobs) = env_parse("DOCFORGE_MAX_PARALLEL_JOBS") {
            config.max_parallel_jobs = max_parallel_jobs;
        }

        if let Some(memory_limit_mb) = env_parse("DOCFORGE_MEMORY_LIMIT_MB") {
            config.memory_limit_mb = memory_limit_mb;
        }

        Ok(config)
    }

    /// Path of the job record
    pub fn jobs_file(&self) -> PathBuf {
        self.data_dir.join("jobs.json")
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.template_root.as_os_str().is_empty() {
            anyhow::bail!("template_root cannot be empty");
        }

        if let Some(url) = &self.completion_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("completion_url must start with http:// or https://");
            }
        }

        if self.execution_timeout.is_zero() {
            anyhow::bail!("execution_timeout must be greater than 0");
        }

        if self.max_jobs == 0 {
            anyhow::bail!("max_jobs must be greater than 0");
        }

        if self.max_parallel_jobs == 0 {
            anyhow::bail!("max_parallel_jobs must be greater than 0");
        }

        if self.memory_limit_mb == 0 {
            anyhow::bail!("memory_limit_mb must be greater than 0");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(PathBuf::from(".docforge"), PathBuf::from("templates"))
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.execution_timeout, Duration::from_secs(600));
        assert_eq!(config.cache_ttl, Duration::from_secs(900));
        assert_eq!(config.max_jobs, 200);
        assert_eq!(config.output_dir, PathBuf::from(".docforge/output"));
        assert_eq!(config.jobs_file(), PathBuf::from(".docforge/jobs.json"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.completion_url = Some("localhost:8090".to_string());
        assert!(config.validate().is_err());

        config.completion_url = Some("http://localhost:8090".to_string());
        assert!(config.validate().is_ok());

        config.max_parallel_jobs = 0;
        assert!(config.validate().is_err());

        config.max_parallel_jobs = 1;
        config.execution_timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }
}
