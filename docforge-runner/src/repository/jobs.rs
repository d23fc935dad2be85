//! Jobs repository
//!
//! Durable storage of the job collection. The job manager owns the
//! collection in memory and hands the whole of it to the repository after
//! every mutation.

use async_trait::async_trait;
use docforge_core::GenerationError;
use docforge_core::domain::job::Job;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// Repository trait for the job collection
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Loads the stored collection, most-recent-first
    async fn load(&self) -> Result<Vec<Job>, GenerationError>;

    /// Replaces the stored collection
    ///
    /// Returns only once the collection is durable.
    async fn save(&self, jobs: &[Job]) -> Result<(), GenerationError>;
}

/// JSON file implementation of JobRepository
///
/// The file holds a JSON array. Saves write a temporary file in the same
/// directory and rename it over the record, so readers never observe a
/// partial write.
pub struct JsonFileJobRepository {
    path: PathBuf,
}

impl JsonFileJobRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Writes `bytes` to `path` through a temporary file in the same directory
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), GenerationError> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;
    file.persist(path)
        .map_err(|e| GenerationError::storage(format!("failed to replace {}: {}", path.display(), e)))?;
    Ok(())
}

#[async_trait]
impl JobRepository for JsonFileJobRepository {
    async fn load(&self) -> Result<Vec<Job>, GenerationError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }

        serde_json::from_slice(&bytes).map_err(|e| {
            GenerationError::storage(format!("failed to parse {}: {}", self.path.display(), e))
        })
    }

    async fn save(&self, jobs: &[Job]) -> Result<(), GenerationError> {
        let bytes = serde_json::to_vec_pretty(jobs)
            .map_err(|e| GenerationError::storage(format!("failed to serialize jobs: {}", e)))?;
        let path = self.path.clone();

        debug!("Persisting {} job(s) to {}", jobs.len(), path.display());
        tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
            .await
            .map_err(|e| GenerationError::storage(format!("job store writer failed: {}", e)))?
    }
}

/// In-memory implementation of JobRepository
#[derive(Default)]
pub struct InMemoryJobRepository {
    jobs: Mutex<Vec<Job>>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn load(&self) -> Result<Vec<Job>, GenerationError> {
        Ok(self.jobs.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    async fn save(&self, jobs: &[Job]) -> Result<(), GenerationError> {
        *self.jobs.lock().unwrap_or_else(PoisonError::into_inner) = jobs.to_vec();
        Ok(())
    }
}
