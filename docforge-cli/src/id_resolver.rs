//! ID resolver module
//!
//! Lets users name a job by an unambiguous prefix of its id instead of the
//! full id.

use anyhow::{Result, anyhow};
use docforge_core::domain::job::Job;

/// Resolve a job id or prefix against `jobs`
///
/// An exact match wins even if it is also a prefix of other ids.
///
/// # Errors
/// Returns an error if no job matches or the prefix matches several jobs
pub fn resolve_job_id(jobs: &[Job], id_or_prefix: &str) -> Result<String> {
    let wanted = id_or_prefix.trim();
    if let Some(job) = jobs.iter().find(|j| j.id == wanted) {
        return Ok(job.id.clone());
    }

    let prefix = wanted.to_lowercase();
    let matches: Vec<&Job> = jobs
        .iter()
        .filter(|j| j.id.to_lowercase().starts_with(&prefix))
        .collect();

    match matches.as_slice() {
        [] => Err(anyhow!("No job found with ID starting with '{}'", wanted)),
        [job] => Ok(job.id.clone()),
        many => {
            let ids: Vec<&str> = many.iter().map(|j| j.id.as_str()).collect();
            Err(anyhow!(
                "Ambiguous prefix '{}' matches multiple jobs: {}",
                wanted,
                ids.join(", ")
            ))
        }
    }
}
