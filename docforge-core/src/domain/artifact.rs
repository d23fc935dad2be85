//! Transformation code artifacts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default lifetime of an enhanced artifact
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(15 * 60);

/// Transformation code in effect for one run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CodeArtifact {
    pub source: String,
    pub provenance: Provenance,
}

impl CodeArtifact {
    pub fn base(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            provenance: Provenance::Base,
        }
    }

    pub fn enhanced(source: impl Into<String>, cached_at: DateTime<Utc>) -> Self {
        Self {
            source: source.into(),
            provenance: Provenance::Enhanced { cached_at },
        }
    }

    pub fn is_enhanced(&self) -> bool {
        matches!(self.provenance, Provenance::Enhanced { .. })
    }
}

/// Where an artifact came from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Provenance {
    Base,
    Enhanced { cached_at: DateTime<Utc> },
}

/// Freshness rule for a cached enhanced artifact
///
/// Fresh only while younger than `ttl` and not older than the base artifact
/// it was derived from.
pub fn is_fresh(
    now: DateTime<Utc>,
    cached_at: DateTime<Utc>,
    base_modified_at: DateTime<Utc>,
    ttl: Duration,
) -> bool {
    let Ok(ttl) = chrono::Duration::from_std(ttl) else {
        return false;
    };
    now - cached_at < ttl && cached_at >= base_modified_at
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_fresh_within_ttl() {
        assert!(is_fresh(at(14 * 60 + 59), at(0), at(-10), DEFAULT_CACHE_TTL));
    }

    #[test]
    fn test_stale_after_ttl() {
        assert!(!is_fresh(at(15 * 60 + 1), at(0), at(-10), DEFAULT_CACHE_TTL));
        assert!(!is_fresh(at(15 * 60), at(0), at(-10), DEFAULT_CACHE_TTL));
    }

    #[test]
    fn test_stale_when_base_is_newer() {
        assert!(!is_fresh(at(60), at(0), at(30), DEFAULT_CACHE_TTL));
        assert!(is_fresh(at(60), at(30), at(30), DEFAULT_CACHE_TTL));
    }
}
