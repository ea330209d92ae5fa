//! # Cache Module
//!
//! Whether a stage output may stand in for running the stage.
//!
//! The pipeline memoizes every stage on the filesystem: an artifact at its
//! canonical path is a cache entry. The policy is isolated behind
//! [`CacheProbe`] so the orchestrator never performs the check itself.

use std::path::Path;

/// Decides whether an artifact counts as a cache hit.
pub trait CacheProbe: Send + Sync {
    fn is_cached(&self, artifact: &Path) -> bool;
}

/// Presence alone is a hit; content and timestamps are not inspected.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExistenceProbe;

impl CacheProbe for ExistenceProbe {
    fn is_cached(&self, artifact: &Path) -> bool {
        artifact.is_file()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn existence_probe_follows_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("lh.x.stats");
        let probe = ExistenceProbe;

        assert!(!probe.is_cached(&artifact));
        std::fs::write(&artifact, b"").unwrap();
        // empty files still count
        assert!(probe.is_cached(&artifact));
        assert!(!probe.is_cached(dir.path()));
    }
}
