//! Known-depot cache.
//!
//! Remembers which depot keys were already submitted so later runs can skip
//! them, and holds the backend's list of depots it already knows.
//!
//! # File Format
//!
//! ```text
//! ; comment lines start with a semicolon
//! 228990
//! 228991
//! ```
//!
//! One decimal depot ID per line, sorted ascending. The file is rewritten
//! whole on every save.

use std::collections::{BTreeSet, HashSet};
use std::io::ErrorKind;
use std::path::Path;

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, info};

use crate::error::{DumpError, DumpResult};
use crate::io::write_atomic;

const FILE_HEADER: &str = "\
; Depot IDs whose decryption keys were already submitted.
; Managed by tokendump and rewritten after every run.
";

/// Source of the depot IDs the backend already has keys for.
#[async_trait]
pub trait KnownDepotSource: Send + Sync {
    async fn known_depot_ids(&self) -> DumpResult<Vec<u32>>;
}

/// Previously submitted depots plus the backend skip list.
#[derive(Debug, Clone, Default)]
pub struct KnownDepots {
    previously_sent: BTreeSet<u32>,
    server: HashSet<u32>,
}

impl KnownDepots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load previously submitted depots from `path`.
    ///
    /// A missing file is an empty cache. The first unparsable line stops the
    /// load with an error; IDs read before it stay loaded.
    pub async fn load(&mut self, path: impl AsRef<Path>) -> DumpResult<usize> {
        let path = path.as_ref();

        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "no known depot file yet");
                return Ok(0);
            }
            Err(e) => {
                return Err(DumpError::Cache {
                    message: format!("failed to read {}: {}", path.display(), e),
                })
            }
        };

        let loaded = self.parse_lines(&content)?;
        info!(path = %path.display(), loaded, "loaded known depots");
        Ok(loaded)
    }

    fn parse_lines(&mut self, content: &str) -> DumpResult<usize> {
        let mut loaded = 0;

        for (index, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with(';') {
                continue;
            }

            let depot_id: u32 = line.parse().map_err(|e| DumpError::Cache {
                message: format!("line {}: invalid depot id {:?}: {}", index + 1, line, e),
            })?;

            if self.previously_sent.insert(depot_id) {
                loaded += 1;
            }
        }

        Ok(loaded)
    }

    /// Replace the server skip list with the backend's current one.
    ///
    /// On failure the previous list (empty on first use) is kept.
    pub async fn fetch_server_skip_list<S>(&mut self, source: &S) -> DumpResult<usize>
    where
        S: KnownDepotSource + ?Sized,
    {
        let ids = source.known_depot_ids().await?;
        self.server = ids.into_iter().collect();

        info!(count = self.server.len(), "fetched server known depots");
        Ok(self.server.len())
    }

    /// Write previously submitted depots to `path`.
    ///
    /// Returns `false` without touching the file when there is nothing to save.
    pub async fn save(&self, path: impl AsRef<Path>) -> DumpResult<bool> {
        let path = path.as_ref();

        if self.previously_sent.is_empty() {
            return Ok(false);
        }

        write_atomic(path, &self.to_file_contents())
            .await
            .map_err(|e| DumpError::Cache {
                message: format!("failed to write {}: {}", path.display(), e),
            })?;

        info!(path = %path.display(), count = self.previously_sent.len(), "saved known depots");
        Ok(true)
    }

    pub fn to_file_contents(&self) -> String {
        let mut out = String::from(FILE_HEADER);
        for depot_id in &self.previously_sent {
            out.push_str(&depot_id.to_string());
            out.push('\n');
        }
        out
    }

    /// Whether a key for `depot_id` was sent before or is known to the backend.
    pub fn is_known(&self, depot_id: u32) -> bool {
        self.previously_sent.contains(&depot_id) || self.server.contains(&depot_id)
    }

    /// Record depots whose keys were just submitted. Returns how many are new.
    pub fn mark_submitted(&mut self, depot_ids: impl IntoIterator<Item = u32>) -> usize {
        depot_ids
            .into_iter()
            .filter(|id| self.previously_sent.insert(*id))
            .count()
    }

    pub fn previously_sent(&self) -> &BTreeSet<u32> {
        &self.previously_sent
    }

    pub fn server_len(&self) -> usize {
        self.server.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct FixedSource(DumpResult<Vec<u32>>);

    #[async_trait]
    impl KnownDepotSource for FixedSource {
        async fn known_depot_ids(&self) -> DumpResult<Vec<u32>> {
            match &self.0 {
                Ok(ids) => Ok(ids.clone()),
                Err(_) => Err(DumpError::Network {
                    message: "connection refused".into(),
                }),
            }
        }
    }

    #[tokio::test]
    async fn test_save_load_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("known_depots.txt");

        let mut known = KnownDepots::new();
        known.mark_submitted([900, 5, 441, 5, 70, 900]);
        assert!(known.save(&path).await.unwrap());

        let mut reloaded = KnownDepots::new();
        let loaded = reloaded.load(&path).await.unwrap();
        assert_eq!(loaded, 4);
        assert_eq!(
            reloaded.previously_sent().iter().copied().collect::<Vec<_>>(),
            vec![5, 70, 441, 900]
        );

        let content = fs::read_to_string(&path).await.unwrap();
        let data: Vec<&str> = content.lines().filter(|l| !l.starts_with(';')).collect();
        assert_eq!(data, vec!["5", "70", "441", "900"]);
    }

    #[tokio::test]
    async fn test_save_empty_is_noop() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("known_depots.txt");

        let known = KnownDepots::new();
        assert!(!known.save(&path).await.unwrap());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let mut known = KnownDepots::new();
        let loaded = known.load(temp_dir.path().join("absent.txt")).await.unwrap();
        assert_eq!(loaded, 0);
    }

    #[tokio::test]
    async fn test_load_skips_comments_and_blank_lines() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("known_depots.txt");
        fs::write(&path, "; header\n\n  12 \n;  34\n56\n").await.unwrap();

        let mut known = KnownDepots::new();
        assert_eq!(known.load(&path).await.unwrap(), 2);
        assert!(known.previously_sent().contains(&12));
        assert!(!known.previously_sent().contains(&34));
        assert!(known.previously_sent().contains(&56));
    }

    #[tokio::test]
    async fn test_load_stops_at_bad_line_keeping_prefix() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("known_depots.txt");
        fs::write(&path, "10\n20\nnot-a-depot\n30\n").await.unwrap();

        let mut known = KnownDepots::new();
        let err = known.load(&path).await.unwrap_err();
        assert!(matches!(err, DumpError::Cache { .. }));
        assert!(err.to_string().contains("line 3"));

        assert!(known.previously_sent().contains(&10));
        assert!(known.previously_sent().contains(&20));
        assert!(!known.previously_sent().contains(&30));
    }

    #[tokio::test]
    async fn test_server_skip_list_union() {
        let mut known = KnownDepots::new();
        known.mark_submitted([1]);

        let fetched = known
            .fetch_server_skip_list(&FixedSource(Ok(vec![2, 3])))
            .await
            .unwrap();
        assert_eq!(fetched, 2);

        assert!(known.is_known(1));
        assert!(known.is_known(3));
        assert!(!known.is_known(4));
        assert!(!known.previously_sent().contains(&3));
    }

    #[tokio::test]
    async fn test_server_skip_list_failure_keeps_empty() {
        let mut known = KnownDepots::new();
        let source = FixedSource(Err(DumpError::Network {
            message: String::new(),
        }));

        assert!(known.fetch_server_skip_list(&source).await.is_err());
        assert_eq!(known.server_len(), 0);
    }

    #[tokio::test]
    async fn test_server_ids_are_not_persisted() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("known_depots.txt");

        let mut known = KnownDepots::new();
        known
            .fetch_server_skip_list(&FixedSource(Ok(vec![77])))
            .await
            .unwrap();
        known.mark_submitted([5]);
        known.save(&path).await.unwrap();

        let content = fs::read_to_string(&path).await.unwrap();
        assert!(!content.contains("77"));
    }
}
