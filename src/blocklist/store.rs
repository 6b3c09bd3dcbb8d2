//! Snapshot store for the block domain sets.
//!
//! The packet path classifies every query against the current lists, so
//! reads must never lock. Loads build a complete new [`ListSnapshot`]
//! and publish it through an [`ArcSwap`]; readers keep whatever snapshot
//! they grabbed until the next packet. A failed reload publishes
//! nothing, leaving the previous snapshot in place.

use std::collections::HashSet;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::{debug, warn};

use super::loader::{FileLoader, LoadError};
use crate::config::ListsConfig;

/// Immutable view of the main and custom domain sets.
///
/// `ready` reports whether a main-list load has completed since start;
/// it latches true and never goes back. The default snapshot is empty
/// and not ready.
#[derive(Debug, Clone, Default)]
pub struct ListSnapshot {
    main: Arc<HashSet<String>>,
    custom: Arc<HashSet<String>>,
    ready: bool,
}

impl ListSnapshot {
    /// Build a ready snapshot from raw list entries.
    ///
    /// Entries are normalized to lowercase with a single trailing dot
    /// removed, matching how queried names are normalized before
    /// lookup.
    #[must_use]
    pub fn build(main: Vec<String>, custom: Vec<String>) -> Self {
        Self {
            main: Arc::new(normalize(main)),
            custom: Arc::new(normalize(custom)),
            ready: true,
        }
    }

    /// Whether a main-list load has completed.
    #[must_use]
    pub fn ready(&self) -> bool {
        self.ready
    }

    /// Membership in main or custom set. `domain` must already be
    /// normalized.
    #[must_use]
    pub fn contains(&self, domain: &str) -> bool {
        self.main.contains(domain) || self.custom.contains(domain)
    }

    /// Total entries across both sets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.main.len() + self.custom.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.main.is_empty() && self.custom.is_empty()
    }
}

fn normalize(entries: Vec<String>) -> HashSet<String> {
    entries
        .into_iter()
        .map(|entry| {
            let entry = entry.trim();
            let entry = entry.strip_suffix('.').unwrap_or(entry);
            entry.to_ascii_lowercase()
        })
        .filter(|entry| !entry.is_empty())
        .collect()
}

/// Owns the current snapshot and the list sources it is built from.
pub struct ListStore {
    config: ListsConfig,
    current: ArcSwap<ListSnapshot>,
}

impl ListStore {
    #[must_use]
    pub fn new(config: ListsConfig) -> Self {
        Self {
            config,
            current: ArcSwap::from_pointee(ListSnapshot::default()),
        }
    }

    /// The current snapshot. Cheap; safe to call per packet.
    #[must_use]
    pub fn snapshot(&self) -> Arc<ListSnapshot> {
        self.current.load_full()
    }

    /// Initial load of both lists.
    ///
    /// The main list is required. A missing or unreadable custom list is
    /// tolerated: the filter starts with the main list alone and the
    /// custom set stays empty until the next successful reload.
    ///
    /// # Errors
    ///
    /// Returns the main-list [`LoadError`]; the previous (empty)
    /// snapshot stays published in that case.
    pub async fn load_all(&self) -> Result<usize, LoadError> {
        let main = self.read_main().await?;
        let custom = match self.read_custom().await {
            Ok(entries) => entries,
            Err(LoadError::NotFound(path)) => {
                debug!(path = ?path, "no custom list yet");
                Vec::new()
            }
            Err(error) => {
                warn!(error = %error, "custom list unreadable, continuing without it");
                Vec::new()
            }
        };

        let snapshot = Arc::new(ListSnapshot::build(main, custom));
        let total = snapshot.len();
        self.current.store(snapshot);
        Ok(total)
    }

    /// Rebuild the main set, keeping the current custom set.
    ///
    /// Readiness latches true on success; on error the previous
    /// snapshot stays published.
    ///
    /// # Errors
    ///
    /// Returns the [`LoadError`] from reading the main source.
    pub async fn reload_main(&self) -> Result<usize, LoadError> {
        let main = Arc::new(normalize(self.read_main().await?));
        self.current.rcu(|current| {
            Arc::new(ListSnapshot {
                main: Arc::clone(&main),
                custom: Arc::clone(&current.custom),
                ready: true,
            })
        });
        Ok(main.len())
    }

    /// Rebuild the custom set, keeping the current main set.
    ///
    /// Does not change readiness: only a main-list load arms the
    /// filter.
    ///
    /// # Errors
    ///
    /// Returns the [`LoadError`] from reading the custom source.
    pub async fn reload_custom(&self) -> Result<usize, LoadError> {
        let custom = Arc::new(normalize(self.read_custom().await?));
        self.current.rcu(|current| {
            Arc::new(ListSnapshot {
                main: Arc::clone(&current.main),
                custom: Arc::clone(&custom),
                ready: current.ready,
            })
        });
        Ok(custom.len())
    }

    /// Read main entries, preferring the updated file when one exists.
    async fn read_main(&self) -> Result<Vec<String>, LoadError> {
        let main = &self.config.main;
        if let Some(update_path) = &main.update_path {
            if tokio::fs::try_exists(update_path).await.unwrap_or(false) {
                debug!(path = ?update_path, "loading updated main list");
                return FileLoader::load(update_path, main.format).await;
            }
        }
        FileLoader::load(&main.path, main.format).await
    }

    async fn read_custom(&self) -> Result<Vec<String>, LoadError> {
        let custom = &self.config.custom;
        FileLoader::load(&custom.path, custom.format).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CustomListConfig, ListFormat, MainListConfig};
    use std::path::Path;
    use tempfile::TempDir;

    fn lists_config(dir: &Path) -> ListsConfig {
        ListsConfig {
            main: MainListConfig {
                path: dir.join("main.txt"),
                update_path: Some(dir.join("main-updated.txt")),
                format: ListFormat::Hosts,
            },
            custom: CustomListConfig {
                path: dir.join("custom.txt"),
                format: ListFormat::Domains,
            },
        }
    }

    fn store_in(dir: &TempDir) -> ListStore {
        ListStore::new(lists_config(dir.path()))
    }

    #[tokio::test]
    async fn should_start_with_empty_unready_snapshot() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let snapshot = store.snapshot();
        assert!(!snapshot.ready());
        assert!(snapshot.is_empty());
    }

    #[tokio::test]
    async fn should_publish_union_after_load_all() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("main.txt"), "0.0.0.0 ads.example.com\n").unwrap();
        std::fs::write(dir.path().join("custom.txt"), "tracker.example.org\n").unwrap();
        let store = store_in(&dir);

        let total = store.load_all().await.unwrap();

        assert_eq!(total, 2);
        let snapshot = store.snapshot();
        assert!(snapshot.ready());
        assert!(snapshot.contains("ads.example.com"));
        assert!(snapshot.contains("tracker.example.org"));
    }

    #[tokio::test]
    async fn should_tolerate_missing_custom_list() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("main.txt"), "0.0.0.0 ads.example.com\n").unwrap();
        let store = store_in(&dir);

        store.load_all().await.unwrap();

        let snapshot = store.snapshot();
        assert!(snapshot.ready());
        assert!(snapshot.contains("ads.example.com"));
    }

    #[tokio::test]
    async fn should_keep_empty_snapshot_when_main_list_is_missing() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let result = store.load_all().await;

        assert!(matches!(result, Err(LoadError::NotFound(_))));
        assert!(!store.snapshot().ready());
    }

    #[tokio::test]
    async fn should_prefer_updated_main_list() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("main.txt"), "0.0.0.0 bundled.example.com\n").unwrap();
        std::fs::write(
            dir.path().join("main-updated.txt"),
            "0.0.0.0 updated.example.com\n",
        )
        .unwrap();
        let store = store_in(&dir);

        store.load_all().await.unwrap();

        let snapshot = store.snapshot();
        assert!(snapshot.contains("updated.example.com"));
        assert!(!snapshot.contains("bundled.example.com"));
    }

    #[tokio::test]
    async fn should_swap_custom_set_without_touching_main() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("main.txt"), "0.0.0.0 ads.example.com\n").unwrap();
        std::fs::write(dir.path().join("custom.txt"), "old.example.org\n").unwrap();
        let store = store_in(&dir);
        store.load_all().await.unwrap();

        std::fs::write(dir.path().join("custom.txt"), "new.example.org\n").unwrap();
        let count = store.reload_custom().await.unwrap();

        assert_eq!(count, 1);
        let snapshot = store.snapshot();
        assert!(snapshot.contains("ads.example.com"));
        assert!(snapshot.contains("new.example.org"));
        assert!(!snapshot.contains("old.example.org"));
    }

    #[tokio::test]
    async fn should_keep_previous_snapshot_when_custom_reload_fails() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("main.txt"), "0.0.0.0 ads.example.com\n").unwrap();
        std::fs::write(dir.path().join("custom.txt"), "keep.example.org\n").unwrap();
        let store = store_in(&dir);
        store.load_all().await.unwrap();

        std::fs::remove_file(dir.path().join("custom.txt")).unwrap();
        let result = store.reload_custom().await;

        assert!(result.is_err());
        let snapshot = store.snapshot();
        assert!(snapshot.ready());
        assert!(snapshot.contains("keep.example.org"));
    }

    #[tokio::test]
    async fn should_keep_previous_snapshot_when_main_reload_fails() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("main.txt"), "0.0.0.0 ads.example.com\n").unwrap();
        let store = store_in(&dir);
        store.load_all().await.unwrap();

        std::fs::remove_file(dir.path().join("main.txt")).unwrap();
        let result = store.reload_main().await;

        assert!(result.is_err());
        let snapshot = store.snapshot();
        assert!(snapshot.ready());
        assert!(snapshot.contains("ads.example.com"));
    }

    #[tokio::test]
    async fn should_swap_main_set_keeping_custom() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("main.txt"), "0.0.0.0 first.example.com\n").unwrap();
        std::fs::write(dir.path().join("custom.txt"), "mine.example.org\n").unwrap();
        let store = store_in(&dir);
        store.load_all().await.unwrap();

        std::fs::write(dir.path().join("main.txt"), "0.0.0.0 second.example.com\n").unwrap();
        store.reload_main().await.unwrap();

        let snapshot = store.snapshot();
        assert!(snapshot.contains("second.example.com"));
        assert!(!snapshot.contains("first.example.com"));
        assert!(snapshot.contains("mine.example.org"));
    }

    #[tokio::test]
    async fn should_normalize_entries_on_build() {
        let snapshot = ListSnapshot::build(
            vec!["ADS.Example.COM.".to_string()],
            vec!["  Tracker.Example.ORG ".to_string()],
        );

        assert!(snapshot.contains("ads.example.com"));
        assert!(snapshot.contains("tracker.example.org"));
        assert_eq!(snapshot.len(), 2);
    }
}
