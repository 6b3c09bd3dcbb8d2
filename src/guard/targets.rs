//! Guarded application set.
//!
//! A small persisted set of application ids. Changes go to disk
//! immediately (write-then-rename, so a crash never leaves a torn
//! file) and the set is restored on startup. With no path configured
//! the set lives in memory only.

use std::collections::HashSet;
use std::io;
use std::path::PathBuf;

use parking_lot::RwLock;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum TargetsError {
    #[error("failed to persist guarded apps: {source}")]
    Persist {
        #[source]
        source: io::Error,
    },
    #[error("failed to restore guarded apps: {source}")]
    Restore {
        #[source]
        source: io::Error,
    },
}

/// The set of application ids the guard intercepts.
pub struct GuardTargets {
    path: Option<PathBuf>,
    apps: RwLock<HashSet<String>>,
}

impl GuardTargets {
    #[must_use]
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            apps: RwLock::new(HashSet::new()),
        }
    }

    /// Load the persisted set, replacing the in-memory one. A missing
    /// file is an empty set, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`TargetsError::Restore`] when the file exists but
    /// cannot be read.
    pub fn restore(&self) -> Result<usize, TargetsError> {
        let Some(path) = &self.path else {
            return Ok(0);
        };
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no guarded apps file yet");
                return Ok(0);
            }
            Err(source) => return Err(TargetsError::Restore { source }),
        };

        let apps: HashSet<String> = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(ToString::to_string)
            .collect();
        let count = apps.len();
        *self.apps.write() = apps;
        Ok(count)
    }

    #[must_use]
    pub fn contains(&self, app: &str) -> bool {
        self.apps.read().contains(app)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.apps.read().is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.apps.read().len()
    }

    /// Sorted listing for display surfaces.
    #[must_use]
    pub fn all(&self) -> Vec<String> {
        let mut apps: Vec<String> = self.apps.read().iter().cloned().collect();
        apps.sort_unstable();
        apps
    }

    /// Add `app` to the set. Returns whether it was new.
    ///
    /// # Errors
    ///
    /// Returns [`TargetsError::Persist`] when writing the file fails;
    /// the in-memory set keeps the change regardless.
    pub fn insert(&self, app: &str) -> Result<bool, TargetsError> {
        let mut apps = self.apps.write();
        let added = apps.insert(app.to_string());
        if added {
            self.persist(&apps)?;
        }
        Ok(added)
    }

    /// Remove `app` from the set. Returns whether it was present.
    ///
    /// # Errors
    ///
    /// Returns [`TargetsError::Persist`] when writing the file fails;
    /// the in-memory set keeps the change regardless.
    pub fn remove(&self, app: &str) -> Result<bool, TargetsError> {
        let mut apps = self.apps.write();
        let removed = apps.remove(app);
        if removed {
            self.persist(&apps)?;
        }
        Ok(removed)
    }

    /// Replace the whole set.
    ///
    /// # Errors
    ///
    /// Returns [`TargetsError::Persist`] when writing the file fails.
    pub fn replace(&self, apps: HashSet<String>) -> Result<(), TargetsError> {
        let mut current = self.apps.write();
        *current = apps;
        self.persist(&current)
    }

    fn persist(&self, apps: &HashSet<String>) -> Result<(), TargetsError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let mut lines: Vec<&str> = apps.iter().map(String::as_str).collect();
        lines.sort_unstable();
        let mut contents = String::new();
        for app in lines {
            contents.push_str(app);
            contents.push('\n');
        }

        let staging = path.with_extension("tmp");
        std::fs::write(&staging, contents).map_err(|source| TargetsError::Persist { source })?;
        std::fs::rename(&staging, path).map_err(|source| TargetsError::Persist { source })?;
        Ok(())
    }
}
