//! File-backed blocklist loading.

use std::io::BufReader;
use std::path::{Path, PathBuf};

use super::{parser_for_format, ParseError};
use crate::config::ListFormat;

/// Error type for blocklist file loading.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// File was not found at the given path.
    #[error("list file not found: {0:?}")]
    NotFound(PathBuf),

    /// Permission denied when opening the file.
    #[error("permission denied: {0:?}")]
    PermissionDenied(PathBuf),

    /// Other I/O error while reading the file.
    #[error("I/O error reading {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error parsing the file content.
    #[error("parse error")]
    Parse(#[from] ParseError),

    /// The parsing task was cancelled or panicked.
    #[error("parse task failed")]
    Join(#[from] tokio::task::JoinError),
}

/// Loads and parses a blocklist file.
pub struct FileLoader;

impl FileLoader {
    /// Read `path` and parse it as `format`.
    ///
    /// The read is async; parsing runs on a blocking task since the
    /// main list can be hundreds of thousands of lines.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::NotFound`] / [`LoadError::PermissionDenied`]
    /// for the matching open failures, [`LoadError::Io`] for other read
    /// errors, and [`LoadError::Parse`] when the content is unreadable.
    pub async fn load(path: &Path, format: ListFormat) -> Result<Vec<String>, LoadError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| read_error(path, source))?;

        let entries = tokio::task::spawn_blocking(move || {
            let parser = parser_for_format(format);
            parser.parse(&mut BufReader::new(content.as_bytes()))
        })
        .await??;

        Ok(entries)
    }
}

fn read_error(path: &Path, source: std::io::Error) -> LoadError {
    match source.kind() {
        std::io::ErrorKind::NotFound => LoadError::NotFound(path.to_path_buf()),
        std::io::ErrorKind::PermissionDenied => LoadError::PermissionDenied(path.to_path_buf()),
        _ => LoadError::Io {
            path: path.to_path_buf(),
            source,
        },
    }
}
