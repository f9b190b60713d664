use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::networking::FetchError;

/// Failures surfaced by a sync run.
///
/// `Discovery`, `Parse` and `Serialize` are always fatal to the run. `Fetch`, `Io` and
/// `InvalidUrl` are fatal when they hit the catalog page or the manifest and
/// otherwise only fail the manufacturer that produced them.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("discovery failed: {0}")]
    Discovery(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize {}: {source}", .path.display())]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{context} ({}): {source}", .path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl SyncError {
    pub fn io(context: &'static str, path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            context,
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}
