use std::path::PathBuf;

use crate::engine::models::LogoRecord;

/// What happened to one manufacturer's logo during a run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ItemOutcome {
    /// A file was written and a record produced.
    Downloaded(LogoRecord),
    /// The on-disk file already matches the upstream bytes.
    Unchanged,
    /// The on-disk file differs from upstream and the policy kept it.
    ChangedSkipped,
    /// The manufacturer page advertises no logo.
    NotFound,
}

/// How the run went as a whole, judged after every item finished.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    Complete { downloaded: usize },
    Shortfall { downloaded: usize, expected: usize },
    NothingDownloaded,
}

impl RunOutcome {
    /// `existing` is the record count of the manifest loaded at start, if
    /// there was one.
    pub fn classify(discovered: usize, existing: Option<usize>, downloaded: usize) -> Self {
        match existing {
            Some(existing) if existing > 0 => {
                let expected = discovered.saturating_sub(existing);
                if downloaded < expected {
                    Self::Shortfall {
                        downloaded,
                        expected,
                    }
                } else {
                    Self::Complete { downloaded }
                }
            }
            _ if downloaded == 0 => Self::NothingDownloaded,
            _ if downloaded < discovered => Self::Shortfall {
                downloaded,
                expected: discovered,
            },
            _ => Self::Complete { downloaded },
        }
    }
}

/// A manufacturer whose pipeline ended in an error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ItemFailure {
    pub name: String,
    pub error: String,
}

/// Summary of one sync run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncReport {
    pub discovered: usize,
    pub existing: Option<usize>,
    pub downloaded: Vec<String>,
    pub unchanged: Vec<String>,
    pub changed_skipped: Vec<String>,
    pub not_found: Vec<String>,
    pub failures: Vec<ItemFailure>,
    pub unaccounted: Vec<String>,
    pub orphans: Vec<PathBuf>,
    pub outcome: RunOutcome,
    pub manifest_written: bool,
}
