use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::repos::RepoRef;

/// Returned by highest_seen() for repositories with no recorded issue.
pub const NONE_SEEN: u64 = 0;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("Failed to write state file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize state: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Last notified issue number per repository, backed by a JSON file.
///
/// Keys are "owner/name". Values only ever grow. Every record() rewrites the
/// whole file through a temp file and rename, so a crash mid-write leaves the
/// previous contents intact.
#[derive(Debug)]
pub struct IssueState {
    path: PathBuf,
    seen: BTreeMap<String, u64>,
    dirty: bool,
}

impl IssueState {
    /// Load persisted state. A missing or unparsable file yields an empty
    /// mapping rather than an error.
    #[instrument]
    pub fn load(path: &Path) -> IssueState {
        let seen = match fs::read_to_string(path) {
            Ok(contents) => match parse_state(&contents) {
                Ok(seen) => {
                    info!(repos = seen.len(), "loaded issue state");
                    seen
                }
                Err(err) => {
                    warn!(error = %err, "state file is not valid JSON, starting fresh");
                    BTreeMap::new()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!("no state file yet, starting fresh");
                BTreeMap::new()
            }
            Err(err) => {
                warn!(error = %err, "failed to read state file, starting fresh");
                BTreeMap::new()
            }
        };

        IssueState {
            path: path.to_path_buf(),
            seen,
            dirty: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Highest notified issue number, or NONE_SEEN.
    pub fn highest_seen(&self, repo: &RepoRef) -> u64 {
        self.seen.get(&repo.key()).copied().unwrap_or(NONE_SEEN)
    }

    /// Whether anything has ever been recorded for this repository.
    pub fn contains(&self, repo: &RepoRef) -> bool {
        self.seen.contains_key(&repo.key())
    }

    /// True when the last write failed and memory is ahead of disk.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    #[cfg(test)]
    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        self.seen.clone()
    }

    /// Raise the stored number for `repo` to at least `issue_number` and
    /// persist. On error the in-memory value is kept and the store is left
    /// dirty for the next flush().
    pub fn record(&mut self, repo: &RepoRef, issue_number: u64) -> Result<(), StateError> {
        if issue_number > self.highest_seen(repo) {
            self.seen.insert(repo.key(), issue_number);
            self.dirty = true;
        }
        if !self.dirty {
            return Ok(());
        }
        debug!(repo = %repo, issue = self.highest_seen(repo), "recording last seen issue");
        self.flush()
    }

    /// Write the mapping to disk if it has unsaved changes.
    pub fn flush(&mut self) -> Result<(), StateError> {
        if !self.dirty {
            return Ok(());
        }
        write_atomic(&self.path, &self.seen)?;
        self.dirty = false;
        Ok(())
    }
}

/// Accepts `null` values, which older state files used for "not seen yet".
fn parse_state(contents: &str) -> Result<BTreeMap<String, u64>, serde_json::Error> {
    let raw: BTreeMap<String, Option<u64>> = serde_json::from_str(contents)?;
    Ok(raw
        .into_iter()
        .filter_map(|(key, value)| value.map(|n| (key, n)))
        .collect())
}

fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StateError> {
    let json = serde_json::to_string_pretty(value)?;
    let tmp_path = tmp_path_for(path);
    let write_err = |source| StateError::Write {
        path: path.to_path_buf(),
        source,
    };

    let mut file = fs::File::create(&tmp_path).map_err(write_err)?;
    file.write_all(json.as_bytes()).map_err(write_err)?;
    file.write_all(b"\n").map_err(write_err)?;
    file.sync_all().map_err(write_err)?;
    drop(file);

    fs::rename(&tmp_path, path).map_err(|source| {
        fs::remove_file(&tmp_path).ok();
        write_err(source)
    })
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "state".into());
    name.push(".tmp");
    path.with_file_name(name)
}
