pub mod types;

pub use types::RepoRef;

use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Error)]
pub enum RepoListError {
    #[error("Failed to read repository list {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid GitHub repository URL: {0}")]
    InvalidUrl(String),
}

/// Parse a GitHub repository URL into a RepoRef.
///
/// Accepts https://github.com/{owner}/{name} with an optional trailing slash,
/// `.git` suffix, or extra path segments such as `/issues`.
pub fn parse_repo_url(url: &str) -> Result<RepoRef, RepoListError> {
    let invalid = || RepoListError::InvalidUrl(url.to_string());
    let parsed = reqwest::Url::parse(url.trim()).map_err(|_| invalid())?;

    if !matches!(parsed.host_str(), Some("github.com") | Some("www.github.com")) {
        return Err(invalid());
    }

    let segments: Vec<_> = parsed
        .path_segments()
        .ok_or_else(invalid)?
        .filter(|segment| !segment.is_empty())
        .collect();

    if segments.len() < 2 {
        return Err(invalid());
    }

    let owner = segments[0];
    let name = segments[1].strip_suffix(".git").unwrap_or(segments[1]);
    if name.is_empty() {
        return Err(invalid());
    }

    Ok(RepoRef::new(owner, name))
}

/// Parse newline-delimited repository URLs, preserving order.
/// Blank lines and `#` comments are ignored; malformed lines and duplicates
/// are skipped with a warning.
pub fn parse_repo_list(contents: &str) -> Vec<RepoRef> {
    let mut seen = HashSet::new();
    let mut repos = Vec::new();

    for (index, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match parse_repo_url(line) {
            Ok(repo) => {
                if seen.insert(repo.clone()) {
                    repos.push(repo);
                } else {
                    warn!(line = index + 1, repo = %repo, "duplicate repository, skipping");
                }
            }
            Err(err) => warn!(line = index + 1, error = %err, "skipping malformed repository entry"),
        }
    }

    repos
}

/// Load the repository list from disk.
/// A missing file yields an empty list; any other read failure is an error.
#[instrument]
pub fn load_repo_list(path: &Path) -> Result<Vec<RepoRef>, RepoListError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            warn!("repository list not found, nothing to poll");
            return Ok(Vec::new());
        }
        Err(source) => {
            return Err(RepoListError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let repos = parse_repo_list(&contents);
    for repo in &repos {
        debug!(repo = %repo, "loaded repository");
    }
    info!(count = repos.len(), "loaded repository list");
    Ok(repos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_repo_url() {
        let repo = parse_repo_url("https://github.com/acme/widgets").unwrap();
        assert_eq!(repo.owner, "acme");
        assert_eq!(repo.name, "widgets");
    }

    #[test]
    fn test_parse_repo_url_variants() {
        let expected = RepoRef::new("acme", "widgets");
        assert_eq!(parse_repo_url("https://github.com/acme/widgets/").unwrap(), expected);
        assert_eq!(parse_repo_url("https://github.com/acme/widgets.git").unwrap(), expected);
        assert_eq!(parse_repo_url("https://github.com/acme/widgets/issues").unwrap(), expected);
        assert_eq!(parse_repo_url("  https://www.github.com/acme/widgets  ").unwrap(), expected);
    }

    #[test]
    fn test_parse_invalid_repo_url() {
        assert!(parse_repo_url("https://example.com/acme/widgets").is_err());
        assert!(parse_repo_url("https://github.com/acme").is_err());
        assert!(parse_repo_url("https://github.com/acme/.git").is_err());
        assert!(parse_repo_url("not-a-url").is_err());
    }

    #[test]
    fn test_parse_repo_list_skips_noise_and_keeps_order() {
        let contents = "\
https://github.com/acme/widgets

# comment line
https://github.com/acme/gadgets
garbage
https://github.com/acme/widgets/
https://github.com/other/tool
";
        let repos = parse_repo_list(contents);
        assert_eq!(
            repos,
            vec![
                RepoRef::new("acme", "widgets"),
                RepoRef::new("acme", "gadgets"),
                RepoRef::new("other", "tool"),
            ]
        );
    }

    #[test]
    fn test_load_missing_repo_list_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let repos = load_repo_list(&dir.path().join("missing.txt")).unwrap();
        assert!(repos.is_empty());
    }

    #[test]
    fn test_load_repo_list_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("repos.txt");
        std::fs::write(&path, "https://github.com/acme/widgets\n").unwrap();
        let repos = load_repo_list(&path).unwrap();
        assert_eq!(repos, vec![RepoRef::new("acme", "widgets")]);
    }

    #[test]
    fn test_load_empty_repo_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("repos.txt");
        std::fs::write(&path, "\n\n").unwrap();
        assert!(load_repo_list(&path).unwrap().is_empty());
    }

    #[test]
    fn test_load_repo_list_directory_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_repo_list(dir.path()),
            Err(RepoListError::Read { .. })
        ));
    }
}
