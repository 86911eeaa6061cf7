use chrono::{DateTime, Utc};
use serde::Deserialize;

/// An open issue as returned by the GitHub issues endpoint.
/// Note: the fetcher never hands out pull requests, but the flag is kept so
/// filtering stays visible at the call site.
#[derive(Debug, Clone, PartialEq)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub is_pull_request: bool,
}

/// Raw shape of one entry in `GET /repos/{owner}/{repo}/issues`.
/// Pull requests appear in the same listing with a `pull_request` object.
#[derive(Debug, Deserialize)]
pub(crate) struct IssueResponse {
    pub number: u64,
    pub title: String,
    pub html_url: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub pull_request: Option<serde_json::Value>,
}

impl From<IssueResponse> for Issue {
    fn from(raw: IssueResponse) -> Self {
        Issue {
            number: raw.number,
            title: raw.title,
            url: raw.html_url,
            created_at: raw.created_at,
            is_pull_request: raw.pull_request.is_some(),
        }
    }
}
