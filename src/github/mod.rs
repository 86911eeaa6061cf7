pub mod types;

pub use types::Issue;

use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::config::GitHubConfig;
use crate::repos::RepoRef;
use types::IssueResponse;

const USER_AGENT: &str = "gh-issue-notifier";
const API_VERSION: &str = "2022-11-28";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("GitHub request failed transiently: {0}")]
    Transient(String),

    #[error("GitHub rate limit reached{}", retry_hint(*.retry_after))]
    RateLimited { retry_after: Option<u64> },

    #[error("GitHub rejected the credential (HTTP {0}); check GITHUB_TOKEN")]
    Unauthorized(u16),

    #[error("Repository not found or not visible to this token")]
    NotFound,

    #[error("Unexpected GitHub response (HTTP {status}): {body}")]
    Unexpected { status: u16, body: String },

    #[error("Failed to decode GitHub response: {0}")]
    Decode(String),

    #[error("GitHub API request failed: {0}")]
    Request(#[from] reqwest::Error),
}

fn retry_hint(retry_after: Option<u64>) -> String {
    match retry_after {
        Some(secs) => format!(", retry after {secs}s"),
        None => String::new(),
    }
}

impl FetchError {
    pub fn is_auth(&self) -> bool {
        matches!(self, FetchError::Unauthorized(_))
    }

    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Transient(_) | FetchError::RateLimited { .. } => true,
            FetchError::Request(err) => err.is_timeout() || err.is_connect(),
            _ => false,
        }
    }
}

/// Source of open issues for a repository.
#[async_trait]
pub trait IssueSource: Send + Sync {
    /// Open issues, newest first, pull requests excluded.
    async fn open_issues(&self, repo: &RepoRef) -> Result<Vec<Issue>, FetchError>;
}

/// Issue source backed by the GitHub REST API.
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: String,
    token: String,
    per_page: u32,
}

impl GitHubClient {
    pub fn new(config: &GitHubConfig, token: impl Into<String>) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token: token.into(),
            per_page: config.per_page,
        })
    }
}

#[async_trait]
impl IssueSource for GitHubClient {
    #[instrument(skip_all, fields(repo = %repo))]
    async fn open_issues(&self, repo: &RepoRef) -> Result<Vec<Issue>, FetchError> {
        let url = format!("{}/repos/{}/{}/issues", self.api_url, repo.owner, repo.name);
        let per_page = self.per_page.to_string();

        debug!("fetching open issues from GitHub API");
        let response = self
            .http
            .get(&url)
            .query(&[
                ("state", "open"),
                ("sort", "created"),
                ("direction", "desc"),
                ("per_page", per_page.as_str()),
            ])
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &headers, body));
        }

        let body = response.text().await.map_err(classify_transport)?;
        let raw: Vec<IssueResponse> =
            serde_json::from_str(&body).map_err(|err| FetchError::Decode(err.to_string()))?;
        let total = raw.len();

        let issues = exclude_pull_requests(raw.into_iter().map(Issue::from).collect());
        debug!(
            total,
            issues = issues.len(),
            "received issue listing"
        );
        Ok(issues)
    }
}

/// Drop pull requests from a mixed issue listing, keeping order.
pub fn exclude_pull_requests(issues: Vec<Issue>) -> Vec<Issue> {
    issues.into_iter().filter(|i| !i.is_pull_request).collect()
}

fn classify_transport(err: reqwest::Error) -> FetchError {
    if err.is_timeout() || err.is_connect() {
        FetchError::Transient(err.to_string())
    } else {
        FetchError::Request(err)
    }
}

fn classify_status(
    status: StatusCode,
    headers: &reqwest::header::HeaderMap,
    body: String,
) -> FetchError {
    let header_u64 = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
    };

    match status {
        StatusCode::TOO_MANY_REQUESTS => FetchError::RateLimited {
            retry_after: header_u64("retry-after"),
        },
        StatusCode::FORBIDDEN
            if header_u64("x-ratelimit-remaining") == Some(0)
                || headers.contains_key("retry-after") =>
        {
            FetchError::RateLimited {
                retry_after: header_u64("retry-after"),
            }
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            FetchError::Unauthorized(status.as_u16())
        }
        StatusCode::NOT_FOUND => FetchError::NotFound,
        s if s.is_server_error() => FetchError::Transient(format!("HTTP {}", s.as_u16())),
        s => FetchError::Unexpected {
            status: s.as_u16(),
            body,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    const LISTING: &str = r#"[
        {"number": 44, "title": "Panic on empty input", "html_url": "https://github.com/acme/widgets/issues/44",
         "created_at": "2024-03-03T12:00:00Z"},
        {"number": 43, "title": "Add CI", "html_url": "https://github.com/acme/widgets/pull/43",
         "created_at": "2024-03-02T12:00:00Z", "pull_request": {"url": "https://api.github.com/repos/acme/widgets/pulls/43"}},
        {"number": 42, "title": "Docs typo", "html_url": "https://github.com/acme/widgets/issues/42",
         "created_at": "2024-03-01T12:00:00Z"}
    ]"#;

    fn client_for(url: &str) -> GitHubClient {
        let config = GitHubConfig {
            api_url: url.to_string(),
            ..GitHubConfig::default()
        };
        GitHubClient::new(&config, "test_token").unwrap()
    }

    fn widgets() -> RepoRef {
        RepoRef::new("acme", "widgets")
    }

    #[tokio::test]
    async fn test_open_issues_requests_newest_open_and_drops_prs() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/repos/acme/widgets/issues")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("state".into(), "open".into()),
                Matcher::UrlEncoded("sort".into(), "created".into()),
                Matcher::UrlEncoded("direction".into(), "desc".into()),
                Matcher::UrlEncoded("per_page".into(), "30".into()),
            ]))
            .match_header("authorization", "Bearer test_token")
            .match_header("user-agent", "gh-issue-notifier")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(LISTING)
            .create_async()
            .await;

        let issues = client_for(&server.url()).open_issues(&widgets()).await.unwrap();

        mock.assert_async().await;
        let numbers: Vec<u64> = issues.iter().map(|i| i.number).collect();
        assert_eq!(numbers, vec![44, 42]);
        assert!(issues.iter().all(|i| !i.is_pull_request));
        assert_eq!(issues[0].url, "https://github.com/acme/widgets/issues/44");
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/repos/acme/widgets/issues")
            .match_query(Matcher::Any)
            .with_status(502)
            .create_async()
            .await;

        let err = client_for(&server.url()).open_issues(&widgets()).await.unwrap_err();
        assert!(matches!(err, FetchError::Transient(_)));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_rate_limit_responses() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/repos/acme/widgets/issues")
            .match_query(Matcher::Any)
            .with_status(403)
            .with_header("x-ratelimit-remaining", "0")
            .create_async()
            .await;
        server
            .mock("GET", "/repos/acme/gadgets/issues")
            .match_query(Matcher::Any)
            .with_status(429)
            .with_header("retry-after", "60")
            .create_async()
            .await;

        let client = client_for(&server.url());
        let err = client.open_issues(&widgets()).await.unwrap_err();
        assert!(matches!(err, FetchError::RateLimited { retry_after: None }));

        let err = client
            .open_issues(&RepoRef::new("acme", "gadgets"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::RateLimited { retry_after: Some(60) }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_unauthorized_is_auth_error() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/repos/acme/widgets/issues")
            .match_query(Matcher::Any)
            .with_status(401)
            .with_body(r#"{"message": "Bad credentials"}"#)
            .create_async()
            .await;

        let err = client_for(&server.url()).open_issues(&widgets()).await.unwrap_err();
        assert!(err.is_auth());
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_not_found_and_bad_body() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/repos/acme/widgets/issues")
            .match_query(Matcher::Any)
            .with_status(404)
            .create_async()
            .await;
        server
            .mock("GET", "/repos/acme/gadgets/issues")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("{\"not\": \"a list\"}")
            .create_async()
            .await;

        let client = client_for(&server.url());
        assert!(matches!(
            client.open_issues(&widgets()).await.unwrap_err(),
            FetchError::NotFound
        ));
        assert!(matches!(
            client
                .open_issues(&RepoRef::new("acme", "gadgets"))
                .await
                .unwrap_err(),
            FetchError::Decode(_)
        ));
    }
}
