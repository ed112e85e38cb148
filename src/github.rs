//! GitHub API interactions for draft pull requests.
//!
//! The engine opens a draft PR for an epic's shared branch when asked to.
//! This is a secondary convenience action: callers downgrade any failure
//! here to a warning and never roll back branch work because of it.

use serde::Deserialize;
use thiserror::Error;

/// GitHub API base URL
const GITHUB_API_BASE: &str = "https://api.github.com";

/// User-Agent header required by GitHub API
const USER_AGENT: &str = "capstan-cli";

/// Errors that can occur while creating a pull request.
#[derive(Debug, Error)]
pub enum PullRequestError {
    /// No token available in the environment
    #[error("No GitHub token found; set CAPSTAN_GITHUB_TOKEN or GITHUB_TOKEN")]
    MissingToken,

    /// Token is invalid or expired (401 Unauthorized)
    #[error("Invalid or expired token: GitHub returned 401 Unauthorized")]
    Unauthorized,

    /// Token lacks required permissions (403 Forbidden)
    #[error("Token lacks required permissions: GitHub returned 403 Forbidden")]
    Forbidden,

    /// PR already exists or the request was otherwise rejected (422)
    #[error("GitHub rejected the pull request: {0}")]
    Rejected(String),

    /// Network or other HTTP error
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    /// Failed to parse response
    #[error("Failed to parse GitHub response: {0}")]
    ParseError(String),
}

/// Response from POST /repos/{owner}/{repo}/pulls (only fields we care about).
#[derive(Debug, Deserialize)]
pub struct PullRequest {
    /// PR number
    pub number: i64,
    /// Web URL of the PR
    pub html_url: String,
    /// Whether the PR is a draft
    #[serde(default)]
    pub draft: bool,
}

/// Resolve the GitHub token from the environment.
fn github_token() -> Result<String, PullRequestError> {
    std::env::var("CAPSTAN_GITHUB_TOKEN")
        .or_else(|_| std::env::var("GITHUB_TOKEN"))
        .map_err(|_| PullRequestError::MissingToken)
}

/// Create a draft pull request for `head` against `base`.
///
/// # Arguments
/// * `owner` / `repo` - Repository coordinates parsed from the origin remote
/// * `title` - PR title
/// * `head` - Branch with the changes
/// * `base` - Trunk branch to merge into
/// * `body` - PR description
pub fn create_draft_pull_request(
    owner: &str,
    repo: &str,
    title: &str,
    head: &str,
    base: &str,
    body: &str,
) -> Result<PullRequest, PullRequestError> {
    let token = github_token()?;
    let url = format!("{}/repos/{}/{}/pulls", GITHUB_API_BASE, owner, repo);

    let response = ureq::post(&url)
        .set("Authorization", &format!("Bearer {}", token))
        .set("Accept", "application/vnd.github+json")
        .set("User-Agent", USER_AGENT)
        .set("X-GitHub-Api-Version", "2022-11-28")
        .send_json(ureq::json!({
            "title": title,
            "head": head,
            "base": base,
            "body": body,
            "draft": true,
        }));

    match response {
        Ok(resp) => resp
            .into_json()
            .map_err(|e| PullRequestError::ParseError(e.to_string())),
        Err(ureq::Error::Status(401, _)) => Err(PullRequestError::Unauthorized),
        Err(ureq::Error::Status(403, _)) => Err(PullRequestError::Forbidden),
        Err(ureq::Error::Status(422, resp)) => {
            let body = resp.into_string().unwrap_or_default();
            Err(PullRequestError::Rejected(body))
        }
        Err(ureq::Error::Status(code, resp)) => {
            let body = resp.into_string().unwrap_or_default();
            Err(PullRequestError::HttpError(format!(
                "HTTP {}: {}",
                code, body
            )))
        }
        Err(e) => Err(PullRequestError::HttpError(e.to_string())),
    }
}
