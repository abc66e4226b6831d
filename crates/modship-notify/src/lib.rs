//! GitHub issue notifications for modship.
//!
//! When a publish run ends in a state a human has to look at (rejected
//! credentials, a fatal platform error, or an exhausted attempt budget) an
//! issue is filed on the project repository.
//!
//! Filing is best-effort: a missing token, a network error or a rejected
//! request is reported back as a [`NotifyOutcome`], never as an error, so a
//! broken notification path cannot change the outcome of a publish run.
//!
//! # Example
//!
//! ```ignore
//! use modship_notify::{GitHubIssueNotifier, Notification, Notifier};
//! use modship_types::Platform;
//!
//! let notifier = GitHubIssueNotifier::new(
//!     Some("statusmod/statusmod".to_string()),
//!     std::env::var("GITHUB_TOKEN").ok(),
//! );
//! let outcome = notifier.notify(&Notification::auth_failure(Platform::Modrinth, 401, "{}"));
//! println!("{outcome}");
//! ```

use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result};
use modship_types::Platform;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Public GitHub REST endpoint.
pub const GITHUB_API_BASE: &str = "https://api.github.com";

/// How much of a platform response is quoted in an issue body.
pub const BODY_EXCERPT_CHARS: usize = 10_000;

/// Timeout for the issue request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// An issue to file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
}

impl Notification {
    /// A platform rejected the credentials.
    pub fn auth_failure(platform: Platform, status: u16, response_body: &str) -> Self {
        Self {
            title: format!("Publish failed: {platform} auth"),
            body: format!(
                "Automated publish failed: {platform} authentication error (code {status}).\nLogs:\n{}",
                tail_chars(response_body, BODY_EXCERPT_CHARS)
            ),
        }
    }

    /// A platform answered with an error that retrying will not fix.
    pub fn fatal(platform: Platform, status: u16, response_body: &str) -> Self {
        Self {
            title: format!("Publish failed: {platform} fatal"),
            body: format!(
                "Automated publish failed: {platform} fatal error (code {status}).\nLogs:\n{}",
                tail_chars(response_body, BODY_EXCERPT_CHARS)
            ),
        }
    }

    /// A platform has no project id or token configured.
    pub fn configuration_missing(platform: Platform) -> Self {
        let slug = platform.slug().to_ascii_uppercase();
        Self {
            title: format!("Publish failed: {platform} configuration"),
            body: format!(
                "Automated publish failed: {platform} credentials are not configured. \
                 Set {slug}_PROJECT_ID and the {platform} token, then re-run the workflow."
            ),
        }
    }

    /// The attempt budget ran out. `last_body` is the most recent rejected
    /// response, if any upload was attempted at all.
    pub fn exhausted(attempts: u32, version: &str, last_body: Option<&str>) -> Self {
        let mut body = format!(
            "Automated publish failed after {attempts} attempts. Last version: {version}. See logs above."
        );
        if let Some(last_body) = last_body {
            body.push_str("\nLast response:\n");
            body.push_str(tail_chars(last_body, BODY_EXCERPT_CHARS));
        }
        Self {
            title: "Publish failed: retries exhausted".to_string(),
            body,
        }
    }
}

/// Keep the last `n` characters of `s`.
pub fn tail_chars(s: &str, n: usize) -> &str {
    let count = s.chars().count();
    if count <= n {
        return s;
    }
    match s.char_indices().nth(count - n) {
        Some((idx, _)) => &s[idx..],
        None => s,
    }
}

/// What happened to a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    /// The issue was created
    Filed { status: u16 },
    /// Nothing was sent because the notifier is not configured
    Skipped { reason: String },
    /// The request was sent (or attempted) and did not create an issue
    Failed { reason: String },
}

impl NotifyOutcome {
    pub fn delivered(&self) -> bool {
        matches!(self, NotifyOutcome::Filed { .. })
    }
}

impl fmt::Display for NotifyOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotifyOutcome::Filed { status } => write!(f, "created issue (status {status})"),
            NotifyOutcome::Skipped { reason } => write!(f, "skipped: {reason}"),
            NotifyOutcome::Failed { reason } => write!(f, "failed to create issue: {reason}"),
        }
    }
}

/// Something that can tell a human about a failed run.
pub trait Notifier {
    fn notify(&self, notification: &Notification) -> NotifyOutcome;
}

/// Files GitHub issues through the REST API.
#[derive(Debug, Clone)]
pub struct GitHubIssueNotifier {
    repository: Option<String>,
    token: Option<String>,
    api_base: String,
    timeout: Duration,
}

impl GitHubIssueNotifier {
    /// `repository` is `owner/name`. Empty values count as absent.
    pub fn new(repository: Option<String>, token: Option<String>) -> Self {
        Self {
            repository: repository.filter(|r| !r.trim().is_empty()),
            token: token.filter(|t| !t.trim().is_empty()),
            api_base: GITHUB_API_BASE.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Whether both the repository and the token are known.
    pub fn is_configured(&self) -> bool {
        self.repository.is_some() && self.token.is_some()
    }

    pub fn repository(&self) -> Option<&str> {
        self.repository.as_deref()
    }

    fn issues_url(&self, repository: &str) -> String {
        format!(
            "{}/repos/{}/issues",
            self.api_base.trim_end_matches('/'),
            repository
        )
    }

    fn create_issue(
        &self,
        repository: &str,
        token: &str,
        notification: &Notification,
    ) -> Result<(u16, String)> {
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .user_agent(concat!("modship/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to create HTTP client")?;

        let response = client
            .post(self.issues_url(repository))
            .header("Authorization", format!("token {token}"))
            .header("Accept", "application/vnd.github.v3+json")
            .json(&json!({
                "title": notification.title,
                "body": notification.body,
            }))
            .send()
            .context("failed to send issue request")?;

        let status = response.status().as_u16();
        let text = response.text().unwrap_or_default();
        Ok((status, text))
    }
}

impl Notifier for GitHubIssueNotifier {
    fn notify(&self, notification: &Notification) -> NotifyOutcome {
        let (Some(repository), Some(token)) = (&self.repository, &self.token) else {
            return NotifyOutcome::Skipped {
                reason: "GITHUB_TOKEN or GITHUB_REPOSITORY not set; cannot create issue"
                    .to_string(),
            };
        };

        match self.create_issue(repository, token, notification) {
            Ok((status @ (200 | 201), _)) => NotifyOutcome::Filed { status },
            Ok((status, text)) => NotifyOutcome::Failed {
                reason: format!("status {status}: {text}"),
            },
            Err(err) => NotifyOutcome::Failed {
                reason: format!("{err:#}"),
            },
        }
    }
}
