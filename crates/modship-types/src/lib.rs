//! Core domain types for modship.
//!
//! This crate provides the vocabulary shared by the publish engine, the
//! configuration loader, the event log and the CLI: which platform an upload
//! went to, what a platform answered, how that answer was judged, and how a
//! publish run ended.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Body reported by a publisher that refused to run without credentials.
pub const MISSING_CREDENTIALS: &str = "missing-credentials";

/// Status code used when no HTTP response was obtained at all.
pub const NO_RESPONSE: u16 = 0;

/// A distribution platform the artifact is published to.
///
/// The declaration order is the processing order: Modrinth is target A and is
/// always evaluated before CurseForge (target B) within an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    /// Target A
    Modrinth,
    /// Target B
    #[serde(rename = "curseforge")]
    CurseForge,
}

impl Platform {
    /// Both platforms in processing order.
    pub const ALL: [Platform; 2] = [Platform::Modrinth, Platform::CurseForge];

    /// Lowercase identifier used in config sections and event logs.
    pub fn slug(&self) -> &'static str {
        match self {
            Platform::Modrinth => "modrinth",
            Platform::CurseForge => "curseforge",
        }
    }

    /// Process exit code used when this platform answers with a fatal error.
    pub fn fatal_exit_code(&self) -> u8 {
        match self {
            Platform::Modrinth => 3,
            Platform::CurseForge => 4,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Modrinth => write!(f, "Modrinth"),
            Platform::CurseForge => write!(f, "CurseForge"),
        }
    }
}

/// How the engine should react to a failed upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Transient failure: wait out the backoff and try again
    Retry,
    /// Naming conflict: bump the local version, rebuild, try again immediately
    BumpVersion,
    /// Credentials were rejected; a human has to step in
    AuthFailure,
    /// Any other rejection; a human has to step in
    Fatal,
    /// Credentials were never configured (only produced under the fail-fast policy)
    ConfigurationMissing,
}

impl Verdict {
    /// Whether this verdict ends the run immediately.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Verdict::AuthFailure | Verdict::Fatal | Verdict::ConfigurationMissing
        )
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Retry => write!(f, "retry"),
            Verdict::BumpVersion => write!(f, "bump_version"),
            Verdict::AuthFailure => write!(f, "auth"),
            Verdict::Fatal => write!(f, "fatal"),
            Verdict::ConfigurationMissing => write!(f, "configuration_missing"),
        }
    }
}

/// What a single upload attempt produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    /// `true` iff the platform answered with a 2xx status
    pub success: bool,
    /// HTTP status, or [`NO_RESPONSE`] when no response was obtained
    pub status: u16,
    /// Response body (or error text when no response was obtained)
    pub body: String,
}

impl UploadResponse {
    /// Build a response from an HTTP status and body.
    pub fn from_http(status: u16, body: impl Into<String>) -> Self {
        Self {
            success: (200..300).contains(&status),
            status,
            body: body.into(),
        }
    }

    /// The publisher refused to run because a project id or token is absent.
    pub fn missing_credentials() -> Self {
        Self {
            success: false,
            status: NO_RESPONSE,
            body: MISSING_CREDENTIALS.to_string(),
        }
    }

    /// The request never produced an HTTP response.
    pub fn transport(error: impl fmt::Display) -> Self {
        Self {
            success: false,
            status: NO_RESPONSE,
            body: error.to_string(),
        }
    }

    pub fn is_missing_credentials(&self) -> bool {
        self.status == NO_RESPONSE && self.body == MISSING_CREDENTIALS
    }
}

/// Order in which the two targets are evaluated within an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationOrder {
    /// Modrinth first; a bump or retry verdict on it skips CurseForge for the
    /// rest of the attempt
    #[default]
    Sequential,
    /// Every incomplete target is uploaded each attempt, then the verdicts are
    /// applied together
    Independent,
}

impl fmt::Display for EvaluationOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvaluationOrder::Sequential => write!(f, "sequential"),
            EvaluationOrder::Independent => write!(f, "independent"),
        }
    }
}

impl std::str::FromStr for EvaluationOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" => Ok(EvaluationOrder::Sequential),
            "independent" => Ok(EvaluationOrder::Independent),
            other => Err(format!(
                "unknown evaluation order '{other}' (expected 'sequential' or 'independent')"
            )),
        }
    }
}

/// Terminal state of a publish run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// Both platforms accepted the artifact
    Success,
    /// The attempt budget ran out
    Exhausted,
    /// A platform rejected the credentials
    AuthFailure { platform: Platform },
    /// A platform answered with an unrecoverable error
    Fatal { platform: Platform },
    /// Credentials were missing and the fail-fast policy was enabled
    ConfigurationMissing { platform: Platform },
}

impl Outcome {
    /// Process exit code for this outcome.
    pub fn exit_code(&self) -> u8 {
        match self {
            Outcome::Success => 0,
            Outcome::Exhausted => 1,
            Outcome::AuthFailure { .. } => 2,
            Outcome::Fatal { platform } => platform.fatal_exit_code(),
            Outcome::ConfigurationMissing { .. } => 5,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success => write!(f, "success"),
            Outcome::Exhausted => write!(f, "attempts exhausted"),
            Outcome::AuthFailure { platform } => write!(f, "{platform} authentication failure"),
            Outcome::Fatal { platform } => write!(f, "{platform} fatal error"),
            Outcome::ConfigurationMissing { platform } => {
                write!(f, "{platform} credentials missing")
            }
        }
    }
}

/// Final per-platform status in a [`PublishReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetReport {
    pub platform: Platform,
    pub complete: bool,
    /// Number of uploads sent to this platform
    pub uploads: u32,
    /// Status of the last upload (absent if never attempted)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_status: Option<u16>,
    /// Verdict for the last failed upload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_verdict: Option<Verdict>,
}

/// Summary of a finished publish run, also persisted as the receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishReport {
    pub outcome: Outcome,
    /// Attempts consumed (whole orchestrator iterations)
    pub attempts: u32,
    pub max_attempts: u32,
    /// Version the run ended on
    pub version: String,
    pub targets: Vec<TargetReport>,
    /// Number of rebuilds triggered during the run
    pub rebuilds: u32,
    /// Sum of all backoff sleeps
    #[serde(with = "humantime_serde")]
    pub total_backoff: Duration,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl PublishReport {
    pub fn target(&self, platform: Platform) -> Option<&TargetReport> {
        self.targets.iter().find(|t| t.platform == platform)
    }
}

/// Event types for the run log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventType {
    /// Run started
    RunStarted { version: String, max_attempts: u32 },
    /// An orchestrator iteration started
    AttemptStarted { attempt: u32, version: String },
    /// No artifact could be selected for the current version
    ArtifactMissing { version: String, reason: String },
    /// An upload was accepted
    UploadSucceeded { status: u16 },
    /// An upload was rejected and classified
    UploadFailed {
        status: u16,
        verdict: Verdict,
        body_excerpt: String,
    },
    /// The local version was bumped
    VersionBumped { from: String, to: String },
    /// The build ran and produced a version
    Rebuilt { version: String },
    /// The engine is about to sleep
    BackoffScheduled { attempt: u32, delay_ms: u64 },
    /// A human was notified
    NotificationSent { title: String, delivered: bool },
    /// Run finished
    RunFinished { outcome: Outcome, attempts: u32 },
}

/// A timestamped entry in the run log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunEvent {
    /// When the event occurred
    pub timestamp: DateTime<Utc>,
    /// The type of event
    #[serde(flatten)]
    pub event_type: EventType,
    /// Platform this event relates to (absent for run-level events)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
}

impl RunEvent {
    pub fn now(event_type: EventType, platform: Option<Platform>) -> Self {
        Self {
            timestamp: Utc::now(),
            event_type,
            platform,
        }
    }
}
