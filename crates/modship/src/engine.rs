use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use modship_config::Settings;
use modship_events::{EventLog, events_path};
use modship_notify::{Notification, Notifier, NotifyOutcome};
use modship_retry::{BackoffConfig, backoff_delay};
use modship_types::{
    EvaluationOrder, EventType, Outcome, Platform, PublishReport, RunEvent, TargetReport,
    UploadResponse, Verdict,
};

use crate::artifact::Artifact;
use crate::classify::ResponseClassifier;
use crate::platform::Publishers;
use crate::project::Project;
use crate::redact::{Redactor, truncate_chars};
use crate::version::bump;

/// Characters of a response body echoed to the reporter and the event log.
pub const LOG_EXCERPT_CHARS: usize = 1000;

pub trait Reporter {
    fn info(&mut self, msg: &str);
    fn warn(&mut self, msg: &str);
    fn error(&mut self, msg: &str);
}

/// Where the engine waits out its backoff.
pub trait Sleeper {
    fn sleep(&mut self, duration: Duration);
}

/// Blocks the current thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Knobs for a publish run. Built once and never changed during the run.
#[derive(Debug, Clone)]
pub struct PublishOptions {
    /// Attempt budget and sleep schedule
    pub backoff: BackoffConfig,
    pub order: EvaluationOrder,
    pub fail_fast_on_missing_credentials: bool,
    /// Directory receiving `events.jsonl`
    pub state_dir: PathBuf,
    pub redactor: Redactor,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            backoff: BackoffConfig::default(),
            order: EvaluationOrder::default(),
            fail_fast_on_missing_credentials: false,
            state_dir: PathBuf::from(modship_config::DEFAULT_STATE_DIR),
            redactor: Redactor::default(),
        }
    }
}

impl PublishOptions {
    /// Options for a project rooted at `project_root`.
    pub fn from_settings(settings: &Settings, project_root: &Path) -> Self {
        let config = &settings.config;
        Self {
            backoff: config.retry.clone(),
            order: config.policy.order,
            fail_fast_on_missing_credentials: config.policy.fail_fast_on_missing_credentials,
            state_dir: project_root.join(config.state_dir()),
            redactor: Redactor::new(settings.credentials.secrets()),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.backoff.max_attempts
    }
}

/// Everything the engine talks to.
pub struct Collaborators<'a> {
    pub project: &'a mut dyn Project,
    pub publishers: &'a Publishers,
    pub notifier: &'a dyn Notifier,
    pub sleeper: &'a mut dyn Sleeper,
}

/// Progress of one run. Lives exactly as long as the loop.
#[derive(Debug, Clone)]
pub struct AttemptState {
    /// Whole iterations started so far
    pub attempt: u32,
    pub max_attempts: u32,
    /// Replaced wholesale by every rebuild
    pub version: String,
    pub targets: Vec<TargetReport>,
    pub rebuilds: u32,
    pub total_backoff: Duration,
    /// Redacted body of the most recent rejected upload
    pub last_body: Option<String>,
}

impl AttemptState {
    pub fn new(version: impl Into<String>, max_attempts: u32) -> Self {
        Self {
            attempt: 0,
            max_attempts,
            version: version.into(),
            targets: Platform::ALL
                .iter()
                .map(|&platform| TargetReport {
                    platform,
                    complete: false,
                    uploads: 0,
                    last_status: None,
                    last_verdict: None,
                })
                .collect(),
            rebuilds: 0,
            total_backoff: Duration::ZERO,
            last_body: None,
        }
    }

    pub fn is_complete(&self, platform: Platform) -> bool {
        self.target(platform).complete
    }

    pub fn all_complete(&self) -> bool {
        self.targets.iter().all(|t| t.complete)
    }

    pub fn budget_exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }

    fn index(platform: Platform) -> usize {
        match platform {
            Platform::Modrinth => 0,
            Platform::CurseForge => 1,
        }
    }

    fn target(&self, platform: Platform) -> &TargetReport {
        &self.targets[Self::index(platform)]
    }

    fn target_mut(&mut self, platform: Platform) -> &mut TargetReport {
        &mut self.targets[Self::index(platform)]
    }
}

enum Step {
    Continue,
    Exit(Outcome),
}

struct Failure {
    platform: Platform,
    verdict: Verdict,
    response: UploadResponse,
}

/// Drive both platforms to completion, a terminal verdict, or exhaustion.
///
/// Returns `Err` only when the run itself breaks (a failed build, an
/// unreadable version file, an unwritable event log); every platform answer
/// ends up in the report's [`Outcome`].
pub fn run_publish(
    opts: &PublishOptions,
    collab: Collaborators<'_>,
    reporter: &mut dyn Reporter,
) -> Result<PublishReport> {
    let mut run = Run {
        opts,
        classifier: ResponseClassifier::new(opts.fail_fast_on_missing_credentials),
        collab,
        log: EventLog::new(),
        events_path: events_path(&opts.state_dir),
        started_at: Utc::now(),
    };

    match run.execute(reporter) {
        Ok(report) => Ok(report),
        Err(err) => {
            if let Err(flush_err) = run.log.flush_to(&run.events_path) {
                reporter.warn(&format!("failed to write event log: {flush_err:#}"));
            }
            Err(err)
        }
    }
}

struct Run<'o, 'c> {
    opts: &'o PublishOptions,
    classifier: ResponseClassifier,
    collab: Collaborators<'c>,
    log: EventLog,
    events_path: PathBuf,
    started_at: DateTime<Utc>,
}

impl Run<'_, '_> {
    fn execute(&mut self, reporter: &mut dyn Reporter) -> Result<PublishReport> {
        let mut initial_rebuilds = 0;
        if !self.collab.project.has_build_output() {
            reporter.info("no build output found; running initial build");
            let built = self.collab.project.rebuild()?;
            self.record(EventType::Rebuilt { version: built }, None);
            initial_rebuilds = 1;
        }

        let version = self
            .collab
            .project
            .current_version()
            .context("failed to determine the version to publish")?;

        let mut state = AttemptState::new(version, self.opts.max_attempts());
        state.rebuilds = initial_rebuilds;

        reporter.info(&format!(
            "publishing version {} (max {} attempts, {} order)",
            state.version, state.max_attempts, self.opts.order
        ));
        self.record(
            EventType::RunStarted {
                version: state.version.clone(),
                max_attempts: state.max_attempts,
            },
            None,
        );
        self.flush()?;

        let outcome = loop {
            if state.all_complete() {
                break Outcome::Success;
            }
            if state.budget_exhausted() {
                break Outcome::Exhausted;
            }

            state.attempt += 1;
            reporter.info(&format!(
                "=== attempt {}/{} (version {}) ===",
                state.attempt, state.max_attempts, state.version
            ));
            self.record(
                EventType::AttemptStarted {
                    attempt: state.attempt,
                    version: state.version.clone(),
                },
                None,
            );

            let step = match self.collab.project.resolve_artifact(&state.version) {
                Ok(artifact) => match self.opts.order {
                    EvaluationOrder::Sequential => {
                        self.attempt_sequential(&mut state, &artifact, reporter)?
                    }
                    EvaluationOrder::Independent => {
                        self.attempt_independent(&mut state, &artifact, reporter)?
                    }
                },
                Err(err) => {
                    self.recover_missing_artifact(&mut state, &err, reporter)?;
                    Step::Continue
                }
            };

            self.flush()?;
            if let Step::Exit(outcome) = step {
                break outcome;
            }
        };

        match outcome {
            Outcome::Success => reporter.info("both uploads succeeded"),
            Outcome::Exhausted => {
                reporter.error("reached attempt limit without success");
                self.notify(
                    Notification::exhausted(
                        state.attempt,
                        &state.version,
                        state.last_body.as_deref(),
                    ),
                    None,
                    reporter,
                );
            }
            _ => {}
        }

        self.record(
            EventType::RunFinished {
                outcome,
                attempts: state.attempt,
            },
            None,
        );
        self.flush()?;

        Ok(PublishReport {
            outcome,
            attempts: state.attempt,
            max_attempts: state.max_attempts,
            version: state.version,
            targets: state.targets,
            rebuilds: state.rebuilds,
            total_backoff: state.total_backoff,
            started_at: self.started_at,
            finished_at: Utc::now(),
        })
    }

    /// Platform A first. A bump or retry verdict ends the attempt before the
    /// next platform is tried.
    fn attempt_sequential(
        &mut self,
        state: &mut AttemptState,
        artifact: &Artifact,
        reporter: &mut dyn Reporter,
    ) -> Result<Step> {
        for platform in Platform::ALL {
            if state.is_complete(platform) {
                continue;
            }
            if let Some(failure) = self.upload(state, platform, artifact, reporter) {
                return self.apply(state, failure, reporter);
            }
        }
        Ok(Step::Continue)
    }

    /// Every incomplete platform is tried, then the verdicts are applied
    /// together: the first terminal verdict exits, otherwise one bump or one
    /// sleep covers the whole attempt.
    fn attempt_independent(
        &mut self,
        state: &mut AttemptState,
        artifact: &Artifact,
        reporter: &mut dyn Reporter,
    ) -> Result<Step> {
        let mut failures = Vec::new();
        for platform in Platform::ALL {
            if state.is_complete(platform) {
                continue;
            }
            if let Some(failure) = self.upload(state, platform, artifact, reporter) {
                failures.push(failure);
            }
        }

        if let Some(idx) = failures.iter().position(|f| f.verdict.is_terminal()) {
            let failure = failures.swap_remove(idx);
            return Ok(Step::Exit(self.terminate(failure, reporter)));
        }

        if failures.iter().any(|f| f.verdict == Verdict::BumpVersion) {
            self.bump_and_rebuild(state, reporter)?;
            return Ok(Step::Continue);
        }

        let retrying: Vec<String> = failures
            .iter()
            .filter(|f| f.verdict == Verdict::Retry)
            .map(|f| f.platform.to_string())
            .collect();
        if !retrying.is_empty() {
            self.back_off(state, &retrying.join(" and "), reporter);
        }

        Ok(Step::Continue)
    }

    /// One upload. `None` means the platform accepted it.
    fn upload(
        &mut self,
        state: &mut AttemptState,
        platform: Platform,
        artifact: &Artifact,
        reporter: &mut dyn Reporter,
    ) -> Option<Failure> {
        let response = self
            .collab
            .publishers
            .get(platform)
            .publish(artifact, &state.version);

        let target = state.target_mut(platform);
        target.uploads += 1;
        target.last_status = Some(response.status);

        if response.success {
            target.complete = true;
            target.last_verdict = None;
            reporter.info(&format!(
                "{platform}: uploaded {} (status {})",
                artifact.file_name(),
                response.status
            ));
            self.record(
                EventType::UploadSucceeded {
                    status: response.status,
                },
                Some(platform),
            );
            return None;
        }

        let verdict = self.classifier.classify(&response);
        target.last_verdict = Some(verdict);

        let body = self.opts.redactor.redact(&response.body);
        let excerpt = truncate_chars(&body, LOG_EXCERPT_CHARS).to_string();
        state.last_body = Some(body.clone());
        reporter.warn(&format!(
            "{platform}: upload failed (status {}): {excerpt}",
            response.status
        ));
        reporter.info(&format!("{platform} action: {verdict}"));
        self.record(
            EventType::UploadFailed {
                status: response.status,
                verdict,
                body_excerpt: excerpt,
            },
            Some(platform),
        );

        Some(Failure {
            platform,
            verdict,
            response,
        })
    }

    fn apply(
        &mut self,
        state: &mut AttemptState,
        failure: Failure,
        reporter: &mut dyn Reporter,
    ) -> Result<Step> {
        match failure.verdict {
            Verdict::BumpVersion => {
                self.bump_and_rebuild(state, reporter)?;
                Ok(Step::Continue)
            }
            Verdict::Retry => {
                self.back_off(state, &failure.platform.to_string(), reporter);
                Ok(Step::Continue)
            }
            Verdict::AuthFailure | Verdict::Fatal | Verdict::ConfigurationMissing => {
                Ok(Step::Exit(self.terminate(failure, reporter)))
            }
        }
    }

    /// Bump the project version file, rebuild, and adopt whatever version
    /// the build reports.
    fn bump_and_rebuild(
        &mut self,
        state: &mut AttemptState,
        reporter: &mut dyn Reporter,
    ) -> Result<()> {
        let current = self
            .collab
            .project
            .project_version()
            .context("failed to read the project version for bumping")?;
        let next = bump(&current);
        self.collab.project.write_project_version(&next)?;
        self.record(
            EventType::VersionBumped {
                from: current,
                to: next,
            },
            None,
        );

        let built = self.collab.project.rebuild()?;
        reporter.info(&format!("bumped version -> {built}"));
        self.record(
            EventType::Rebuilt {
                version: built.clone(),
            },
            None,
        );
        state.version = built;
        state.rebuilds += 1;
        Ok(())
    }

    fn back_off(&mut self, state: &mut AttemptState, label: &str, reporter: &mut dyn Reporter) {
        let delay = backoff_delay(&self.opts.backoff, state.attempt);
        reporter.warn(&format!(
            "{label} transient error, sleeping {}",
            humantime::format_duration(delay)
        ));
        self.sleep(state, delay);
    }

    fn recover_missing_artifact(
        &mut self,
        state: &mut AttemptState,
        err: &anyhow::Error,
        reporter: &mut dyn Reporter,
    ) -> Result<()> {
        let reason = self.opts.redactor.redact(&format!("{err:#}"));
        reporter.warn(&format!("jar selection failed: {reason}"));
        self.record(
            EventType::ArtifactMissing {
                version: state.version.clone(),
                reason,
            },
            None,
        );

        let built = self.collab.project.rebuild()?;
        self.record(
            EventType::Rebuilt {
                version: built.clone(),
            },
            None,
        );
        state.version = built;
        state.rebuilds += 1;

        let delay = self.opts.backoff.base_interval();
        reporter.info(&format!(
            "rebuilt as {}; waiting {} before the next attempt",
            state.version,
            humantime::format_duration(delay)
        ));
        self.sleep(state, delay);
        Ok(())
    }

    fn sleep(&mut self, state: &mut AttemptState, delay: Duration) {
        self.record(
            EventType::BackoffScheduled {
                attempt: state.attempt,
                delay_ms: delay.as_millis() as u64,
            },
            None,
        );
        state.total_backoff = state.total_backoff.saturating_add(delay);
        self.collab.sleeper.sleep(delay);
    }

    fn terminate(&mut self, failure: Failure, reporter: &mut dyn Reporter) -> Outcome {
        let Failure {
            platform,
            verdict,
            response,
        } = failure;
        let body = self.opts.redactor.redact(&response.body);

        let (notification, outcome) = match verdict {
            Verdict::AuthFailure => (
                Notification::auth_failure(platform, response.status, &body),
                Outcome::AuthFailure { platform },
            ),
            Verdict::ConfigurationMissing => (
                Notification::configuration_missing(platform),
                Outcome::ConfigurationMissing { platform },
            ),
            _ => (
                Notification::fatal(platform, response.status, &body),
                Outcome::Fatal { platform },
            ),
        };

        reporter.error(&format!("{outcome}; filing an issue"));
        self.notify(notification, Some(platform), reporter);
        outcome
    }

    fn notify(
        &mut self,
        notification: Notification,
        platform: Option<Platform>,
        reporter: &mut dyn Reporter,
    ) {
        let outcome = self.collab.notifier.notify(&notification);
        match &outcome {
            NotifyOutcome::Filed { .. } => {
                reporter.info(&format!("created GitHub issue: {}", notification.title))
            }
            NotifyOutcome::Skipped { reason } => reporter.warn(reason),
            NotifyOutcome::Failed { reason } => reporter.warn(&format!(
                "failed to create GitHub issue: {}",
                self.opts.redactor.redact(reason)
            )),
        }
        self.record(
            EventType::NotificationSent {
                title: notification.title,
                delivered: outcome.delivered(),
            },
            platform,
        );
    }

    fn record(&mut self, event_type: EventType, platform: Option<Platform>) {
        self.log.record(RunEvent::now(event_type, platform));
    }

    fn flush(&mut self) -> Result<()> {
        self.log
            .flush_to(&self.events_path)
            .context("failed to write event log")
    }
}
