use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use modship::artifact::Artifact;
use modship::config::{self, Config, Settings};
use modship::engine::{self, Collaborators, PublishOptions, Reporter, ThreadSleeper};
use modship::notify::GitHubIssueNotifier;
use modship::platform::Publishers;
use modship::project::{GradleProject, Project};
use modship::redact::Redactor;
use modship::retry::total_backoff;
use modship::types::{EvaluationOrder, Platform, PublishReport};
use modship::upload::{self, UploadStatus};
use modship::{events, receipt, version};

#[derive(Parser, Debug)]
#[command(name = "modship", version)]
#[command(about = "Publish a mod JAR to Modrinth and CurseForge, retrying until both accept it")]
struct Cli {
    /// Gradle project directory
    #[arg(long, default_value = ".", global = true)]
    project_dir: PathBuf,

    /// Config file (default: <project-dir>/.modship.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build if needed, upload to both platforms, and retry until done.
    Publish(PublishArgs),
    /// Upload the first file matching a glob once, without retries.
    Upload {
        /// File pattern, relative to the project directory
        pattern: String,

        /// Release version (default: $VERSION, else inferred from the file name)
        #[arg(long)]
        version: Option<String>,
    },
    /// Print the next project version.
    Bump {
        /// Also write it to the project version file.
        #[arg(long)]
        write: bool,
    },
    /// Print configuration, credential and build diagnostics.
    Doctor,
}

#[derive(Args, Debug)]
struct PublishArgs {
    /// Attempt budget for the whole run
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Base backoff delay (e.g. 5s, 500ms)
    #[arg(long)]
    base_backoff: Option<String>,

    /// sequential or independent
    #[arg(long)]
    order: Option<EvaluationOrder>,

    /// Stop with exit code 5 when a platform has no credentials.
    #[arg(long)]
    fail_fast_missing_credentials: bool,

    /// Write a JSON run report to this path.
    #[arg(long)]
    receipt: Option<PathBuf>,
}

struct CliReporter;

impl Reporter for CliReporter {
    fn info(&mut self, msg: &str) {
        eprintln!("[info] {msg}");
    }

    fn warn(&mut self, msg: &str) {
        eprintln!("[warn] {msg}");
    }

    fn error(&mut self, msg: &str) {
        eprintln!("[error] {msg}");
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let mut reporter = CliReporter;

    match run(cli, &mut reporter) {
        Ok(code) => code,
        Err(err) => {
            reporter.error(&format!("{err:#}"));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli, reporter: &mut dyn Reporter) -> Result<ExitCode> {
    let project_dir = cli
        .project_dir
        .canonicalize()
        .with_context(|| format!("project directory {} not found", cli.project_dir.display()))?;
    let config_file = cli
        .config
        .unwrap_or_else(|| config::config_path(&project_dir));
    let settings = config::resolve_from_env(config::load_config_from_file(&config_file)?)?;

    match cli.cmd {
        Commands::Publish(args) => run_publish(&project_dir, settings, &args, reporter),
        Commands::Upload { pattern, version } => {
            run_upload(&project_dir, &settings, &pattern, version.as_deref(), reporter)
        }
        Commands::Bump { write } => run_bump(&project_dir, &settings, write, reporter),
        Commands::Doctor => run_doctor(&project_dir, &config_file, &settings),
    }
}

fn parse_duration(s: &str) -> Result<Duration> {
    humantime::parse_duration(s).with_context(|| format!("invalid duration: {s}"))
}

/// Flags win over the config file and the environment.
fn apply_overrides(config: &mut Config, args: &PublishArgs) -> Result<()> {
    if let Some(max_attempts) = args.max_attempts {
        config.retry.max_attempts = max_attempts;
    }
    if let Some(raw) = &args.base_backoff {
        config.retry.base_delay = parse_duration(raw)?;
    }
    if let Some(order) = args.order {
        config.policy.order = order;
    }
    if args.fail_fast_missing_credentials {
        config.policy.fail_fast_on_missing_credentials = true;
    }
    Ok(())
}

fn gradle_project(project_dir: &Path, settings: &Settings) -> GradleProject {
    GradleProject::new(
        project_dir,
        settings.config.build.clone(),
        settings.java_home.clone(),
    )
}

fn run_publish(
    project_dir: &Path,
    mut settings: Settings,
    args: &PublishArgs,
    reporter: &mut dyn Reporter,
) -> Result<ExitCode> {
    apply_overrides(&mut settings.config, args)?;

    for platform in Platform::ALL {
        if !settings.has_credentials(platform) {
            reporter.warn(&format!("{platform} project id or token not set"));
        }
    }

    let opts = PublishOptions::from_settings(&settings, project_dir);
    let publishers = Publishers::from_settings(&settings)?;
    let notifier = GitHubIssueNotifier::new(
        settings.config.github.repository.clone(),
        settings.credentials.github_token.clone(),
    )
    .with_api_base(settings.config.github.api_base.clone());
    let mut project = gradle_project(project_dir, &settings);
    let mut sleeper = ThreadSleeper;

    let report = engine::run_publish(
        &opts,
        Collaborators {
            project: &mut project,
            publishers: &publishers,
            notifier: &notifier,
            sleeper: &mut sleeper,
        },
        reporter,
    )?;

    if let Some(path) = &args.receipt {
        receipt::write_report(path, &report)?;
        reporter.info(&format!("receipt written to {}", path.display()));
    }

    print_report(&report, &opts.state_dir);
    Ok(ExitCode::from(report.outcome.exit_code()))
}

fn print_report(report: &PublishReport, state_dir: &Path) {
    println!("outcome: {}", report.outcome);
    println!("version: {}", report.version);
    println!("attempts: {}/{}", report.attempts, report.max_attempts);
    println!("rebuilds: {}", report.rebuilds);
    println!(
        "total_backoff: {}",
        humantime::format_duration(report.total_backoff)
    );
    println!("events: {}", events::events_path(state_dir).display());
    println!();

    for target in &report.targets {
        let state = if target.complete { "complete" } else { "incomplete" };
        let mut line = format!("{}: {state} (uploads={}", target.platform, target.uploads);
        if let Some(status) = target.last_status {
            line.push_str(&format!(", last_status={status}"));
        }
        if let Some(verdict) = target.last_verdict {
            line.push_str(&format!(", last_verdict={verdict}"));
        }
        line.push(')');
        println!("{line}");
    }
}

fn run_upload(
    project_dir: &Path,
    settings: &Settings,
    pattern: &str,
    explicit_version: Option<&str>,
    reporter: &mut dyn Reporter,
) -> Result<ExitCode> {
    let Some(path) = upload::first_match_in(project_dir, pattern)? else {
        reporter.error(&format!("no file matches {pattern}"));
        return Ok(ExitCode::FAILURE);
    };

    let version = upload::upload_version(explicit_version.or(settings.version.as_deref()), &path);
    let artifact = Artifact::new(path, version);
    let publishers = Publishers::from_settings(settings)?;
    let redactor = Redactor::new(settings.credentials.secrets());

    let summary = upload::upload_once(&publishers, &artifact, &redactor, reporter);

    println!("file: {}", summary.artifact.file_name());
    println!("version: {}", summary.artifact.version);
    for (platform, status) in &summary.results {
        match status {
            UploadStatus::Skipped => println!("{platform}: skipped"),
            UploadStatus::Uploaded { status } => println!("{platform}: uploaded ({status})"),
            UploadStatus::Failed { status, .. } => println!("{platform}: failed ({status})"),
        }
    }

    Ok(if summary.failed() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn run_bump(
    project_dir: &Path,
    settings: &Settings,
    write: bool,
    reporter: &mut dyn Reporter,
) -> Result<ExitCode> {
    let mut project = gradle_project(project_dir, settings);
    let current = project.project_version()?;
    let next = version::bump(&current);

    if write {
        project.write_project_version(&next)?;
        reporter.info(&format!("bumped version {current} -> {next}"));
    }

    println!("{next}");
    Ok(ExitCode::SUCCESS)
}

fn run_doctor(project_dir: &Path, config_file: &Path, settings: &Settings) -> Result<ExitCode> {
    let config = &settings.config;
    let found = if config_file.is_file() { "found" } else { "defaults" };

    println!("project_dir: {}", project_dir.display());
    println!("config: {} ({found})", config_file.display());
    println!(
        "state_dir: {}",
        project_dir.join(config.state_dir()).display()
    );
    println!();

    for platform in Platform::ALL {
        println!(
            "{}: project_id={} token={}",
            platform.slug(),
            presence(settings.project_id(platform).is_some()),
            presence(settings.credentials.token(platform).is_some()),
        );
    }
    let notifier = GitHubIssueNotifier::new(
        config.github.repository.clone(),
        settings.credentials.github_token.clone(),
    );
    println!(
        "github_issues: {}",
        if notifier.is_configured() { "ready" } else { "disabled" }
    );
    println!();

    let project = gradle_project(project_dir, settings);
    println!(
        "build_command: {} ({})",
        config.build.command,
        if project.build_command_available() { "found" } else { "missing" }
    );
    println!(
        "java_home: {}",
        settings.java_home.as_deref().unwrap_or("unset")
    );
    println!();

    let retry = &config.retry;
    println!("max_attempts: {}", retry.max_attempts);
    println!("base_delay: {}", humantime::format_duration(retry.base_delay));
    println!(
        "worst_case_backoff: {}",
        humantime::format_duration(total_backoff(retry, retry.max_attempts))
    );
    println!("order: {}", config.policy.order);
    println!(
        "fail_fast_on_missing_credentials: {}",
        config.policy.fail_fast_on_missing_credentials
    );

    Ok(ExitCode::SUCCESS)
}

fn presence(set: bool) -> &'static str {
    if set { "set" } else { "missing" }
}
