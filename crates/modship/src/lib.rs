//! # modship
//!
//! Publishes a mod JAR to Modrinth and CurseForge and keeps at it until both
//! platforms have accepted it, a human has to step in, or the attempt budget
//! runs out.
//!
//! ## Pipeline
//!
//! Each publish run is a bounded loop over attempts:
//!
//! 1. [`project::Project::resolve_artifact`] finds the JAR for the current
//!    version, rebuilding when none is found.
//! 2. Every incomplete platform gets one upload through its
//!    [`platform::Publisher`].
//! 3. A rejected upload is judged by [`classify::classify`]:
//!    - naming conflicts bump the project version and rebuild
//!      ([`version::bump`]),
//!    - transient failures wait out the exponential backoff,
//!    - rejected credentials and other errors file a GitHub issue and stop.
//! 4. The run ends with an [`types::Outcome`] that maps onto the process exit
//!    code.
//!
//! ## Example
//!
//! ```ignore
//! use modship::engine::{self, Collaborators, PublishOptions, ThreadSleeper};
//!
//! let report = engine::run_publish(&opts, collaborators, &mut reporter)?;
//! std::process::exit(report.outcome.exit_code().into());
//! ```
//!
//! ## Modules
//!
//! - [`classify`]: Response classification into verdicts
//! - [`version`]: Version bumping and version files
//! - [`artifact`]: Runtime JAR selection
//! - [`project`]: The build collaborator (Gradle by default)
//! - [`platform`]: Modrinth and CurseForge upload clients
//! - [`engine`]: The attempt loop
//! - [`upload`]: One-shot uploads without retries
//! - [`receipt`]: Persisted run reports
//! - [`redact`]: Secret scrubbing for logs, events and issues

pub mod artifact;
pub mod classify;
pub mod engine;
pub mod platform;
pub mod project;
pub mod receipt;
pub mod redact;
pub mod upload;
pub mod version;

pub use modship_config as config;
pub use modship_events as events;
pub use modship_notify as notify;
pub use modship_retry as retry;
pub use modship_types as types;
