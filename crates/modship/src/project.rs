use std::path::{Path, PathBuf};

use anyhow::Result;
use modship_config::BuildConfig;
use modship_process::{ProcessOutput, command_exists_in, ensure_executable, run_in};
use thiserror::Error;

use crate::artifact::{Artifact, select_runtime_jar};
use crate::version::{read_version_file, write_version_file};

/// Lines of build output kept in a [`BuildError`].
const BUILD_OUTPUT_TAIL_LINES: usize = 40;

/// The build could not produce a publishable version.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("failed to start build command `{command}`: {reason}")]
    Spawn { command: String, reason: String },

    #[error("build command `{command}` failed (exit code {exit_code:?})\n{output}")]
    Failed {
        command: String,
        exit_code: Option<i32>,
        output: String,
    },

    #[error("build finished but its version file {} could not be read", .path.display())]
    MissingVersion {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("build finished but its version file {} is empty", .path.display())]
    EmptyVersion { path: PathBuf },
}

/// The project being published: owns the version file and the build output.
pub trait Project {
    /// Whether an earlier build left its version file behind.
    fn has_build_output(&self) -> bool;

    /// Run the build and return the version it reports.
    fn rebuild(&mut self) -> Result<String, BuildError>;

    /// Version of the current build output, or of the project when there is none.
    fn current_version(&self) -> Result<String>;

    /// Version recorded in the project version file.
    fn project_version(&self) -> Result<String>;

    fn write_project_version(&mut self, version: &str) -> Result<()>;

    /// Pick the artifact to upload for `version`.
    fn resolve_artifact(&self, version: &str) -> Result<Artifact>;
}

/// A Gradle project driven through its wrapper script.
#[derive(Debug, Clone)]
pub struct GradleProject {
    root: PathBuf,
    build: BuildConfig,
    java_home: Option<String>,
}

impl GradleProject {
    pub fn new(root: impl Into<PathBuf>, build: BuildConfig, java_home: Option<String>) -> Self {
        Self {
            root: root.into(),
            build,
            java_home,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, relative: &Path) -> PathBuf {
        self.root.join(relative)
    }

    /// Build program as it will be spawned. Relative paths with a separator
    /// are anchored at the project root.
    pub fn program(&self) -> PathBuf {
        let command = Path::new(&self.build.command);
        if command.is_relative() && command.components().count() > 1 {
            self.root.join(command)
        } else {
            command.to_path_buf()
        }
    }

    /// Whether the build program can be found (on `PATH` or under the root).
    pub fn build_command_available(&self) -> bool {
        command_exists_in(&self.build.command, &self.root)
    }

    pub fn command_line(&self) -> String {
        let mut parts = vec![self.build.command.clone()];
        parts.extend(self.args());
        parts.join(" ")
    }

    fn args(&self) -> Vec<String> {
        let mut args = self.build.args.clone();
        if let Some(java_home) = &self.java_home {
            args.push(format!("-Dorg.gradle.java.home={java_home}"));
        }
        args
    }

    fn env(&self) -> Vec<(String, String)> {
        match &self.java_home {
            Some(java_home) => vec![("ORG_GRADLE_JAVA_HOME".to_string(), java_home.clone())],
            None => Vec::new(),
        }
    }

    fn run_build(&self) -> Result<ProcessOutput, BuildError> {
        let program = self.program();
        if program.components().count() > 1 {
            ensure_executable(&program);
        }

        let args = self.args();
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let program_str = program.to_string_lossy();

        run_in(&self.root, &program_str, &arg_refs, &self.env()).map_err(
            |err| BuildError::Spawn {
                command: self.command_line(),
                reason: format!("{err:#}"),
            },
        )
    }
}

impl Project for GradleProject {
    fn has_build_output(&self) -> bool {
        self.path(&self.build.build_version_file).is_file()
    }

    fn rebuild(&mut self) -> Result<String, BuildError> {
        let out = self.run_build()?;
        if !out.success() {
            return Err(BuildError::Failed {
                command: self.command_line(),
                exit_code: out.exit_code,
                output: out.tail(BUILD_OUTPUT_TAIL_LINES),
            });
        }

        let path = self.path(&self.build.build_version_file);
        let raw = std::fs::read_to_string(&path).map_err(|source| BuildError::MissingVersion {
            path: path.clone(),
            source,
        })?;
        let version = raw.trim();
        if version.is_empty() {
            return Err(BuildError::EmptyVersion { path });
        }
        Ok(version.to_string())
    }

    fn current_version(&self) -> Result<String> {
        let build_file = self.path(&self.build.build_version_file);
        if build_file.is_file() {
            read_version_file(&build_file)
        } else {
            self.project_version()
        }
    }

    fn project_version(&self) -> Result<String> {
        read_version_file(&self.path(&self.build.version_file))
    }

    fn write_project_version(&mut self, version: &str) -> Result<()> {
        write_version_file(&self.path(&self.build.version_file), version)
    }

    fn resolve_artifact(&self, version: &str) -> Result<Artifact> {
        let jar = select_runtime_jar(
            &self.path(&self.build.libs_dir),
            &self.build.artifact_names,
            version,
        )?;
        Ok(Artifact::new(jar, version))
    }
}
