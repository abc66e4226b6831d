use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

/// Version used when nothing better can be inferred from a file name.
pub const UNSPECIFIED_VERSION: &str = "unspecified";

/// A build output paired with the version it was built as.
///
/// Never mutated: a rebuild produces a new artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub version: String,
}

impl Artifact {
    pub fn new(path: impl Into<PathBuf>, version: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            version: version.into(),
        }
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Pick the runtime JAR for `version` in `libs_dir`.
///
/// `<name>-<version>.jar` is tried for each preferred name in order. Failing
/// that, the first JAR (by file name) that is not a `-sources.jar` wins.
pub fn select_runtime_jar(libs_dir: &Path, names: &[String], version: &str) -> Result<PathBuf> {
    for name in names {
        let candidate = libs_dir.join(format!("{name}-{version}.jar"));
        if candidate.is_file() {
            return Ok(candidate);
        }
    }

    let entries = fs::read_dir(libs_dir)
        .with_context(|| format!("no runtime jar found: cannot read {}", libs_dir.display()))?;

    let mut jars: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .filter(|path| {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            name.ends_with(".jar") && !name.ends_with("-sources.jar")
        })
        .collect();
    jars.sort();

    match jars.into_iter().next() {
        Some(jar) => Ok(jar),
        None => bail!("no runtime jar found in {}", libs_dir.display()),
    }
}

/// Guess a version from a file name shaped like `name-<version>.jar`.
///
/// ```
/// use modship::artifact::infer_version_from_file_name;
/// use std::path::Path;
///
/// assert_eq!(infer_version_from_file_name(Path::new("build/libs/statusmod-1.4.2.jar")), "1.4.2");
/// assert_eq!(infer_version_from_file_name(Path::new("mod.jar")), "unspecified");
/// ```
pub fn infer_version_from_file_name(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let stem = name.strip_suffix(".jar").unwrap_or(&name);
    match stem.rsplit_once('-') {
        Some((_, version)) if !version.is_empty() => version.to_string(),
        _ => UNSPECIFIED_VERSION.to_string(),
    }
}
