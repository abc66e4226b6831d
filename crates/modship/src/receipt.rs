//! Persisted [`PublishReport`]s.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use modship_types::PublishReport;

/// Write `report` as pretty JSON. The receipt is staged next to `path` and
/// renamed into place, so readers see either the old receipt or the new one.
pub fn write_report(path: &Path, report: &PublishReport) -> Result<()> {
    let dir = path.parent().filter(|dir| !dir.as_os_str().is_empty());
    if let Some(dir) = dir {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }

    let mut json = serde_json::to_vec_pretty(report).context("failed to encode run report")?;
    json.push(b'\n');

    let staged = staging_path(path);
    let mut file = File::create(&staged)
        .with_context(|| format!("failed to stage receipt at {}", staged.display()))?;
    file.write_all(&json)
        .and_then(|()| file.sync_all())
        .with_context(|| format!("failed to stage receipt at {}", staged.display()))?;
    drop(file);

    fs::rename(&staged, path)
        .with_context(|| format!("failed to move receipt into place at {}", path.display()))
}

pub fn read_report(path: &Path) -> Result<PublishReport> {
    let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_slice(&raw)
        .with_context(|| format!("{} is not a modship receipt", path.display()))
}

/// `receipt.json` is staged as `.receipt.json.partial`.
fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "receipt".to_string());
    path.with_file_name(format!(".{name}.partial"))
}
