//! One-shot uploads: a single pass over both platforms with no retries,
//! no classification and no rebuilds.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use modship_types::{Platform, UploadResponse};

use crate::artifact::{Artifact, infer_version_from_file_name};
use crate::engine::{LOG_EXCERPT_CHARS, Reporter};
use crate::platform::Publishers;
use crate::redact::{Redactor, truncate_chars};

/// First path matching `pattern`, in sorted order.
pub fn first_match(pattern: &str) -> Result<Option<PathBuf>> {
    let mut paths = glob::glob(pattern)
        .with_context(|| format!("invalid file pattern '{pattern}'"))?
        .filter_map(|entry| entry.ok())
        .filter(|path| path.is_file())
        .collect::<Vec<_>>();
    paths.sort();
    Ok(paths.into_iter().next())
}

/// [`first_match`] with a relative `pattern` anchored at `dir`.
pub fn first_match_in(dir: &Path, pattern: &str) -> Result<Option<PathBuf>> {
    if Path::new(pattern).is_absolute() {
        return first_match(pattern);
    }
    let base = glob::Pattern::escape(&dir.to_string_lossy());
    first_match(&format!("{}/{pattern}", base.trim_end_matches('/')))
}

/// The explicit version if one was given, else whatever the file name says.
pub fn upload_version(explicit: Option<&str>, path: &Path) -> String {
    match explicit.map(str::trim).filter(|v| !v.is_empty()) {
        Some(version) => version.to_string(),
        None => infer_version_from_file_name(path),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadStatus {
    /// No credentials for this platform
    Skipped,
    Uploaded { status: u16 },
    Failed { status: u16, body: String },
}

#[derive(Debug, Clone)]
pub struct UploadSummary {
    pub artifact: Artifact,
    pub results: Vec<(Platform, UploadStatus)>,
}

impl UploadSummary {
    /// Whether any attempted upload was rejected. Skipped platforms do not count.
    pub fn failed(&self) -> bool {
        self.results
            .iter()
            .any(|(_, status)| matches!(status, UploadStatus::Failed { .. }))
    }

    pub fn status(&self, platform: Platform) -> Option<&UploadStatus> {
        self.results
            .iter()
            .find(|(p, _)| *p == platform)
            .map(|(_, status)| status)
    }
}

/// Upload `artifact` once to every configured platform.
pub fn upload_once(
    publishers: &Publishers,
    artifact: &Artifact,
    redactor: &Redactor,
    reporter: &mut dyn Reporter,
) -> UploadSummary {
    let mut results = Vec::with_capacity(Platform::ALL.len());

    for platform in Platform::ALL {
        let publisher = publishers.get(platform);
        if !publisher.is_configured() {
            reporter.warn(&format!(
                "{platform} credentials not set; skipping {platform} upload"
            ));
            results.push((platform, UploadStatus::Skipped));
            continue;
        }

        reporter.info(&format!(
            "uploading {} to {platform} as {}",
            artifact.file_name(),
            artifact.version
        ));
        let UploadResponse {
            success,
            status,
            body,
        } = publisher.publish(artifact, &artifact.version);
        let body = redactor.redact(&body);

        if success {
            reporter.info(&format!("{platform} upload succeeded (status {status})"));
            results.push((platform, UploadStatus::Uploaded { status }));
        } else {
            reporter.error(&format!(
                "{platform} upload failed (status {status}): {}",
                truncate_chars(&body, LOG_EXCERPT_CHARS)
            ));
            results.push((platform, UploadStatus::Failed { status, body }));
        }
    }

    UploadSummary {
        artifact: artifact.clone(),
        results,
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::platform::Publisher;

    #[derive(Default)]
    struct CollectingReporter {
        infos: Vec<String>,
        warns: Vec<String>,
        errors: Vec<String>,
    }

    impl Reporter for CollectingReporter {
        fn info(&mut self, msg: &str) {
            self.infos.push(msg.to_string());
        }

        fn warn(&mut self, msg: &str) {
            self.warns.push(msg.to_string());
        }

        fn error(&mut self, msg: &str) {
            self.errors.push(msg.to_string());
        }
    }

    struct StubPublisher {
        platform: Platform,
        configured: bool,
        response: UploadResponse,
    }

    impl Publisher for StubPublisher {
        fn platform(&self) -> Platform {
            self.platform
        }

        fn is_configured(&self) -> bool {
            self.configured
        }

        fn publish(&self, _artifact: &Artifact, _version: &str) -> UploadResponse {
            self.response.clone()
        }
    }

    fn stub(platform: Platform, configured: bool, response: UploadResponse) -> Box<StubPublisher> {
        Box::new(StubPublisher {
            platform,
            configured,
            response,
        })
    }

    fn artifact() -> Artifact {
        Artifact::new("build/libs/statusmod-1.2.0.jar", "1.2.0")
    }

    #[test]
    fn first_match_picks_sorted_first_file() {
        let td = tempdir().expect("tempdir");
        std::fs::write(td.path().join("statusmod-1.1.jar"), b"b").expect("write");
        std::fs::write(td.path().join("statusmod-1.0.jar"), b"a").expect("write");
        std::fs::create_dir(td.path().join("statusmod-dir.jar")).expect("mkdir");

        let pattern = format!("{}/statusmod-*.jar", td.path().display());
        let found = first_match(&pattern).expect("glob");
        assert_eq!(found, Some(td.path().join("statusmod-1.0.jar")));
    }

    #[test]
    fn first_match_without_files_is_none() {
        let td = tempdir().expect("tempdir");
        let pattern = format!("{}/*.jar", td.path().display());
        assert_eq!(first_match(&pattern).expect("glob"), None);
    }

    #[test]
    fn relative_patterns_are_anchored_at_the_directory() {
        let td = tempdir().expect("tempdir");
        std::fs::create_dir_all(td.path().join("build/libs")).expect("mkdir");
        std::fs::write(td.path().join("build/libs/statusmod-2.0.jar"), b"a").expect("write");

        let found = first_match_in(td.path(), "build/libs/*.jar").expect("glob");
        assert_eq!(found, Some(td.path().join("build/libs/statusmod-2.0.jar")));
    }

    #[test]
    fn invalid_pattern_is_an_error() {
        assert!(first_match("build/[libs").is_err());
    }

    #[test]
    fn version_prefers_explicit_value() {
        let path = Path::new("build/libs/statusmod-1.4.2.jar");
        assert_eq!(upload_version(Some("2.0.0"), path), "2.0.0");
        assert_eq!(upload_version(Some("  "), path), "1.4.2");
        assert_eq!(upload_version(None, path), "1.4.2");
        assert_eq!(upload_version(None, Path::new("mod.jar")), "unspecified");
    }

    #[test]
    fn unconfigured_platforms_are_skipped() {
        let publishers = Publishers::new(
            stub(Platform::Modrinth, true, UploadResponse::from_http(200, "{}")),
            stub(Platform::CurseForge, false, UploadResponse::from_http(200, "{}")),
        );
        let mut reporter = CollectingReporter::default();

        let summary = upload_once(&publishers, &artifact(), &Redactor::default(), &mut reporter);

        assert!(!summary.failed());
        assert_eq!(
            summary.status(Platform::Modrinth),
            Some(&UploadStatus::Uploaded { status: 200 })
        );
        assert_eq!(summary.status(Platform::CurseForge), Some(&UploadStatus::Skipped));
        assert_eq!(
            reporter.warns,
            vec!["CurseForge credentials not set; skipping CurseForge upload"]
        );
    }

    #[test]
    fn rejected_upload_fails_summary_without_retry() {
        let curseforge = stub(
            Platform::CurseForge,
            true,
            UploadResponse::from_http(500, "key cf-secret rejected"),
        );
        let publishers = Publishers::new(
            stub(Platform::Modrinth, true, UploadResponse::from_http(201, "")),
            curseforge,
        );
        let mut reporter = CollectingReporter::default();

        let summary = upload_once(
            &publishers,
            &artifact(),
            &Redactor::new(["cf-secret"]),
            &mut reporter,
        );

        assert!(summary.failed());
        assert_eq!(
            summary.status(Platform::CurseForge),
            Some(&UploadStatus::Failed {
                status: 500,
                body: "key [REDACTED] rejected".to_string()
            })
        );
        assert_eq!(reporter.errors.len(), 1);
        assert!(!reporter.errors[0].contains("cf-secret"));
    }
}
