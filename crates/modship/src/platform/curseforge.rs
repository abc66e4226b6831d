use anyhow::Result;
use modship_config::{CurseForgeConfig, ReleaseConfig};
use modship_types::{Platform, UploadResponse};
use reqwest::blocking::{Client, multipart::Form};

use super::{Publisher, attach_file, http_client, release_name, send};
use crate::artifact::Artifact;

/// Uploads a file to a CurseForge project (`POST /v1/mods/{id}/files`).
pub struct CurseForgePublisher {
    client: Client,
    api_base: String,
    project_id: Option<String>,
    api_key: Option<String>,
    java_version: Option<String>,
    environment: Option<String>,
    release: ReleaseConfig,
}

impl CurseForgePublisher {
    pub fn new(
        config: &CurseForgeConfig,
        api_key: Option<String>,
        release: ReleaseConfig,
    ) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            project_id: config.project_id.clone().filter(|s| !s.is_empty()),
            api_key: api_key.filter(|s| !s.is_empty()),
            java_version: config.java_version.clone().filter(|s| !s.is_empty()),
            environment: config.environment.clone().filter(|s| !s.is_empty()),
            release,
        })
    }

    fn endpoint(&self, project_id: &str) -> String {
        format!("{}/v1/mods/{}/files", self.api_base, project_id)
    }

    fn form(&self, version: &str) -> Form {
        let mut form = Form::new()
            .text("changelog", self.release.changelog.clone())
            .text(
                "displayName",
                release_name(&self.release.display_name, version),
            )
            .text("releaseType", self.release.release_type.clone());
        for game_version in &self.release.game_versions {
            form = form.text("gameVersions[]", game_version.clone());
        }
        if let Some(java_version) = &self.java_version {
            form = form.text("javaVersion", java_version.clone());
        }
        if let Some(environment) = &self.environment {
            form = form.text("environment", environment.clone());
        }
        form
    }
}

/// CurseForge answers in JSON; re-serialize it compactly when it parses.
fn normalize_body(text: String) -> String {
    match serde_json::from_str::<serde_json::Value>(&text) {
        Ok(value) => serde_json::to_string(&value).unwrap_or(text),
        Err(_) => text,
    }
}

impl Publisher for CurseForgePublisher {
    fn platform(&self) -> Platform {
        Platform::CurseForge
    }

    fn is_configured(&self) -> bool {
        self.project_id.is_some() && self.api_key.is_some()
    }

    fn publish(&self, artifact: &Artifact, version: &str) -> UploadResponse {
        let (Some(project_id), Some(api_key)) = (&self.project_id, &self.api_key) else {
            return UploadResponse::missing_credentials();
        };

        let form = match attach_file(self.form(version), artifact) {
            Ok(form) => form,
            Err(response) => return response,
        };

        let request = self
            .client
            .post(self.endpoint(project_id))
            .header("x-api-key", api_key.as_str())
            .multipart(form);

        send(request, normalize_body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::test_server;
    use tempfile::tempdir;

    fn config(base_url: &str) -> CurseForgeConfig {
        CurseForgeConfig {
            api_base: base_url.to_string(),
            project_id: Some("123456".to_string()),
            ..CurseForgeConfig::default()
        }
    }

    fn artifact(dir: &std::path::Path) -> Artifact {
        let path = dir.join("statusmod-2.0.0.jar");
        std::fs::write(&path, b"PK\x03\x04").expect("write jar");
        Artifact::new(path, "2.0.0")
    }

    #[test]
    fn normalizes_json_bodies() {
        assert_eq!(
            normalize_body("{ \"id\" : 42 }".to_string()),
            r#"{"id":42}"#
        );
        assert_eq!(normalize_body("<html>oops</html>".to_string()), "<html>oops</html>");
    }

    #[test]
    fn missing_key_short_circuits() {
        let td = tempdir().expect("tempdir");
        let publisher = CurseForgePublisher::new(
            &config("http://127.0.0.1:9"),
            None,
            ReleaseConfig::default(),
        )
        .expect("publisher");
        assert!(!publisher.is_configured());
        assert!(publisher.publish(&artifact(td.path()), "2.0.0").is_missing_credentials());
    }

    #[test]
    fn uploads_with_api_key_and_optional_fields() {
        let td = tempdir().expect("tempdir");
        let server = test_server::spawn(200, "{ \"id\": 987 }", "application/json");
        let mut cfg = config(&server.base_url);
        cfg.java_version = Some("Java 21".to_string());
        cfg.environment = Some("client".to_string());

        let publisher =
            CurseForgePublisher::new(&cfg, Some("cf-key".to_string()), ReleaseConfig::default())
                .expect("publisher");
        let resp = publisher.publish(&artifact(td.path()), "2.0.0");
        assert!(resp.success);
        assert_eq!(resp.body, r#"{"id":987}"#);

        let seen = server.join();
        assert_eq!(seen.url, "/v1/mods/123456/files");
        assert_eq!(seen.header("x-api-key"), Some("cf-key"));
        assert!(seen.body.contains("name=\"displayName\"\r\n\r\nStatusMod 2.0.0\r\n"));
        assert!(seen.body.contains("name=\"releaseType\"\r\n\r\nrelease\r\n"));
        assert!(seen.body.contains("name=\"gameVersions[]\"\r\n\r\n1.21.10\r\n"));
        assert!(seen.body.contains("name=\"javaVersion\"\r\n\r\nJava 21\r\n"));
        assert!(seen.body.contains("name=\"environment\"\r\n\r\nclient\r\n"));
    }

    #[test]
    fn optional_fields_are_omitted_when_unset() {
        let td = tempdir().expect("tempdir");
        let server = test_server::spawn(403, "{\"errorCode\":403}", "application/json");
        let publisher = CurseForgePublisher::new(
            &config(&server.base_url),
            Some("cf-key".to_string()),
            ReleaseConfig::default(),
        )
        .expect("publisher");

        let resp = publisher.publish(&artifact(td.path()), "2.0.0");
        assert_eq!(resp.status, 403);

        let seen = server.join();
        assert!(!seen.body.contains("javaVersion"));
        assert!(!seen.body.contains("name=\"environment\""));
    }
}
