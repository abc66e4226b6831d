use anyhow::Result;
use modship_config::ReleaseConfig;
use modship_types::{Platform, UploadResponse};
use reqwest::blocking::{Client, multipart::Form};

use super::{Publisher, attach_file, http_client, release_name, send};
use crate::artifact::Artifact;
use crate::version::release_version;

/// Creates a version on a Modrinth project (`POST /v2/project/{id}/version`).
pub struct ModrinthPublisher {
    client: Client,
    api_base: String,
    project_id: Option<String>,
    token: Option<String>,
    release: ReleaseConfig,
}

impl ModrinthPublisher {
    pub fn new(
        api_base: &str,
        project_id: Option<String>,
        token: Option<String>,
        release: ReleaseConfig,
    ) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            api_base: api_base.trim_end_matches('/').to_string(),
            project_id: project_id.filter(|s| !s.is_empty()),
            token: token.filter(|s| !s.is_empty()),
            release,
        })
    }

    fn endpoint(&self, project_id: &str) -> String {
        format!("{}/v2/project/{}/version", self.api_base, project_id)
    }

    fn form(&self, version: &str) -> Form {
        let mut form = Form::new().text("version_number", release_version(version).to_string());
        for game_version in &self.release.game_versions {
            form = form.text("game_versions[]", game_version.clone());
        }
        for loader in &self.release.loaders {
            form = form.text("loaders[]", loader.clone());
        }
        form.text("name", release_name(&self.release.display_name, version))
            .text("changelog", self.release.changelog.clone())
    }
}

impl Publisher for ModrinthPublisher {
    fn platform(&self) -> Platform {
        Platform::Modrinth
    }

    fn is_configured(&self) -> bool {
        self.project_id.is_some() && self.token.is_some()
    }

    fn publish(&self, artifact: &Artifact, version: &str) -> UploadResponse {
        let (Some(project_id), Some(token)) = (&self.project_id, &self.token) else {
            return UploadResponse::missing_credentials();
        };

        let form = match attach_file(self.form(version), artifact) {
            Ok(form) => form,
            Err(response) => return response,
        };

        let request = self
            .client
            .post(self.endpoint(project_id))
            .header("Authorization", token.as_str())
            .multipart(form);

        send(request, |text| text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::test_server;
    use modship_types::MISSING_CREDENTIALS;
    use tempfile::tempdir;

    fn artifact(dir: &std::path::Path) -> Artifact {
        let path = dir.join("statusmod-1.4.2.jar");
        std::fs::write(&path, b"PK\x03\x04jar-bytes").expect("write jar");
        Artifact::new(path, "1.4.2")
    }

    #[test]
    fn missing_credentials_short_circuit() {
        let td = tempdir().expect("tempdir");
        let publisher = ModrinthPublisher::new(
            "http://127.0.0.1:9",
            Some("statusmod".to_string()),
            Some(String::new()),
            ReleaseConfig::default(),
        )
        .expect("publisher");

        assert!(!publisher.is_configured());
        let resp = publisher.publish(&artifact(td.path()), "1.4.2");
        assert!(!resp.success);
        assert_eq!(resp.status, 0);
        assert_eq!(resp.body, MISSING_CREDENTIALS);
    }

    #[test]
    fn uploads_multipart_with_raw_token() {
        let td = tempdir().expect("tempdir");
        let server = test_server::spawn(200, r#"{"id":"abc"}"#, "application/json");
        let publisher = ModrinthPublisher::new(
            &format!("{}/", server.base_url),
            Some("statusmod".to_string()),
            Some("mrp_token".to_string()),
            ReleaseConfig::default(),
        )
        .expect("publisher");

        let resp = publisher.publish(&artifact(td.path()), "v1.4.2");
        assert_eq!(resp, UploadResponse::from_http(200, r#"{"id":"abc"}"#));

        let seen = server.join();
        assert_eq!(seen.url, "/v2/project/statusmod/version");
        assert_eq!(seen.header("Authorization"), Some("mrp_token"));
        assert!(
            seen.header("Content-Type")
                .expect("content type")
                .starts_with("multipart/form-data")
        );
        assert!(seen.body.contains("name=\"version_number\"\r\n\r\n1.4.2\r\n"));
        assert!(seen.body.contains("name=\"game_versions[]\"\r\n\r\n1.21.10\r\n"));
        assert!(seen.body.contains("name=\"loaders[]\"\r\n\r\nfabric\r\n"));
        assert!(seen.body.contains("name=\"name\"\r\n\r\nStatusMod 1.4.2\r\n"));
        assert!(seen.body.contains("Automated upload from GitHub Actions"));
        assert!(seen.body.contains("filename=\"statusmod-1.4.2.jar\""));
        assert!(seen.body.contains("jar-bytes"));
    }

    #[test]
    fn rejection_keeps_body_verbatim() {
        let td = tempdir().expect("tempdir");
        let server = test_server::spawn(
            400,
            "{\n  \"error\": \"invalid_input\",\n  \"description\": \"Version already exists\"\n}",
            "application/json",
        );
        let publisher = ModrinthPublisher::new(
            &server.base_url,
            Some("p".to_string()),
            Some("t".to_string()),
            ReleaseConfig::default(),
        )
        .expect("publisher");

        let resp = publisher.publish(&artifact(td.path()), "1.4.2");
        server.join();
        assert!(!resp.success);
        assert_eq!(resp.status, 400);
        assert!(resp.body.starts_with("{\n  \"error\""));
    }

    #[test]
    fn unreadable_artifact_is_reported_without_network() {
        let td = tempdir().expect("tempdir");
        let publisher = ModrinthPublisher::new(
            "http://127.0.0.1:9",
            Some("p".to_string()),
            Some("t".to_string()),
            ReleaseConfig::default(),
        )
        .expect("publisher");

        let resp = publisher.publish(&Artifact::new(td.path().join("missing.jar"), "1.0.0"), "1.0.0");
        assert_eq!(resp.status, 0);
        assert!(resp.body.contains("failed to read artifact"));
    }

    #[test]
    fn transport_failure_has_status_zero() {
        let td = tempdir().expect("tempdir");
        let server = tiny_http::Server::http("127.0.0.1:0").expect("server");
        let base_url = format!("http://{}", server.server_addr());
        drop(server);

        let publisher = ModrinthPublisher::new(
            &base_url,
            Some("p".to_string()),
            Some("t".to_string()),
            ReleaseConfig::default(),
        )
        .expect("publisher");
        let resp = publisher.publish(&artifact(td.path()), "1.4.2");
        assert!(!resp.success);
        assert_eq!(resp.status, 0);
        assert!(!resp.body.is_empty());
    }
}
