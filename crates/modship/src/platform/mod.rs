//! Upload clients for the two distribution platforms.
//!
//! A publisher makes exactly one upload per call and never retries; retry
//! decisions belong to the engine. Every failure is reported as an
//! [`UploadResponse`], including absent credentials and transport errors.

use std::time::Duration;

use anyhow::{Context, Result};
use modship_config::Settings;
use modship_types::{Platform, UploadResponse};
use reqwest::blocking::{Client, RequestBuilder, multipart::Form};

use crate::artifact::Artifact;
use crate::version::release_version;

pub mod curseforge;
pub mod modrinth;

pub use curseforge::CurseForgePublisher;
pub use modrinth::ModrinthPublisher;

/// Per-request timeout for uploads.
pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(120);

/// One platform's upload endpoint.
pub trait Publisher {
    fn platform(&self) -> Platform;

    /// Whether a project id and a token are both present.
    fn is_configured(&self) -> bool;

    /// Upload `artifact` as `version`.
    fn publish(&self, artifact: &Artifact, version: &str) -> UploadResponse;
}

/// The publisher for each platform.
pub struct Publishers {
    modrinth: Box<dyn Publisher>,
    curseforge: Box<dyn Publisher>,
}

impl Publishers {
    pub fn new(modrinth: Box<dyn Publisher>, curseforge: Box<dyn Publisher>) -> Self {
        Self {
            modrinth,
            curseforge,
        }
    }

    /// Real HTTP publishers built from resolved settings.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let config = &settings.config;
        let modrinth = ModrinthPublisher::new(
            &config.modrinth.api_base,
            config.modrinth.project_id.clone(),
            settings.credentials.modrinth_token.clone(),
            config.release.clone(),
        )?;
        let curseforge = CurseForgePublisher::new(
            &config.curseforge,
            settings.credentials.curseforge_token.clone(),
            config.release.clone(),
        )?;
        Ok(Self::new(Box::new(modrinth), Box::new(curseforge)))
    }

    pub fn get(&self, platform: Platform) -> &dyn Publisher {
        match platform {
            Platform::Modrinth => self.modrinth.as_ref(),
            Platform::CurseForge => self.curseforge.as_ref(),
        }
    }
}

/// `"<display name> <version without leading v>"`
pub fn release_name(display_name: &str, version: &str) -> String {
    format!("{display_name} {}", release_version(version))
}

pub(crate) fn http_client() -> Result<Client> {
    Client::builder()
        .timeout(UPLOAD_TIMEOUT)
        .user_agent(concat!("modship/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to create HTTP client")
}

/// Attach the artifact bytes as the `file` part.
pub(crate) fn attach_file(form: Form, artifact: &Artifact) -> Result<Form, UploadResponse> {
    form.file("file", &artifact.path).map_err(|err| {
        UploadResponse::transport(format!(
            "failed to read artifact {}: {err}",
            artifact.path.display()
        ))
    })
}

/// Send a prepared request. The body is passed through `render` so a
/// platform can normalize it.
pub(crate) fn send(request: RequestBuilder, render: fn(String) -> String) -> UploadResponse {
    match request.send() {
        Ok(response) => {
            let status = response.status().as_u16();
            let text = response
                .text()
                .unwrap_or_else(|err| format!("failed to read response body: {err}"));
            UploadResponse::from_http(status, render(text))
        }
        Err(err) => UploadResponse::transport(err),
    }
}

#[cfg(test)]
pub(crate) mod test_server {
    use std::io::Read;
    use std::thread;

    use tiny_http::{Header, Response, Server, StatusCode};

    /// What a fake platform saw.
    pub struct Captured {
        pub url: String,
        pub headers: Vec<(String, String)>,
        pub body: String,
    }

    impl Captured {
        pub fn header(&self, name: &str) -> Option<&str> {
            self.headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str())
        }
    }

    pub struct FakePlatform {
        pub base_url: String,
        handle: thread::JoinHandle<Captured>,
    }

    impl FakePlatform {
        pub fn join(self) -> Captured {
            self.handle.join().expect("join server")
        }
    }

    pub fn spawn(status: u16, body: &'static str, content_type: &'static str) -> FakePlatform {
        let server = Server::http("127.0.0.1:0").expect("server");
        let base_url = format!("http://{}", server.server_addr());
        let handle = thread::spawn(move || {
            let mut req = server.recv().expect("request");
            let mut raw = Vec::new();
            req.as_reader().read_to_end(&mut raw).expect("body");
            let captured = Captured {
                url: req.url().to_string(),
                headers: req
                    .headers()
                    .iter()
                    .map(|h| (h.field.to_string(), h.value.to_string()))
                    .collect(),
                body: String::from_utf8_lossy(&raw).into_owned(),
            };
            let resp = Response::from_string(body)
                .with_status_code(StatusCode(status))
                .with_header(Header::from_bytes("Content-Type", content_type).expect("header"));
            req.respond(resp).expect("respond");
            captured
        });
        FakePlatform { base_url, handle }
    }
}
