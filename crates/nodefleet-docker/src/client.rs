//! Docker Engine API client.
//!
//! Each call opens a fresh TCP connection and speaks HTTP/1.1 over it with
//! hyper's connection-level client. Engine conditions the lifecycle manager
//! absorbs are mapped to their [`EngineError`] variants by status code.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE;
use bytes::Bytes;
use http::{Method, StatusCode};
use http_body_util::{BodyExt, Full};
use serde::Deserialize;
use tracing::debug;

use nodefleet_core::{ContainerConfig, ContainerEngine, EngineError, HostConfig, RegistryAuth};

use crate::endpoint::Endpoint;
use crate::stream::render_pull_stream;

const USER_AGENT: &str = concat!("nodefleet/", env!("CARGO_PKG_VERSION"));

/// Connection and request deadlines for one engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    pub connect_timeout: Duration,
    /// Bounds a whole request, including reading the response body.
    pub request_timeout: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(300),
        }
    }
}

/// Client for one node's Docker Engine.
#[derive(Debug, Clone)]
pub struct DockerEngine {
    endpoint: Endpoint,
    options: EngineOptions,
}

struct Reply {
    status: StatusCode,
    body: Bytes,
}

impl DockerEngine {
    /// Validate `endpoint`. No connection is made until the first call.
    pub fn connect(endpoint: &str, options: EngineOptions) -> Result<Self, EngineError> {
        Ok(Self {
            endpoint: Endpoint::parse(endpoint)?,
            options,
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        headers: &[(&str, String)],
        body: Option<Vec<u8>>,
    ) -> Result<Reply, EngineError> {
        let address = self.endpoint.authority();

        let stream = match tokio::time::timeout(
            self.options.connect_timeout,
            tokio::net::TcpStream::connect(address),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(EngineError::Transport(format!("connect to {address}: {e}")));
            }
            Err(_) => {
                return Err(EngineError::Transport(format!(
                    "connect to {address} timed out after {:?}",
                    self.options.connect_timeout
                )));
            }
        };

        let has_body = body.is_some();
        let mut builder = http::Request::builder()
            .method(method.clone())
            .uri(path)
            .header("host", address)
            .header("user-agent", USER_AGENT);
        if has_body {
            builder = builder.header("content-type", "application/json");
        }
        for (name, value) in headers {
            builder = builder.header(*name, value);
        }
        let req = builder
            .body(Full::new(Bytes::from(body.unwrap_or_default())))
            .map_err(|e| EngineError::Transport(format!("invalid request {method} {path}: {e}")))?;

        let exchange = async {
            let io = hyper_util::rt::TokioIo::new(stream);
            let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
                .await
                .map_err(|e| EngineError::Transport(format!("handshake with {address}: {e}")))?;

            // Drive the connection in the background.
            tokio::spawn(async move {
                let _ = conn.await;
            });

            let resp = sender
                .send_request(req)
                .await
                .map_err(|e| EngineError::Transport(format!("{method} {path}: {e}")))?;
            let status = resp.status();
            let body = resp
                .into_body()
                .collect()
                .await
                .map_err(|e| EngineError::Transport(format!("reading {method} {path}: {e}")))?
                .to_bytes();
            Ok::<_, EngineError>(Reply { status, body })
        };

        let reply = tokio::time::timeout(self.options.request_timeout, exchange)
            .await
            .map_err(|_| {
                EngineError::Transport(format!(
                    "{method} {path} timed out after {:?}",
                    self.options.request_timeout
                ))
            })??;
        debug!(%address, %method, %path, status = %reply.status, "engine request");
        Ok(reply)
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn create_container(
        &self,
        name: &str,
        config: &ContainerConfig,
        host_config: &HostConfig,
    ) -> Result<(), EngineError> {
        let payload = create_payload(config, host_config)?;
        let path = format!("/containers/create?name={}", encode_query(name));
        let reply = self
            .request(Method::POST, &path, &[], Some(payload))
            .await?;
        match reply.status {
            StatusCode::CREATED | StatusCode::OK => Ok(()),
            StatusCode::CONFLICT => Err(EngineError::AlreadyExists),
            status => Err(api_error(status, &reply.body)),
        }
    }

    /// Host settings travel with the create payload; start sends no body.
    async fn start_container(
        &self,
        name: &str,
        _host_config: &HostConfig,
    ) -> Result<(), EngineError> {
        let path = format!("/containers/{}/start", encode_path(name));
        let reply = self.request(Method::POST, &path, &[], None).await?;
        match reply.status {
            StatusCode::NO_CONTENT | StatusCode::OK => Ok(()),
            StatusCode::NOT_MODIFIED => Err(EngineError::AlreadyRunning),
            StatusCode::NOT_FOUND => Err(EngineError::NotFound(name.to_string())),
            status => Err(api_error(status, &reply.body)),
        }
    }

    async fn remove_container(&self, name: &str, force: bool) -> Result<(), EngineError> {
        let path = format!("/containers/{}?force={force}", encode_path(name));
        let reply = self.request(Method::DELETE, &path, &[], None).await?;
        match reply.status {
            StatusCode::NO_CONTENT | StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => Err(EngineError::NotFound(name.to_string())),
            status => Err(api_error(status, &reply.body)),
        }
    }

    async fn pull_image(
        &self,
        image: &str,
        auth: &RegistryAuth,
        output: &mut String,
    ) -> Result<(), EngineError> {
        let (repository, tag) = split_reference(image);
        let path = format!(
            "/images/create?fromImage={}&tag={}",
            encode_query(repository),
            encode_query(tag)
        );
        let mut headers = Vec::new();
        if !auth.is_empty() {
            headers.push(("x-registry-auth", encode_auth(auth)?));
        }
        let reply = self.request(Method::POST, &path, &headers, None).await?;
        if !reply.status.is_success() {
            return Err(api_error(reply.status, &reply.body));
        }
        render_pull_stream(&reply.body, output)
    }
}

/// The create body: container settings with `HostConfig` nested inside.
fn create_payload(
    config: &ContainerConfig,
    host_config: &HostConfig,
) -> Result<Vec<u8>, EngineError> {
    let encode_err =
        |e: serde_json::Error| EngineError::Transport(format!("encoding create payload: {e}"));
    let mut payload = serde_json::to_value(config).map_err(encode_err)?;
    if let Some(object) = payload.as_object_mut() {
        object.insert(
            "HostConfig".to_string(),
            serde_json::to_value(host_config).map_err(encode_err)?,
        );
    }
    serde_json::to_vec(&payload).map_err(encode_err)
}

fn encode_auth(auth: &RegistryAuth) -> Result<String, EngineError> {
    let json = serde_json::to_vec(auth)
        .map_err(|e| EngineError::Transport(format!("encoding registry auth: {e}")))?;
    Ok(URL_SAFE.encode(json))
}

#[derive(Deserialize)]
struct ApiMessage {
    message: String,
}

fn api_error(status: StatusCode, body: &[u8]) -> EngineError {
    let message = serde_json::from_slice::<ApiMessage>(body)
        .map(|m| m.message)
        .unwrap_or_else(|_| String::from_utf8_lossy(body).trim().to_string());
    EngineError::Api {
        status: status.as_u16(),
        message,
    }
}

/// Split `image` into repository and tag (or digest) for `/images/create`.
///
/// A name-only reference means `latest`; without an explicit tag the engine
/// pulls every tag of the repository. A digest wins over a tag.
fn split_reference(image: &str) -> (&str, &str) {
    let (name, digest) = match image.split_once('@') {
        Some((name, digest)) => (name, Some(digest)),
        None => (image, None),
    };
    let name_start = name.rfind('/').map_or(0, |i| i + 1);
    let (repository, tag) = match name[name_start..].rfind(':') {
        Some(i) => (&name[..name_start + i], &name[name_start + i + 1..]),
        None => (name, "latest"),
    };
    (repository, digest.unwrap_or(tag))
}

fn encode_query(value: &str) -> String {
    percent_encode(value, |b| b.is_ascii_alphanumeric() || b"-._~".contains(&b))
}

fn encode_path(value: &str) -> String {
    percent_encode(value, |b| b.is_ascii_alphanumeric() || b"-._~:@".contains(&b))
}

fn percent_encode(value: &str, keep: impl Fn(u8) -> bool) -> String {
    let mut out = String::with_capacity(value.len());
    for b in value.bytes() {
        if keep(b) {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// One-shot engine stub: answers a single request with `status` and
    /// `body`, and hands back the raw request it received.
    async fn stub(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                raw.extend_from_slice(&buf[..n]);
                if n == 0 || request_complete(&raw) {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\n\
                 content-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&raw).to_string()
        });
        (address, handle)
    }

    fn request_complete(raw: &[u8]) -> bool {
        let text = String::from_utf8_lossy(raw);
        let Some((head, body)) = text.split_once("\r\n\r\n") else {
            return false;
        };
        let length = head
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        body.len() >= length
    }

    fn engine(address: &str) -> DockerEngine {
        DockerEngine::connect(
            &format!("http://{address}"),
            EngineOptions {
                connect_timeout: Duration::from_secs(2),
                request_timeout: Duration::from_secs(5),
            },
        )
        .unwrap()
    }

    fn agent_config() -> ContainerConfig {
        ContainerConfig {
            image: Some("fleet/agent:v1".to_string()),
            env: vec!["DOCKER_ENDPOINT=http://n1:2375".to_string()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_sends_payload_and_accepts_201() {
        let (address, server) = stub("201 Created", r#"{"Id":"abc","Warnings":[]}"#).await;
        let host = HostConfig {
            privileged: Some(true),
            ..Default::default()
        };

        engine(&address)
            .create_container("agent", &agent_config(), &host)
            .await
            .unwrap();

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /containers/create?name=agent HTTP/1.1\r\n"));
        assert!(request.contains(r#""Image":"fleet/agent:v1""#));
        assert!(request.contains(r#""HostConfig":{"Privileged":true}"#));
    }

    #[tokio::test]
    async fn create_conflict_is_already_exists() {
        let (address, _server) = stub("409 Conflict", r#"{"message":"name in use"}"#).await;
        let err = engine(&address)
            .create_container("agent", &agent_config(), &HostConfig::default())
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::AlreadyExists);
    }

    #[tokio::test]
    async fn start_not_modified_is_already_running() {
        let (address, server) = stub("304 Not Modified", "").await;
        let err = engine(&address)
            .start_container("agent", &HostConfig::default())
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::AlreadyRunning);
        assert!(server.await.unwrap().starts_with("POST /containers/agent/start HTTP/1.1\r\n"));
    }

    #[tokio::test]
    async fn remove_missing_is_not_found() {
        let (address, server) =
            stub("404 Not Found", r#"{"message":"No such container: agent"}"#).await;
        let err = engine(&address).remove_container("agent", true).await.unwrap_err();
        assert_eq!(err, EngineError::NotFound("agent".into()));
        let request = server.await.unwrap();
        assert!(request.starts_with("DELETE /containers/agent?force=true HTTP/1.1\r\n"));
    }

    #[tokio::test]
    async fn server_error_carries_engine_message() {
        let (address, _server) =
            stub("500 Internal Server Error", r#"{"message":"disk full"}"#).await;
        let err = engine(&address)
            .start_container("agent", &HostConfig::default())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            EngineError::Api {
                status: 500,
                message: "disk full".into()
            }
        );
    }

    #[tokio::test]
    async fn pull_renders_stream_and_sends_auth() {
        let (address, server) = stub(
            "200 OK",
            "{\"status\":\"Pulling from fleet/agent\",\"id\":\"latest\"}\n\
             {\"status\":\"Digest: sha256:5d4d4c0e1f\"}\n",
        )
        .await;
        let auth = RegistryAuth {
            username: "ci".into(),
            password: "s3cret".into(),
            server_address: "registry.local:5000".into(),
            ..Default::default()
        };

        let mut output = String::new();
        engine(&address)
            .pull_image("registry.local:5000/fleet/agent", &auth, &mut output)
            .await
            .unwrap();

        assert_eq!(output, "latest: Pulling from fleet/agent\nDigest: sha256:5d4d4c0e1f\n");
        let request = server.await.unwrap();
        assert!(request.starts_with(
            "POST /images/create?fromImage=registry.local%3A5000%2Ffleet%2Fagent&tag=latest \
             HTTP/1.1\r\n"
        ));
        let expected = format!("x-registry-auth: {}", encode_auth(&auth).unwrap());
        assert!(request.to_ascii_lowercase().contains(&expected.to_ascii_lowercase()));
    }

    #[tokio::test]
    async fn pull_error_in_stream_fails() {
        let (address, _server) = stub("200 OK", r#"{"error":"pull access denied"}"#).await;
        let mut output = String::new();
        let err = engine(&address)
            .pull_image("fleet/private", &RegistryAuth::default(), &mut output)
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::Pull("pull access denied".into()));
    }

    #[tokio::test]
    async fn closed_port_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = engine(&address).remove_container("agent", true).await.unwrap_err();
        assert!(matches!(err, EngineError::Transport(_)));
    }

    #[test]
    fn auth_is_base64url_json() {
        let auth = RegistryAuth {
            username: "ci".into(),
            password: "pw".into(),
            ..Default::default()
        };
        let decoded = URL_SAFE.decode(encode_auth(&auth).unwrap()).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&decoded).unwrap();
        assert_eq!(json, serde_json::json!({"username": "ci", "password": "pw"}));
    }

    #[tokio::test]
    async fn pull_of_versioned_tag_sends_that_tag() {
        let (address, server) = stub("200 OK", r#"{"status":"Digest: sha256:1"}"#).await;
        let mut output = String::new();
        engine(&address)
            .pull_image("fleet/agent:v1", &RegistryAuth::default(), &mut output)
            .await
            .unwrap();

        let request = server.await.unwrap();
        assert!(
            request.starts_with("POST /images/create?fromImage=fleet%2Fagent&tag=v1 HTTP/1.1\r\n")
        );
    }

    #[test]
    fn references_split_into_repository_and_tag() {
        assert_eq!(split_reference("fleet/agent"), ("fleet/agent", "latest"));
        assert_eq!(split_reference("agent"), ("agent", "latest"));
        assert_eq!(split_reference("fleet/agent:v1"), ("fleet/agent", "v1"));
        assert_eq!(
            split_reference("registry.local:5000/fleet/agent"),
            ("registry.local:5000/fleet/agent", "latest")
        );
        assert_eq!(
            split_reference("registry.local:5000/fleet/agent:2.1"),
            ("registry.local:5000/fleet/agent", "2.1")
        );
        assert_eq!(
            split_reference("fleet/agent:latest@sha256:ab"),
            ("fleet/agent", "sha256:ab")
        );
    }

    #[test]
    fn query_values_are_percent_encoded() {
        assert_eq!(encode_query("fleet/agent@sha256:ab"), "fleet%2Fagent%40sha256%3Aab");
        assert_eq!(encode_query("big-sibling_1.0"), "big-sibling_1.0");
    }

    #[test]
    fn connect_rejects_bad_endpoint() {
        assert!(matches!(
            DockerEngine::connect("unix:///var/run/docker.sock", EngineOptions::default()),
            Err(EngineError::InvalidEndpoint(_))
        ));
    }
}
