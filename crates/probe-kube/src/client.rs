//! In-cluster API client.
//!
//! Talks HTTP/1.1 over TLS to the API server using the Pod's service
//! account. Each request opens its own connection; a probe tick makes at
//! most three calls, so there is nothing to pool.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use http::{Method, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};

use crate::api::{KubeFuture, PodPatcher, SecretReader};
use crate::error::{KubeError, KubeResult};
use crate::tls;
use crate::types::{PatchOperation, Pod, Secret};

const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";
const ENV_SERVICE_HOST: &str = "KUBERNETES_SERVICE_HOST";
const ENV_SERVICE_PORT: &str = "KUBERNETES_SERVICE_PORT";
const JSON_PATCH: &str = "application/json-patch+json";
const USER_AGENT: &str = "readinessprobe/0.1";

/// Client for the API server reachable from inside a Pod.
#[derive(Clone)]
pub struct InClusterClient {
    host: String,
    port: u16,
    token: String,
    connector: TlsConnector,
    server_name: ServerName<'static>,
}

impl std::fmt::Debug for InClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InClusterClient")
            .field("host", &self.host)
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}

/// `Status` object the API server returns with error responses.
#[derive(Debug, Default, Deserialize)]
struct ApiStatus {
    #[serde(default)]
    reason: String,
    #[serde(default)]
    message: String,
}

impl InClusterClient {
    /// Discover the API server from the service environment and the mounted
    /// service account.
    pub fn from_env() -> KubeResult<Self> {
        let host = std::env::var(ENV_SERVICE_HOST)
            .ok()
            .filter(|h| !h.is_empty())
            .ok_or(KubeError::MissingEnv(ENV_SERVICE_HOST))?;
        let port = match std::env::var(ENV_SERVICE_PORT) {
            Ok(port) if !port.is_empty() => port
                .parse()
                .map_err(|_| KubeError::Transport(format!("invalid {ENV_SERVICE_PORT}: {port}")))?,
            _ => 443,
        };

        let dir = Path::new(SERVICE_ACCOUNT_DIR);
        let token = read_file(&dir.join("token"))?;
        let ca = read_file(&dir.join("ca.crt"))?;
        Self::new(&host, port, String::from_utf8_lossy(&token).trim(), &ca)
    }

    pub fn new(host: &str, port: u16, token: &str, ca_pem: &[u8]) -> KubeResult<Self> {
        let config = tls::client_config(ca_pem)?;
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|e| KubeError::Tls(format!("invalid server name {host}: {e}")))?;
        Ok(Self {
            host: host.to_string(),
            port,
            token: token.to_string(),
            connector: TlsConnector::from(Arc::clone(&config)),
            server_name,
        })
    }

    fn authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        content_type: Option<&str>,
        body: Bytes,
    ) -> KubeResult<Bytes> {
        let stream = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(|e| KubeError::Transport(format!("connect {}: {e}", self.authority())))?;
        let stream = self
            .connector
            .connect(self.server_name.clone(), stream)
            .await
            .map_err(|e| KubeError::Tls(format!("handshake with {}: {e}", self.authority())))?;

        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .map_err(|e| KubeError::Transport(format!("http handshake: {e}")))?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, "api connection closed with error");
            }
        });

        let mut builder = http::Request::builder()
            .method(method.clone())
            .uri(path)
            .header(http::header::HOST, self.authority())
            .header(http::header::USER_AGENT, USER_AGENT)
            .header(http::header::ACCEPT, "application/json")
            .header(http::header::AUTHORIZATION, format!("Bearer {}", self.token));
        if let Some(content_type) = content_type {
            builder = builder.header(http::header::CONTENT_TYPE, content_type);
        }
        let req = builder
            .body(Full::new(body))
            .map_err(|e| KubeError::Transport(format!("build request: {e}")))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| KubeError::Transport(format!("{method} {path}: {e}")))?;
        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| KubeError::Transport(format!("{method} {path}: reading body: {e}")))?
            .to_bytes();

        debug!(%method, %path, status = status.as_u16(), "api request");
        if status.is_success() {
            return Ok(body);
        }
        Err(api_error(status, path, &body))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> KubeResult<T> {
        let body = self.request(Method::GET, path, None, Bytes::new()).await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

fn read_file(path: &Path) -> KubeResult<Vec<u8>> {
    std::fs::read(path).map_err(|source| KubeError::ReadFile {
        path: path.to_path_buf(),
        source,
    })
}

fn api_error(status: StatusCode, path: &str, body: &[u8]) -> KubeError {
    let parsed: ApiStatus = serde_json::from_slice(body).unwrap_or_else(|_| ApiStatus {
        reason: status.canonical_reason().unwrap_or_default().to_string(),
        message: String::from_utf8_lossy(body).into_owned(),
    });
    if status == StatusCode::NOT_FOUND {
        return KubeError::NotFound(path.to_string());
    }
    warn!(status = status.as_u16(), reason = %parsed.reason, "api request failed");
    KubeError::Api {
        status: status.as_u16(),
        reason: parsed.reason,
        message: parsed.message,
    }
}

fn secret_path(namespace: &str, name: &str) -> String {
    format!("/api/v1/namespaces/{namespace}/secrets/{name}")
}

fn pod_path(namespace: &str, name: &str) -> String {
    format!("/api/v1/namespaces/{namespace}/pods/{name}")
}

impl SecretReader for InClusterClient {
    fn read_secret<'a>(&'a self, namespace: &'a str, name: &'a str) -> KubeFuture<'a, Secret> {
        Box::pin(async move { self.get_json(&secret_path(namespace, name)).await })
    }
}

impl PodPatcher for InClusterClient {
    fn get_pod<'a>(&'a self, namespace: &'a str, name: &'a str) -> KubeFuture<'a, Pod> {
        Box::pin(async move { self.get_json(&pod_path(namespace, name)).await })
    }

    fn patch_pod<'a>(
        &'a self,
        namespace: &'a str,
        name: &'a str,
        patch: &'a [PatchOperation],
    ) -> KubeFuture<'a, Pod> {
        Box::pin(async move {
            let body = serde_json::to_vec(patch)?;
            let resp = self
                .request(
                    Method::PATCH,
                    &pod_path(namespace, name),
                    Some(JSON_PATCH),
                    Bytes::from(body),
                )
                .await?;
            Ok(serde_json::from_slice(&resp)?)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ca_pem() -> String {
        let key = rcgen::KeyPair::generate().unwrap();
        let mut params = rcgen::CertificateParams::new(vec!["kubernetes.default.svc".to_string()])
            .unwrap();
        params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
        params.self_signed(&key).unwrap().pem()
    }

    #[test]
    fn resource_paths() {
        assert_eq!(
            secret_path("test", "appdb-config"),
            "/api/v1/namespaces/test/secrets/appdb-config"
        );
        assert_eq!(pod_path("test", "appdb-0"), "/api/v1/namespaces/test/pods/appdb-0");
    }

    #[test]
    fn authority_brackets_ipv6() {
        let pem = ca_pem();
        let v4 = InClusterClient::new("10.96.0.1", 443, "t", pem.as_bytes()).unwrap();
        assert_eq!(v4.authority(), "10.96.0.1:443");
        let v6 = InClusterClient::new("fd00::1", 6443, "t", pem.as_bytes()).unwrap();
        assert_eq!(v6.authority(), "[fd00::1]:6443");
    }

    #[test]
    fn debug_hides_token() {
        let client = InClusterClient::new("10.96.0.1", 443, "secret-token", ca_pem().as_bytes())
            .unwrap();
        assert!(!format!("{client:?}").contains("secret-token"));
    }

    #[test]
    fn status_body_becomes_api_error() {
        let body = br#"{"kind":"Status","status":"Failure","message":"pods \"appdb-0\" is forbidden","reason":"Forbidden","code":403}"#;
        match api_error(StatusCode::FORBIDDEN, "/api/v1/namespaces/t/pods/appdb-0", body) {
            KubeError::Api {
                status,
                reason,
                message,
            } => {
                assert_eq!(status, 403);
                assert_eq!(reason, "Forbidden");
                assert!(message.contains("forbidden"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn plain_body_error_uses_canonical_reason() {
        match api_error(StatusCode::BAD_GATEWAY, "/x", b"upstream down") {
            KubeError::Api {
                reason, message, ..
            } => {
                assert_eq!(reason, "Bad Gateway");
                assert_eq!(message, "upstream down");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn not_found_maps_to_not_found() {
        let err = api_error(StatusCode::NOT_FOUND, "/api/v1/namespaces/t/secrets/s", b"{}");
        assert!(matches!(err, KubeError::NotFound(p) if p.ends_with("/secrets/s")));
    }
}
