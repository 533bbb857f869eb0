//! HTTP implementation of [`RemoteEndpoint`].

use crate::{
    EndpointError, EndpointResult, GeneratorCredentials, ParticipantAccount, PostError,
    RemoteEndpoint, SignInResponse,
};
use async_trait::async_trait;
use delivery_config_and_utils::{
    Config, CoreResult, DEFAULT_ENDPOINT_URL, DEFAULT_REQUEST_TIMEOUT_SECS,
};
use delivery_queue::DataPoint;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// HTTP client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    /// Base URL of the collection endpoint, without trailing slash.
    pub base_url: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_ENDPOINT_URL.trim_end_matches('/').to_string(),
            timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl EndpointConfig {
    /// Build from the delivery configuration, validating the URL.
    pub fn from_config(config: &Config) -> CoreResult<Self> {
        let url = config.endpoint_url()?;
        Ok(Self {
            base_url: url.as_str().trim_end_matches('/').to_string(),
            timeout_secs: config.request_timeout_secs,
        })
    }
}

#[derive(Serialize)]
struct SignInRequest<'a> {
    username: &'a str,
    password: &'a str,
}

/// Map the status of a record upload to its outcome class.
pub fn classify_post_status(status: u16) -> Result<(), PostError> {
    match status {
        200..=299 => Ok(()),
        409 => Err(PostError::Conflict),
        400 | 422 => Err(PostError::InvalidRecord),
        401 | 403 => Err(PostError::InvalidToken),
        other => Err(PostError::Other(format!("unexpected status {}", other))),
    }
}

/// reqwest-backed endpoint client.
pub struct HttpEndpointClient {
    config: EndpointConfig,
    client: Client,
}

impl HttpEndpointClient {
    pub fn new(config: EndpointConfig) -> EndpointResult<Self> {
        url::Url::parse(&config.base_url)
            .map_err(|e| EndpointError::Config(format!("invalid base URL: {}", e)))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    async fn read_json<T: DeserializeOwned>(response: Response) -> EndpointResult<T> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(EndpointError::Api {
                status: status.as_u16(),
                message: body,
            });
        }
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl RemoteEndpoint for HttpEndpointClient {
    async fn generate_account(
        &self,
        credentials: &GeneratorCredentials,
    ) -> EndpointResult<ParticipantAccount> {
        let url = self.url("/account/generate");
        debug!(
            url = %url,
            generator_id = %credentials.generator_id,
            "Generating participant account"
        );

        let response = self.client.post(&url).json(credentials).send().await?;
        let account: ParticipantAccount = Self::read_json(response).await?;

        info!(username = %account.username, "Participant account generated");
        Ok(account)
    }

    async fn sign_in(&self, username: &str, password: &str) -> EndpointResult<SignInResponse> {
        let url = self.url("/auth/token");
        debug!(url = %url, username = %username, "Signing in");

        let response = self
            .client
            .post(&url)
            .json(&SignInRequest { username, password })
            .send()
            .await?;
        Self::read_json(response).await
    }

    async fn sign_out(&self, auth_token: &str) -> EndpointResult<bool> {
        let url = self.url("/auth/logout");
        let response = self.client.post(&url).bearer_auth(auth_token).send().await?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "Remote sign-out refused");
        }
        Ok(status.is_success())
    }

    async fn post_record(&self, point: &DataPoint, auth_token: &str) -> Result<(), PostError> {
        let url = self.url("/dataPoints");

        let response = self
            .client
            .post(&url)
            .bearer_auth(auth_token)
            .json(point)
            .send()
            .await
            .map_err(|e| PostError::Other(e.to_string()))?;

        let status = response.status().as_u16();
        debug!(record_id = %point.id(), status, "Record upload answered");
        classify_post_status(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use delivery_queue::SchemaId;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response and hand back the raw request text.
    async fn serve_once(
        status_line: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&raw).to_string();
                if let Some(split) = text.find("\r\n\r\n") {
                    let content_length = text[..split]
                        .lines()
                        .find_map(|line| {
                            let lower = line.to_ascii_lowercase();
                            lower
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                        })
                        .unwrap_or(0);
                    if raw.len() >= split + 4 + content_length {
                        break;
                    }
                }
            }

            let response = format!(
                "{}\r\ncontent-type: application/json\r\ncontent-length: {}\r\n\
                 connection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&raw).to_string()
        });

        (base, handle)
    }

    fn client(base_url: String) -> HttpEndpointClient {
        HttpEndpointClient::new(EndpointConfig {
            base_url,
            timeout_secs: 5,
        })
        .unwrap()
    }

    fn point() -> DataPoint {
        DataPoint::new(SchemaId::new("omh", "step-count", "2.0"), json!({"steps": 40}))
    }

    #[test]
    fn test_classify_post_status() {
        assert_eq!(classify_post_status(200), Ok(()));
        assert_eq!(classify_post_status(201), Ok(()));
        assert_eq!(classify_post_status(409), Err(PostError::Conflict));
        assert_eq!(classify_post_status(400), Err(PostError::InvalidRecord));
        assert_eq!(classify_post_status(422), Err(PostError::InvalidRecord));
        assert_eq!(classify_post_status(401), Err(PostError::InvalidToken));
        assert_eq!(classify_post_status(403), Err(PostError::InvalidToken));
        assert!(matches!(classify_post_status(500), Err(PostError::Other(_))));
        assert!(matches!(classify_post_status(302), Err(PostError::Other(_))));
    }

    #[test]
    fn test_endpoint_config_from_config() {
        let config = Config {
            endpoint_url: "https://collector.example.com/".to_string(),
            request_timeout_secs: 12,
            ..Default::default()
        };
        let endpoint = EndpointConfig::from_config(&config).unwrap();
        assert_eq!(endpoint.base_url, "https://collector.example.com");
        assert_eq!(endpoint.timeout_secs, 12);

        let bad = Config {
            endpoint_url: "nope".to_string(),
            ..Default::default()
        };
        assert!(EndpointConfig::from_config(&bad).is_err());
    }

    #[test]
    fn test_new_rejects_invalid_base_url() {
        let result = HttpEndpointClient::new(EndpointConfig {
            base_url: "::not a url::".to_string(),
            timeout_secs: 5,
        });
        assert!(matches!(result, Err(EndpointError::Config(_))));
    }

    #[tokio::test]
    async fn test_post_record_sends_bearer_and_classifies_conflict() {
        let (base, server) = serve_once("HTTP/1.1 409 Conflict", "").await;
        let record = point();

        let result = client(base).post_record(&record, "tok-123").await;
        assert_eq!(result, Err(PostError::Conflict));

        let request = server.await.unwrap();
        let lower = request.to_ascii_lowercase();
        assert!(request.starts_with("POST /dataPoints "));
        assert!(lower.contains("authorization: bearer tok-123"));
        assert!(request.contains(&record.id().to_string()));
    }

    #[tokio::test]
    async fn test_post_record_success() {
        let (base, server) = serve_once("HTTP/1.1 201 Created", "{}").await;
        assert_eq!(client(base).post_record(&point(), "tok").await, Ok(()));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_post_record_unreachable_is_other() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let result = client(base).post_record(&point(), "tok").await;
        assert!(matches!(result, Err(PostError::Other(_))));
    }

    #[tokio::test]
    async fn test_sign_in_parses_token() {
        let (base, server) = serve_once("HTTP/1.1 200 OK", r#"{"auth_token":"abc"}"#).await;

        let response = client(base).sign_in("alice", "pw").await.unwrap();
        assert_eq!(response.auth_token, "abc");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /auth/token "));
        assert!(request.contains(r#""username":"alice""#));
    }

    #[tokio::test]
    async fn test_sign_in_rejected_is_api_error() {
        let (base, server) = serve_once("HTTP/1.1 401 Unauthorized", r#"{"error":"bad"}"#).await;

        let err = client(base).sign_in("alice", "wrong").await.unwrap_err();
        assert!(matches!(err, EndpointError::Api { status: 401, .. }));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_generate_account() {
        let (base, server) = serve_once(
            "HTTP/1.1 200 OK",
            r#"{"username":"participant-9","password":"generated"}"#,
        )
        .await;

        let account = client(base)
            .generate_account(&GeneratorCredentials {
                generator_id: "gen".into(),
                generator_password: "secret".into(),
            })
            .await
            .unwrap();
        assert_eq!(account.username, "participant-9");
        assert_eq!(account.password, "generated");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /account/generate "));
    }

    #[tokio::test]
    async fn test_sign_out_reports_flag() {
        let (base, server) = serve_once("HTTP/1.1 500 Internal Server Error", "").await;
        assert!(!client(base).sign_out("tok").await.unwrap());
        let request = server.await.unwrap();
        assert!(request.starts_with("POST /auth/logout "));
    }
}
