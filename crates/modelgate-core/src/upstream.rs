//! Upstream HTTP IO behind a trait, so the forwarder never touches a
//! concrete client and tests can stub the wire.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use http::{HeaderMap, Method};
use tokio::sync::mpsc;

/// Non-2xx bodies are buffered (and truncated) so the failover loop can
/// classify them; only 2xx event streams flow through untouched.
pub const ERROR_BODY_LIMIT: usize = 64 * 1024;

pub type ByteStream = mpsc::Receiver<Bytes>;

#[derive(Debug)]
pub enum UpstreamBody {
    Bytes(Bytes),
    Stream(ByteStream),
}

#[derive(Debug)]
pub struct UpstreamHttpResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: UpstreamBody,
}

#[derive(Debug, Clone)]
pub struct UpstreamHttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("upstream transport error: {message}")]
pub struct UpstreamTransportError {
    pub message: String,
}

#[async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn send(
        &self,
        request: UpstreamHttpRequest,
    ) -> Result<UpstreamHttpResponse, UpstreamTransportError>;
}

#[derive(Debug, Clone)]
pub struct UpstreamClientConfig {
    pub proxy: Option<String>,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub stream_idle_timeout: Duration,
}

impl Default for UpstreamClientConfig {
    fn default() -> Self {
        Self {
            proxy: None,
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(86400),
            stream_idle_timeout: Duration::from_secs(30),
        }
    }
}

pub struct WreqUpstreamClient {
    client: wreq::Client,
}

impl WreqUpstreamClient {
    pub fn new(config: UpstreamClientConfig) -> Result<Self, wreq::Error> {
        let mut builder = wreq::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .read_timeout(config.stream_idle_timeout);
        if let Some(proxy) = config.proxy.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
            builder = builder.proxy(wreq::Proxy::all(proxy)?);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }
}

#[async_trait]
impl UpstreamClient for WreqUpstreamClient {
    async fn send(
        &self,
        request: UpstreamHttpRequest,
    ) -> Result<UpstreamHttpResponse, UpstreamTransportError> {
        let method = match request.method.as_str() {
            "GET" => wreq::Method::GET,
            "POST" => wreq::Method::POST,
            "PUT" => wreq::Method::PUT,
            "PATCH" => wreq::Method::PATCH,
            "DELETE" => wreq::Method::DELETE,
            "HEAD" => wreq::Method::HEAD,
            other => {
                return Err(UpstreamTransportError {
                    message: format!("unsupported method {other}"),
                });
            }
        };
        let mut builder = self.client.request(method, &request.url);
        for (name, value) in request.headers.iter() {
            if let Ok(value) = value.to_str() {
                builder = builder.header(name.as_str(), value);
            }
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|err| UpstreamTransportError {
            message: err.to_string(),
        })?;

        let status = response.status().as_u16();
        let mut headers = HeaderMap::new();
        for (name, value) in response.headers().iter() {
            if let (Ok(name), Ok(value)) = (
                http::HeaderName::from_bytes(name.as_str().as_bytes()),
                http::HeaderValue::from_bytes(value.as_bytes()),
            ) {
                headers.insert(name, value);
            }
        }

        let is_event_stream = headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("text/event-stream"));

        if !(200..300).contains(&status) {
            // Error envelopes are small; buffer and bound them.
            let body = response.bytes().await.map_err(|err| UpstreamTransportError {
                message: err.to_string(),
            })?;
            let body = if body.len() > ERROR_BODY_LIMIT {
                body.slice(..ERROR_BODY_LIMIT)
            } else {
                body
            };
            return Ok(UpstreamHttpResponse {
                status,
                headers,
                body: UpstreamBody::Bytes(body),
            });
        }

        if is_event_stream {
            let (tx, rx) = mpsc::channel(16);
            let mut stream = response.bytes_stream();
            tokio::spawn(async move {
                while let Some(chunk) = stream.next().await {
                    match chunk {
                        Ok(bytes) => {
                            if tx.send(bytes).await.is_err() {
                                break;
                            }
                        }
                        Err(err) => {
                            tracing::warn!(event = "upstream_stream_error", error = %err);
                            break;
                        }
                    }
                }
            });
            return Ok(UpstreamHttpResponse {
                status,
                headers,
                body: UpstreamBody::Stream(rx),
            });
        }

        let body = response.bytes().await.map_err(|err| UpstreamTransportError {
            message: err.to_string(),
        })?;
        Ok(UpstreamHttpResponse {
            status,
            headers,
            body: UpstreamBody::Bytes(body),
        })
    }
}
