use std::fmt;
use std::pin::Pin;

use bytes::Bytes;
use futures::StreamExt as _;
use tracing::debug;

use crate::config::StreamConfig;
use crate::errors::StreamError;

/// Ordered body chunks, ended by the stream returning `None`.
pub type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<Bytes, StreamError>> + Send + 'static>>;

const STREAM_CONTENT_TYPE: &str = "text/event-stream";
const JSON_CONTENT_TYPE: &str = "application/json";

/// One invocation request, fully resolved by the client.
#[derive(Clone)]
pub struct TransportRequest {
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: serde_json::Value,
}

impl TransportRequest {
    /// Returns the first header value with this name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

impl fmt::Debug for TransportRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let headers: Vec<(&str, &str)> = self
            .headers
            .iter()
            .map(|(key, value)| {
                if key.eq_ignore_ascii_case("authorization") {
                    (*key, "<redacted>")
                } else {
                    (*key, value.as_str())
                }
            })
            .collect();
        f.debug_struct("TransportRequest")
            .field("url", &self.url)
            .field("headers", &headers)
            .field("body", &self.body)
            .finish()
    }
}

/// Response body as handed over by a transport.
pub enum ResponseBody {
    /// Incremental body, read chunk by chunk.
    Stream(ByteStream),
    /// The upstream answered without a readable stream; this is the whole body.
    Complete(String),
}

impl ResponseBody {
    /// Reads the whole body into a string.
    pub async fn read_to_string(self) -> Result<String, StreamError> {
        match self {
            Self::Complete(text) => Ok(text),
            Self::Stream(mut stream) => {
                let mut bytes = Vec::new();
                while let Some(chunk) = stream.next().await {
                    bytes.extend_from_slice(&chunk?);
                }
                Ok(String::from_utf8_lossy(&bytes).into_owned())
            }
        }
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stream(_) => f.write_str("ResponseBody::Stream(..)"),
            Self::Complete(text) => f.debug_tuple("ResponseBody::Complete").field(text).finish(),
        }
    }
}

#[derive(Debug)]
pub struct TransportResponse {
    pub status: u16,
    pub body: ResponseBody,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Delivers one request and hands back the status plus an ordered body.
///
/// Implementations must not interpret the body; framing and decoding belong
/// to the client.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, StreamError>;
}

/// HTTP transport backed by `reqwest`.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: &StreamConfig) -> Result<Self, StreamError> {
        let mut builder = reqwest::Client::builder().connect_timeout(config.connect_timeout);
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| StreamError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Wraps an existing client (shared connection pool, custom TLS, ...).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, StreamError> {
        let mut http_req = self.client.post(&request.url);
        for (name, value) in &request.headers {
            http_req = http_req.header(*name, value);
        }
        let response = http_req
            .json(&request.body)
            .send()
            .await
            .map_err(|e| StreamError::transport(format!("invocation request failed: {e}")))?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        debug!(status = status.as_u16(), content_type = %content_type, "invocation response received");

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Ok(TransportResponse {
                status: status.as_u16(),
                body: ResponseBody::Complete(body),
            });
        }

        if content_type.starts_with(JSON_CONTENT_TYPE) {
            let body = response
                .text()
                .await
                .map_err(|e| StreamError::transport(format!("failed to read response body: {e}")))?;
            return Ok(TransportResponse {
                status: status.as_u16(),
                body: ResponseBody::Complete(body),
            });
        }

        if !content_type.is_empty() && !content_type.starts_with(STREAM_CONTENT_TYPE) {
            debug!(content_type = %content_type, "streaming response with unexpected content type");
        }
        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| StreamError::transport(format!("stream read failed: {e}"))));
        Ok(TransportResponse {
            status: status.as_u16(),
            body: ResponseBody::Stream(Box::pin(stream)),
        })
    }
}
