use std::time::Duration;

use crate::errors::StreamError;

const DEFAULT_QUALIFIER: &str = "DEFAULT";

/// Configuration for invoking an agent runtime.
///
/// Built once and shared read-only (behind an `Arc`) by every session that
/// targets the same runtime. Nothing here is global; two sessions with
/// different configs can run concurrently.
#[derive(Clone, Debug)]
pub struct StreamConfig {
    /// ARN of the agent runtime to invoke.
    pub runtime_arn: String,
    /// Region used to derive the default endpoint.
    pub region: String,
    /// Endpoint override, for proxies or local test servers.
    pub endpoint: Option<String>,
    /// Runtime endpoint qualifier.
    pub qualifier: String,
    /// Connect timeout for the HTTP client.
    pub connect_timeout: Duration,
    /// Optional whole-request timeout. Unset by default because streams are
    /// long-lived.
    pub request_timeout: Option<Duration>,
    /// Bounded event buffer used by [`InvocationStream`](crate::InvocationStream).
    pub stream_buffer_capacity: usize,
}

impl StreamConfig {
    pub fn new(runtime_arn: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            runtime_arn: runtime_arn.into(),
            region: region.into(),
            endpoint: None,
            qualifier: DEFAULT_QUALIFIER.to_string(),
            connect_timeout: Duration::from_secs(30),
            request_timeout: None,
            stream_buffer_capacity: 128,
        }
    }

    /// Builds a config from the environment.
    ///
    /// - `AGENT_RUNTIME_ARN` (required)
    /// - `AGENT_RUNTIME_REGION`, falling back to `AWS_REGION`
    /// - `AGENT_RUNTIME_ENDPOINT` (optional endpoint override)
    /// - `AGENT_RUNTIME_QUALIFIER` (optional, defaults to `DEFAULT`)
    pub fn from_env() -> Result<Self, StreamError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, StreamError> {
        let read = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let arn = read("AGENT_RUNTIME_ARN").ok_or(StreamError::missing("AGENT_RUNTIME_ARN"))?;
        let endpoint = read("AGENT_RUNTIME_ENDPOINT");
        let region = read("AGENT_RUNTIME_REGION").or_else(|| read("AWS_REGION"));
        if region.is_none() && endpoint.is_none() {
            return Err(StreamError::missing("AGENT_RUNTIME_REGION"));
        }

        let mut config = Self::new(arn, region.unwrap_or_default());
        config.endpoint = endpoint;
        if let Some(qualifier) = read("AGENT_RUNTIME_QUALIFIER") {
            config.qualifier = qualifier;
        }
        Ok(config)
    }

    /// Overrides the endpoint (for proxies or test servers).
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifier = qualifier.into();
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn stream_buffer_capacity(mut self, capacity: usize) -> Self {
        self.stream_buffer_capacity = capacity;
        self
    }

    /// Resolves the invocation URL, failing if the runtime target or the
    /// routing key is missing.
    pub(crate) fn invocation_url(&self) -> Result<String, StreamError> {
        let arn = self.runtime_arn.trim();
        if arn.is_empty() {
            return Err(StreamError::missing("runtime ARN"));
        }
        let base = match self.endpoint.as_deref().map(str::trim) {
            Some(endpoint) if !endpoint.is_empty() => endpoint.trim_end_matches('/').to_string(),
            _ => {
                let region = self.region.trim();
                if region.is_empty() {
                    return Err(StreamError::missing("region"));
                }
                format!("https://bedrock-agentcore.{region}.amazonaws.com")
            }
        };
        let arn: String = url::form_urlencoded::byte_serialize(arn.as_bytes()).collect();
        let qualifier: String =
            url::form_urlencoded::byte_serialize(self.qualifier.trim().as_bytes()).collect();
        Ok(format!("{base}/runtimes/{arn}/invocations?qualifier={qualifier}"))
    }
}
