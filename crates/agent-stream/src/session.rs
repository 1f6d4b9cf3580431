use std::fmt;
use std::sync::Arc;

use crate::config::StreamConfig;
use crate::errors::StreamError;

/// Shortest runtime session id the upstream service accepts.
pub const MIN_SESSION_ID_LEN: usize = 33;

const TRACE_SCHEME: &str = "1";
const TRACE_RANDOM_HEX: usize = 24;

/// One conversation against an agent runtime.
///
/// Holds the session id (generated once, or supplied by the caller to resume
/// a conversation) and the shared runtime configuration. Cloning is cheap.
#[derive(Clone, Debug)]
pub struct StreamSession {
    config: Arc<StreamConfig>,
    session_id: String,
}

impl StreamSession {
    /// Creates a session with a freshly generated id.
    pub fn new(config: Arc<StreamConfig>) -> Self {
        Self {
            config,
            session_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Creates a session with a caller-supplied id.
    pub fn with_id(config: Arc<StreamConfig>, session_id: impl Into<String>) -> Self {
        Self {
            config,
            session_id: session_id.into(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Creates the trace id for the next request in this session.
    pub fn next_trace_id(&self) -> TraceId {
        TraceId::generate()
    }

    pub(crate) fn validate(&self) -> Result<(), StreamError> {
        if self.session_id.trim().len() < MIN_SESSION_ID_LEN {
            return Err(StreamError::Validation(format!(
                "session id must be at least {MIN_SESSION_ID_LEN} characters"
            )));
        }
        Ok(())
    }
}

/// Per-request correlation id: `<scheme>-<hex unix seconds>-<random hex>`.
///
/// Only sent upstream for observability; never used for application logic.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TraceId(String);

impl TraceId {
    pub fn generate() -> Self {
        Self::at(chrono::Utc::now().timestamp())
    }

    /// Builds a trace id for the given unix time with a fresh random part.
    pub fn at(unix_seconds: i64) -> Self {
        let random = uuid::Uuid::new_v4().simple().to_string();
        let random: String = random.chars().take(TRACE_RANDOM_HEX).collect();
        Self(format!("{TRACE_SCHEME}-{unix_seconds:08x}-{random}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
