/// Errors surfaced to the caller of an invocation.
///
/// Frame decode failures are deliberately absent: they are recovered inside
/// the parser that hit them and reported through
/// [`DiagnosticSink`](crate::parser::DiagnosticSink) instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// A required credential or target setting was missing. Raised before any
    /// network contact.
    #[error("missing precondition: {name}")]
    MissingPrecondition { name: &'static str },
    /// Invalid caller input (blank prompt, malformed session id, ...).
    #[error("validation error: {0}")]
    Validation(String),
    /// Invalid client or registry configuration.
    #[error("config error: {0}")]
    Config(String),
    /// The request could not be sent or the body could not be read.
    #[error("transport error: {0}")]
    Transport(String),
    /// Upstream answered with a non-success status.
    #[error("upstream returned status {status}: {body}")]
    Status { status: u16, body: String },
    /// The invocation was cancelled by the caller.
    #[error("cancelled")]
    Cancelled,
    /// Internal invariant violation (for example a read loop that ended
    /// without reporting a result).
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl StreamError {
    pub(crate) fn missing(name: &'static str) -> Self {
        Self::MissingPrecondition { name }
    }

    pub(crate) fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    pub(crate) fn protocol_msg(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Returns the upstream status code for [`StreamError::Status`].
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns the verbatim upstream body for [`StreamError::Status`].
    pub fn body(&self) -> Option<&str> {
        match self {
            Self::Status { body, .. } => Some(body),
            _ => None,
        }
    }

    /// True when the failure happened before the request left the process.
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::MissingPrecondition { .. } | Self::Validation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_exposes_code_and_body() {
        let err = StreamError::Status {
            status: 502,
            body: "boom".into(),
        };
        assert_eq!(err.status(), Some(502));
        assert_eq!(err.body(), Some("boom"));
        assert_eq!(err.to_string(), "upstream returned status 502: boom");
    }

    #[test]
    fn precondition_errors_name_the_missing_setting() {
        let err = StreamError::missing("bearer token");
        assert!(err.is_precondition());
        assert!(err.to_string().contains("bearer token"));
        assert!(!StreamError::transport("reset").is_precondition());
    }
}
