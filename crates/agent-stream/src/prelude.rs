//! Common imports for typical client usage.
pub use crate::{
    AbortHandle, ActiveStream, CollectedDiagnostics, InvocationStream, InvokeRequest,
    StreamClient, StreamConfig, StreamError, StreamEvent, StreamSession,
};
