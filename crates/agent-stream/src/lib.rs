//! Streaming client for agent runtimes.
//!
//! Opens a long-lived invocation response, reassembles its body into lines
//! and runs every line through a registry of format decoders (Strands-style
//! envelopes, LangGraph message chunks, `data:` SSE records). Callers see one
//! normalized [`StreamEvent`] model and get the assembled completion text at
//! the end.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use agent_stream::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), StreamError> {
//! let config = Arc::new(StreamConfig::from_env()?);
//! let client = StreamClient::http(&config)?;
//! let session = StreamSession::new(config);
//!
//! let completion = client
//!     .invoke(
//!         &session,
//!         InvokeRequest::new("Summarize the last release").bearer_token("token"),
//!         |event| {
//!             if let StreamEvent::Text { text } = &event {
//!                 print!("{text}");
//!             }
//!         },
//!     )
//!     .await?;
//! println!("\n{} characters", completion.len());
//! # Ok(())
//! # }
//! ```

/// Invocation orchestration and the pull-based response reader.
pub mod client;
/// Runtime target and HTTP settings.
pub mod config;
/// Public error type.
pub mod errors;
/// Normalized stream events.
pub mod event;
/// Line reassembly across body chunks.
pub mod frame;
/// Process-wide logging setup.
pub mod observability;
/// Format decoders and the registry that dispatches frames to them.
pub mod parser;
/// Common imports for typical usage.
pub mod prelude;
/// Session identity and trace ids.
pub mod session;
/// Spawned read loop, event channel and cancellation.
pub mod stream;
/// Transport contract and the HTTP implementation.
pub mod transport;

pub use client::{ActiveStream, InvokeRequest, Phase, StreamClient};
pub use config::StreamConfig;
pub use errors::StreamError;
pub use event::StreamEvent;
pub use frame::FrameBuffer;
pub use observability::{ObservabilitySettings, init_observability, init_observability_with};
pub use parser::{
    CollectedDiagnostics, DecodeDiagnostic, DiagnosticSink, ParseContext, Parser,
    ParserRegistry, ParserRegistryBuilder, Recognition,
};
pub use session::{StreamSession, TraceId};
pub use stream::{AbortHandle, InvocationStream};
pub use transport::{HttpTransport, ResponseBody, Transport, TransportRequest, TransportResponse};
