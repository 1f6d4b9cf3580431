//! Invocation orchestration.
//!
//! [`StreamClient::open`] validates the request, sends it and hands back an
//! [`ActiveStream`] that pulls the body one chunk at a time. Every chunk is
//! split into frames and every frame is dispatched through the
//! [`ParserRegistry`] before the next chunk is requested, so nothing is read
//! ahead of the caller.

use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt as _;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::StreamConfig;
use crate::errors::StreamError;
use crate::event::StreamEvent;
use crate::frame::FrameBuffer;
use crate::parser::{DiagnosticSink, ParseContext, ParserRegistry};
use crate::session::{StreamSession, TraceId};
use crate::transport::{ByteStream, HttpTransport, ResponseBody, Transport, TransportRequest};

const SESSION_HEADER: &str = "X-Amzn-Bedrock-AgentCore-Runtime-Session-Id";
const TRACE_HEADER: &str = "X-Amzn-Trace-Id";
const ACCEPT: &str = "text/event-stream, application/json";

/// Caller input for one invocation.
#[derive(Clone, Debug, Default)]
pub struct InvokeRequest {
    prompt: String,
    bearer_token: Option<String>,
    resume_session: Option<String>,
    extra: serde_json::Map<String, Value>,
}

impl InvokeRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    /// Bearer token sent as `Authorization`. Required.
    pub fn bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Resumes an upstream agent session, as announced earlier through a
    /// `session_id` lifecycle event.
    pub fn resume_session(mut self, claude_session_id: impl Into<String>) -> Self {
        self.resume_session = Some(claude_session_id.into());
        self
    }

    /// Adds a field to the JSON payload. The prompt and session fields always
    /// win over extra fields with the same name.
    pub fn payload_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }
}

/// Lifecycle of one invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Requesting,
    Streaming,
    Completed,
    Errored,
}

impl Phase {
    pub fn can_advance_to(self, next: Phase) -> bool {
        matches!(
            (self, next),
            (Phase::Idle, Phase::Requesting)
                | (Phase::Requesting, Phase::Streaming)
                | (Phase::Requesting, Phase::Completed)
                | (Phase::Requesting | Phase::Streaming, Phase::Errored)
                | (Phase::Streaming, Phase::Completed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Completed | Phase::Errored)
    }
}

#[derive(Debug)]
struct PhaseTracker {
    phase: Phase,
    trace_id: TraceId,
}

impl PhaseTracker {
    fn new(trace_id: TraceId) -> Self {
        Self {
            phase: Phase::Idle,
            trace_id,
        }
    }

    fn advance(&mut self, next: Phase) {
        debug_assert!(
            self.phase.can_advance_to(next),
            "illegal phase transition {:?} -> {:?}",
            self.phase,
            next
        );
        debug!(trace_id = %self.trace_id, from = ?self.phase, to = ?next, "invocation phase");
        self.phase = next;
    }
}

/// Holds the response body for the lifetime of the read loop.
///
/// Dropping the lease releases the underlying connection, whichever way the
/// loop ended.
struct BodyLease {
    stream: Option<ByteStream>,
    trace_id: TraceId,
    chunks: u64,
}

impl BodyLease {
    fn new(stream: ByteStream, trace_id: TraceId) -> Self {
        Self {
            stream: Some(stream),
            trace_id,
            chunks: 0,
        }
    }

    async fn next_chunk(&mut self) -> Option<Result<Bytes, StreamError>> {
        let stream = self.stream.as_mut()?;
        let next = stream.next().await;
        if matches!(next, Some(Ok(_))) {
            self.chunks += 1;
        }
        next
    }
}

impl Drop for BodyLease {
    fn drop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            debug!(trace_id = %self.trace_id, chunks = self.chunks, "released response body");
        }
    }
}

/// Client that invokes an agent runtime and normalizes its streamed output.
///
/// Cheap to clone; clones share the transport, registry and diagnostic sink.
#[derive(Clone)]
pub struct StreamClient {
    transport: Arc<dyn Transport>,
    registry: Arc<ParserRegistry>,
    diagnostics: Option<Arc<dyn DiagnosticSink>>,
}

impl StreamClient {
    /// Client over a custom transport, with the built-in formats.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            registry: Arc::new(ParserRegistry::with_builtin_formats()),
            diagnostics: None,
        }
    }

    /// Client over HTTP, configured from `config`.
    pub fn http(config: &StreamConfig) -> Result<Self, StreamError> {
        Ok(Self::new(Arc::new(HttpTransport::new(config)?)))
    }

    pub fn with_registry(mut self, registry: ParserRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    /// Routes frame decode failures to `sink` in addition to the log.
    pub fn with_diagnostics(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.diagnostics = Some(sink);
        self
    }

    pub fn registry(&self) -> &ParserRegistry {
        &self.registry
    }

    /// Runs one invocation to completion.
    ///
    /// `on_event` is called once per normalized event, in order, as frames
    /// arrive. Returns the completion: every `text` fragment concatenated.
    pub async fn invoke<F>(
        &self,
        session: &StreamSession,
        request: InvokeRequest,
        mut on_event: F,
    ) -> Result<String, StreamError>
    where
        F: FnMut(StreamEvent),
    {
        let mut active = self.open(session, request).await?;
        while let Some(events) = active.next_events().await? {
            events.into_iter().for_each(&mut on_event);
        }
        Ok(active.into_completion())
    }

    /// Runs one invocation and returns only the completion.
    pub async fn collect_text(
        &self,
        session: &StreamSession,
        request: InvokeRequest,
    ) -> Result<String, StreamError> {
        self.invoke(session, request, |_| {}).await
    }

    /// Sends the request and returns a pull-based reader over the response.
    ///
    /// Fails before any network contact when a precondition is missing, and
    /// with [`StreamError::Status`] when the upstream rejects the request.
    pub async fn open(
        &self,
        session: &StreamSession,
        request: InvokeRequest,
    ) -> Result<ActiveStream, StreamError> {
        let trace_id = session.next_trace_id();
        let transport_request = prepare(session, &request, &trace_id)?;

        let mut phase = PhaseTracker::new(trace_id.clone());
        phase.advance(Phase::Requesting);
        info!(session_id = session.session_id(), trace_id = %trace_id, "invoking agent runtime");

        let response = match self.transport.send(transport_request).await {
            Ok(response) => response,
            Err(err) => {
                phase.advance(Phase::Errored);
                warn!(trace_id = %trace_id, error = %err, "invocation request failed");
                return Err(err);
            }
        };

        let mut stream = ActiveStream {
            registry: self.registry.clone(),
            cx: ParseContext::new(self.diagnostics.clone()),
            completion: String::new(),
            body: None,
            ready: Vec::new(),
            phase,
        };

        if !response.is_success() {
            let status = response.status;
            let body = response
                .body
                .read_to_string()
                .await
                .unwrap_or_else(|e| format!("<unreadable body: {e}>"));
            stream.phase.advance(Phase::Errored);
            warn!(trace_id = %trace_id, status, "agent runtime rejected invocation");
            return Err(StreamError::Status { status, body });
        }

        match response.body {
            ResponseBody::Stream(body) => {
                stream.body = Some((BodyLease::new(body, trace_id), FrameBuffer::new()));
                stream.phase.advance(Phase::Streaming);
            }
            ResponseBody::Complete(body) => {
                let text = complete_text(body);
                stream.completion = stream.cx.push_text(String::new(), &text);
                stream.ready = stream.cx.take_events();
                stream.phase.advance(Phase::Completed);
                info!(trace_id = %trace_id, completion_len = stream.completion.len(), "invocation completed without stream");
            }
        }
        Ok(stream)
    }
}

impl std::fmt::Debug for StreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamClient")
            .field("registry", &self.registry)
            .field("diagnostics", &self.diagnostics.is_some())
            .finish_non_exhaustive()
    }
}

/// Resolves the outbound request. Checks run in order: credential, target,
/// session id, prompt.
fn prepare(
    session: &StreamSession,
    request: &InvokeRequest,
    trace_id: &TraceId,
) -> Result<TransportRequest, StreamError> {
    let token = request
        .bearer_token
        .as_deref()
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(StreamError::missing("bearer token"))?;
    let url = session.config().invocation_url()?;
    session.validate()?;
    if request.prompt.trim().is_empty() {
        return Err(StreamError::Validation("prompt must not be empty".into()));
    }

    let mut body = request.extra.clone();
    body.insert("prompt".into(), Value::String(request.prompt.clone()));
    body.insert(
        "runtimeSessionId".into(),
        Value::String(session.session_id().to_owned()),
    );
    if let Some(resume) = request.resume_session.as_deref().filter(|id| !id.is_empty()) {
        body.insert("claude_session_id".into(), Value::String(resume.to_owned()));
    }

    Ok(TransportRequest {
        url,
        headers: vec![
            ("Authorization", format!("Bearer {token}")),
            ("Content-Type", "application/json".to_string()),
            ("Accept", ACCEPT.to_string()),
            (SESSION_HEADER, session.session_id().to_owned()),
            (TRACE_HEADER, trace_id.to_string()),
        ],
        body: Value::Object(body),
    })
}

/// A whole-body response is the completion itself; a JSON string body is
/// unwrapped first.
fn complete_text(body: String) -> String {
    let trimmed = body.trim();
    if trimmed.starts_with('"')
        && let Ok(text) = serde_json::from_str::<String>(trimmed)
    {
        return text;
    }
    body
}

/// Pull-based reader over one invocation's response.
///
/// Each [`next_events`](Self::next_events) call reads at most one body chunk
/// and returns the events of every frame it completed. Dropping the reader
/// releases the response body.
pub struct ActiveStream {
    registry: Arc<ParserRegistry>,
    cx: ParseContext,
    completion: String,
    body: Option<(BodyLease, FrameBuffer)>,
    ready: Vec<StreamEvent>,
    phase: PhaseTracker,
}

impl ActiveStream {
    /// Returns the next batch of events, or `None` once the body has ended.
    ///
    /// At end of input the pending partial frame, if any, is dispatched as a
    /// final frame before `None` is returned. Never polls the body again
    /// after it ended or failed.
    pub async fn next_events(&mut self) -> Result<Option<Vec<StreamEvent>>, StreamError> {
        loop {
            if !self.ready.is_empty() {
                return Ok(Some(std::mem::take(&mut self.ready)));
            }
            let Some((lease, frames)) = self.body.as_mut() else {
                return Ok(None);
            };
            match lease.next_chunk().await {
                Some(Ok(chunk)) => {
                    let complete = frames.append(&chunk);
                    self.dispatch_all(&complete);
                }
                Some(Err(err)) => {
                    self.body = None;
                    self.phase.advance(Phase::Errored);
                    warn!(trace_id = %self.phase.trace_id, error = %err, "response body read failed");
                    return Err(err);
                }
                None => {
                    if let Some((lease, frames)) = self.body.take() {
                        drop(lease);
                        if let Some(tail) = frames.finish() {
                            self.dispatch_all(std::slice::from_ref(&tail));
                        }
                    }
                    self.phase.advance(Phase::Completed);
                    info!(
                        trace_id = %self.phase.trace_id,
                        completion_len = self.completion.len(),
                        decode_failures = self.cx.decode_failures(),
                        "invocation completed"
                    );
                }
            }
            self.ready = self.cx.take_events();
        }
    }

    fn dispatch_all(&mut self, frames: &[String]) {
        for frame in frames {
            let accumulated = std::mem::take(&mut self.completion);
            self.completion = self.registry.dispatch(frame, accumulated, &mut self.cx);
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase.phase
    }

    pub fn trace_id(&self) -> &TraceId {
        &self.phase.trace_id
    }

    /// Text accumulated so far.
    pub fn completion(&self) -> &str {
        &self.completion
    }

    /// Frames that were recognized but failed to decode.
    pub fn decode_failures(&self) -> usize {
        self.cx.decode_failures()
    }

    pub fn into_completion(self) -> String {
        self.completion
    }
}

impl std::fmt::Debug for ActiveStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveStream")
            .field("phase", &self.phase.phase)
            .field("trace_id", &self.phase.trace_id)
            .field("completion_len", &self.completion.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::parser::CollectedDiagnostics;
    use futures::StreamExt as _;
    use futures::stream;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    pub(crate) const SESSION_ID: &str = "0123456789abcdef0123456789abcdef-test";

    pub(crate) enum FakeBody {
        Chunks(Vec<Vec<u8>>),
        FailAfter(Vec<Vec<u8>>),
        Pending(Vec<Vec<u8>>),
        Complete(String),
    }

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    pub(crate) struct FakeTransport {
        status: u16,
        body: Mutex<Option<FakeBody>>,
        pub(crate) calls: AtomicUsize,
        pub(crate) released: Arc<AtomicBool>,
        pub(crate) last_request: Mutex<Option<TransportRequest>>,
    }

    impl FakeTransport {
        pub(crate) fn new(status: u16, body: FakeBody) -> Arc<Self> {
            Arc::new(Self {
                status,
                body: Mutex::new(Some(body)),
                calls: AtomicUsize::new(0),
                released: Arc::new(AtomicBool::new(false)),
                last_request: Mutex::new(None),
            })
        }

        pub(crate) fn chunks(chunks: &[&str]) -> Arc<Self> {
            Self::new(
                200,
                FakeBody::Chunks(chunks.iter().map(|c| c.as_bytes().to_vec()).collect()),
            )
        }
    }

    #[async_trait::async_trait]
    impl Transport for FakeTransport {
        async fn send(
            &self,
            request: TransportRequest,
        ) -> Result<crate::transport::TransportResponse, StreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock().expect("lock") = Some(request);
            let body = self.body.lock().expect("lock").take().expect("single use");
            let guard = DropFlag(self.released.clone());
            let into_items = |chunks: Vec<Vec<u8>>| {
                chunks
                    .into_iter()
                    .map(|c| Ok(Bytes::from(c)))
                    .collect::<Vec<Result<Bytes, StreamError>>>()
            };
            let body = match body {
                FakeBody::Complete(text) => ResponseBody::Complete(text),
                FakeBody::Chunks(chunks) => ResponseBody::Stream(Box::pin(
                    stream::iter(into_items(chunks)).map(move |item| {
                        let _held = &guard;
                        item
                    }),
                )),
                FakeBody::FailAfter(chunks) => {
                    let mut items = into_items(chunks);
                    items.push(Err(StreamError::transport("connection reset")));
                    ResponseBody::Stream(Box::pin(stream::iter(items).map(move |item| {
                        let _held = &guard;
                        item
                    })))
                }
                FakeBody::Pending(chunks) => ResponseBody::Stream(Box::pin(
                    stream::iter(into_items(chunks))
                        .chain(stream::pending())
                        .map(move |item| {
                            let _held = &guard;
                            item
                        }),
                )),
            };
            Ok(crate::transport::TransportResponse {
                status: self.status,
                body,
            })
        }
    }

    pub(crate) fn session() -> StreamSession {
        StreamSession::with_id(
            Arc::new(StreamConfig::new("rt", "us-east-1")),
            SESSION_ID,
        )
    }

    pub(crate) fn request() -> InvokeRequest {
        InvokeRequest::new("hello").bearer_token("tok")
    }

    async fn run(
        client: &StreamClient,
        request: InvokeRequest,
    ) -> (Result<String, StreamError>, Vec<StreamEvent>) {
        let mut events = Vec::new();
        let result = client
            .invoke(&session(), request, |event| events.push(event))
            .await;
        (result, events)
    }

    const SSE_BODY: &str = "data: {\"data\":\"Hel\"}\ndata: {\"data\":\"lo\"}\ndata: {\"claude_session_id\":\"abc\"}\n";

    #[tokio::test]
    async fn sse_frames_yield_text_and_session_marker() {
        let transport = FakeTransport::chunks(&[SSE_BODY]);
        let client = StreamClient::new(transport.clone());
        let (result, events) = run(&client, request()).await;
        assert_eq!(result.expect("completion"), "Hello");
        assert_eq!(
            events,
            vec![
                StreamEvent::text("Hel"),
                StreamEvent::text("lo"),
                StreamEvent::lifecycle_with("session_id", "abc"),
            ]
        );
        assert!(transport.released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn tool_use_frame_yields_start_then_delta() {
        let transport = FakeTransport::chunks(&[
            "{\"current_tool_use\":{\"toolUseId\":\"t1\",\"name\":\"search\",\"input\":{\"q\":\"x\"}}}\n",
        ]);
        let (result, events) = run(&StreamClient::new(transport), request()).await;
        assert_eq!(result.expect("completion"), "");
        assert_eq!(
            events,
            vec![
                StreamEvent::tool_use_start("t1", "search"),
                StreamEvent::tool_use_delta("t1", "{\"q\":\"x\"}"),
            ]
        );
    }

    #[tokio::test]
    async fn error_status_carries_body_and_emits_nothing() {
        let transport = FakeTransport::new(500, FakeBody::Chunks(vec![b"boom".to_vec()]));
        let (result, events) = run(&StreamClient::new(transport.clone()), request()).await;
        let err = result.expect_err("status error");
        assert_eq!(err.status(), Some(500));
        assert_eq!(err.body(), Some("boom"));
        assert!(events.is_empty());
        assert!(transport.released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn bodyless_response_is_one_text_event() {
        let transport = FakeTransport::new(200, FakeBody::Complete("done".into()));
        let client = StreamClient::new(transport);
        let mut active = client.open(&session(), request()).await.expect("open");
        assert_eq!(active.phase(), Phase::Completed);
        let events = active.next_events().await.expect("events");
        assert_eq!(events, Some(vec![StreamEvent::text("done")]));
        assert_eq!(active.next_events().await.expect("end"), None);
        assert_eq!(active.into_completion(), "done");
    }

    #[tokio::test]
    async fn json_string_body_is_unwrapped() {
        let transport = FakeTransport::new(200, FakeBody::Complete("\"all done\"".into()));
        let (result, events) = run(&StreamClient::new(transport), request()).await;
        assert_eq!(result.expect("completion"), "all done");
        assert_eq!(events, vec![StreamEvent::text("all done")]);
    }

    #[tokio::test]
    async fn events_do_not_depend_on_chunk_boundaries() {
        let whole = {
            let (result, events) =
                run(&StreamClient::new(FakeTransport::chunks(&[SSE_BODY])), request()).await;
            (result.expect("whole"), events)
        };

        for split in 1..SSE_BODY.len() {
            let (a, b) = SSE_BODY.as_bytes().split_at(split);
            let transport = FakeTransport::new(200, FakeBody::Chunks(vec![a.to_vec(), b.to_vec()]));
            let (result, events) = run(&StreamClient::new(transport), request()).await;
            assert_eq!((result.expect("split"), events), whole, "split at {split}");
        }

        let bytes: Vec<Vec<u8>> = SSE_BODY.bytes().map(|b| vec![b]).collect();
        let (result, events) =
            run(&StreamClient::new(FakeTransport::new(200, FakeBody::Chunks(bytes))), request())
                .await;
        assert_eq!((result.expect("bytewise"), events), whole);
    }

    #[tokio::test]
    async fn text_events_concatenate_to_completion() {
        let transport = FakeTransport::chunks(&[
            "{\"data\":\"a\"}\n{\"type\":\"AIMessageChunk\",\"content\":\"b\"}\n",
            "data: \"c\"\n{\"data\":\"\"}\n",
        ]);
        let (result, events) = run(&StreamClient::new(transport), request()).await;
        let joined: String = events.iter().filter_map(StreamEvent::as_text).collect();
        assert_eq!(result.expect("completion"), joined);
        assert_eq!(joined, "abc");
    }

    #[tokio::test]
    async fn malformed_frame_does_not_block_later_formats() {
        let diagnostics = CollectedDiagnostics::new();
        let transport = FakeTransport::chunks(&[
            "{\"data\": oops}\n",
            "{\"type\":\"AIMessageChunk\",\"content\":\"fine\"}\n",
        ]);
        let client = StreamClient::new(transport).with_diagnostics(Arc::new(diagnostics.clone()));
        let (result, events) = run(&client, request()).await;
        assert_eq!(result.expect("completion"), "fine");
        assert_eq!(events, vec![StreamEvent::text("fine")]);
        let records = diagnostics.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].parser, "strands");
    }

    #[tokio::test]
    async fn unterminated_tail_is_flushed_at_end_of_stream() {
        let transport = FakeTransport::chunks(&["{\"data\":\"a\"}\n{\"data\":", "\"b\"}"]);
        let (result, events) = run(&StreamClient::new(transport), request()).await;
        assert_eq!(result.expect("completion"), "ab");
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn unrecognized_frames_are_skipped_silently() {
        let diagnostics = CollectedDiagnostics::new();
        let transport = FakeTransport::chunks(&["event: ping\n: keepalive\n{\"unknown\":1}\n\n"]);
        let client = StreamClient::new(transport).with_diagnostics(Arc::new(diagnostics.clone()));
        let (result, events) = run(&client, request()).await;
        assert_eq!(result.expect("completion"), "");
        assert!(events.is_empty());
        assert!(diagnostics.is_empty());
    }

    #[tokio::test]
    async fn preconditions_fail_before_network_contact() {
        let transport = FakeTransport::chunks(&[SSE_BODY]);
        let client = StreamClient::new(transport.clone());

        let err = client
            .invoke(&session(), InvokeRequest::new("hi"), |_| {})
            .await
            .expect_err("no token");
        assert_eq!(err, StreamError::missing("bearer token"));
        assert!(err.is_precondition());

        let no_region = StreamSession::with_id(Arc::new(StreamConfig::new("rt", "")), SESSION_ID);
        let err = client
            .invoke(&no_region, request(), |_| {})
            .await
            .expect_err("no region");
        assert_eq!(err, StreamError::missing("region"));

        let short = StreamSession::with_id(Arc::new(StreamConfig::new("rt", "us-east-1")), "s1");
        let err = client.invoke(&short, request(), |_| {}).await.expect_err("short id");
        assert!(matches!(err, StreamError::Validation(_)));

        let err = client
            .invoke(&session(), InvokeRequest::new("  ").bearer_token("tok"), |_| {})
            .await
            .expect_err("blank prompt");
        assert!(matches!(err, StreamError::Validation(msg) if msg.contains("prompt")));

        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn request_carries_identity_headers_and_payload() {
        let transport = FakeTransport::chunks(&[]);
        let client = StreamClient::new(transport.clone());
        let request = request()
            .resume_session("claude-123")
            .payload_field("prompt", serde_json::json!("shadowed"))
            .payload_field("mode", serde_json::json!("fast"));
        client.invoke(&session(), request, |_| {}).await.expect("invoke");

        let sent = transport
            .last_request
            .lock()
            .expect("lock")
            .clone()
            .expect("request sent");
        assert_eq!(
            sent.url,
            "https://bedrock-agentcore.us-east-1.amazonaws.com/runtimes/rt/invocations?qualifier=DEFAULT"
        );
        assert_eq!(sent.header("authorization"), Some("Bearer tok"));
        assert_eq!(sent.header("content-type"), Some("application/json"));
        assert_eq!(sent.header(SESSION_HEADER), Some(SESSION_ID));
        let trace = sent.header(TRACE_HEADER).expect("trace header");
        assert!(trace.starts_with("1-"));
        assert_eq!(trace.split('-').count(), 3);
        assert_eq!(
            sent.body,
            serde_json::json!({
                "prompt": "hello",
                "runtimeSessionId": SESSION_ID,
                "claude_session_id": "claude-123",
                "mode": "fast",
            })
        );
    }

    #[tokio::test]
    async fn mid_stream_failure_is_surfaced_and_releases_body() {
        let transport =
            FakeTransport::new(200, FakeBody::FailAfter(vec![b"{\"data\":\"par\"}\n".to_vec()]));
        let client = StreamClient::new(transport.clone());
        let mut active = client.open(&session(), request()).await.expect("open");
        assert_eq!(
            active.next_events().await.expect("first chunk"),
            Some(vec![StreamEvent::text("par")])
        );
        let err = active.next_events().await.expect_err("read failure");
        assert!(matches!(err, StreamError::Transport(msg) if msg.contains("reset")));
        assert_eq!(active.phase(), Phase::Errored);
        assert!(transport.released.load(Ordering::SeqCst));
        assert_eq!(active.next_events().await.expect("after error"), None);
    }

    #[tokio::test]
    async fn abandoning_the_reader_releases_the_body() {
        let transport =
            FakeTransport::new(200, FakeBody::Pending(vec![b"{\"data\":\"x\"}\n".to_vec()]));
        let client = StreamClient::new(transport.clone());
        let mut active = client.open(&session(), request()).await.expect("open");
        assert_eq!(active.phase(), Phase::Streaming);
        active.next_events().await.expect("first chunk");
        assert!(!transport.released.load(Ordering::SeqCst));
        drop(active);
        assert!(transport.released.load(Ordering::SeqCst));
    }

    #[test]
    fn phase_transitions_follow_the_state_machine() {
        assert!(Phase::Idle.can_advance_to(Phase::Requesting));
        assert!(Phase::Requesting.can_advance_to(Phase::Completed));
        assert!(Phase::Streaming.can_advance_to(Phase::Errored));
        assert!(!Phase::Idle.can_advance_to(Phase::Errored));
        assert!(!Phase::Completed.can_advance_to(Phase::Streaming));
        assert!(!Phase::Errored.can_advance_to(Phase::Completed));
        assert!(Phase::Errored.is_terminal());
        assert!(!Phase::Streaming.is_terminal());
    }
}
