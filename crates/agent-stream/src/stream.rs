use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;

use crate::client::{ActiveStream, InvokeRequest, StreamClient};
use crate::errors::StreamError;
use crate::event::StreamEvent;
use crate::session::{StreamSession, TraceId};

/// Handle used to request cancellation of a running invocation.
#[derive(Clone, Debug)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortHandle {
    /// Requests cancellation.
    ///
    /// The read loop stops at its next suspension point, releases the
    /// response body and [`InvocationStream::finish`] returns
    /// [`StreamError::Cancelled`].
    pub fn abort(&self) {
        let _ = self.tx.send(true);
    }
}

/// Streaming handle returned by [`StreamClient::start_stream`].
///
/// The read loop runs on its own task and forwards events through a bounded
/// channel. Use `next_event()` to consume events as they arrive and `finish()`
/// to obtain the completion.
#[derive(Debug)]
pub struct InvocationStream {
    session_id: String,
    trace_id: TraceId,
    rx: mpsc::Receiver<StreamEvent>,
    final_rx: oneshot::Receiver<Result<String, StreamError>>,
    abort_handle: AbortHandle,
}

impl InvocationStream {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn trace_id(&self) -> &TraceId {
        &self.trace_id
    }

    /// Returns a handle that can cancel the invocation.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort_handle.clone()
    }

    /// Waits for the next event. Returns `None` once the read loop ended.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        self.rx.recv().await
    }

    /// Drains remaining events (if any) and returns the completion or the
    /// error that ended the invocation.
    pub async fn finish(mut self) -> Result<String, StreamError> {
        while self.rx.recv().await.is_some() {}
        match self.final_rx.await {
            Ok(result) => result,
            Err(_) => Err(StreamError::protocol_msg(format!(
                "read loop ended without final result (trace_id={})",
                self.trace_id
            ))),
        }
    }
}

impl StreamClient {
    /// Opens the invocation and moves its read loop onto a spawned task.
    ///
    /// Precondition and status failures are returned here, before any task is
    /// spawned. Must be called from within a tokio runtime.
    pub async fn start_stream(
        &self,
        session: &StreamSession,
        request: InvokeRequest,
    ) -> Result<InvocationStream, StreamError> {
        let capacity = session.config().stream_buffer_capacity;
        if capacity == 0 {
            return Err(StreamError::Validation(
                "stream_buffer_capacity must be greater than 0".into(),
            ));
        }
        let active = self.open(session, request).await?;

        let (tx, rx) = mpsc::channel(capacity);
        let (final_tx, final_rx) = oneshot::channel();
        let (abort_tx, abort_rx) = watch::channel(false);
        let trace_id = active.trace_id().clone();
        tokio::spawn(run_task(active, tx, final_tx, abort_rx));

        Ok(InvocationStream {
            session_id: session.session_id().to_owned(),
            trace_id,
            rx,
            final_rx,
            abort_handle: AbortHandle { tx: abort_tx },
        })
    }
}

async fn run_task(
    mut active: ActiveStream,
    tx: mpsc::Sender<StreamEvent>,
    final_tx: oneshot::Sender<Result<String, StreamError>>,
    mut abort_rx: watch::Receiver<bool>,
) {
    let mut abort_live = true;
    loop {
        tokio::select! {
            biased;
            changed = abort_rx.changed(), if abort_live => {
                match changed {
                    Ok(()) if *abort_rx.borrow() => {
                        debug!(trace_id = %active.trace_id(), "invocation cancelled");
                        drop(active);
                        let _ = final_tx.send(Err(StreamError::Cancelled));
                        return;
                    }
                    Ok(()) => {}
                    Err(_) => abort_live = false,
                }
            }
            _ = tx.closed() => {
                debug!(trace_id = %active.trace_id(), "event receiver dropped; abandoning invocation");
                return;
            }
            next = active.next_events() => {
                match next {
                    Ok(Some(events)) => {
                        for event in events {
                            if tx.send(event).await.is_err() {
                                let _ = final_tx.send(Err(StreamError::protocol_msg(
                                    "event receiver dropped during stream",
                                )));
                                return;
                            }
                        }
                    }
                    Ok(None) => {
                        let _ = final_tx.send(Ok(active.into_completion()));
                        return;
                    }
                    Err(err) => {
                        let _ = final_tx.send(Err(err));
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::{FakeBody, FakeTransport, request, session};
    use crate::config::StreamConfig;
    use std::sync::Arc;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    #[tokio::test]
    async fn forwards_events_then_completion() {
        let transport = FakeTransport::chunks(&["{\"data\":\"a\"}\n", "data: {\"data\":\"b\"}\n"]);
        let client = StreamClient::new(transport);
        let mut stream = client.start_stream(&session(), request()).await.expect("start");
        assert_eq!(stream.session_id(), crate::client::tests::SESSION_ID);

        let mut events = Vec::new();
        while let Some(event) = stream.next_event().await {
            events.push(event);
        }
        assert_eq!(events, vec![StreamEvent::text("a"), StreamEvent::text("b")]);
        assert_eq!(stream.finish().await.expect("finish"), "ab");
    }

    #[tokio::test]
    async fn finish_drains_unread_events() {
        let transport = FakeTransport::chunks(&["{\"data\":\"x\"}\n{\"data\":\"y\"}\n"]);
        let stream = StreamClient::new(transport)
            .start_stream(&session(), request())
            .await
            .expect("start");
        assert_eq!(stream.finish().await.expect("finish"), "xy");
    }

    #[tokio::test]
    async fn status_failure_is_returned_at_start() {
        let transport = FakeTransport::new(503, FakeBody::Complete("busy".into()));
        let err = StreamClient::new(transport)
            .start_stream(&session(), request())
            .await
            .expect_err("status");
        assert_eq!(err.status(), Some(503));
    }

    #[tokio::test]
    async fn abort_cancels_and_releases_the_body() {
        let transport =
            FakeTransport::new(200, FakeBody::Pending(vec![b"{\"data\":\"x\"}\n".to_vec()]));
        let mut stream = StreamClient::new(transport.clone())
            .start_stream(&session(), request())
            .await
            .expect("start");

        assert_eq!(stream.next_event().await, Some(StreamEvent::text("x")));
        stream.abort_handle().abort();
        assert_eq!(stream.next_event().await, None);
        assert!(matches!(stream.finish().await, Err(StreamError::Cancelled)));
        assert!(transport.released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn dropping_the_stream_ends_the_read_loop() {
        let transport = FakeTransport::new(200, FakeBody::Pending(Vec::new()));
        let stream = StreamClient::new(transport.clone())
            .start_stream(&session(), request())
            .await
            .expect("start");
        drop(stream);

        for _ in 0..200 {
            if transport.released.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(transport.released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn zero_buffer_capacity_is_rejected() {
        let transport = FakeTransport::chunks(&[]);
        let config = StreamConfig::new("rt", "us-east-1").stream_buffer_capacity(0);
        let session = StreamSession::with_id(Arc::new(config), crate::client::tests::SESSION_ID);
        let err = StreamClient::new(transport.clone())
            .start_stream(&session, request())
            .await
            .expect_err("capacity");
        assert!(matches!(err, StreamError::Validation(msg) if msg.contains("capacity")));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }
}
