//! `data:`-prefixed SSE records.
//!
//! The agent runtime wraps each yielded value as one `data:` line. JSON object
//! payloads are handed to an inner registry of the bare-object formats, JSON
//! strings are text. Other SSE fields (`event:`, `id:`, comments) are not
//! claimed here and fall through as unrecognized frames.

use super::{ParseContext, Parser, ParserRegistry, Recognition};

const NAME: &str = "sse-data";

const PREFIX: &str = "data:";

const DONE_SENTINEL: &str = "[DONE]";

/// Parser for `data: <payload>` lines.
#[derive(Debug)]
pub struct SseDataParser {
    inner: ParserRegistry,
}

impl SseDataParser {
    /// Wraps a custom registry for decoding object payloads.
    pub fn with_inner(inner: ParserRegistry) -> Self {
        Self { inner }
    }
}

impl Default for SseDataParser {
    fn default() -> Self {
        Self::with_inner(ParserRegistry::object_formats())
    }
}

impl Parser for SseDataParser {
    fn name(&self) -> &'static str {
        NAME
    }

    fn recognition(&self) -> Recognition {
        Recognition::LinePrefix(PREFIX)
    }

    fn try_parse(&self, frame: &str, accumulated: String, cx: &mut ParseContext) -> String {
        let Some(rest) = frame.strip_prefix(PREFIX) else {
            return accumulated;
        };
        let payload = rest.strip_prefix(' ').unwrap_or(rest).trim_end();
        if payload.is_empty() || payload == DONE_SENTINEL {
            return accumulated;
        }

        if payload.starts_with('{') {
            self.inner.dispatch(payload, accumulated, cx)
        } else if payload.starts_with('"') {
            match serde_json::from_str::<String>(payload) {
                Ok(text) => cx.push_text(accumulated, &text),
                Err(e) => {
                    cx.report(NAME, frame, format!("invalid string payload: {e}"));
                    accumulated
                }
            }
        } else {
            cx.report(NAME, frame, "payload is neither a JSON object nor a JSON string");
            accumulated
        }
    }
}
