//! Format decoders and the contract they share.
//!
//! Every registered [`Parser`] sees every non-blank frame. A parser first runs
//! a cheap structural check ([`Recognition::matches`]); only on a match does it
//! decode the frame. Because [`ParserRegistryBuilder`] rejects parsers whose
//! recognition keys overlap, at most one parser acts on any given frame, so
//! adding a format means adding one parser and registering it.
//!
//! Decode failures never escape a parser. They are logged and handed to the
//! [`DiagnosticSink`] configured on the client, and the stream continues.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::warn;

use crate::event::StreamEvent;

pub mod langgraph;
mod registry;
pub mod sse;
pub mod strands;

pub use langgraph::LangGraphParser;
pub use registry::{ParserRegistry, ParserRegistryBuilder};
pub use sse::SseDataParser;
pub use strands::StrandsParser;

const EXCERPT_CHARS: usize = 200;

/// Decoder for one upstream wire format.
pub trait Parser: Send + Sync {
    /// Stable name used in diagnostics and logs.
    fn name(&self) -> &'static str;

    /// The structural key this parser claims. Must not overlap any other
    /// parser registered alongside it.
    fn recognition(&self) -> Recognition;

    /// Inspects one frame.
    ///
    /// Returns `accumulated` unchanged and emits nothing when the frame is not
    /// this parser's format or fails to decode. Otherwise emits events through
    /// `cx` in discovery order and returns the accumulated text extended by
    /// any text the frame carried.
    fn try_parse(&self, frame: &str, accumulated: String, cx: &mut ParseContext) -> String;
}

/// How a parser recognizes its frames before decoding them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recognition {
    /// The frame starts with a literal tag.
    LinePrefix(&'static str),
    /// The frame is a bare JSON object carrying at least one of these
    /// top-level keys.
    ObjectKeys(&'static [&'static str]),
}

impl Recognition {
    /// Cheap structural check run before any decode attempt.
    ///
    /// For [`Recognition::ObjectKeys`] this only looks for a quoted key
    /// anywhere in the object; parsers confirm the key is top-level after
    /// decoding.
    pub fn matches(&self, frame: &str) -> bool {
        match self {
            Self::LinePrefix(prefix) => frame.starts_with(prefix),
            Self::ObjectKeys(keys) => {
                let trimmed = frame.trim_start();
                trimmed.starts_with('{') && keys.iter().any(|key| contains_quoted(trimmed, key))
            }
        }
    }

    /// Describes the overlap with `other`, if the two could claim the same frame.
    pub fn overlap(&self, other: &Recognition) -> Option<String> {
        match (self, other) {
            (Self::LinePrefix(a), Self::LinePrefix(b)) => {
                (a.starts_with(b) || b.starts_with(a)).then(|| format!("prefixes {a:?} and {b:?}"))
            }
            (Self::ObjectKeys(a), Self::ObjectKeys(b)) => a
                .iter()
                .find(|key| b.contains(key))
                .map(|key| format!("object key {key:?}")),
            (Self::LinePrefix(prefix), Self::ObjectKeys(_))
            | (Self::ObjectKeys(_), Self::LinePrefix(prefix)) => prefix
                .starts_with('{')
                .then(|| format!("prefix {prefix:?} shadows JSON objects")),
        }
    }
}

fn contains_quoted(haystack: &str, key: &str) -> bool {
    haystack.match_indices(key).any(|(at, _)| {
        haystack[..at].ends_with('"') && haystack[at + key.len()..].starts_with('"')
    })
}

/// A recovered decode failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeDiagnostic {
    /// Name of the parser that recognized the frame.
    pub parser: &'static str,
    /// Why decoding failed.
    pub reason: String,
    /// The start of the offending frame.
    pub excerpt: String,
}

/// Structured channel for frame decode failures.
pub trait DiagnosticSink: Send + Sync {
    fn on_decode_failure(&self, diagnostic: DecodeDiagnostic);
}

/// In-memory [`DiagnosticSink`]; clones share the same record list.
#[derive(Debug, Clone, Default)]
pub struct CollectedDiagnostics {
    records: Arc<Mutex<Vec<DecodeDiagnostic>>>,
}

impl CollectedDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn records(&self) -> Vec<DecodeDiagnostic> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }
}

impl DiagnosticSink for CollectedDiagnostics {
    fn on_decode_failure(&self, diagnostic: DecodeDiagnostic) {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(diagnostic);
    }
}

/// Tool invocations introduced so far in one request.
#[derive(Debug, Default)]
pub struct ToolCallTracker {
    names: HashMap<String, String>,
    by_index: HashMap<u64, String>,
}

impl ToolCallTracker {
    /// Records `id` as naming `name`. Returns `true` when this introduces the
    /// call, meaning a `tool_use_start` is due: the id is new, or it was last
    /// seen under a different tool name.
    pub fn introduce(&mut self, id: &str, name: &str) -> bool {
        if self.names.get(id).is_some_and(|known| known == name) {
            return false;
        }
        self.names.insert(id.to_owned(), name.to_owned());
        true
    }

    /// Binds a streaming index to an introduced id.
    pub fn bind_index(&mut self, index: u64, id: &str) {
        self.by_index.insert(index, id.to_owned());
    }

    pub fn id_for_index(&self, index: u64) -> Option<&str> {
        self.by_index.get(&index).map(String::as_str)
    }

    pub fn name_of(&self, id: &str) -> Option<&str> {
        self.names.get(id).map(String::as_str)
    }
}

/// Per-request state handed to every parser call.
///
/// Events emitted while dispatching a frame are buffered here in emission
/// order and handed to the caller once the frame (or chunk) is done.
#[derive(Default)]
pub struct ParseContext {
    events: Vec<StreamEvent>,
    tools: ToolCallTracker,
    diagnostics: Option<Arc<dyn DiagnosticSink>>,
    decode_failures: usize,
}

impl ParseContext {
    pub fn new(diagnostics: Option<Arc<dyn DiagnosticSink>>) -> Self {
        Self {
            diagnostics,
            ..Self::default()
        }
    }

    pub fn emit(&mut self, event: StreamEvent) {
        self.events.push(event);
    }

    /// Emits a `text` event and appends it to the completion. Empty text is a
    /// no-op so the completion always equals the concatenated events.
    pub fn push_text(&mut self, mut accumulated: String, text: &str) -> String {
        if !text.is_empty() {
            accumulated.push_str(text);
            self.emit(StreamEvent::text(text));
        }
        accumulated
    }

    /// Emits `tool_use_start` if `id` is not yet introduced under `name`,
    /// then `tool_use_delta` when `input` is present.
    pub fn tool_use(&mut self, id: &str, name: &str, input: Option<String>) {
        if self.tools.introduce(id, name) {
            self.emit(StreamEvent::tool_use_start(id, name));
        }
        if let Some(input) = input {
            self.emit(StreamEvent::tool_use_delta(id, input));
        }
    }

    pub fn tools(&self) -> &ToolCallTracker {
        &self.tools
    }

    pub fn tools_mut(&mut self) -> &mut ToolCallTracker {
        &mut self.tools
    }

    /// Records a decode failure for `frame`.
    pub fn report(&mut self, parser: &'static str, frame: &str, reason: impl Into<String>) {
        let diagnostic = DecodeDiagnostic {
            parser,
            reason: reason.into(),
            excerpt: frame.chars().take(EXCERPT_CHARS).collect(),
        };
        warn!(parser, reason = %diagnostic.reason, "skipping undecodable frame");
        self.decode_failures += 1;
        if let Some(sink) = &self.diagnostics {
            sink.on_decode_failure(diagnostic);
        }
    }

    pub fn decode_failures(&self) -> usize {
        self.decode_failures
    }

    /// Takes the events emitted since the last call.
    pub fn take_events(&mut self) -> Vec<StreamEvent> {
        std::mem::take(&mut self.events)
    }
}

/// Renders tool arguments for a `tool_use_delta`.
///
/// Strings are forwarded verbatim (runtimes stream partial JSON as text),
/// structured values become compact JSON. Missing, null, empty-string and
/// empty-object arguments count as absent.
pub(crate) fn render_arguments(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(text) if text.is_empty() => None,
        serde_json::Value::String(text) => Some(text.clone()),
        serde_json::Value::Object(map) if map.is_empty() => None,
        other => Some(other.to_string()),
    }
}
