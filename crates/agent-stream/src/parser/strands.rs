//! Strands-style incremental envelopes.
//!
//! Each frame is a bare JSON object. Text arrives under `data`, tool activity
//! under `current_tool_use` (repeated while the runtime streams the tool's
//! arguments), and the resumable Claude session id under
//! `claude_session_id`. Event-loop markers are surfaced as lifecycle events.

use serde::Deserialize;
use serde_json::Value;

use super::{ParseContext, Parser, Recognition, render_arguments};
use crate::event::StreamEvent;

const NAME: &str = "strands";

const KEYS: &[&str] = &[
    "data",
    "current_tool_use",
    "claude_session_id",
    "init_event_loop",
    "start_event_loop",
    "complete",
    "force_stop",
];

/// Marker emitted for `claude_session_id` frames.
pub const SESSION_ID_MARKER: &str = "session_id";

#[derive(Debug, Deserialize)]
struct Envelope {
    data: Option<String>,
    current_tool_use: Option<ToolUse>,
    claude_session_id: Option<String>,
    init_event_loop: Option<Value>,
    start_event_loop: Option<Value>,
    complete: Option<Value>,
    force_stop: Option<Value>,
    force_stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToolUse {
    tool_use_id: Option<String>,
    name: Option<String>,
    #[serde(default)]
    input: Value,
}

struct Decoded {
    text: Option<String>,
    tool: Option<(String, String, Option<String>)>,
    markers: Vec<(&'static str, Option<String>)>,
}

/// Parser for Strands-style `data` / `current_tool_use` envelopes.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrandsParser;

impl Parser for StrandsParser {
    fn name(&self) -> &'static str {
        NAME
    }

    fn recognition(&self) -> Recognition {
        Recognition::ObjectKeys(KEYS)
    }

    fn try_parse(&self, frame: &str, accumulated: String, cx: &mut ParseContext) -> String {
        if !self.recognition().matches(frame) {
            return accumulated;
        }
        let decoded = match decode(frame) {
            Ok(Some(decoded)) => decoded,
            Ok(None) => return accumulated,
            Err(reason) => {
                cx.report(NAME, frame, reason);
                return accumulated;
            }
        };

        let accumulated = match decoded.text {
            Some(text) => cx.push_text(accumulated, &text),
            None => accumulated,
        };
        if let Some((id, name, input)) = decoded.tool {
            cx.tool_use(&id, &name, input);
        }
        for (marker, detail) in decoded.markers {
            cx.emit(StreamEvent::Lifecycle {
                marker: marker.to_owned(),
                detail,
            });
        }
        accumulated
    }
}

/// Decodes and validates the whole frame before anything is emitted.
/// `Ok(None)` means the keys only appeared nested, not at the top level.
fn decode(frame: &str) -> Result<Option<Decoded>, String> {
    let envelope: Envelope =
        serde_json::from_str(frame.trim()).map_err(|e| format!("invalid envelope: {e}"))?;

    let tool = match envelope.current_tool_use {
        Some(tool) => {
            let id = tool
                .tool_use_id
                .filter(|id| !id.is_empty())
                .ok_or("current_tool_use without toolUseId")?;
            let name = tool
                .name
                .filter(|name| !name.is_empty())
                .ok_or("current_tool_use without name")?;
            Some((id, name, render_arguments(&tool.input)))
        }
        None => None,
    };

    let mut markers = Vec::new();
    if let Some(session_id) = envelope.claude_session_id {
        markers.push((SESSION_ID_MARKER, Some(session_id)));
    }
    for (marker, value) in [
        ("init_event_loop", &envelope.init_event_loop),
        ("start_event_loop", &envelope.start_event_loop),
        ("complete", &envelope.complete),
    ] {
        if value.as_ref().is_some_and(is_truthy) {
            markers.push((marker, None));
        }
    }
    if envelope.force_stop.as_ref().is_some_and(is_truthy) {
        markers.push(("force_stop", envelope.force_stop_reason));
    }

    if envelope.data.is_none() && tool.is_none() && markers.is_empty() {
        return Ok(None);
    }
    Ok(Some(Decoded {
        text: envelope.data,
        tool,
        markers,
    }))
}

/// A marker is set by `true` or a non-empty string, array or object.
/// Numbers and null never set one.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(set) => *set,
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
        Value::Null | Value::Number(_) => false,
    }
}
