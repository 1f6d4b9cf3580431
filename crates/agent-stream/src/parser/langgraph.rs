//! LangGraph message chunks.
//!
//! Frames are serialized LangChain messages discriminated by `type`. Only AI
//! messages produce events: text from `content` (a string or a list of content
//! blocks) and tool calls from `tool_call_chunks` while streaming, or from
//! `tool_calls` on a complete message. Continuation chunks omit the call id
//! and are matched to their call through `index`.

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{ParseContext, Parser, Recognition, ToolCallTracker, render_arguments};
use crate::event::StreamEvent;

const NAME: &str = "langgraph";

const KEYS: &[&str] = &["type"];

const AI_MESSAGE_TYPES: &[&str] = &["AIMessageChunk", "AIMessage", "ai"];

#[derive(Debug, Deserialize)]
struct MessageChunk {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: Value,
    #[serde(default)]
    tool_call_chunks: Vec<ToolCallChunk>,
    #[serde(default)]
    tool_calls: Vec<ToolCall>,
    #[serde(default)]
    langgraph_node: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ToolCallChunk {
    id: Option<String>,
    name: Option<String>,
    args: Option<String>,
    index: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ToolCall {
    id: String,
    name: String,
    #[serde(default)]
    args: Value,
}

/// A tool call resolved against the tracker, ready to emit.
struct ResolvedCall {
    id: String,
    introduce: Option<(String, Option<u64>)>,
    args: Option<String>,
}

/// Parser for LangGraph `AIMessageChunk` frames.
#[derive(Debug, Clone, Copy, Default)]
pub struct LangGraphParser;

impl Parser for LangGraphParser {
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
        let message = match decode(frame) {
            Ok(Some(message)) => message,
            Ok(None) => return accumulated,
            Err(reason) => {
                cx.report(NAME, frame, reason);
                return accumulated;
            }
        };
        debug!(kind = %message.kind, node = ?message.langgraph_node, "langgraph message chunk");

        let texts = match content_texts(&message.content) {
            Ok(texts) => texts,
            Err(reason) => {
                cx.report(NAME, frame, reason);
                return accumulated;
            }
        };
        let calls = match resolve_calls(&message, cx.tools()) {
            Ok(calls) => calls,
            Err(reason) => {
                cx.report(NAME, frame, reason);
                return accumulated;
            }
        };

        let accumulated = texts
            .iter()
            .fold(accumulated, |acc, text| cx.push_text(acc, text));
        for call in calls {
            if let Some((name, index)) = call.introduce {
                if let Some(index) = index {
                    cx.tools_mut().bind_index(index, &call.id);
                }
                cx.tool_use(&call.id, &name, call.args);
            } else if let Some(args) = call.args {
                cx.emit(StreamEvent::tool_use_delta(call.id, args));
            }
        }
        accumulated
    }
}

/// Decodes an AI message chunk. `Ok(None)` means the object has no
/// top-level string `type` (the key only appeared nested) or is not an AI
/// message.
fn decode(frame: &str) -> Result<Option<MessageChunk>, String> {
    let object: serde_json::Map<String, Value> =
        serde_json::from_str(frame.trim()).map_err(|e| format!("invalid message chunk: {e}"))?;
    let is_ai = object
        .get("type")
        .and_then(Value::as_str)
        .is_some_and(|kind| AI_MESSAGE_TYPES.contains(&kind));
    if !is_ai {
        return Ok(None);
    }
    serde_json::from_value(Value::Object(object))
        .map(Some)
        .map_err(|e| format!("invalid message chunk: {e}"))
}

fn content_texts(content: &Value) -> Result<Vec<&str>, String> {
    match content {
        Value::Null => Ok(Vec::new()),
        Value::String(text) => Ok(vec![text.as_str()]),
        Value::Array(blocks) => Ok(blocks
            .iter()
            .filter_map(|block| match block {
                Value::String(text) => Some(text.as_str()),
                Value::Object(fields) if fields.get("type").and_then(Value::as_str) == Some("text") => {
                    fields.get("text").and_then(Value::as_str)
                }
                _ => None,
            })
            .collect()),
        other => Err(format!("unsupported content shape: {other}")),
    }
}

/// Resolves every tool call in the message without touching the tracker, so a
/// bad chunk leaves the request state as it was.
fn resolve_calls(
    message: &MessageChunk,
    tracker: &ToolCallTracker,
) -> Result<Vec<ResolvedCall>, String> {
    if message.tool_call_chunks.is_empty() {
        return Ok(message
            .tool_calls
            .iter()
            .map(|call| ResolvedCall {
                id: call.id.clone(),
                introduce: Some((call.name.clone(), None)),
                args: render_arguments(&call.args),
            })
            .collect());
    }

    let mut resolved: Vec<ResolvedCall> = Vec::with_capacity(message.tool_call_chunks.len());
    let mut introduced_here: Vec<(u64, String)> = Vec::new();
    for chunk in &message.tool_call_chunks {
        let args = chunk.args.clone().filter(|args| !args.is_empty());
        match (&chunk.id, chunk.index) {
            (Some(id), index) if !id.is_empty() => {
                let name = chunk
                    .name
                    .clone()
                    .or_else(|| tracker.name_of(id).map(str::to_owned))
                    .ok_or_else(|| format!("tool call chunk {id} without name"))?;
                if let Some(index) = index {
                    introduced_here.push((index, id.clone()));
                }
                resolved.push(ResolvedCall {
                    id: id.clone(),
                    introduce: Some((name, index)),
                    args,
                });
            }
            (_, Some(index)) => {
                let id = introduced_here
                    .iter()
                    .rev()
                    .find(|(known, _)| *known == index)
                    .map(|(_, id)| id.as_str())
                    .or_else(|| tracker.id_for_index(index))
                    .ok_or_else(|| format!("tool call chunk for unknown index {index}"))?;
                resolved.push(ResolvedCall {
                    id: id.to_owned(),
                    introduce: None,
                    args,
                });
            }
            _ => return Err("tool call chunk without id or index".into()),
        }
    }
    Ok(resolved)
}
