/// Normalized, format-independent event delivered to the caller's sink.
///
/// Exactly one variant is populated per event; consumers match on it.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Incremental text fragment. Concatenating these in order yields the
    /// completion returned at stream end.
    Text { text: String },
    /// Introduces a tool invocation. The identifier is unique within the request.
    ToolUseStart { tool_use_id: String, name: String },
    /// Argument payload (incremental or complete) for an introduced tool call.
    ToolUseDelta { tool_use_id: String, input: String },
    /// Named lifecycle marker, for example `session_id`.
    Lifecycle {
        marker: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
}

impl StreamEvent {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn tool_use_start(tool_use_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::ToolUseStart {
            tool_use_id: tool_use_id.into(),
            name: name.into(),
        }
    }

    pub fn tool_use_delta(tool_use_id: impl Into<String>, input: impl Into<String>) -> Self {
        Self::ToolUseDelta {
            tool_use_id: tool_use_id.into(),
            input: input.into(),
        }
    }

    pub fn lifecycle(marker: impl Into<String>) -> Self {
        Self::Lifecycle {
            marker: marker.into(),
            detail: None,
        }
    }

    pub fn lifecycle_with(marker: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Lifecycle {
            marker: marker.into(),
            detail: Some(detail.into()),
        }
    }

    /// Returns the text fragment for [`StreamEvent::Text`].
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }

    /// Returns the tool invocation id for tool events.
    pub fn tool_use_id(&self) -> Option<&str> {
        match self {
            Self::ToolUseStart { tool_use_id, .. } | Self::ToolUseDelta { tool_use_id, .. } => {
                Some(tool_use_id)
            }
            _ => None,
        }
    }
}
