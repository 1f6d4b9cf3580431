use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INIT: OnceCell<()> = OnceCell::new();

/// Filter used when neither `AGENT_STREAM_LOG_LEVEL` nor `RUST_LOG` is set.
pub const DEFAULT_FILTER: &str = "agent_stream=info";

const DEFAULT_LOG_FILE: &str = "agent-stream.logs.jsonl";

/// How the client's `tracing` output is installed.
///
/// Per-frame dispatch is logged at `trace`, phase transitions and body
/// release at `debug`, decode failures at `warn`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservabilitySettings {
    pub enabled: bool,
    /// An `EnvFilter` directive string.
    pub filter: String,
    /// Write JSON lines to this file instead of compact stdout output.
    pub json_log_path: Option<PathBuf>,
}

impl Default for ObservabilitySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            filter: DEFAULT_FILTER.to_string(),
            json_log_path: None,
        }
    }
}

impl ObservabilitySettings {
    /// Reads the settings from the process environment.
    ///
    /// - `AGENT_STREAM_OBSERVABILITY`: enable flag, default on. Unrecognized values keep it on.
    /// - `AGENT_STREAM_LOG_LEVEL`: filter directives, takes precedence over `RUST_LOG`.
    /// - `AGENT_STREAM_JSON_LOG_PATH`: JSONL output file.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_blank = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let enabled = non_blank("AGENT_STREAM_OBSERVABILITY")
            .and_then(|value| parse_flag(&value))
            .unwrap_or(true);
        let filter = non_blank("AGENT_STREAM_LOG_LEVEL")
            .or_else(|| non_blank("RUST_LOG"))
            .unwrap_or_else(|| DEFAULT_FILTER.to_string());
        let json_log_path = non_blank("AGENT_STREAM_JSON_LOG_PATH").map(PathBuf::from);

        Self {
            enabled,
            filter,
            json_log_path,
        }
    }

    pub fn filter(mut self, directives: impl Into<String>) -> Self {
        self.filter = directives.into();
        self
    }

    pub fn json_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.json_log_path = Some(path.into());
        self
    }

    /// Invalid directives fall back to [`DEFAULT_FILTER`].
    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_new(&self.filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

/// Splits a log path into the directory and file name `tracing_appender` expects.
fn split_log_path(path: &Path) -> (&Path, &str) {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(DEFAULT_LOG_FILE);
    (dir, file_name)
}

/// Installs logging from [`ObservabilitySettings::from_env`].
pub fn init_observability() {
    init_observability_with(&ObservabilitySettings::from_env());
}

/// Installs a global subscriber once per process. Later calls are no-ops,
/// as is a call while another global subscriber is already set.
pub fn init_observability_with(settings: &ObservabilitySettings) {
    INIT.get_or_init(|| {
        if !settings.enabled {
            return;
        }

        let env_filter = settings.env_filter();
        if let Some(path) = &settings.json_log_path {
            let (dir, file_name) = split_log_path(path);
            if let Err(err) = std::fs::create_dir_all(dir) {
                eprintln!("agent-stream: cannot create log directory {}: {err}", dir.display());
                return;
            }
            let json_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_writer(tracing_appender::rolling::never(dir, file_name));
            let _ = tracing_subscriber::registry()
                .with(env_filter)
                .with(json_layer)
                .try_init();
        } else {
            let console_layer = tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(std::io::stdout);
            let _ = tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer)
                .try_init();
        }
    });
}
