use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INIT: OnceCell<()> = OnceCell::new();

const ENV_ENABLED: &str = "SCENARIO_OBSERVABILITY_ENABLED";
const ENV_LOG_LEVEL: &str = "SCENARIO_LOG_LEVEL";
const ENV_JSON_LOG_PATH: &str = "SCENARIO_JSON_LOG_PATH";
const DEFAULT_LOG_FILE: &str = "scenario.logs.jsonl";

/// Logging settings resolved from the environment.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LogSettings {
    /// False turns logging off entirely.
    pub enabled: bool,
    /// Filter directive, e.g. `debug` or `scenario_ai_harness=trace`.
    pub level: Option<String>,
    /// JSONL log file; console output when unset.
    pub json_log_path: Option<PathBuf>,
}

impl LogSettings {
    /// Loads a `.env` file if present, then reads the `SCENARIO_*` logging variables.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        Self {
            enabled: read(ENV_ENABLED)
                .and_then(|v| parse_bool_env(&v))
                .unwrap_or(true),
            level: read(ENV_LOG_LEVEL),
            json_log_path: read(ENV_JSON_LOG_PATH).map(PathBuf::from),
        }
    }

    fn env_filter(&self) -> tracing_subscriber::EnvFilter {
        if let Some(level) = &self.level
            && let Ok(filter) = tracing_subscriber::EnvFilter::try_new(level)
        {
            return filter;
        }
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    }
}

fn parse_bool_env(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

/// Splits a log path into the directory and file name handed to the appender.
fn log_file_target(path: &Path) -> (PathBuf, String) {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(DEFAULT_LOG_FILE)
        .to_string();
    (dir, file_name)
}

/// Installs the process-wide tracing subscriber from [`LogSettings::from_env`].
/// Later calls are no-ops.
///
/// Environment variables (a `.env` file is honoured):
/// - `SCENARIO_OBSERVABILITY_ENABLED`: optional enable/disable flag (default enabled).
/// - `SCENARIO_LOG_LEVEL`: optional level/filter override (`info`, `debug`, etc.).
/// - `SCENARIO_JSON_LOG_PATH`: optional log file path. If set, logs are JSONL in that file.
///   If unset, logs are emitted to stdout in a compact console format.
/// - `RUST_LOG`: filter used when `SCENARIO_LOG_LEVEL` is unset or invalid.
pub fn init_observability() {
    INIT.get_or_init(|| init_with(&LogSettings::from_env()));
}

fn init_with(settings: &LogSettings) {
    if !settings.enabled {
        return;
    }

    let env_filter = settings.env_filter();
    match &settings.json_log_path {
        Some(path) => {
            let (dir, file_name) = log_file_target(path);
            let _ = std::fs::create_dir_all(&dir);
            let writer = tracing_appender::rolling::never(dir, file_name);
            let json_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_target(false)
                .with_writer(writer);
            let _ = tracing_subscriber::registry()
                .with(env_filter)
                .with(json_layer)
                .try_init();
        }
        None => {
            let console_layer = tracing_subscriber::fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stdout);
            let _ = tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer)
                .try_init();
        }
    }
}
