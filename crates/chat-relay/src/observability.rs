//! Process-wide tracing setup.
//!
//! Relay diagnostics never go to stdout: a presentation layer streams reply
//! text there. Logs go to stderr in compact form, or to a JSONL file.

use std::path::PathBuf;

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INIT: OnceCell<()> = OnceCell::new();

const DEFAULT_LOG_FILE: &str = "chat-relay.logs.jsonl";
const DEFAULT_FILTER: &str = "warn";

/// Where and how much the relay logs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogSettings {
    pub enabled: bool,
    /// Filter directive (`info`, `chat_relay=debug`, ...). Falls back to
    /// `RUST_LOG`, then `warn`.
    pub filter: Option<String>,
    /// JSONL sink. Compact stderr output when unset.
    pub json_log_path: Option<PathBuf>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            filter: None,
            json_log_path: None,
        }
    }
}

impl LogSettings {
    /// Reads `CHAT_RELAY_OBSERVABILITY_ENABLED`, `CHAT_RELAY_LOG_LEVEL` and
    /// `CHAT_RELAY_JSON_LOG_PATH`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            // Unrecognized values keep logging on.
            enabled: non_empty("CHAT_RELAY_OBSERVABILITY_ENABLED")
                .and_then(|v| parse_flag(&v))
                .unwrap_or(true),
            filter: non_empty("CHAT_RELAY_LOG_LEVEL"),
            json_log_path: non_empty("CHAT_RELAY_JSON_LOG_PATH").map(PathBuf::from),
        }
    }

    /// Raises the filter for `-v` style repetition counts: 1 is `info`, 2 is
    /// `debug`, 3 or more is `trace`. Zero keeps the current filter.
    pub fn verbosity(mut self, count: u8) -> Self {
        let level = match count {
            0 => return self,
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        self.filter = Some(level.to_string());
        self
    }

    pub fn json_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.json_log_path = Some(path.into());
        self
    }

    fn env_filter(&self) -> EnvFilter {
        if let Some(filter) = self.filter.as_deref()
            && let Ok(filter) = EnvFilter::try_new(filter)
        {
            return filter;
        }
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

/// Initialize logging once per process from the environment.
pub fn init_observability() {
    init_with(LogSettings::from_env());
}

/// Initialize logging once per process. Later calls are ignored.
pub fn init_with(settings: LogSettings) {
    INIT.get_or_init(|| {
        if !settings.enabled {
            return;
        }

        let env_filter = settings.env_filter();
        match settings.json_log_path.as_deref() {
            Some(path) => {
                let dir = path
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .unwrap_or_else(|| std::path::Path::new("."));
                let _ = std::fs::create_dir_all(dir);
                let file_name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or(DEFAULT_LOG_FILE);
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
                    .with_writer(std::io::stderr);
                let _ = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(console_layer)
                    .try_init();
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> LogSettings {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        LogSettings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn reads_settings_from_environment() {
        let parsed = settings(&[
            ("CHAT_RELAY_OBSERVABILITY_ENABLED", "off"),
            ("CHAT_RELAY_LOG_LEVEL", "chat_relay=debug"),
            ("CHAT_RELAY_JSON_LOG_PATH", "logs/relay.jsonl"),
        ]);
        assert!(!parsed.enabled);
        assert_eq!(parsed.filter.as_deref(), Some("chat_relay=debug"));
        assert_eq!(parsed.json_log_path, Some(PathBuf::from("logs/relay.jsonl")));
    }

    #[test]
    fn unset_or_unrecognized_values_keep_defaults() {
        assert_eq!(settings(&[]), LogSettings::default());
        let parsed = settings(&[
            ("CHAT_RELAY_OBSERVABILITY_ENABLED", "maybe"),
            ("CHAT_RELAY_LOG_LEVEL", "  "),
        ]);
        assert!(parsed.enabled);
        assert_eq!(parsed.filter, None);
    }

    #[test]
    fn verbosity_overrides_filter() {
        let base = LogSettings::default();
        assert_eq!(base.clone().verbosity(0).filter, None);
        assert_eq!(base.clone().verbosity(1).filter.as_deref(), Some("info"));
        assert_eq!(base.clone().verbosity(2).filter.as_deref(), Some("debug"));
        assert_eq!(base.verbosity(7).filter.as_deref(), Some("trace"));
    }

    #[test]
    fn parses_flags() {
        assert_eq!(parse_flag(" YES "), Some(true));
        assert_eq!(parse_flag("Disabled"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn init_is_idempotent() {
        init_with(LogSettings {
            enabled: false,
            ..LogSettings::default()
        });
        init_observability();
        assert!(INIT.get().is_some());
    }
}
