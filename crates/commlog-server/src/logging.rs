//! Logging setup.
//!
//! Presets pick a baseline per target (`commlog::sync`, `commlog::observer`
//! and so on). `--log target=level` overrides one target; a bare target name
//! is prefixed with `commlog::`. `RUST_LOG`, when set, replaces all of it.

use std::collections::HashMap;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!("Invalid log format: '{}'. Use 'text' or 'json'.", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogPreset {
    /// Sync summaries, startup and API errors.
    #[default]
    Production,
    Verbose,
    Debug,
    /// Includes per-signal observer decisions and store change traces.
    Trace,
    Quiet,
}

#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    pub preset: LogPreset,
    pub overrides: HashMap<String, Level>,
    pub format: LogFormat,
}

impl LogConfig {
    pub fn from_cli(
        verbose: bool,
        debug: bool,
        trace: bool,
        quiet: bool,
        log_overrides: Vec<String>,
        format: LogFormat,
    ) -> Self {
        let preset = if quiet {
            LogPreset::Quiet
        } else if trace {
            LogPreset::Trace
        } else if debug {
            LogPreset::Debug
        } else if verbose {
            LogPreset::Verbose
        } else {
            LogPreset::Production
        };

        let mut overrides = HashMap::new();
        for override_str in log_overrides {
            for part in override_str.split(',') {
                let Some((target, level_str)) = part.split_once('=') else {
                    continue;
                };
                let target = target.trim();
                let full_target = if target.starts_with("commlog::") || target == "tower_http" {
                    target.to_string()
                } else {
                    format!("commlog::{}", target)
                };

                if let Some(level) = parse_level(level_str.trim()) {
                    overrides.insert(full_target, level);
                }
            }
        }

        Self {
            preset,
            overrides,
            format,
        }
    }

    pub fn build_filter(&self) -> EnvFilter {
        if let Ok(env_filter) = EnvFilter::try_from_default_env() {
            return env_filter;
        }

        let mut directives: Vec<String> = match self.preset {
            LogPreset::Production => vec![
                "commlog::startup=info".into(),
                "commlog::api=info".into(),
                "commlog::ws=info".into(),
                "commlog::sync=info".into(),
                "commlog::observer=info".into(),
                "commlog::source=warn".into(),
                "commlog::store=warn".into(),
                "commlog::aggregate=warn".into(),
                "tower_http=warn".into(),
            ],
            LogPreset::Verbose => vec!["commlog=info".into(), "tower_http=info".into()],
            LogPreset::Debug => vec![
                "commlog=debug".into(),
                "commlog::observer=info".into(),
                "tower_http=debug".into(),
            ],
            LogPreset::Trace => vec!["commlog=trace".into(), "tower_http=trace".into()],
            LogPreset::Quiet => vec!["commlog=warn".into(), "tower_http=error".into()],
        };

        for (target, level) in &self.overrides {
            directives.push(format!("{}={}", target, level_to_str(*level)));
        }

        let filter_str = directives.join(",");
        EnvFilter::try_new(&filter_str).unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

fn parse_level(s: &str) -> Option<Level> {
    match s.to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" | "warning" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

fn level_to_str(level: Level) -> &'static str {
    match level {
        Level::TRACE => "trace",
        Level::DEBUG => "debug",
        Level::INFO => "info",
        Level::WARN => "warn",
        Level::ERROR => "error",
    }
}

/// Install the global subscriber.
pub fn init(config: &LogConfig) {
    let filter = config.build_filter();

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_target(true).with_file(false).with_line_number(false))
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_span_events(FmtSpan::CLOSE),
                )
                .init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_priority() {
        let config = LogConfig::from_cli(true, true, true, true, vec![], LogFormat::Text);
        assert_eq!(config.preset, LogPreset::Quiet);

        let config = LogConfig::from_cli(true, true, false, false, vec![], LogFormat::Text);
        assert_eq!(config.preset, LogPreset::Debug);

        let config = LogConfig::from_cli(false, false, false, false, vec![], LogFormat::Json);
        assert_eq!(config.preset, LogPreset::Production);
        assert_eq!(config.format, LogFormat::Json);
    }

    #[test]
    fn test_overrides_are_prefixed() {
        let config = LogConfig::from_cli(
            false,
            false,
            false,
            false,
            vec!["sync=debug,observer=trace".into(), "tower_http=warn".into(), "bogus".into()],
            LogFormat::Text,
        );

        assert_eq!(config.overrides.get("commlog::sync"), Some(&Level::DEBUG));
        assert_eq!(config.overrides.get("commlog::observer"), Some(&Level::TRACE));
        assert_eq!(config.overrides.get("tower_http"), Some(&Level::WARN));
        assert_eq!(config.overrides.len(), 3);
    }

    #[test]
    fn test_unknown_level_is_ignored() {
        let config = LogConfig::from_cli(
            false,
            false,
            false,
            false,
            vec!["commlog::store=loud".into()],
            LogFormat::Text,
        );
        assert!(config.overrides.is_empty());
    }
}
