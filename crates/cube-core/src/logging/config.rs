//! Where log settings come from.
//!
//! Precedence, lowest first: built-in defaults, `RUST_LOG`, the `CUBE_LOG*`
//! variables, then the `-v`/`-q`/`--log-format` flags.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Log level variable; wins over `RUST_LOG`.
pub const ENV_LOG_LEVEL: &str = "CUBE_LOG";
/// Log line format variable (`human` or `jsonl`).
pub const ENV_LOG_FORMAT: &str = "CUBE_LOG_FORMAT";
/// Set to `0` or `false` when the host stamps lines itself.
pub const ENV_LOG_TIMESTAMPS: &str = "CUBE_LOG_TIMESTAMPS";

/// Shape of the lines written to stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Console lines for people watching a terminal.
    #[default]
    Human,
    /// One JSON object per line, for pipeline log collectors.
    #[value(alias = "json")]
    Jsonl,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <LogFormat as ValueEnum>::from_str(s.trim(), true)
            .map_err(|_| format!("unknown log format '{}' (expected human or jsonl)", s))
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            LogFormat::Human => "human",
            LogFormat::Jsonl => "jsonl",
        })
    }
}

/// Most verbose level still written. Ordered from chattiest to silent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Off,
}

impl LogLevel {
    const ALL: [LogLevel; 6] = [
        LogLevel::Trace,
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warn,
        LogLevel::Error,
        LogLevel::Off,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Off => "off",
        }
    }

    /// Chattiest level named by any directive of a `RUST_LOG` value,
    /// e.g. `ureq=warn,cube_core=debug` gives `Debug`.
    fn from_rust_log(value: &str) -> Option<Self> {
        value
            .split(',')
            .filter_map(|directive| {
                let level = directive.rsplit('=').next()?;
                level.trim().parse::<LogLevel>().ok()
            })
            .min()
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        match wanted.as_str() {
            "warning" => return Ok(LogLevel::Warn),
            "none" | "quiet" => return Ok(LogLevel::Off),
            _ => {}
        }
        Self::ALL
            .into_iter()
            .find(|level| level.as_str() == wanted)
            .ok_or_else(|| format!("unknown log level '{}'", s))
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved logging settings handed to [`super::init_logging`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub format: LogFormat,
    pub level: LogLevel,
    /// Prefix human lines with a timestamp.
    pub timestamps: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            format: LogFormat::Human,
            level: LogLevel::Info,
            timestamps: true,
        }
    }
}

impl LogConfig {
    /// Settings from the process environment, then CLI flags.
    pub fn from_env(cli_level: Option<LogLevel>, cli_format: Option<LogFormat>) -> Self {
        Self::from_lookup(|key| std::env::var(key).ok(), cli_level, cli_format)
    }

    /// Same as [`LogConfig::from_env`] over an arbitrary variable lookup.
    /// Unparseable values are ignored.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
        cli_level: Option<LogLevel>,
        cli_format: Option<LogFormat>,
    ) -> Self {
        let defaults = LogConfig::default();

        let env_level = match lookup(ENV_LOG_LEVEL) {
            Some(value) => value.parse().ok(),
            None => lookup("RUST_LOG").and_then(|v| LogLevel::from_rust_log(&v)),
        };
        let env_format = lookup(ENV_LOG_FORMAT).and_then(|v| v.parse().ok());
        let timestamps = lookup(ENV_LOG_TIMESTAMPS)
            .map(|v| !matches!(v.trim(), "0" | "false" | "no" | "off"))
            .unwrap_or(defaults.timestamps);

        LogConfig {
            level: cli_level.or(env_level).unwrap_or(defaults.level),
            format: cli_format.or(env_format).unwrap_or(defaults.format),
            timestamps,
        }
    }
}
