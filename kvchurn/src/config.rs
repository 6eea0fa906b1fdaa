//! Configuration for a churn run.
//!
//! Configuration can be loaded from multiple sources with the following precedence (highest to
//! lowest):
//!
//! 1. Command line flags
//! 2. Environment variables (prefixed with `KVCHURN__`)
//! 3. YAML configuration file (specified via `-c` or `--config` flag)
//! 4. Defaults
//!
//! See [`Config`] for a description of all configuration fields and their defaults.
//!
//! # Environment Variables
//!
//! Environment variables use `KVCHURN__` as a prefix and double underscores (`__`) to denote nested
//! configuration structures. For example:
//!
//! - `KVCHURN__ENDPOINTS=etcd-0:2379` sets the store address
//! - `KVCHURN__KEY_COUNT=1000` sets the number of keys
//! - `KVCHURN__LOGGING__FORMAT=json` sets the log format
//!
//! # YAML Configuration File
//!
//! ```yaml
//! endpoints: etcd-0:2379
//! key_count: 1000
//! tick_interval: 500ms
//!
//! logging:
//!   format: json
//! ```

use std::borrow::Cow;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use bytesize::ByteSize;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

use crate::etcd::DEFAULT_DIAL_TIMEOUT;
use crate::keys::DEFAULT_KEY_PREFIX;
use crate::phase::Phase;

/// Environment variable prefix for all configuration options.
const ENV_PREFIX: &str = "KVCHURN__";

/// Log output format.
///
/// Controls how log messages are formatted. The format can be explicitly specified or
/// auto-detected based on whether output is to a TTY.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect the best format.
    ///
    /// This chooses [`LogFormat::Pretty`] for TTY, otherwise [`LogFormat::Simplified`].
    Auto,

    /// Pretty printing with colors.
    ///
    /// ```text
    ///  INFO  kvchurn::driver > keys created
    /// ```
    Pretty,

    /// Simplified plain text output.
    ///
    /// ```text
    /// 2020-12-04T12:10:32Z [kvchurn::driver] INFO: keys created
    /// ```
    Simplified,

    /// Dump out JSON lines.
    Json,
}

/// The logging format parse error.
#[derive(Clone, Debug)]
pub struct FormatParseError(String);

impl fmt::Display for FormatParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            r#"error parsing "{}" as format: expected one of "auto", "pretty", "simplified", "json""#,
            self.0
        )
    }
}

impl std::str::FromStr for LogFormat {
    type Err = FormatParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let result = match s {
            "" => LogFormat::Auto,
            s if s.eq_ignore_ascii_case("auto") => LogFormat::Auto,
            s if s.eq_ignore_ascii_case("pretty") => LogFormat::Pretty,
            s if s.eq_ignore_ascii_case("simplified") => LogFormat::Simplified,
            s if s.eq_ignore_ascii_case("json") => LogFormat::Json,
            s => return Err(FormatParseError(s.into())),
        };

        Ok(result)
    }
}

impl std::error::Error for FormatParseError {}

mod display_fromstr {
    pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
        T: std::fmt::Display,
    {
        serializer.collect_str(&value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        D: serde::Deserializer<'de>,
        T: std::str::FromStr,
        <T as std::str::FromStr>::Err: std::fmt::Display,
    {
        use serde::Deserialize;
        let s = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Logging configuration.
///
/// Logs are always written to stderr, so the final summary on stdout stays machine-friendly.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Logging {
    /// Minimum log level to output.
    ///
    /// Per-key failures are logged at `ERROR`, unexpected delete counts at `WARN`, cycle and
    /// phase summaries at `INFO`, and every single store response at `DEBUG`.
    ///
    /// The `RUST_LOG` environment variable provides more granular control per module if needed.
    ///
    /// # Default
    ///
    /// `INFO`
    ///
    /// # Environment Variable
    ///
    /// `KVCHURN__LOGGING__LEVEL`
    #[serde(with = "display_fromstr")]
    pub level: LevelFilter,

    /// Log output format. See [`LogFormat`].
    ///
    /// # Default
    ///
    /// `Auto`
    ///
    /// # Environment Variable
    ///
    /// `KVCHURN__LOGGING__FORMAT`
    pub format: LogFormat,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
            format: LogFormat::Auto,
        }
    }
}

/// [Sentry](https://sentry.io/) error reporting.
///
/// Disabled unless a DSN is provided. Per-key errors and delete-count warnings are forwarded as
/// events, phase summaries as logs.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Sentry {
    /// Sentry DSN. `None` disables the integration.
    ///
    /// # Environment Variable
    ///
    /// `KVCHURN__SENTRY__DSN`
    pub dsn: Option<String>,

    /// Environment name attached to all events, such as `"staging"`.
    pub environment: Option<Cow<'static, str>>,

    /// Sample rate for error events, between `0.0` and `1.0`. Defaults to `1.0`.
    pub sample_rate: f32,
}

impl Default for Sentry {
    fn default() -> Self {
        Self {
            dsn: None,
            environment: None,
            sample_rate: 1.0,
        }
    }
}

impl Sentry {
    /// Returns whether Sentry is enabled.
    pub fn is_enabled(&self) -> bool {
        self.dsn.is_some()
    }
}

/// Main configuration struct for a churn run.
///
/// All values are fixed for the lifetime of the process.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Address of the store, as `host:port` or a full URL.
    ///
    /// # Default
    ///
    /// `localhost:2379`
    pub endpoints: String,

    /// Time allowed for connecting to the store at startup.
    ///
    /// # Default
    ///
    /// `4s`
    #[serde(with = "humantime_serde")]
    pub dial_timeout: Duration,

    /// Upper bound for every single store request. Unbounded if unset.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Option<Duration>,

    /// Skip the create phase.
    pub disable_create: bool,
    /// Skip the delete phase.
    pub disable_delete: bool,
    /// Skip the compaction phase. Compaction is not implemented; when enabled the run reports it
    /// as unsupported.
    pub disable_compaction: bool,
    /// Skip the defragmentation phase. Not implemented, see [`Self::disable_compaction`].
    pub disable_defragmentation: bool,
    /// Skip the cleanup phase. Not implemented, see [`Self::disable_compaction`].
    pub disable_cleanup: bool,

    /// Number of keys created and deleted per tick.
    ///
    /// # Default
    ///
    /// `200`
    pub key_count: usize,

    /// Length of the random suffix of every key.
    ///
    /// Despite the name this sizes the key, not the value. See [`Self::value_size`].
    ///
    /// # Default
    ///
    /// `102400`
    pub key_size: usize,

    /// Namespace prefix of every key.
    ///
    /// # Default
    ///
    /// `foo/`
    pub key_prefix: String,

    /// Size of the value written by every put.
    ///
    /// # Default
    ///
    /// `0 B` (empty value)
    pub value_size: ByteSize,

    /// Number of ticks per phase.
    ///
    /// # Default
    ///
    /// `1`
    pub frequency: usize,

    /// Period of the tick timer.
    ///
    /// # Default
    ///
    /// `2s`
    #[serde(with = "humantime_serde")]
    pub tick_interval: Duration,

    /// Pause between the create and the delete phase.
    ///
    /// # Default
    ///
    /// `5s`
    #[serde(with = "humantime_serde")]
    pub settle_delay: Duration,

    /// Seed for key generation. A random seed is drawn and logged if unset.
    pub seed: Option<u64>,

    /// Logging configuration.
    pub logging: Logging,

    /// Sentry configuration.
    pub sentry: Sentry,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoints: "localhost:2379".to_owned(),
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            request_timeout: None,

            disable_create: false,
            disable_delete: false,
            disable_compaction: false,
            disable_defragmentation: false,
            disable_cleanup: false,

            key_count: 200,
            key_size: 102_400,
            key_prefix: DEFAULT_KEY_PREFIX.to_owned(),
            value_size: ByteSize::b(0),
            frequency: 1,
            tick_interval: Duration::from_secs(2),
            settle_delay: Duration::from_secs(5),
            seed: None,

            logging: Logging::default(),
            sentry: Sentry::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the provided sources.
    ///
    /// Configuration is merged in the following order (later sources override earlier ones):
    /// 1. Default values
    /// 2. YAML configuration file (if `path` is given)
    /// 3. Environment variables (prefixed with `KVCHURN__`)
    /// 4. Command line overrides
    ///
    /// # Errors
    ///
    /// This function fails if the YAML file cannot be read or parsed, or if any value has the
    /// wrong type.
    pub fn load(path: Option<&Path>, overrides: &Overrides) -> Result<Self> {
        let mut figment = figment::Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .merge(Serialized::defaults(overrides))
            .extract()?;

        Ok(config)
    }

    /// Returns whether the given phase is enabled.
    pub fn is_enabled(&self, phase: Phase) -> bool {
        let disabled = match phase {
            Phase::Create => self.disable_create,
            Phase::Delete => self.disable_delete,
            Phase::Compaction => self.disable_compaction,
            Phase::Defragmentation => self.disable_defragmentation,
            Phase::Cleanup => self.disable_cleanup,
        };
        !disabled
    }

    /// Returns all enabled phases in execution order.
    pub fn phases(&self) -> Vec<Phase> {
        Phase::ALL
            .into_iter()
            .filter(|phase| self.is_enabled(*phase))
            .collect()
    }
}

/// Values given on the command line, overriding all other configuration sources.
///
/// Fields left as `None` do not override anything.
#[derive(Debug, Default, Serialize)]
pub struct Overrides {
    /// Overrides [`Config::endpoints`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoints: Option<String>,
    /// Overrides [`Config::disable_create`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_create: Option<bool>,
    /// Overrides [`Config::disable_delete`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_delete: Option<bool>,
    /// Overrides [`Config::disable_compaction`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_compaction: Option<bool>,
    /// Overrides [`Config::disable_defragmentation`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_defragmentation: Option<bool>,
    /// Overrides [`Config::disable_cleanup`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_cleanup: Option<bool>,
    /// Overrides [`Config::key_count`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_count: Option<usize>,
    /// Overrides [`Config::key_size`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_size: Option<usize>,
    /// Overrides [`Config::frequency`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency: Option<usize>,
}
