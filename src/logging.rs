//! Structured logging initialisation.
//!
//! Every stage of a call (route match, materialize, validate, invoke,
//! encode) emits `tracing` events with a `request_id` field. This module
//! installs the subscriber that writes them.
//!
//! | Variable | Values | Default |
//! |---|---|---|
//! | `METAROUTE_LOG_LEVEL` | trace, debug, info, warn, error | `info` |
//! | `METAROUTE_LOG_FORMAT` | json, pretty | `json` |
//! | `METAROUTE_LOG_SAMPLING_MODE` | all, error-only, sampled | `all` |
//! | `METAROUTE_LOG_SAMPLING_RATE` | 0.0 to 1.0 | `1.0` |
//! | `METAROUTE_LOG_ASYNC` | true, false | `true` |
//! | `METAROUTE_LOG_TARGET_FILTER` | comma-separated directives | none |
//! | `METAROUTE_LOG_INCLUDE_LOCATION` | true, false | `false` |
//!
//! `RUST_LOG`, when set, takes precedence over `METAROUTE_LOG_LEVEL`.

use std::env;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use tracing::{Level, Metadata, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::{Context as LayerContext, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => LogFormat::Pretty,
            _ => LogFormat::Json,
        }
    }
}

/// Which events pass the sampling layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplingMode {
    All,
    /// WARN and ERROR only
    ErrorOnly,
    /// Every WARN and ERROR, a fraction of everything else
    Sampled,
}

impl SamplingMode {
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "error-only" | "error_only" => SamplingMode::ErrorOnly,
            "sampled" => SamplingMode::Sampled,
            _ => SamplingMode::All,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
    pub sampling_mode: SamplingMode,
    pub sampling_rate: f64,
    /// Write through a non-blocking background worker
    pub async_logging: bool,
    pub target_filter: Option<String>,
    pub include_location: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
            sampling_mode: SamplingMode::All,
            sampling_rate: 1.0,
            async_logging: true,
            target_filter: None,
            include_location: false,
        }
    }
}

impl LogConfig {
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; unset or unparsable keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            level: lookup("METAROUTE_LOG_LEVEL").unwrap_or(defaults.level),
            format: lookup("METAROUTE_LOG_FORMAT")
                .map(|v| LogFormat::parse(&v))
                .unwrap_or(defaults.format),
            sampling_mode: lookup("METAROUTE_LOG_SAMPLING_MODE")
                .map(|v| SamplingMode::parse(&v))
                .unwrap_or(defaults.sampling_mode),
            sampling_rate: parsed(&lookup, "METAROUTE_LOG_SAMPLING_RATE").unwrap_or(defaults.sampling_rate),
            async_logging: parsed(&lookup, "METAROUTE_LOG_ASYNC").unwrap_or(defaults.async_logging),
            target_filter: lookup("METAROUTE_LOG_TARGET_FILTER"),
            include_location: parsed(&lookup, "METAROUTE_LOG_INCLUDE_LOCATION")
                .unwrap_or(defaults.include_location),
        }
    }

    /// Human-readable, unsampled, synchronous output for local runs.
    #[must_use]
    pub fn development() -> Self {
        Self {
            level: "debug".to_string(),
            format: LogFormat::Pretty,
            async_logging: false,
            include_location: true,
            ..Self::default()
        }
    }
}

/// Value of `key` parsed as `T`; `None` when unset or unparsable.
fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}

/// Drops a share of events below WARN according to [`SamplingMode`].
pub struct SamplingLayer {
    mode: SamplingMode,
    interval: u64,
    counter: AtomicU64,
}

impl SamplingLayer {
    #[must_use]
    pub fn new(mode: SamplingMode, rate: f64) -> Self {
        let rate = rate.clamp(0.0, 1.0);
        // A rate of zero keeps only warnings and errors.
        let interval = if rate > 0.0 { (1.0 / rate).round() as u64 } else { 0 };
        Self {
            mode,
            interval,
            counter: AtomicU64::new(0),
        }
    }

    fn should_sample(&self, metadata: &Metadata<'_>) -> bool {
        let severe = matches!(*metadata.level(), Level::WARN | Level::ERROR);
        match self.mode {
            SamplingMode::All => true,
            SamplingMode::ErrorOnly => severe,
            SamplingMode::Sampled => {
                if severe || metadata.is_span() {
                    return true;
                }
                let count = self.counter.fetch_add(1, Ordering::Relaxed);
                self.interval > 0 && count % self.interval == 0
            }
        }
    }
}

impl<S> Layer<S> for SamplingLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn enabled(&self, metadata: &Metadata<'_>, _ctx: LayerContext<'_, S>) -> bool {
        self.should_sample(metadata)
    }
}

fn level_of(level: &str) -> Level {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Install the global subscriber.
///
/// With async logging the returned guard flushes the background writer
/// when dropped; keep it alive for the life of the process.
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let level = level_of(&config.level);
    let mut env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    env_filter = env_filter.add_directive(
        "may_minihttp=warn"
            .parse()
            .context("invalid built-in log directive")?,
    );
    if let Some(filters) = &config.target_filter {
        for directive in filters.split(',').map(str::trim).filter(|d| !d.is_empty()) {
            let directive = directive
                .parse()
                .with_context(|| format!("invalid log filter directive `{directive}`"))?;
            env_filter = env_filter.add_directive(directive);
        }
    }

    let (writer, guard) = if config.async_logging {
        let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());
        (tracing_subscriber::fmt::writer::BoxMakeWriter::new(writer), Some(guard))
    } else {
        (
            tracing_subscriber::fmt::writer::BoxMakeWriter::new(std::io::stdout),
            None,
        )
    };

    let fmt_layer = match config.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_writer(writer)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .pretty()
            .with_target(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_writer(writer)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(SamplingLayer::new(config.sampling_mode, config.sampling_rate))
        .with(fmt_layer)
        .try_init()
        .context("failed to install tracing subscriber")?;
    Ok(guard)
}
