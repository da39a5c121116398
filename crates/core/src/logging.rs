//! Structured logging setup for Bastion Control
//!
//! Every subsystem logs through `tracing` with structured fields (`tier`,
//! `caller`, `job_id`, `service`, `serial`, `job`). Secrets never appear in
//! those fields: caller keys are already digested and error messages pass
//! through [`bastion_control_types::redact_text`] before they are logged.

use std::io::IsTerminal;

use tracing_subscriber::{
    EnvFilter, Layer, fmt, fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt,
};

/// Filter used when neither the config nor `RUST_LOG` provides one
const DEFAULT_FILTER: &str = "info,bastion_control=debug";

/// Log output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Single-line text with timestamp, level and fields
    Full,
    /// Human-readable multi-line format with colors
    Pretty,
    /// Compact single-line format
    Compact,
    /// One JSON object per line, for log aggregation
    Json,
}

#[allow(clippy::derivable_impls)]
impl Default for LogFormat {
    fn default() -> Self {
        #[cfg(debug_assertions)]
        {
            LogFormat::Full
        }
        #[cfg(not(debug_assertions))]
        {
            LogFormat::Json
        }
    }
}

/// Configuration for logging behavior
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub format: LogFormat,
    /// Whether to include file/line numbers
    pub include_location: bool,
    /// Whether to include the target module
    pub include_target: bool,
    pub include_thread_id: bool,
    /// Whether to log span events (new/close)
    pub log_spans: bool,
    /// Whether to use ANSI colors (None = auto-detect based on TTY)
    pub ansi: Option<bool>,
    /// Environment filter (e.g., "info,bastion_control=debug")
    pub filter: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            include_location: cfg!(debug_assertions),
            include_target: false,
            include_thread_id: false,
            log_spans: false,
            ansi: None,
            filter: None,
        }
    }
}

/// Install the global `tracing` subscriber
///
/// Fails if the filter does not parse or a subscriber is already installed.
///
/// ```no_run
/// use bastion_control_core::logging::{LogConfig, LogFormat, init_logging};
///
/// init_logging(LogConfig {
///     format: LogFormat::Json,
///     filter: Some("info".to_string()),
///     ..Default::default()
/// })
/// .unwrap();
/// ```
pub fn init_logging(config: LogConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = if let Some(filter) = &config.filter {
        EnvFilter::try_new(filter)?
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    };

    let ansi = config.ansi.unwrap_or_else(|| std::io::stdout().is_terminal());

    let fmt_span = if config.log_spans { FmtSpan::NEW | FmtSpan::CLOSE } else { FmtSpan::NONE };

    match config.format {
        LogFormat::Full => {
            let fmt_layer = fmt::layer()
                .with_ansi(ansi)
                .with_target(config.include_target)
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_filter(env_filter);

            tracing_subscriber::registry().with(fmt_layer).try_init()?;
        },
        LogFormat::Pretty => {
            let fmt_layer = fmt::layer()
                .pretty()
                .with_ansi(ansi)
                .with_target(config.include_target)
                .with_thread_ids(config.include_thread_id)
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_span_events(fmt_span)
                .with_filter(env_filter);

            tracing_subscriber::registry().with(fmt_layer).try_init()?;
        },
        LogFormat::Compact => {
            let fmt_layer = fmt::layer()
                .compact()
                .with_ansi(ansi)
                .with_target(config.include_target)
                .with_thread_ids(config.include_thread_id)
                .with_span_events(fmt_span)
                .with_filter(env_filter);

            tracing_subscriber::registry().with(fmt_layer).try_init()?;
        },
        LogFormat::Json => {
            let fmt_layer = fmt::layer()
                .json()
                .with_target(config.include_target)
                .with_current_span(true)
                .with_span_list(false)
                .with_thread_ids(config.include_thread_id)
                .with_filter(env_filter);

            tracing_subscriber::registry().with(fmt_layer).try_init()?;
        },
    }

    tracing::debug!(format = ?config.format, ansi, "Logging initialized");

    Ok(())
}
