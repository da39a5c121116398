//! # Bastion Control Configuration
//!
//! CLI-first configuration for the control plane. Uses `clap::Parser` for
//! argument parsing with environment variable fallbacks, and `bon::Builder`
//! for ergonomic test construction without CLI/env interference.
//!
//! ```no_run
//! use bastion_control_config::{Cli, Config};
//! use clap::Parser;
//!
//! let cli = Cli::parse();
//! let config = cli.config;
//! config.validate().expect("invalid configuration");
//! ```
//!
//! ```no_run
//! use bastion_control_config::{Config, StorageBackend};
//!
//! let config = Config::builder()
//!     .storage(StorageBackend::Memory)
//!     .auth_limit(3)
//!     .build();
//! ```

#![deny(unsafe_code)]

use std::{net::SocketAddr, path::PathBuf, time::Duration};

use bastion_control_const::{
    duration,
    limits::{DEFAULT_KNOWN_SERVICES, MAX_FAULT_WINDOW_SECONDS},
    ratelimit as tiers,
};
use bastion_control_types::{
    entities::{RateLimit, RateLimitTable},
    error::{Error, Result},
    validation::service_name_regex,
};
use bon::Builder;
use clap::Parser;

/// Default HTTP listen address.
const DEFAULT_LISTEN: &str = "127.0.0.1:9090";

/// Default master key file path.
const DEFAULT_KEY_FILE: &str = "./data/master.key";

/// Default SQLite database path.
const DEFAULT_SQLITE_PATH: &str = "./data/control.db";

/// Default log level filter string.
const DEFAULT_LOG_LEVEL: &str = "info";

/// Default base URL for generated media references.
const DEFAULT_RESULT_BASE_URL: &str = "https://media.example.com/generated";

/// Longest credential validity accepted (the CA/Browser Forum TLS maximum).
const MAX_CREDENTIAL_VALIDITY_DAYS: i64 = 397;

/// Storage backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum StorageBackend {
    /// In-memory storage (data lost on restart).
    Memory,
    /// Persistent storage in a local SQLite file.
    #[default]
    Sqlite,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum LogFormat {
    /// Automatically detect: JSON for non-TTY stdout, text otherwise.
    #[default]
    Auto,
    /// JSON structured logging (recommended for production).
    Json,
    /// Human-readable text format.
    Text,
}

/// Command-line interface for the Bastion Control Plane.
#[derive(Debug, Parser)]
#[command(name = "bastion-control")]
#[command(version)]
pub struct Cli {
    /// Subcommand to run. If omitted, starts the server.
    #[command(subcommand)]
    pub command: Option<CliCommand>,

    /// Server configuration (flattened so flags appear at top level).
    #[command(flatten)]
    pub config: Config,
}

/// CLI subcommands.
#[derive(Debug, clap::Subcommand)]
pub enum CliCommand {
    /// Validate the configuration and exit.
    CheckConfig,
}

/// Configuration for the Bastion Control Plane.
///
/// All fields are configurable via CLI flags or environment variables.
/// Precedence: CLI arg > env var > default value.
#[derive(Debug, Clone, Builder, Parser)]
#[command(name = "bastion-control")]
#[command(version)]
#[builder(on(String, into))]
pub struct Config {
    // ── Server ───────────────────────────────────────────────────────
    /// HTTP bind address.
    #[arg(long = "listen", env = "BASTION__CONTROL__LISTEN", default_value = DEFAULT_LISTEN)]
    #[builder(default = default_listen())]
    pub listen: SocketAddr,

    /// Tracing-subscriber filter string (e.g., info, debug, trace).
    #[arg(long = "log-level", env = "BASTION__CONTROL__LOG_LEVEL", default_value = DEFAULT_LOG_LEVEL)]
    #[builder(default = DEFAULT_LOG_LEVEL.to_string())]
    pub log_level: String,

    /// Log output format: auto, json, or text.
    #[arg(
        long = "log-format",
        env = "BASTION__CONTROL__LOG_FORMAT",
        value_enum,
        default_value = "auto"
    )]
    #[builder(default)]
    pub log_format: LogFormat,

    /// Identifier of this instance in leader election and health output.
    /// Generated at startup when omitted.
    #[arg(long = "instance-id", env = "BASTION__CONTROL__INSTANCE_ID")]
    pub instance_id: Option<String>,

    // ── Storage & Encryption ─────────────────────────────────────────
    /// Storage backend: memory or sqlite.
    #[arg(
        long = "storage",
        env = "BASTION__CONTROL__STORAGE",
        value_enum,
        default_value = "sqlite"
    )]
    #[builder(default)]
    pub storage: StorageBackend,

    /// SQLite database file. Used when storage=sqlite.
    #[arg(long = "sqlite-path", env = "BASTION__CONTROL__SQLITE_PATH", default_value = DEFAULT_SQLITE_PATH)]
    #[builder(default = PathBuf::from(DEFAULT_SQLITE_PATH))]
    pub sqlite_path: PathBuf,

    /// Path to the AES-256-GCM master key file for encrypting private keys at rest.
    #[arg(long = "key-file", env = "BASTION__CONTROL__KEY_FILE", default_value = DEFAULT_KEY_FILE)]
    #[builder(default = PathBuf::from(DEFAULT_KEY_FILE))]
    pub key_file: PathBuf,

    // ── Rate Limits ──────────────────────────────────────────────────
    /// Requests per window for the general tier.
    #[arg(long = "general-limit", env = "BASTION__CONTROL__GENERAL_LIMIT", default_value_t = tiers::GENERAL_LIMIT)]
    #[builder(default = tiers::GENERAL_LIMIT)]
    pub general_limit: u32,

    #[arg(long = "general-window-secs", env = "BASTION__CONTROL__GENERAL_WINDOW_SECS", default_value_t = tiers::GENERAL_WINDOW_SECONDS)]
    #[builder(default = tiers::GENERAL_WINDOW_SECONDS)]
    pub general_window_secs: u64,

    #[arg(long = "general-block-secs", env = "BASTION__CONTROL__GENERAL_BLOCK_SECS", default_value_t = tiers::GENERAL_BLOCK_SECONDS)]
    #[builder(default = tiers::GENERAL_BLOCK_SECONDS)]
    pub general_block_secs: u64,

    /// Requests per window for the auth tier (credential operations).
    #[arg(long = "auth-limit", env = "BASTION__CONTROL__AUTH_LIMIT", default_value_t = tiers::AUTH_LIMIT)]
    #[builder(default = tiers::AUTH_LIMIT)]
    pub auth_limit: u32,

    #[arg(long = "auth-window-secs", env = "BASTION__CONTROL__AUTH_WINDOW_SECS", default_value_t = tiers::AUTH_WINDOW_SECONDS)]
    #[builder(default = tiers::AUTH_WINDOW_SECONDS)]
    pub auth_window_secs: u64,

    #[arg(long = "auth-block-secs", env = "BASTION__CONTROL__AUTH_BLOCK_SECS", default_value_t = tiers::AUTH_BLOCK_SECONDS)]
    #[builder(default = tiers::AUTH_BLOCK_SECONDS)]
    pub auth_block_secs: u64,

    /// Requests per window for the upload tier (job creation).
    #[arg(long = "upload-limit", env = "BASTION__CONTROL__UPLOAD_LIMIT", default_value_t = tiers::UPLOAD_LIMIT)]
    #[builder(default = tiers::UPLOAD_LIMIT)]
    pub upload_limit: u32,

    #[arg(long = "upload-window-secs", env = "BASTION__CONTROL__UPLOAD_WINDOW_SECS", default_value_t = tiers::UPLOAD_WINDOW_SECONDS)]
    #[builder(default = tiers::UPLOAD_WINDOW_SECONDS)]
    pub upload_window_secs: u64,

    #[arg(long = "upload-block-secs", env = "BASTION__CONTROL__UPLOAD_BLOCK_SECS", default_value_t = tiers::UPLOAD_BLOCK_SECONDS)]
    #[builder(default = tiers::UPLOAD_BLOCK_SECONDS)]
    pub upload_block_secs: u64,

    /// Requests per window for the payment tier.
    #[arg(long = "payment-limit", env = "BASTION__CONTROL__PAYMENT_LIMIT", default_value_t = tiers::PAYMENT_LIMIT)]
    #[builder(default = tiers::PAYMENT_LIMIT)]
    pub payment_limit: u32,

    #[arg(long = "payment-window-secs", env = "BASTION__CONTROL__PAYMENT_WINDOW_SECS", default_value_t = tiers::PAYMENT_WINDOW_SECONDS)]
    #[builder(default = tiers::PAYMENT_WINDOW_SECONDS)]
    pub payment_window_secs: u64,

    #[arg(long = "payment-block-secs", env = "BASTION__CONTROL__PAYMENT_BLOCK_SECS", default_value_t = tiers::PAYMENT_BLOCK_SECONDS)]
    #[builder(default = tiers::PAYMENT_BLOCK_SECONDS)]
    pub payment_block_secs: u64,

    /// Requests per window for API-key callers (replaces the general tier).
    #[arg(long = "api-key-limit", env = "BASTION__CONTROL__API_KEY_LIMIT", default_value_t = tiers::API_KEY_LIMIT)]
    #[builder(default = tiers::API_KEY_LIMIT)]
    pub api_key_limit: u32,

    #[arg(long = "api-key-window-secs", env = "BASTION__CONTROL__API_KEY_WINDOW_SECS", default_value_t = tiers::API_KEY_WINDOW_SECONDS)]
    #[builder(default = tiers::API_KEY_WINDOW_SECONDS)]
    pub api_key_window_secs: u64,

    #[arg(long = "api-key-block-secs", env = "BASTION__CONTROL__API_KEY_BLOCK_SECS", default_value_t = tiers::API_KEY_BLOCK_SECONDS)]
    #[builder(default = tiers::API_KEY_BLOCK_SECONDS)]
    pub api_key_block_secs: u64,

    // ── Jobs ─────────────────────────────────────────────────────────
    /// How long terminal jobs are kept before garbage collection.
    #[arg(long = "job-retention-secs", env = "BASTION__CONTROL__JOB_RETENTION_SECS", default_value_t = duration::JOB_RETENTION_SECONDS)]
    #[builder(default = duration::JOB_RETENTION_SECONDS)]
    pub job_retention_secs: u64,

    /// Interval between generation backend status polls.
    #[arg(long = "job-poll-interval-ms", env = "BASTION__CONTROL__JOB_POLL_INTERVAL_MS", default_value_t = duration::JOB_POLL_INTERVAL_MS)]
    #[builder(default = duration::JOB_POLL_INTERVAL_MS)]
    pub job_poll_interval_ms: u64,

    /// Total time a job may stay non-terminal before it is failed.
    #[arg(long = "job-max-runtime-secs", env = "BASTION__CONTROL__JOB_MAX_RUNTIME_SECS", default_value_t = duration::JOB_MAX_RUNTIME_SECONDS)]
    #[builder(default = duration::JOB_MAX_RUNTIME_SECONDS)]
    pub job_max_runtime_secs: u64,

    /// Timeout for each call into the generation backend.
    #[arg(long = "backend-call-timeout-ms", env = "BASTION__CONTROL__BACKEND_CALL_TIMEOUT_MS", default_value_t = duration::BACKEND_CALL_TIMEOUT_MS)]
    #[builder(default = duration::BACKEND_CALL_TIMEOUT_MS)]
    pub backend_call_timeout_ms: u64,

    /// Processing time reported by the simulated generation backend.
    #[arg(long = "simulated-generation-ms", env = "BASTION__CONTROL__SIMULATED_GENERATION_MS", default_value_t = duration::SIMULATED_GENERATION_MS)]
    #[builder(default = duration::SIMULATED_GENERATION_MS)]
    pub simulated_generation_ms: u64,

    /// Base URL under which generated results are published.
    #[arg(long = "result-base-url", env = "BASTION__CONTROL__RESULT_BASE_URL", default_value = DEFAULT_RESULT_BASE_URL)]
    #[builder(default = DEFAULT_RESULT_BASE_URL.to_string())]
    pub result_base_url: String,

    // ── Credentials ──────────────────────────────────────────────────
    /// Validity of issued service credentials, in days.
    #[arg(long = "credential-validity-days", env = "BASTION__CONTROL__CREDENTIAL_VALIDITY_DAYS", default_value_t = duration::CREDENTIAL_VALIDITY_DAYS)]
    #[builder(default = duration::CREDENTIAL_VALIDITY_DAYS)]
    pub credential_validity_days: i64,

    /// Services allowed to receive credentials (comma separated).
    /// An empty list accepts any well-formed service name.
    #[arg(
        long = "known-services",
        env = "BASTION__CONTROL__KNOWN_SERVICES",
        value_delimiter = ',',
        default_values_t = default_known_services()
    )]
    #[builder(default = default_known_services())]
    pub known_services: Vec<String>,

    // ── Fault Injection ──────────────────────────────────────────────
    /// Default window an applied fault stays installed.
    #[arg(long = "fault-window-secs", env = "BASTION__CONTROL__FAULT_WINDOW_SECS", default_value_t = duration::DEFAULT_FAULT_WINDOW_SECONDS)]
    #[builder(default = duration::DEFAULT_FAULT_WINDOW_SECONDS)]
    pub fault_window_secs: u64,

    // ── Mode Flags ───────────────────────────────────────────────────
    /// Force development mode: uses in-memory storage regardless of --storage
    /// and exposes internal error messages to callers.
    /// No environment variable — this must be an explicit CLI choice.
    #[arg(long = "dev-mode")]
    #[builder(default)]
    pub dev_mode: bool,
}

fn default_listen() -> SocketAddr {
    #[allow(clippy::expect_used)]
    DEFAULT_LISTEN.parse().expect("valid default listen address")
}

fn default_known_services() -> Vec<String> {
    DEFAULT_KNOWN_SERVICES.iter().map(ToString::to_string).collect()
}

fn require_non_zero(flag: &str, value: u64) -> Result<()> {
    if value == 0 {
        return Err(Error::config(format!("--{flag} must be greater than zero")));
    }
    Ok(())
}

impl Config {
    /// Validate cross-field business rules.
    ///
    /// Must be called after parsing and before using the config.
    pub fn validate(&self) -> Result<()> {
        if self.effective_storage() == StorageBackend::Sqlite
            && self.sqlite_path.as_os_str().is_empty()
        {
            return Err(Error::config("--sqlite-path is required when storage=sqlite"));
        }

        for (tier, limit) in [
            ("general", self.general_limit),
            ("auth", self.auth_limit),
            ("upload", self.upload_limit),
            ("payment", self.payment_limit),
            ("api-key", self.api_key_limit),
        ] {
            require_non_zero(&format!("{tier}-limit"), u64::from(limit))?;
        }
        for (flag, secs) in [
            ("general-window-secs", self.general_window_secs),
            ("auth-window-secs", self.auth_window_secs),
            ("upload-window-secs", self.upload_window_secs),
            ("payment-window-secs", self.payment_window_secs),
            ("api-key-window-secs", self.api_key_window_secs),
        ] {
            require_non_zero(flag, secs)?;
        }

        require_non_zero("job-poll-interval-ms", self.job_poll_interval_ms)?;
        require_non_zero("job-max-runtime-secs", self.job_max_runtime_secs)?;
        require_non_zero("backend-call-timeout-ms", self.backend_call_timeout_ms)?;
        require_non_zero("job-retention-secs", self.job_retention_secs)?;
        if self.job_poll_interval() >= self.job_max_runtime() {
            return Err(Error::config(
                "--job-poll-interval-ms must be shorter than --job-max-runtime-secs",
            ));
        }

        if !self.result_base_url.starts_with("http://") && !self.result_base_url.starts_with("https://")
        {
            return Err(Error::config("--result-base-url must start with http:// or https://"));
        }
        if self.result_base_url.ends_with('/') {
            return Err(Error::config("--result-base-url must not end with a trailing slash"));
        }

        if !(1..=MAX_CREDENTIAL_VALIDITY_DAYS).contains(&self.credential_validity_days) {
            return Err(Error::config(format!(
                "--credential-validity-days must be between 1 and {MAX_CREDENTIAL_VALIDITY_DAYS}"
            )));
        }

        if let Some(bad) = self.known_services.iter().find(|s| !service_name_regex().is_match(s)) {
            return Err(Error::config(format!("--known-services contains an invalid name: {bad}")));
        }

        if self.fault_window_secs == 0 || self.fault_window_secs > MAX_FAULT_WINDOW_SECONDS.unsigned_abs() {
            return Err(Error::config(format!(
                "--fault-window-secs must be between 1 and {MAX_FAULT_WINDOW_SECONDS}"
            )));
        }

        if self.dev_mode {
            tracing::warn!("--dev-mode is set: storage is in-memory and internal errors are exposed");
        }

        Ok(())
    }

    /// Returns the effective storage backend, accounting for dev-mode override.
    ///
    /// When `dev_mode` is true, always returns `Memory` regardless of the
    /// `storage` field value.
    pub fn effective_storage(&self) -> StorageBackend {
        if self.dev_mode { StorageBackend::Memory } else { self.storage }
    }

    /// Returns whether dev-mode is enabled.
    pub fn is_dev_mode(&self) -> bool {
        self.dev_mode
    }

    /// Per-tier quotas consumed by the rate limiter.
    pub fn rate_limits(&self) -> RateLimitTable {
        RateLimitTable {
            general: RateLimit::new(self.general_limit, self.general_window_secs, self.general_block_secs),
            auth: RateLimit::new(self.auth_limit, self.auth_window_secs, self.auth_block_secs),
            upload: RateLimit::new(self.upload_limit, self.upload_window_secs, self.upload_block_secs),
            payment: RateLimit::new(self.payment_limit, self.payment_window_secs, self.payment_block_secs),
            api_key: RateLimit::new(self.api_key_limit, self.api_key_window_secs, self.api_key_block_secs),
        }
    }

    pub fn job_retention(&self) -> Duration {
        Duration::from_secs(self.job_retention_secs)
    }

    pub fn job_poll_interval(&self) -> Duration {
        Duration::from_millis(self.job_poll_interval_ms)
    }

    pub fn job_max_runtime(&self) -> Duration {
        Duration::from_secs(self.job_max_runtime_secs)
    }

    pub fn backend_call_timeout(&self) -> Duration {
        Duration::from_millis(self.backend_call_timeout_ms)
    }

    pub fn simulated_generation(&self) -> Duration {
        Duration::from_millis(self.simulated_generation_ms)
    }

    pub fn fault_window(&self) -> Duration {
        Duration::from_secs(self.fault_window_secs)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    // ── Default Values ───────────────────────────────────────────────

    #[test]
    fn defaults_match_expected_values() {
        let config = Config::builder().build();

        assert_eq!(config.listen, "127.0.0.1:9090".parse::<SocketAddr>().unwrap());
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Auto);
        assert!(config.instance_id.is_none());
        assert_eq!(config.storage, StorageBackend::Sqlite);
        assert_eq!(config.sqlite_path, PathBuf::from("./data/control.db"));
        assert_eq!(config.key_file, PathBuf::from("./data/master.key"));
        assert_eq!(config.job_retention_secs, 86_400);
        assert_eq!(config.credential_validity_days, 90);
        assert_eq!(config.fault_window_secs, 60);
        assert_eq!(config.known_services.len(), 13);
        assert!(!config.dev_mode);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn cli_defaults_match_builder_defaults() {
        let cli = Cli::try_parse_from(["test"]).unwrap();
        let built = Config::builder().build();

        assert_eq!(cli.config.known_services, built.known_services);
        assert_eq!(cli.config.rate_limits(), built.rate_limits());
        assert_eq!(cli.config.result_base_url, built.result_base_url);
    }

    #[test]
    fn default_rate_limits_match_tier_table() {
        assert_eq!(Config::builder().build().rate_limits(), RateLimitTable::default());
    }

    // ── Validation ───────────────────────────────────────────────────

    #[test]
    fn rejects_empty_sqlite_path() {
        let config = Config::builder().sqlite_path(PathBuf::new()).build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn dev_mode_skips_sqlite_path_check() {
        let config = Config::builder().sqlite_path(PathBuf::new()).dev_mode(true).build();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_zero_quota() {
        let err = Config::builder().auth_limit(0).build().validate().unwrap_err();
        assert!(err.to_string().contains("--auth-limit"));

        let err = Config::builder().upload_window_secs(0).build().validate().unwrap_err();
        assert!(err.to_string().contains("--upload-window-secs"));
    }

    #[test]
    fn rejects_poll_interval_longer_than_runtime() {
        let config = Config::builder().job_poll_interval_ms(5_000).job_max_runtime_secs(5).build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_bad_result_base_url() {
        assert!(Config::builder().result_base_url("ftp://x").build().validate().is_err());
        assert!(
            Config::builder().result_base_url("https://cdn.test/").build().validate().is_err()
        );
    }

    #[test]
    fn rejects_out_of_range_validity() {
        assert!(Config::builder().credential_validity_days(0).build().validate().is_err());
        assert!(Config::builder().credential_validity_days(398).build().validate().is_err());
        assert!(Config::builder().credential_validity_days(397).build().validate().is_ok());
    }

    #[test]
    fn rejects_malformed_known_service() {
        let config = Config::builder().known_services(vec!["Feed Service".to_string()]).build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn effective_storage_returns_memory_in_dev_mode() {
        let config = Config::builder().storage(StorageBackend::Sqlite).dev_mode(true).build();
        assert_eq!(config.effective_storage(), StorageBackend::Memory);
    }

    // ── CLI Parsing ──────────────────────────────────────────────────

    #[test]
    fn cli_parse_dev_mode() {
        let cli = Cli::try_parse_from(["test", "--dev-mode"]).unwrap();
        assert!(cli.config.dev_mode);
    }

    #[test]
    fn cli_parse_storage_memory() {
        let cli = Cli::try_parse_from(["test", "--storage", "memory"]).unwrap();
        assert_eq!(cli.config.storage, StorageBackend::Memory);
    }

    #[test]
    fn cli_rejects_invalid_storage_value() {
        assert!(Cli::try_parse_from(["test", "--storage", "postgres"]).is_err());
    }

    #[test]
    fn cli_parse_tier_overrides() {
        let cli = Cli::try_parse_from([
            "test",
            "--auth-limit",
            "3",
            "--auth-window-secs",
            "30",
            "--auth-block-secs",
            "90",
        ])
        .unwrap();
        assert_eq!(cli.config.rate_limits().auth, RateLimit::new(3, 30, 90));
    }

    #[test]
    fn cli_parse_known_services_list() {
        let cli = Cli::try_parse_from(["test", "--known-services", "feed,seo"]).unwrap();
        assert_eq!(cli.config.known_services, vec!["feed".to_string(), "seo".to_string()]);
    }

    #[test]
    fn cli_parse_check_config_subcommand() {
        let cli = Cli::try_parse_from(["test", "check-config"]).unwrap();
        assert!(matches!(cli.command, Some(CliCommand::CheckConfig)));
    }

    #[test]
    fn cli_rejects_unknown_flags() {
        assert!(Cli::try_parse_from(["test", "--config", "foo.yaml"]).is_err());
    }

    // ── Enum Display ─────────────────────────────────────────────────

    #[test]
    fn storage_backend_display() {
        assert_eq!(StorageBackend::Memory.to_string(), "memory");
        assert_eq!(StorageBackend::Sqlite.to_string(), "sqlite");
    }

    #[test]
    fn log_format_display() {
        assert_eq!(LogFormat::Auto.to_string(), "auto");
        assert_eq!(LogFormat::Json.to_string(), "json");
        assert_eq!(LogFormat::Text.to_string(), "text");
    }
}
