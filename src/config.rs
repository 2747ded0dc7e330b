//! Configuration and settings management
//!
//! Loads settings from environment variables and defines domain constants.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Application settings loaded from environment variables
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Telegram Bot API token
    pub telegram_token: String,

    /// R2 Storage access key ID
    pub r2_access_key_id: Option<String>,
    /// R2 Storage secret access key
    pub r2_secret_access_key: Option<String>,
    /// R2 Storage endpoint URL
    pub r2_endpoint_url: Option<String>,
    /// R2 Storage bucket name
    pub r2_bucket_name: Option<String>,

    /// Base URL of the ledger gateway
    #[serde(default = "default_ledger_api_url")]
    pub ledger_api_url: String,
    /// Optional API key sent to the ledger gateway
    pub ledger_api_key: Option<String>,

    /// Issuer shown by authenticator apps
    #[serde(default = "default_otp_issuer")]
    pub otp_issuer: String,

    /// Maximum admitted events per window
    #[serde(default = "default_rate_limit_max")]
    pub rate_limit_max: usize,
    /// Sliding window length in milliseconds
    #[serde(default = "default_rate_limit_window_ms")]
    pub rate_limit_window_ms: u64,
    /// Temporary block length in milliseconds
    #[serde(default = "default_rate_limit_block_ms")]
    pub rate_limit_block_ms: u64,

    /// Pending flow snapshots older than this are swept
    #[serde(default = "default_pending_state_ttl_hours")]
    pub pending_state_ttl_hours: u64,
    /// Sessions older than this are swept
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: u64,
    /// Interval between background sweeps
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_ledger_api_url() -> String {
    "http://127.0.0.1:8090".to_string()
}

fn default_otp_issuer() -> String {
    "TRON Wallet Bot".to_string()
}

const fn default_rate_limit_max() -> usize {
    8
}

const fn default_rate_limit_window_ms() -> u64 {
    10_000
}

const fn default_rate_limit_block_ms() -> u64 {
    15_000
}

const fn default_pending_state_ttl_hours() -> u64 {
    24
}

const fn default_session_ttl_hours() -> u64 {
    168
}

const fn default_sweep_interval_secs() -> u64 {
    3600
}

/// Builds the layered configuration source shared by all settings loaders.
///
/// # Errors
///
/// Returns a `ConfigError` if a configuration file is malformed.
pub fn build_config() -> Result<Config, ConfigError> {
    let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

    Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
        // Not checked into git
        .add_source(File::with_name("config/local").required(false))
        // Eg. `APP_RATE_LIMIT_MAX=10 ./target/app`
        .add_source(Environment::with_prefix("APP").separator("__"))
        // UPPER_SNAKE_CASE maps to snake_case; empty vars are treated as unset
        .add_source(Environment::default().ignore_empty(true))
        .build()
}

impl Settings {
    /// Create new settings by loading from environment and files
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use tron_wallet_bot::config::Settings;
    ///
    /// let settings = Settings::new().expect("Failed to load configuration");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails.
    pub fn new() -> Result<Self, ConfigError> {
        let mut settings: Self = build_config()?.try_deserialize()?;

        // Fallback for R2 variables the automatic mapping can miss
        for (slot, var) in [
            (&mut settings.r2_endpoint_url, "R2_ENDPOINT_URL"),
            (&mut settings.r2_access_key_id, "R2_ACCESS_KEY_ID"),
            (&mut settings.r2_secret_access_key, "R2_SECRET_ACCESS_KEY"),
            (&mut settings.r2_bucket_name, "R2_BUCKET_NAME"),
        ] {
            if slot.is_none() {
                if let Ok(val) = std::env::var(var) {
                    if !val.is_empty() {
                        *slot = Some(val);
                    }
                }
            }
        }

        Ok(settings)
    }

    /// TTL after which a pending flow snapshot can no longer be resumed
    #[must_use]
    pub const fn pending_state_ttl(&self) -> Duration {
        Duration::from_secs(self.pending_state_ttl_hours * 3600)
    }

    /// TTL after which an idle session is removed
    #[must_use]
    pub const fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_hours * 3600)
    }

    /// Interval between background sweeps
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

// Wallet domain
/// Sun per TRX
pub const SUN_PER_TRX: u64 = 1_000_000;
/// Amount kept back on every withdrawal to pay network fees (2 TRX)
pub const FEE_RESERVE_SUN: u64 = 2 * SUN_PER_TRX;
/// Maximum wallet label length in characters
pub const LABEL_MAX_LEN: usize = 20;
/// Label shown for wallets without one
pub const UNNAMED_WALLET_LABEL: &str = "Unnamed Wallet";

// One-time codes
/// Number of digits in a one-time code
pub const OTP_DIGITS: usize = 6;
/// TOTP time step in seconds
pub const OTP_PERIOD_SECS: u64 = 30;
/// Accepted clock skew in time steps (each direction)
pub const OTP_SKEW_STEPS: i64 = 2;
/// Random bytes in a generated secret
pub const OTP_SECRET_BYTES: usize = 20;

// Telegram API retries
/// Maximum retry attempts for Telegram API calls
pub const TELEGRAM_API_MAX_RETRIES: usize = 3;
/// Initial backoff for Telegram API retries
pub const TELEGRAM_API_INITIAL_BACKOFF_MS: u64 = 500;
/// Backoff ceiling for Telegram API retries
pub const TELEGRAM_API_MAX_BACKOFF_MS: u64 = 4000;

// Per-user lock table
/// Number of idle lock entries tolerated before the table is pruned
pub const USER_LOCK_PRUNE_THRESHOLD: usize = 1024;
