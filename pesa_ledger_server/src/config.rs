//! Server configuration.
//!
//! Everything is read from `PLG_*` environment variables, with sane defaults for anything that is
//! not security sensitive. Secrets loaded here are wrapped in [`Secret`] so they never leak into
//! logs.

use std::env;

use chrono::Duration;
use gateway_tools::GatewayConfig;
use log::*;
use pesa_ledger_engine::FeeSchedule;
use plg_common::{parse_boolean_flag, Secret, Tzs};

const DEFAULT_PLG_HOST: &str = "127.0.0.1";
const DEFAULT_PLG_PORT: u16 = 8460;
const DEFAULT_COIN_RATE: f64 = 0.1;
const DEFAULT_FEE_RATE: f64 = 0.05;
const DEFAULT_FLAT_FEE: i64 = 500;
const DEFAULT_MIN_WITHDRAWAL: i64 = 10_000;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
const DEFAULT_STALE_INTENT_MINUTES: i64 = 30;
const DEFAULT_MISSING_CREDIT_MINUTES: i64 = 24 * 60;
const DEFAULT_PROBE_DELAY_SECS: u64 = 3;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Coins credited per shilling of a settled top-up.
    pub coin_rate: f64,
    pub fees: FeeSchedule,
    /// Key for verifying webhook signatures. When unset, webhooks are accepted unverified and a
    /// warning is logged on every call.
    pub webhook_secret: Option<Secret<String>>,
    pub gateway: GatewayConfig,
    pub reconciler: ReconcilerConfig,
}

#[derive(Clone, Copy, Debug)]
pub struct ReconcilerConfig {
    /// Time between reconciliation sweeps.
    pub sweep_interval_secs: u64,
    /// How long an intent may sit in `Pending` before the expiry sweep retires it.
    pub stale_intent_age: Duration,
    /// How far back the missing-credit sweep looks for completed-but-uncredited intents.
    pub missing_credit_window: Duration,
    /// Delay before the one-shot status probe that follows each intent creation.
    pub probe_delay_secs: u64,
    /// Master switch, so tests can run the server without background sweeps.
    pub enabled: bool,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            stale_intent_age: Duration::minutes(DEFAULT_STALE_INTENT_MINUTES),
            missing_credit_window: Duration::minutes(DEFAULT_MISSING_CREDIT_MINUTES),
            probe_delay_secs: DEFAULT_PROBE_DELAY_SECS,
            enabled: true,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_PLG_HOST.to_string(),
            port: DEFAULT_PLG_PORT,
            database_url: String::default(),
            coin_rate: DEFAULT_COIN_RATE,
            fees: default_fees(),
            webhook_secret: None,
            gateway: GatewayConfig::default(),
            reconciler: ReconcilerConfig::default(),
        }
    }
}

fn default_fees() -> FeeSchedule {
    FeeSchedule {
        platform_rate: DEFAULT_FEE_RATE,
        flat_fee: Tzs::from(DEFAULT_FLAT_FEE),
        minimum: Tzs::from(DEFAULT_MIN_WITHDRAWAL),
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("PLG_HOST").ok().unwrap_or_else(|| DEFAULT_PLG_HOST.into());
        let port = env::var("PLG_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for PLG_PORT. {e} Using the default, {DEFAULT_PLG_PORT}, instead."
                    );
                    DEFAULT_PLG_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_PLG_PORT);
        let database_url = env::var("PLG_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ PLG_DATABASE_URL is not set. Please set it to the URL for the ledger database.");
            String::default()
        });
        let coin_rate = env_f64("PLG_COIN_RATE", DEFAULT_COIN_RATE);
        let fees = fees_from_env();
        let webhook_secret = env::var("PLG_WEBHOOK_SECRET").ok().map(Secret::new);
        if webhook_secret.is_none() {
            warn!(
                "🚨️ PLG_WEBHOOK_SECRET is not set. Incoming webhooks will NOT be signature-checked. Do not run in \
                 production like this."
            );
        }
        let gateway = GatewayConfig::new_from_env_or_default();
        let reconciler = ReconcilerConfig::from_env_or_default();
        Self { host, port, database_url, coin_rate, fees, webhook_secret, gateway, reconciler }
    }
}

impl ReconcilerConfig {
    pub fn from_env_or_default() -> Self {
        let sweep_interval_secs = env_u64("PLG_SWEEP_INTERVAL", DEFAULT_SWEEP_INTERVAL_SECS);
        let stale_intent_age = env_minutes("PLG_STALE_INTENT_MINUTES", DEFAULT_STALE_INTENT_MINUTES);
        let missing_credit_window = env_minutes("PLG_MISSING_CREDIT_MINUTES", DEFAULT_MISSING_CREDIT_MINUTES);
        let probe_delay_secs = env_u64("PLG_PROBE_DELAY", DEFAULT_PROBE_DELAY_SECS);
        let enabled = !parse_boolean_flag(env::var("PLG_DISABLE_RECONCILER").ok(), false);
        if !enabled {
            warn!("🪛️ The reconciler is disabled. Missed webhooks will never be repaired.");
        }
        Self { sweep_interval_secs, stale_intent_age, missing_credit_window, probe_delay_secs, enabled }
    }
}

fn fees_from_env() -> FeeSchedule {
    let platform_rate = env_f64("PLG_FEE_RATE", DEFAULT_FEE_RATE);
    let flat_fee = Tzs::from(env_i64("PLG_FLAT_FEE", DEFAULT_FLAT_FEE));
    let minimum = Tzs::from(env_i64("PLG_MIN_WITHDRAWAL", DEFAULT_MIN_WITHDRAWAL));
    FeeSchedule { platform_rate, flat_fee, minimum }
}

fn env_f64(var: &str, default: f64) -> f64 {
    env::var(var)
        .ok()
        .and_then(|s| {
            s.parse::<f64>().map_err(|e| warn!("🪛️ Invalid configuration value for {var}: {s}. {e}")).ok()
        })
        .unwrap_or(default)
}

fn env_i64(var: &str, default: i64) -> i64 {
    env::var(var)
        .ok()
        .and_then(|s| {
            s.parse::<i64>().map_err(|e| warn!("🪛️ Invalid configuration value for {var}: {s}. {e}")).ok()
        })
        .unwrap_or(default)
}

fn env_u64(var: &str, default: u64) -> u64 {
    env::var(var)
        .ok()
        .and_then(|s| {
            s.parse::<u64>().map_err(|e| warn!("🪛️ Invalid configuration value for {var}: {s}. {e}")).ok()
        })
        .unwrap_or(default)
}

fn env_minutes(var: &str, default: i64) -> Duration {
    Duration::minutes(env_i64(var, default))
}
