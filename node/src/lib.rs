use liftoff_execution::{
    fairness::{Distribution, Policy},
    MultiplierClock, RoundError,
};
use liftoff_types::crash::{
    Multiplier, BETTING_WINDOW_SECS, DEFAULT_HOUSE_EDGE, HISTORY_CAPACITY, MAX_CRASH_POINT,
    MAX_SEED_LENGTH,
};
use serde::{Deserialize, Serialize};
use std::{str::FromStr, time::Duration};
use thiserror::Error;
use tracing::Level;

pub mod bots;
pub mod engine;
pub mod journal;
pub mod scheduler;
pub mod wallet;

/// Errors returned by [engine::Engine] operations.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Error {
    #[error("round {0} not found")]
    RoundNotFound(u64),
    #[error(transparent)]
    Round(#[from] RoundError),
    #[error("insufficient funds")]
    InsufficientFunds,
    #[error("wallet error: {0}")]
    Wallet(String),
}

/// Configuration for the liftoff binary.
#[derive(Deserialize, Serialize)]
pub struct Config {
    pub log_level: String,
    #[serde(default)]
    pub json_logs: bool,
    pub metrics_port: u16,
    pub worker_threads: usize,

    #[serde(default = "default_house_edge")]
    pub house_edge: f64,
    #[serde(default = "default_max_crash_point")]
    pub max_crash_point: f64,
    #[serde(default = "default_distribution")]
    pub distribution: String,
    #[serde(default = "default_growth")]
    pub growth: f64,
    #[serde(default)]
    pub client_seed: Option<String>,

    #[serde(default = "default_betting_window_ms")]
    pub betting_window_ms: u64,
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    #[serde(default = "default_auto_restart")]
    pub auto_restart: bool,

    #[serde(default)]
    pub bots: usize,
    #[serde(default = "default_bot_funding")]
    pub bot_funding: u64,
    #[serde(default = "default_bot_max_stake")]
    pub bot_max_stake: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid log level: {value}")]
    InvalidLogLevel { value: String },
    #[error("{field} must be > 0 (got {value})")]
    InvalidNonZero { field: &'static str, value: u64 },
    #[error("{field} must be at most {max} (got {value})")]
    TooLarge {
        field: &'static str,
        value: u64,
        max: u64,
    },
    #[error("house_edge must be in [0, 1) (got {value})")]
    InvalidHouseEdge { value: f64 },
    #[error("max_crash_point must be at least 1.01 (got {value})")]
    InvalidMaxCrashPoint { value: f64 },
    #[error("growth must be > 0 (got {value})")]
    InvalidGrowth { value: f64 },
    #[error("unknown distribution: {value}")]
    InvalidDistribution { value: String },
    #[error("client_seed must be 1..={max} bytes (got {len})")]
    InvalidClientSeed { len: usize, max: usize },
}

pub struct ValidatedConfig {
    pub log_level: Level,
    pub json_logs: bool,
    pub metrics_port: u16,
    pub worker_threads: usize,

    pub policy: Policy,
    pub clock: MultiplierClock,
    pub client_seed: Option<String>,

    pub betting_window: Duration,
    pub tick: Duration,
    pub cooldown: Duration,
    pub history_capacity: usize,
    pub auto_restart: bool,

    pub bots: usize,
    pub bot_funding: u64,
    pub bot_max_stake: u64,
}

fn default_house_edge() -> f64 {
    DEFAULT_HOUSE_EDGE
}

fn default_max_crash_point() -> f64 {
    MAX_CRASH_POINT.as_f64()
}

fn default_distribution() -> String {
    "inverse".to_string()
}

fn default_growth() -> f64 {
    liftoff_execution::clock::DEFAULT_GROWTH
}

fn default_betting_window_ms() -> u64 {
    BETTING_WINDOW_SECS * 1_000
}

fn default_tick_ms() -> u64 {
    scheduler::DEFAULT_TICK.as_millis() as u64
}

fn default_cooldown_ms() -> u64 {
    3_000
}

fn default_history_capacity() -> usize {
    HISTORY_CAPACITY
}

fn default_auto_restart() -> bool {
    true
}

fn default_bot_funding() -> u64 {
    10_000
}

fn default_bot_max_stake() -> u64 {
    500
}

/// Upper bound for every configured duration (one day).
pub const MAX_DURATION_MS: u64 = 24 * 60 * 60 * 1_000;

fn at_most(field: &'static str, value: u64, max: u64) -> Result<u64, ConfigError> {
    if value > max {
        return Err(ConfigError::TooLarge { field, value, max });
    }
    Ok(value)
}

fn non_zero(field: &'static str, value: u64) -> Result<u64, ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidNonZero { field, value });
    }
    Ok(value)
}

impl Config {
    pub fn validate(self) -> Result<ValidatedConfig, ConfigError> {
        let log_level =
            Level::from_str(&self.log_level).map_err(|_| ConfigError::InvalidLogLevel {
                value: self.log_level.clone(),
            })?;

        if !(0.0..1.0).contains(&self.house_edge) {
            return Err(ConfigError::InvalidHouseEdge {
                value: self.house_edge,
            });
        }
        let cap = Multiplier::floor(self.max_crash_point);
        if !self.max_crash_point.is_finite() || cap <= Multiplier::ONE {
            return Err(ConfigError::InvalidMaxCrashPoint {
                value: self.max_crash_point,
            });
        }
        if !(self.growth.is_finite() && self.growth > 0.0) {
            return Err(ConfigError::InvalidGrowth { value: self.growth });
        }
        let distribution = match self.distribution.to_ascii_lowercase().as_str() {
            "inverse" => Distribution::Inverse,
            "edge" => Distribution::Edge,
            _ => {
                return Err(ConfigError::InvalidDistribution {
                    value: self.distribution,
                })
            }
        };

        if let Some(seed) = &self.client_seed {
            if seed.is_empty() || seed.len() > MAX_SEED_LENGTH {
                return Err(ConfigError::InvalidClientSeed {
                    len: seed.len(),
                    max: MAX_SEED_LENGTH,
                });
            }
        }

        non_zero("worker_threads", self.worker_threads as u64)?;
        let betting_window = non_zero("betting_window_ms", self.betting_window_ms)?;
        at_most("betting_window_ms", betting_window, MAX_DURATION_MS)?;
        let tick = non_zero("tick_ms", self.tick_ms)?;
        at_most("tick_ms", tick, MAX_DURATION_MS)?;
        let cooldown = at_most("cooldown_ms", self.cooldown_ms, MAX_DURATION_MS)?;
        let history_capacity = non_zero("history_capacity", self.history_capacity as u64)?;
        if self.bots > 0 {
            non_zero("bot_max_stake", self.bot_max_stake)?;
        }

        Ok(ValidatedConfig {
            log_level,
            json_logs: self.json_logs,
            metrics_port: self.metrics_port,
            worker_threads: self.worker_threads,
            policy: Policy {
                house_edge: self.house_edge,
                cap,
                distribution,
            },
            clock: MultiplierClock::new(self.growth),
            client_seed: self.client_seed,
            betting_window: Duration::from_millis(betting_window),
            tick: Duration::from_millis(tick),
            cooldown: Duration::from_millis(cooldown),
            history_capacity: history_capacity as usize,
            auto_restart: self.auto_restart,
            bots: self.bots,
            bot_funding: self.bot_funding,
            bot_max_stake: self.bot_max_stake,
        })
    }
}

impl ValidatedConfig {
    /// Engine configuration over the given collaborators.
    pub fn engine<W: wallet::Wallet, J: journal::Journal>(
        &self,
        wallet: W,
        journal: J,
    ) -> engine::Config<W, J> {
        engine::Config {
            wallet,
            journal,
            policy: self.policy,
            clock: self.clock,
            client_seed: self.client_seed.clone(),
            betting_window: self.betting_window,
            cooldown: self.cooldown,
            history_capacity: self.history_capacity,
            auto_restart: self.auto_restart,
        }
    }
}

#[cfg(test)]
mod tests;
