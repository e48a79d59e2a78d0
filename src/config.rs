use std::env;
use std::str::FromStr;
use std::time::Duration;

use log::warn;

use crate::blockchain::DEFAULT_DIFFICULTY;
use crate::miner::{DEFAULT_TIMEOUT, default_worker_count};

/// Mining knobs shared by the HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MiningSettings {
    pub workers: usize,
    pub difficulty: u32,
    pub timeout: Duration,
}

impl Default for MiningSettings {
    fn default() -> Self {
        Self {
            workers: default_worker_count(),
            difficulty: DEFAULT_DIFFICULTY,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Process configuration, read from the environment (and `.env`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub mining: MiningSettings,
    /// `None` disables the periodic deadlock scan.
    pub deadlock_scan_interval: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            mining: MiningSettings::default(),
            deadlock_scan_interval: Some(Duration::from_secs(5)),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset or unparseable keys keep
    /// their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let mining = MiningSettings {
            workers: parse(&lookup, "MINING_WORKERS")
                .filter(|&n: &usize| n > 0)
                .unwrap_or(defaults.mining.workers),
            difficulty: parse(&lookup, "MINING_DIFFICULTY").unwrap_or(defaults.mining.difficulty),
            timeout: parse(&lookup, "MINING_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.mining.timeout),
        };
        let deadlock_scan_interval = match parse::<u64, _>(&lookup, "DEADLOCK_SCAN_SECS") {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => defaults.deadlock_scan_interval,
        };

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse(&lookup, "PORT").unwrap_or(defaults.port),
            mining,
            deadlock_scan_interval,
        }
    }
}

fn parse<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("ignoring unparseable {key}={raw:?}");
            None
        }
    }
}
