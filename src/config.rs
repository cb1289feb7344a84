// region:    --- Imports
use crate::scheduler::SweepConfig;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

// endregion: --- Imports

// region:    --- Config Errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("환경 변수가 설정되지 않았습니다: {0}")]
    Missing(&'static str),

    #[error("환경 변수 값이 올바르지 않습니다: {name}={value}")]
    Invalid { name: &'static str, value: String },

    #[error("임대 기간({lease_secs}s)은 스윕 주기({interval_secs}s)보다 길어야 합니다.")]
    LeaseNotLongerThanInterval { interval_secs: u64, lease_secs: u64 },
}
// endregion: --- Config Errors

// region:    --- Config
/// 실행 설정
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,
    pub kafka_brokers: String,
    pub events_topic: String,
    pub consumer_group: String,
    pub listen_addr: String,
    pub sweep_interval_secs: u64,
    pub sweep_lease_secs: u64,
    pub sweep_lock_name: String,
    pub propagation_batch_size: usize,
}

impl Config {
    /// 환경 변수에서 설정을 읽는다.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// 주어진 조회 함수로 설정을 읽는다.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |name: &'static str, default: &str| {
            lookup(name).unwrap_or_else(|| default.to_string())
        };

        let config = Config {
            database_url: lookup("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?,
            db_max_connections: parse(&lookup, "DB_MAX_CONNECTIONS", 5)?,
            kafka_brokers: text("KAFKA_BROKERS", "localhost:9092"),
            events_topic: text("EVENTS_TOPIC", "auction-events"),
            consumer_group: text("CONSUMER_GROUP", "auction-marketplace"),
            listen_addr: text("LISTEN_ADDR", "0.0.0.0:3000"),
            sweep_interval_secs: parse(&lookup, "SWEEP_INTERVAL_SECS", 60)?,
            sweep_lease_secs: parse(&lookup, "SWEEP_LEASE_SECS", 62)?,
            sweep_lock_name: text("SWEEP_LOCK_NAME", "auction-completion-sweep"),
            propagation_batch_size: parse(&lookup, "PROPAGATION_BATCH_SIZE", 100)?,
        };

        if config.sweep_lease_secs <= config.sweep_interval_secs {
            return Err(ConfigError::LeaseNotLongerThanInterval {
                interval_secs: config.sweep_interval_secs,
                lease_secs: config.sweep_lease_secs,
            });
        }
        Ok(config)
    }

    pub fn sweep(&self) -> SweepConfig {
        SweepConfig {
            interval: Duration::from_secs(self.sweep_interval_secs),
            lease_duration: chrono::Duration::seconds(self.sweep_lease_secs as i64),
            lock_name: self.sweep_lock_name.clone(),
        }
    }
}

fn parse<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}
// endregion: --- Config

// endregion: --- Tests
