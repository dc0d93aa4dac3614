use std::time::Duration;

use chrono::TimeDelta;
use clap::Parser;

use crate::sweeper::{DEFAULT_RETENTION_HOURS, MAX_RETENTION_HOURS};

/// Runtime settings, read from flags or the environment (`.env` included).
#[derive(Debug, Clone, Parser)]
#[command(name = "bus-tracking", about = "Live bus location tracking API")]
pub struct Config {
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "PORT", default_value_t = 5000)]
    pub port: u16,

    /// PostgreSQL connection string. Without it an in-memory store is used.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    #[arg(long, env = "DB_POOL_SIZE", default_value_t = 5)]
    pub db_pool_size: u32,

    /// History older than this many hours is deleted by cleanup.
    #[arg(
        long,
        env = "RETENTION_HOURS",
        default_value_t = DEFAULT_RETENTION_HOURS,
        value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_RETENTION_HOURS))
    )]
    pub retention_hours: u32,

    /// Run cleanup in the background every N seconds.
    #[arg(long, env = "SWEEP_INTERVAL_SECS", value_parser = clap::value_parser!(u64).range(1..))]
    pub sweep_interval_secs: Option<u64>,
}

impl Config {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn retention(&self) -> TimeDelta {
        TimeDelta::hours(i64::from(self.retention_hours))
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        self.sweep_interval_secs.map(Duration::from_secs)
    }
}
