use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub backend_url: Option<String>,
    pub session_file: PathBuf,
    pub poll_interval: Duration,
    pub offer_countdown_secs: u32,
    pub countdown_tick: Duration,
    pub route_sync_interval: Duration,
    pub payment_poll_interval: Duration,
    pub payment_timeout: Duration,
    pub arrival_radius_m: f64,
    pub request_timeout: Duration,
    pub command_queue_size: usize,
    pub event_buffer_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            backend_url: None,
            session_file: PathBuf::from("driver-session.json"),
            poll_interval: Duration::from_secs(4),
            offer_countdown_secs: 20,
            countdown_tick: Duration::from_secs(1),
            route_sync_interval: Duration::from_secs(10),
            payment_poll_interval: Duration::from_secs(5),
            payment_timeout: Duration::from_secs(300),
            arrival_radius_m: 30.0,
            request_timeout: Duration::from_secs(10),
            command_queue_size: 64,
            event_buffer_size: 1024,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let offer_countdown_secs = parse_or_default(&lookup, "OFFER_COUNTDOWN_SECS", 20u32)?;
        if offer_countdown_secs == 0 {
            return Err(AppError::Internal(
                "invalid OFFER_COUNTDOWN_SECS: must be > 0".to_string(),
            ));
        }

        Ok(Self {
            http_port: parse_or_default(&lookup, "HTTP_PORT", defaults.http_port)?,
            log_level: lookup("LOG_LEVEL").unwrap_or(defaults.log_level),
            backend_url: lookup("BACKEND_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .filter(|url| !url.is_empty()),
            session_file: lookup("SESSION_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.session_file),
            poll_interval: secs_or_default(&lookup, "POLL_INTERVAL_SECS", 4)?,
            offer_countdown_secs,
            countdown_tick: defaults.countdown_tick,
            route_sync_interval: secs_or_default(&lookup, "ROUTE_SYNC_SECS", 10)?,
            payment_poll_interval: secs_or_default(&lookup, "PAYMENT_POLL_SECS", 5)?,
            payment_timeout: secs_or_default(&lookup, "PAYMENT_TIMEOUT_SECS", 300)?,
            arrival_radius_m: parse_or_default(&lookup, "ARRIVAL_RADIUS_M", 30.0)?,
            request_timeout: secs_or_default(&lookup, "REQUEST_TIMEOUT_SECS", 10)?,
            command_queue_size: parse_or_default(&lookup, "COMMAND_QUEUE_SIZE", 64)?,
            event_buffer_size: parse_or_default(&lookup, "EVENT_BUFFER_SIZE", 1024)?,
        })
    }
}

fn parse_or_default<F, T>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        None => Ok(default),
    }
}

fn secs_or_default<F>(lookup: &F, key: &str, default: u64) -> Result<Duration, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    let secs: u64 = parse_or_default(lookup, key, default)?;
    if secs == 0 {
        return Err(AppError::Internal(format!("invalid {key}: must be > 0")));
    }
    Ok(Duration::from_secs(secs))
}
