//! Coordinator configuration
//!
//! Values come from the process environment (optionally seeded from a
//! `.env` file by the binary). Unset variables fall back to defaults;
//! malformed values are rejected.

use std::path::PathBuf;
use std::time::Duration;

use crate::errors::{CoordinatorError, CoordinatorResult};

/// Lower bound for the gap between notification text and submit
pub const MIN_NOTIFICATION_DELAY: Duration = Duration::from_millis(100);

pub const DEFAULT_STATE_PATH: &str = ".coordinator/shared_state.json";
pub const DEFAULT_DATABASE_URL: &str = "sqlite://.coordinator/shared_state.db";

/// Where the shared snapshot lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Json { path: PathBuf },
    Sqlite { database_url: String },
    Memory,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Default filter when RUST_LOG is unset (e.g. "info", "debug")
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Agent-side polling cadence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_backoff: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            max_backoff: Duration::from_secs(60),
        }
    }
}

/// Main configuration for the coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    pub backend: StoreBackend,
    /// Agents silent for longer than this are reported stale
    pub heartbeat_max_age: Duration,
    /// Gap between writing notification text and submitting it
    pub notification_delay: Duration,
    /// A conversation with a message inside this window counts as active
    pub conversation_window: Duration,
    pub poll: PollConfig,
    pub logging: LogConfig,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Json {
                path: PathBuf::from(DEFAULT_STATE_PATH),
            },
            heartbeat_max_age: Duration::from_secs(60),
            notification_delay: MIN_NOTIFICATION_DELAY,
            conversation_window: Duration::from_secs(3600),
            poll: PollConfig::default(),
            logging: LogConfig::default(),
        }
    }
}

impl CoordinatorConfig {
    /// Reads configuration from environment variables
    pub fn from_env() -> CoordinatorResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> CoordinatorResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let backend = match lookup("COORDINATOR_BACKEND").as_deref() {
            None | Some("json") => StoreBackend::Json {
                path: lookup("COORDINATOR_STATE_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_PATH)),
            },
            Some("sqlite") => StoreBackend::Sqlite {
                database_url: lookup("DATABASE_URL").unwrap_or_else(|| {
                    tracing::warn!("DATABASE_URL not set, using default");
                    DEFAULT_DATABASE_URL.to_string()
                }),
            },
            Some("memory") => StoreBackend::Memory,
            Some(other) => {
                return Err(CoordinatorError::Config(format!(
                    "Unknown COORDINATOR_BACKEND: {} (expected json, sqlite or memory)",
                    other
                )))
            }
        };

        let notification_delay = read_duration(
            &lookup,
            "COORDINATOR_NOTIFY_DELAY_MS",
            Duration::from_millis,
            defaults.notification_delay,
        )?;
        if notification_delay < MIN_NOTIFICATION_DELAY {
            tracing::warn!(
                requested_ms = notification_delay.as_millis() as u64,
                "Notification delay below minimum, using 100ms"
            );
        }

        let poll_interval = read_duration(
            &lookup,
            "COORDINATOR_POLL_INTERVAL_SECS",
            Duration::from_secs,
            defaults.poll.interval,
        )?;
        if poll_interval.is_zero() {
            return Err(CoordinatorError::Config(
                "COORDINATOR_POLL_INTERVAL_SECS must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            backend,
            heartbeat_max_age: read_duration(
                &lookup,
                "COORDINATOR_HEARTBEAT_MAX_AGE_SECS",
                Duration::from_secs,
                defaults.heartbeat_max_age,
            )?,
            notification_delay: notification_delay.max(MIN_NOTIFICATION_DELAY),
            conversation_window: read_duration(
                &lookup,
                "COORDINATOR_CONVERSATION_WINDOW_SECS",
                Duration::from_secs,
                defaults.conversation_window,
            )?,
            poll: PollConfig {
                interval: poll_interval,
                max_backoff: read_duration(
                    &lookup,
                    "COORDINATOR_POLL_MAX_BACKOFF_SECS",
                    Duration::from_secs,
                    defaults.poll.max_backoff,
                )?,
            },
            logging: LogConfig {
                level: lookup("COORDINATOR_LOG_LEVEL").unwrap_or(defaults.logging.level),
                json: match lookup("COORDINATOR_LOG_JSON") {
                    Some(raw) => parse_bool("COORDINATOR_LOG_JSON", &raw)?,
                    None => defaults.logging.json,
                },
            },
        })
    }
}

fn read_duration<F>(
    lookup: &F,
    key: &str,
    unit: fn(u64) -> Duration,
    default: Duration,
) -> CoordinatorResult<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(unit)
            .map_err(|e| CoordinatorError::Config(format!("{} must be an integer: {}", key, e))),
        None => Ok(default),
    }
}

fn parse_bool(key: &str, raw: &str) -> CoordinatorResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        other => Err(CoordinatorError::Config(format!(
            "{} must be a boolean, got {}",
            key, other
        ))),
    }
}
