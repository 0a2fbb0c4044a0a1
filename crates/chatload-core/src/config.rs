use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Run parameters. Every section and field is optional in the TOML file and
/// falls back to the defaults below.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub target: TargetConfig,
    pub load: LoadConfig,
    pub warmup: WarmupConfig,
    pub main_phase: MainPhaseConfig,
    pub retry: RetryConfig,
    pub worker: WorkerConfig,
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks: [(bool, &str); 10] = [
            (!self.target.base_url.is_empty(), "target.base_url must not be empty"),
            (self.target.connect_timeout_ms > 0, "target.connect_timeout_ms must be > 0"),
            (self.target.ack_timeout_ms > 0, "target.ack_timeout_ms must be > 0"),
            (self.load.queue_capacity > 0, "load.queue_capacity must be > 0"),
            (self.load.rooms > 0, "load.rooms must be > 0"),
            (self.load.content_pool_size > 0, "load.content_pool_size must be > 0"),
            (self.warmup.threads > 0, "warmup.threads must be > 0"),
            (self.main_phase.threads > 0, "main_phase.threads must be > 0"),
            (self.retry.max_attempts > 0, "retry.max_attempts must be > 0"),
            (self.worker.poll_timeout_ms > 0, "worker.poll_timeout_ms must be > 0"),
        ];
        match checks.iter().find(|(ok, _)| !ok) {
            Some((_, reason)) => Err(ConfigError::Invalid((*reason).to_string())),
            None => Ok(()),
        }
    }

    /// Messages sent during warmup: capped by the warmup ceiling, never above the total.
    pub fn warmup_total(&self) -> u64 {
        let ceiling = (self.warmup.threads as u64).saturating_mul(self.warmup.messages_per_thread);
        self.load.total_messages.min(ceiling)
    }

    /// Whatever warmup did not consume.
    pub fn main_total(&self) -> u64 {
        self.load.total_messages - self.warmup_total()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Base address; the room id is appended (e.g. "ws://localhost:8080/chat/" + "7")
    pub base_url: String,
    /// Handshake timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// How long a send waits for its acknowledgment, in milliseconds
    pub ack_timeout_ms: u64,
}

impl TargetConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            base_url: "ws://localhost:8080/chat/".to_string(),
            connect_timeout_ms: 10_000,
            ack_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    /// Messages across both phases
    pub total_messages: u64,
    /// Bounded queue capacity per phase
    pub queue_capacity: usize,
    /// Rooms are numbered 1..=rooms
    pub rooms: u32,
    /// Number of canned message bodies
    pub content_pool_size: usize,
    /// Deterministic seed for message generation; OS entropy when absent
    pub seed: Option<u64>,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            total_messages: 500_000,
            queue_capacity: 10_000,
            rooms: 20,
            content_pool_size: 50,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WarmupConfig {
    pub threads: usize,
    /// Ceiling per warmup worker
    pub messages_per_thread: u64,
}

impl Default for WarmupConfig {
    fn default() -> Self {
        Self {
            threads: 32,
            messages_per_thread: 1_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MainPhaseConfig {
    pub threads: usize,
}

impl Default for MainPhaseConfig {
    fn default() -> Self {
        Self { threads: 128 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per message, including the first
    pub max_attempts: u32,
    /// Backoff after attempt n is base_backoff_ms * 2^n
    pub base_backoff_ms: u64,
}

impl RetryConfig {
    pub fn base_backoff(&self) -> Duration {
        Duration::from_millis(self.base_backoff_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// How long a worker waits on an empty queue before polling again
    pub poll_timeout_ms: u64,
}

impl WorkerConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_timeout_ms: 5_000,
        }
    }
}
