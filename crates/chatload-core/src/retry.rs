use crate::config::Config;
use crate::connection::{Connection, ConnectionManager};
use crate::error::AttemptError;
use crate::shutdown::Shutdown;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrySettings {
    /// Attempts per message, including the first
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub ack_timeout: Duration,
}

impl RetrySettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.retry.max_attempts.max(1),
            base_backoff: config.retry.base_backoff(),
            ack_timeout: config.target.ack_timeout(),
        }
    }

    /// Delay after failed attempt `attempt` (0-based): base * 2^attempt.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_backoff.saturating_mul(factor)
    }
}

#[derive(Debug)]
pub enum SendOutcome {
    Acked {
        reply: String,
        attempts: u32,
    },
    Failed {
        attempts: u32,
        last_error: Option<AttemptError>,
        /// Stopped by shutdown during a backoff sleep
        interrupted: bool,
    },
}

impl SendOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SendOutcome::Acked { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            SendOutcome::Acked { attempts, .. } | SendOutcome::Failed { attempts, .. } => *attempts,
        }
    }
}

/// Bounded retry with exponential backoff around a single logical send.
/// Repairs the connection through the manager whenever it is found closed.
pub struct RetryPolicy {
    manager: Arc<ConnectionManager>,
    settings: RetrySettings,
}

impl RetryPolicy {
    pub fn new(manager: Arc<ConnectionManager>, settings: RetrySettings) -> Self {
        Self { manager, settings }
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    /// Sends `payload` until an acknowledgment arrives or the attempts run
    /// out. The caller keeps `conn`, repaired or not, for its next send.
    pub async fn send_with_retry(
        &self,
        conn: &mut Connection,
        payload: &str,
        shutdown: &mut Shutdown,
    ) -> SendOutcome {
        let mut last_error = None;

        for attempt in 0..self.settings.max_attempts {
            match self.attempt(conn, payload).await {
                Ok(reply) => {
                    return SendOutcome::Acked {
                        reply,
                        attempts: attempt + 1,
                    }
                }
                Err(e) => {
                    debug!(
                        "Attempt {}/{} to room {} failed: {}",
                        attempt + 1,
                        self.settings.max_attempts,
                        conn.room_id(),
                        e
                    );
                    last_error = Some(e);
                }
            }

            if attempt + 1 == self.settings.max_attempts {
                break;
            }

            tokio::select! {
                _ = sleep(self.settings.backoff(attempt)) => {}
                _ = shutdown.wait() => {
                    return SendOutcome::Failed {
                        attempts: attempt + 1,
                        last_error,
                        interrupted: true,
                    };
                }
            }
        }

        SendOutcome::Failed {
            attempts: self.settings.max_attempts,
            last_error,
            interrupted: false,
        }
    }

    async fn attempt(&self, conn: &mut Connection, payload: &str) -> Result<String, AttemptError> {
        if !conn.is_open() {
            self.manager.reconnect(conn).await?;
        }
        Ok(conn.send_and_wait(payload, self.settings.ack_timeout).await?)
    }
}
