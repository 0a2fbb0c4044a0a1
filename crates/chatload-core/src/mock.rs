use crate::connection::{BoxFuture, Connector, Link};
use crate::error::{ConnectionError, SendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

const MOCK_ACK: &str = r#"{"status":"OK"}"#;

/// In-process stand-in for the chat service (acks after a configurable delay).
/// Failure modes can be layered on for tests and dry runs.
#[derive(Debug, Clone)]
pub struct MockConnector {
    shared: Arc<MockShared>,
}

#[derive(Debug, Default)]
struct MockShared {
    ack_delay: Duration,
    connect_delay: Duration,
    never_ack: bool,
    refuse_connections: bool,
    accept_limit: Option<u64>,
    handshakes: AtomicU64,
    failing_connects: AtomicU64,
    dropped_acks: AtomicU64,
    opened: AtomicU64,
    sends: AtomicU64,
}

fn take_one(budget: &AtomicU64) -> bool {
    budget
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl MockConnector {
    pub fn new(ack_delay: Duration) -> Self {
        Self {
            shared: Arc::new(MockShared {
                ack_delay,
                ..MockShared::default()
            }),
        }
    }

    fn configure(mut self, f: impl FnOnce(&mut MockShared)) -> Self {
        // Builders run before any link is handed out, so the Arc is still unique.
        if let Some(shared) = Arc::get_mut(&mut self.shared) {
            f(shared);
        }
        self
    }

    /// Sends are written but never answered.
    pub fn never_ack(self) -> Self {
        self.configure(|s| s.never_ack = true)
    }

    /// Every handshake is rejected.
    pub fn refuse_connections(self) -> Self {
        self.configure(|s| s.refuse_connections = true)
    }

    /// Only the first `n` handshakes succeed; every later one is rejected.
    pub fn accept_only(self, n: u64) -> Self {
        self.configure(|s| s.accept_limit = Some(n))
    }

    /// The next `n` handshakes are rejected.
    pub fn fail_connects(self, n: u64) -> Self {
        self.configure(|s| s.failing_connects = AtomicU64::new(n))
    }

    /// The first `n` sends (across all links) kill their link instead of being acked.
    pub fn drop_first_acks(self, n: u64) -> Self {
        self.configure(|s| s.dropped_acks = AtomicU64::new(n))
    }

    pub fn connect_delay(self, delay: Duration) -> Self {
        self.configure(|s| s.connect_delay = delay)
    }

    /// Links opened so far.
    pub fn opened(&self) -> u64 {
        self.shared.opened.load(Ordering::Relaxed)
    }

    /// Payloads written so far, acked or not.
    pub fn sends(&self) -> u64 {
        self.shared.sends.load(Ordering::Relaxed)
    }
}

impl Connector for MockConnector {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn endpoint(&self, room_id: u32) -> String {
        format!("mock://chat/{room_id}")
    }

    fn open(&self, room_id: u32) -> BoxFuture<'_, Result<Box<dyn Link>, ConnectionError>> {
        Box::pin(async move {
            if !self.shared.connect_delay.is_zero() {
                sleep(self.shared.connect_delay).await;
            }
            let handshake = self.shared.handshakes.fetch_add(1, Ordering::Relaxed);
            let over_limit = self.shared.accept_limit.is_some_and(|limit| handshake >= limit);
            if self.shared.refuse_connections
                || over_limit
                || take_one(&self.shared.failing_connects)
            {
                return Err(ConnectionError::Rejected {
                    url: self.endpoint(room_id),
                    reason: "mock refused handshake".to_string(),
                });
            }
            self.shared.opened.fetch_add(1, Ordering::Relaxed);
            Ok(Box::new(MockLink {
                shared: Arc::clone(&self.shared),
                open: true,
            }) as Box<dyn Link>)
        })
    }
}

struct MockLink {
    shared: Arc<MockShared>,
    open: bool,
}

impl Link for MockLink {
    fn is_open(&self) -> bool {
        self.open
    }

    fn send_and_wait<'a>(
        &'a mut self,
        _payload: &'a str,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<String, SendError>> {
        Box::pin(async move {
            if !self.open {
                return Err(SendError::Closed);
            }
            self.shared.sends.fetch_add(1, Ordering::Relaxed);

            if take_one(&self.shared.dropped_acks) {
                self.open = false;
                return Err(SendError::Closed);
            }
            if self.shared.never_ack || self.shared.ack_delay > timeout {
                sleep(timeout).await;
                return Err(SendError::AckTimeout(timeout));
            }
            if !self.shared.ack_delay.is_zero() {
                sleep(self.shared.ack_delay).await;
            }
            Ok(MOCK_ACK.to_string())
        })
    }

    fn close(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.open = false;
        })
    }
}
