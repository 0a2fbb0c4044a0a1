use crate::counters::Counters;
use crate::error::{ConnectionError, SendError};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Opens links to a room-partitioned endpoint.
pub trait Connector: Send + Sync {
    fn name(&self) -> &'static str;

    /// Address of the room, for logs and errors.
    fn endpoint(&self, room_id: u32) -> String;

    fn open(&self, room_id: u32) -> BoxFuture<'_, Result<Box<dyn Link>, ConnectionError>>;
}

/// One open duplex channel.
///
/// `send_and_wait` arms a one-shot wait before writing the payload and
/// resolves with the next inbound message. Only one such wait can be
/// outstanding; taking `&mut self` makes overlapping sends on the same link
/// impossible.
pub trait Link: Send {
    fn is_open(&self) -> bool;

    fn send_and_wait<'a>(
        &'a mut self,
        payload: &'a str,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<String, SendError>>;

    fn close(&mut self) -> BoxFuture<'_, ()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closed,
    Failed,
}

/// A worker's connection to its room. Repaired in place by
/// [`ConnectionManager::reconnect`]; never shared between workers.
pub struct Connection {
    room_id: u32,
    link: Option<Box<dyn Link>>,
    state: ConnectionState,
}

impl Connection {
    pub fn disconnected(room_id: u32) -> Self {
        Self {
            room_id,
            link: None,
            state: ConnectionState::Disconnected,
        }
    }

    pub fn room_id(&self) -> u32 {
        self.room_id
    }

    pub fn state(&self) -> ConnectionState {
        match (&self.link, self.state) {
            (Some(link), ConnectionState::Open) if !link.is_open() => ConnectionState::Closed,
            (_, state) => state,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    pub async fn send_and_wait(
        &mut self,
        payload: &str,
        timeout: Duration,
    ) -> Result<String, SendError> {
        if !self.is_open() {
            return Err(SendError::Closed);
        }
        let link = self.link.as_mut().ok_or(SendError::Closed)?;
        let result = link.send_and_wait(payload, timeout).await;
        if !link.is_open() {
            self.state = ConnectionState::Closed;
        }
        result
    }

    /// Graceful close if still open.
    pub async fn close(&mut self) {
        if let Some(mut link) = self.link.take() {
            if link.is_open() {
                link.close().await;
            }
        }
        self.state = ConnectionState::Closed;
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("room_id", &self.room_id)
            .field("state", &self.state())
            .finish()
    }
}

/// Opens and repairs connections, counting both into the phase counters.
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    counters: Arc<Counters>,
    connect_timeout: Duration,
}

impl ConnectionManager {
    pub fn new(
        connector: Arc<dyn Connector>,
        counters: Arc<Counters>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            connector,
            counters,
            connect_timeout,
        }
    }

    pub async fn connect(&self, room_id: u32) -> Result<Connection, ConnectionError> {
        let mut conn = Connection::disconnected(room_id);
        self.establish(&mut conn).await?;
        Ok(conn)
    }

    /// Drops the old link without a close handshake (it is assumed broken)
    /// and opens a fresh one for the same room.
    pub async fn reconnect(&self, conn: &mut Connection) -> Result<(), ConnectionError> {
        self.counters.record_reconnection();
        conn.link = None;
        self.establish(conn).await
    }

    async fn establish(&self, conn: &mut Connection) -> Result<(), ConnectionError> {
        conn.state = ConnectionState::Connecting;
        let opened =
            tokio::time::timeout(self.connect_timeout, self.connector.open(conn.room_id)).await;

        match opened {
            Ok(Ok(link)) => {
                conn.link = Some(link);
                conn.state = ConnectionState::Open;
                self.counters.record_connection();
                debug!("Connected to room {}", conn.room_id);
                Ok(())
            }
            Ok(Err(e)) => {
                conn.state = ConnectionState::Failed;
                Err(e)
            }
            Err(_) => {
                conn.state = ConnectionState::Failed;
                Err(ConnectionError::Timeout {
                    url: self.connector.endpoint(conn.room_id),
                    after: self.connect_timeout,
                })
            }
        }
    }
}
