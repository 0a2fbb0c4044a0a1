use crate::connection::{BoxFuture, Connector, Link};
use crate::error::{ConnectionError, SendError};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Reply = Result<String, SendError>;
type PendingAck = Arc<Mutex<Option<oneshot::Sender<Reply>>>>;

/// Connects to `<base_url><room_id>` over WebSocket.
#[derive(Debug, Clone)]
pub struct WsConnector {
    base_url: String,
}

impl WsConnector {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

impl Connector for WsConnector {
    fn name(&self) -> &'static str {
        "ws"
    }

    fn endpoint(&self, room_id: u32) -> String {
        if self.base_url.ends_with('/') {
            format!("{}{}", self.base_url, room_id)
        } else {
            format!("{}/{}", self.base_url, room_id)
        }
    }

    fn open(&self, room_id: u32) -> BoxFuture<'_, Result<Box<dyn Link>, ConnectionError>> {
        let url = self.endpoint(room_id);
        Box::pin(async move {
            let (stream, _response) = connect_async(url.as_str())
                .await
                .map_err(|e| classify_connect_error(&url, e))?;
            Ok(Box::new(WsLink::spawn(stream)) as Box<dyn Link>)
        })
    }
}

fn classify_connect_error(url: &str, err: tungstenite::Error) -> ConnectionError {
    match err {
        tungstenite::Error::Url(e) => ConnectionError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        },
        other => ConnectionError::Rejected {
            url: url.to_string(),
            reason: other.to_string(),
        },
    }
}

/// A connected socket. A background reader hands the next inbound frame to
/// whichever send is currently waiting.
struct WsLink {
    sink: SplitSink<WsStream, Message>,
    pending: PendingAck,
    open: Arc<AtomicBool>,
    reader: JoinHandle<()>,
}

impl WsLink {
    fn spawn(stream: WsStream) -> Self {
        let (sink, source) = stream.split();
        let pending: PendingAck = Arc::new(Mutex::new(None));
        let open = Arc::new(AtomicBool::new(true));
        let reader = tokio::spawn(read_loop(source, Arc::clone(&pending), Arc::clone(&open)));
        Self {
            sink,
            pending,
            open,
            reader,
        }
    }
}

async fn read_loop(mut source: SplitStream<WsStream>, pending: PendingAck, open: Arc<AtomicBool>) {
    while let Some(frame) = source.next().await {
        let reply = match frame {
            Ok(Message::Text(text)) => Ok(text.as_str().to_owned()),
            Ok(Message::Binary(_)) => Err(SendError::Protocol("unexpected binary frame".to_string())),
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!("WebSocket read failed: {}", e);
                break;
            }
        };

        let waiter = pending.lock().take();
        match waiter {
            Some(waiter) => {
                let _ = waiter.send(reply);
            }
            None => trace!("Dropping unsolicited frame"),
        }
    }

    open.store(false, Ordering::Release);
    // Wakes any waiter with a closed-channel error.
    pending.lock().take();
}

impl Link for WsLink {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn send_and_wait<'a>(
        &'a mut self,
        payload: &'a str,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<String, SendError>> {
        Box::pin(async move {
            if !self.is_open() {
                return Err(SendError::Closed);
            }

            let (tx, rx) = oneshot::channel();
            *self.pending.lock() = Some(tx);

            if let Err(e) = self.sink.send(Message::text(payload.to_owned())).await {
                self.pending.lock().take();
                self.open.store(false, Ordering::Release);
                return Err(SendError::Transport(e.to_string()));
            }

            match tokio::time::timeout(timeout, rx).await {
                Ok(Ok(reply)) => reply,
                Ok(Err(_)) => Err(SendError::Closed),
                Err(_) => {
                    self.pending.lock().take();
                    Err(SendError::AckTimeout(timeout))
                }
            }
        })
    }

    fn close(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            if let Err(e) = self.sink.close().await {
                debug!("WebSocket close failed: {}", e);
            }
            self.open.store(false, Ordering::Release);
            self.reader.abort();
        })
    }
}

impl Drop for WsLink {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// Minimal echo peer: replies to every text frame with `ack:<payload>`,
    /// except payloads equal to "silent".
    async fn echo_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((tcp, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
                    while let Some(Ok(msg)) = ws.next().await {
                        if let Message::Text(text) = msg {
                            if text.as_str() == "silent" {
                                continue;
                            }
                            let reply = format!("ack:{}", text.as_str());
                            if ws.send(Message::text(reply)).await.is_err() {
                                break;
                            }
                        }
                    }
                });
            }
        });
        format!("ws://{addr}/chat/")
    }

    #[test]
    fn test_endpoint_joins_room() {
        assert_eq!(WsConnector::new("ws://h/chat/").endpoint(3), "ws://h/chat/3");
        assert_eq!(WsConnector::new("ws://h/chat").endpoint(3), "ws://h/chat/3");
    }

    #[tokio::test]
    async fn test_round_trip() {
        let connector = WsConnector::new(echo_server().await);
        let mut link = connector.open(1).await.unwrap();
        assert!(link.is_open());

        let reply = link.send_and_wait("hello", Duration::from_secs(2)).await.unwrap();
        assert_eq!(reply, "ack:hello");
        let reply = link.send_and_wait("again", Duration::from_secs(2)).await.unwrap();
        assert_eq!(reply, "ack:again");

        link.close().await;
        assert!(!link.is_open());
        assert!(matches!(
            link.send_and_wait("late", Duration::from_millis(50)).await,
            Err(SendError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_ack_timeout() {
        let connector = WsConnector::new(echo_server().await);
        let mut link = connector.open(1).await.unwrap();
        let err = link
            .send_and_wait("silent", Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, SendError::AckTimeout(_)));
        assert!(link.is_open());
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let connector = WsConnector::new(format!("ws://{addr}/chat/"));
        let err = match connector.open(1).await {
            Ok(_) => panic!("connect should fail"),
            Err(e) => e,
        };
        assert!(matches!(err, ConnectionError::Rejected { .. }), "{err}");
    }

    #[tokio::test]
    async fn test_invalid_url() {
        let connector = WsConnector::new("not a url/");
        assert!(connector.open(1).await.is_err());
    }
}
