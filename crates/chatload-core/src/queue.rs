use crate::error::QueueClosed;
use std::time::Duration;

/// Creates a bounded multi-consumer work queue. The producer side blocks
/// while the queue holds `capacity` items; that is the only backpressure
/// between generation and sending.
pub fn bounded<T>(capacity: usize) -> (QueueProducer<T>, QueueConsumer<T>) {
    let (tx, rx) = async_channel::bounded(capacity.max(1));
    (QueueProducer { tx }, QueueConsumer { rx })
}

/// Result of a timed poll.
#[derive(Debug, PartialEq, Eq)]
pub enum Polled<T> {
    Item(T),
    /// Timed out with nothing available; the producer may still be running.
    Empty,
    /// Every producer is gone and nothing is left to take.
    Drained,
}

#[derive(Debug)]
pub struct QueueProducer<T> {
    tx: async_channel::Sender<T>,
}

impl<T> QueueProducer<T> {
    /// Waits for a free slot. Fails once no consumer is left to drain the queue.
    pub async fn put(&self, item: T) -> Result<(), QueueClosed> {
        self.tx.send(item).await.map_err(|_| QueueClosed)
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }
}

/// Cloneable consumer handle; each item is delivered to exactly one consumer.
#[derive(Debug, Clone)]
pub struct QueueConsumer<T> {
    rx: async_channel::Receiver<T>,
}

impl<T> QueueConsumer<T> {
    pub async fn poll(&self, timeout: Duration) -> Polled<T> {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Ok(item)) => Polled::Item(item),
            Ok(Err(_)) => Polled::Drained,
            Err(_) => Polled::Empty,
        }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
