use crate::config::LoadConfig;
use crate::message::{MessageKind, WorkItem};
use crate::queue::QueueProducer;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// User ids are drawn uniformly from 1..=MAX_USER_ID.
pub const MAX_USER_ID: u32 = 100_000;

/// Fixed set of message bodies shared by every generated item.
#[derive(Debug, Clone)]
pub struct ContentPool {
    bodies: Arc<[Arc<str>]>,
}

impl ContentPool {
    pub fn new(size: usize) -> Self {
        let bodies: Vec<Arc<str>> = (1..=size.max(1))
            .map(|i| Arc::from(format!("Sample chat message number {i} for load testing")))
            .collect();
        Self {
            bodies: bodies.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    fn pick(&self, rng: &mut StdRng) -> Arc<str> {
        let idx = rng.gen_range(0..self.bodies.len());
        Arc::clone(&self.bodies[idx])
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratorReport {
    pub requested: u64,
    pub produced: u64,
}

impl GeneratorReport {
    pub fn stopped_early(&self) -> bool {
        self.produced < self.requested
    }
}

/// Producer side of a phase: synthesizes random chat messages and pushes
/// them into the work queue as fast as the queue accepts them.
pub struct MessageGenerator {
    rng: StdRng,
    pool: ContentPool,
    rooms: u32,
}

impl MessageGenerator {
    pub fn new(rooms: u32, pool: ContentPool, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng,
            pool,
            rooms: rooms.max(1),
        }
    }

    /// `salt` keeps seeded phases from replaying the same sequence.
    pub fn from_config(config: &LoadConfig, salt: u64) -> Self {
        Self::new(
            config.rooms,
            ContentPool::new(config.content_pool_size),
            config.seed.map(|s| s.wrapping_add(salt)),
        )
    }

    pub fn next_item(&mut self) -> Result<WorkItem, serde_json::Error> {
        let user_id = self.rng.gen_range(1..=MAX_USER_ID);
        let body = self.pool.pick(&mut self.rng);
        let room_id = self.rng.gen_range(1..=self.rooms);
        let kind = MessageKind::from_roll(self.rng.gen_range(0..100));
        WorkItem::new(user_id, body, Utc::now(), kind, room_id)
    }

    /// Produces exactly `count` items unless every consumer goes away first.
    pub async fn run(mut self, producer: QueueProducer<WorkItem>, count: u64) -> GeneratorReport {
        let mut report = GeneratorReport {
            requested: count,
            produced: 0,
        };

        for _ in 0..count {
            let item = match self.next_item() {
                Ok(item) => item,
                Err(e) => {
                    warn!("Failed to serialize generated message: {}", e);
                    break;
                }
            };
            if producer.put(item).await.is_err() {
                warn!(
                    "All senders exited; generator stopping after {} of {} messages",
                    report.produced, count
                );
                break;
            }
            report.produced += 1;
        }

        debug!("Generator finished: {}/{}", report.produced, count);
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{self, Polled};
    use std::collections::HashMap;
    use std::time::Duration;

    const POLL: Duration = Duration::from_millis(10);

    async fn generate(count: u64, rooms: u32, seed: Option<u64>) -> (GeneratorReport, Vec<WorkItem>) {
        let (tx, rx) = queue::bounded(count.max(1) as usize);
        let generator = MessageGenerator::new(rooms, ContentPool::new(50), seed);
        let report = generator.run(tx, count).await;

        let mut items = Vec::new();
        while let Polled::Item(item) = rx.poll(POLL).await {
            items.push(item);
        }
        (report, items)
    }

    #[tokio::test]
    async fn test_generates_exact_count() {
        for count in [0u64, 1, 100, 1_000] {
            let (report, items) = generate(count, 20, None).await;
            assert_eq!(report.produced, count);
            assert!(!report.stopped_early());
            assert_eq!(items.len() as u64, count);
        }
    }

    #[tokio::test]
    async fn test_fields_in_range() {
        let (_, items) = generate(1_000, 20, None).await;
        for item in &items {
            assert!((1..=MAX_USER_ID).contains(&item.user_id), "user id {}", item.user_id);
            assert!((1..=20).contains(&item.room_id), "room id {}", item.room_id);
            assert!(MessageKind::ALL.contains(&item.kind));
            assert_eq!(item.username, format!("user{}", item.user_id));

            let json: serde_json::Value = serde_json::from_str(&item.payload).unwrap();
            for field in ["userId", "username", "message", "timestamp", "messageType", "roomId"] {
                assert!(json.get(field).is_some(), "missing {field}");
            }
        }
    }

    #[tokio::test]
    async fn test_kind_distribution_approximate() {
        let count = 10_000u64;
        let (_, items) = generate(count, 20, Some(7)).await;

        let mut by_kind: HashMap<MessageKind, u64> = HashMap::new();
        for item in &items {
            *by_kind.entry(item.kind).or_default() += 1;
        }

        let share = |kind| *by_kind.get(&kind).unwrap_or(&0) as f64 / count as f64;
        assert!((share(MessageKind::Text) - 0.90).abs() <= 0.02, "TEXT {}", share(MessageKind::Text));
        assert!((share(MessageKind::Join) - 0.05).abs() <= 0.02, "JOIN {}", share(MessageKind::Join));
        assert!((share(MessageKind::Leave) - 0.05).abs() <= 0.02, "LEAVE {}", share(MessageKind::Leave));
    }

    #[tokio::test]
    async fn test_seed_is_deterministic() {
        let (_, a) = generate(50, 5, Some(42)).await;
        let (_, b) = generate(50, 5, Some(42)).await;
        let key = |items: &[WorkItem]| {
            items
                .iter()
                .map(|i| (i.user_id, i.room_id, i.kind, i.body.to_string()))
                .collect::<Vec<_>>()
        };
        assert_eq!(key(&a), key(&b));
    }

    #[tokio::test]
    async fn test_stops_when_consumers_gone() {
        let (tx, rx) = queue::bounded(2);
        drop(rx);
        let generator = MessageGenerator::new(4, ContentPool::new(3), Some(1));
        let report = generator.run(tx, 10).await;
        assert_eq!(report.produced, 0);
        assert!(report.stopped_early());
    }

    #[test]
    fn test_content_pool() {
        let pool = ContentPool::new(50);
        assert_eq!(pool.len(), 50);
        assert_eq!(&*pool.bodies[0], "Sample chat message number 1 for load testing");
        assert_eq!(ContentPool::new(0).len(), 1);
    }
}
