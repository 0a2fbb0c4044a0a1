use crate::counters::Counters;
use crate::message::WorkItem;
use crate::queue::{Polled, QueueConsumer};
use crate::retry::RetryPolicy;
use crate::samples::{Outcome, SamplePool, SampleRecord};
use crate::shutdown::Shutdown;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Handles every sender of a phase shares.
#[derive(Clone)]
pub struct SenderContext {
    pub queue: QueueConsumer<WorkItem>,
    pub retry: Arc<RetryPolicy>,
    pub counters: Arc<Counters>,
    pub samples: Arc<SamplePool>,
    pub poll_timeout: Duration,
    pub shutdown: Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum SenderExit {
    QuotaReached,
    /// Producer finished and the queue ran dry before the quota was met
    QueueDrained,
    Shutdown,
    /// Could not open the initial connection; the whole quota is abandoned
    ConnectFailed(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenderReport {
    pub id: usize,
    pub room_id: u32,
    pub quota: u64,
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub exit: SenderExit,
}

/// One worker: owns a single connection to its room and drains up to
/// `quota` items from the shared queue through the retry policy.
pub struct MessageSender {
    id: usize,
    quota: u64,
    room_id: u32,
    ctx: SenderContext,
}

impl MessageSender {
    pub fn new(id: usize, quota: u64, room_id: u32, ctx: SenderContext) -> Self {
        Self {
            id,
            quota,
            room_id,
            ctx,
        }
    }

    pub async fn run(self) -> SenderReport {
        let MessageSender {
            id,
            quota,
            room_id,
            ctx,
        } = self;
        let SenderContext {
            queue,
            retry,
            counters,
            samples,
            poll_timeout,
            mut shutdown,
        } = ctx;

        let mut report = SenderReport {
            id,
            room_id,
            quota,
            processed: 0,
            succeeded: 0,
            failed: 0,
            exit: SenderExit::QuotaReached,
        };

        let mut conn = match retry.manager().connect(room_id).await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("Sender {} could not connect to room {}: {}", id, room_id, e);
                report.exit = SenderExit::ConnectFailed(e.to_string());
                return report;
            }
        };

        while report.processed < quota {
            // Shutdown wins over a ready queue: no new item is taken once it fires.
            let polled = tokio::select! {
                biased;
                _ = shutdown.wait() => {
                    report.exit = SenderExit::Shutdown;
                    break;
                }
                polled = queue.poll(poll_timeout) => polled,
            };

            let item = match polled {
                Polled::Item(item) => item,
                Polled::Empty => {
                    debug!("Sender {} starved for {:?}, polling again", id, poll_timeout);
                    continue;
                }
                Polled::Drained => {
                    report.exit = SenderExit::QueueDrained;
                    break;
                }
            };
            report.processed += 1;

            // A failed repair here is repaired again by the first retry attempt,
            // so one outage can count two reconnections.
            if !conn.is_open() {
                if let Err(e) = retry.manager().reconnect(&mut conn).await {
                    warn!("Sender {} reconnect to room {} failed: {}", id, room_id, e);
                }
            }

            let send_ts_ms = Utc::now().timestamp_millis();
            let started = Instant::now();
            let outcome = retry
                .send_with_retry(&mut conn, &item.payload, &mut shutdown)
                .await;
            let latency_ms = started.elapsed().as_millis() as u64;

            let status = if outcome.is_success() {
                counters.record_success();
                report.succeeded += 1;
                Outcome::Ok
            } else {
                counters.record_failure();
                report.failed += 1;
                Outcome::Fail
            };

            samples.record(SampleRecord {
                send_ts_ms,
                kind: item.kind,
                latency_ms,
                outcome: status,
                room_id,
            });
        }

        conn.close().await;
        debug!(
            "Sender {} done: processed={} ok={} failed={} exit={:?}",
            id, report.processed, report.succeeded, report.failed, report.exit
        );
        report
    }
}
