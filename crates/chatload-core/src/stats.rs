use crate::message::MessageKind;
use crate::samples::{Outcome, RecordSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const BUCKET_MS: i64 = 10_000;
const MIN_BUCKET_SECS: f64 = 0.1;

/// Nearest-rank percentile over an ascending slice (integer ms).
/// Returns 0 for an empty slice.
pub fn percentile(sorted: &[u64], p: u32) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let n = sorted.len() as u64;
    let rank = (u64::from(p) * n).div_ceil(100);
    let idx = rank.saturating_sub(1).min(n - 1) as usize;
    sorted[idx]
}

pub fn mean(values: &[u64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().map(|&v| v as f64).sum::<f64>() / values.len() as f64
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub count: u64,
    pub mean_ms: f64,
    pub p50_ms: u64,
    pub p95_ms: u64,
    pub p99_ms: u64,
    pub min_ms: u64,
    pub max_ms: u64,
}

impl LatencySummary {
    pub fn from_sorted(sorted: &[u64]) -> Self {
        Self {
            count: sorted.len() as u64,
            mean_ms: mean(sorted),
            p50_ms: percentile(sorted, 50),
            p95_ms: percentile(sorted, 95),
            p99_ms: percentile(sorted, 99),
            min_ms: sorted.first().copied().unwrap_or(0),
            max_ms: sorted.last().copied().unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KindShare {
    pub kind: MessageKind,
    pub count: u64,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomThroughput {
    pub room_id: u32,
    pub messages: u64,
    pub span_ms: i64,
    pub messages_per_sec: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThroughputBucket {
    /// Seconds since the first send of the run
    pub start_sec: u64,
    pub messages: u64,
    pub duration_sec: f64,
    pub messages_per_sec: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatisticsReport {
    pub records: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub latency: LatencySummary,
    pub kinds: Vec<KindShare>,
    pub rooms: Vec<RoomThroughput>,
    pub buckets: Vec<ThroughputBucket>,
}

impl StatisticsReport {
    pub fn is_empty(&self) -> bool {
        self.records == 0
    }
}

/// Read-only analysis over a closed record set.
pub struct StatisticsCalculator<'a> {
    records: &'a RecordSet,
}

impl<'a> StatisticsCalculator<'a> {
    pub fn new(records: &'a RecordSet) -> Self {
        Self { records }
    }

    pub fn report(&self) -> StatisticsReport {
        if self.records.is_empty() {
            return StatisticsReport::default();
        }
        StatisticsReport {
            records: self.records.len() as u64,
            succeeded: self.records.count(Outcome::Ok) as u64,
            failed: self.records.count(Outcome::Fail) as u64,
            latency: self.latency(),
            kinds: self.kind_distribution(),
            rooms: self.room_throughput(),
            buckets: self.throughput_buckets(),
        }
    }

    pub fn latency(&self) -> LatencySummary {
        let mut latencies: Vec<u64> = self.records.iter().map(|r| r.latency_ms).collect();
        latencies.sort_unstable();
        LatencySummary::from_sorted(&latencies)
    }

    /// Count and percent per kind, highest count first.
    pub fn kind_distribution(&self) -> Vec<KindShare> {
        let total = self.records.len();
        let mut counts: BTreeMap<MessageKind, u64> = BTreeMap::new();
        for record in self.records {
            *counts.entry(record.kind).or_default() += 1;
        }

        let mut shares: Vec<KindShare> = counts
            .into_iter()
            .map(|(kind, count)| KindShare {
                kind,
                count,
                percent: count as f64 * 100.0 / total as f64,
            })
            .collect();
        shares.sort_by(|a, b| b.count.cmp(&a.count).then(a.kind.cmp(&b.kind)));
        shares
    }

    pub fn room_throughput(&self) -> Vec<RoomThroughput> {
        // room -> (count, earliest, latest)
        let mut rooms: BTreeMap<u32, (u64, i64, i64)> = BTreeMap::new();
        for record in self.records {
            let entry = rooms
                .entry(record.room_id)
                .or_insert((0, record.send_ts_ms, record.send_ts_ms));
            entry.0 += 1;
            entry.1 = entry.1.min(record.send_ts_ms);
            entry.2 = entry.2.max(record.send_ts_ms);
        }

        rooms
            .into_iter()
            .map(|(room_id, (messages, first, last))| {
                let span_ms = (last - first).max(1);
                RoomThroughput {
                    room_id,
                    messages,
                    span_ms,
                    messages_per_sec: messages as f64 * 1000.0 / span_ms as f64,
                }
            })
            .collect()
    }

    /// Fixed 10 s buckets from the first send; empty buckets are kept so the
    /// series has no gaps.
    pub fn throughput_buckets(&self) -> Vec<ThroughputBucket> {
        let Some((first, last)) = self.records.send_span_ms() else {
            return Vec::new();
        };
        let span_ms = last - first;
        let bucket_count = (span_ms / BUCKET_MS + 1) as usize;

        let mut counts = vec![0u64; bucket_count];
        for record in self.records {
            let idx = ((record.send_ts_ms - first) / BUCKET_MS) as usize;
            counts[idx.min(bucket_count - 1)] += 1;
        }

        counts
            .into_iter()
            .enumerate()
            .map(|(idx, messages)| {
                let bucket_start = idx as i64 * BUCKET_MS;
                let duration_ms = if idx + 1 == bucket_count {
                    span_ms - bucket_start
                } else {
                    BUCKET_MS
                };
                let duration_sec = (duration_ms as f64 / 1000.0).max(MIN_BUCKET_SECS);
                ThroughputBucket {
                    start_sec: (bucket_start / 1000) as u64,
                    messages,
                    duration_sec,
                    messages_per_sec: messages as f64 / duration_sec,
                }
            })
            .collect()
    }
}
