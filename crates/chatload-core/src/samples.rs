use crate::message::MessageKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Ok,
    Fail,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Ok => "OK",
            Outcome::Fail => "FAIL",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal outcome of one dequeued work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleRecord {
    /// Wall-clock send time, unix epoch milliseconds
    pub send_ts_ms: i64,
    pub kind: MessageKind,
    /// Round trip including every retry and backoff
    pub latency_ms: u64,
    pub outcome: Outcome,
    pub room_id: u32,
}

/// Append-only store written concurrently by every worker of a phase.
#[derive(Debug, Default)]
pub struct SamplePool {
    records: Mutex<Vec<SampleRecord>>,
}

impl SamplePool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Mutex::new(Vec::with_capacity(capacity)),
        }
    }

    pub fn record(&self, record: SampleRecord) {
        self.records.lock().push(record);
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of everything recorded so far. Call after the phase's workers are
    /// joined to get the complete ledger.
    pub fn snapshot(&self) -> RecordSet {
        RecordSet::new(self.records.lock().clone())
    }
}

/// Closed, read-only set of sample records handed to statistics and exporters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordSet {
    records: Vec<SampleRecord>,
}

impl RecordSet {
    pub fn new(records: Vec<SampleRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[SampleRecord] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SampleRecord> {
        self.records.iter()
    }

    pub fn count(&self, outcome: Outcome) -> usize {
        self.records.iter().filter(|r| r.outcome == outcome).count()
    }

    /// Earliest and latest send timestamps, if any records exist.
    pub fn send_span_ms(&self) -> Option<(i64, i64)> {
        let min = self.records.iter().map(|r| r.send_ts_ms).min()?;
        let max = self.records.iter().map(|r| r.send_ts_ms).max()?;
        Some((min, max))
    }

    /// Concatenates phase ledgers into one run ledger.
    pub fn concat<I>(sets: I) -> Self
    where
        I: IntoIterator<Item = RecordSet>,
    {
        let records = sets.into_iter().flat_map(|s| s.records).collect();
        Self { records }
    }
}

impl<'a> IntoIterator for &'a RecordSet {
    type Item = &'a SampleRecord;
    type IntoIter = std::slice::Iter<'a, SampleRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn record(ts: i64, outcome: Outcome) -> SampleRecord {
        SampleRecord {
            send_ts_ms: ts,
            kind: MessageKind::Text,
            latency_ms: 5,
            outcome,
            room_id: 1,
        }
    }

    #[test]
    fn test_pool_concurrent_appends() {
        let pool = Arc::new(SamplePool::new());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || {
                    for i in 0..250 {
                        pool.record(record(t * 1_000 + i, Outcome::Ok));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(pool.len(), 1_000);
        assert_eq!(pool.snapshot().len(), 1_000);
    }

    #[test]
    fn test_pool_survives_panicking_writer() {
        let pool = Arc::new(SamplePool::new());
        pool.record(record(1, Outcome::Ok));

        let writer = Arc::clone(&pool);
        let died = std::thread::spawn(move || {
            let _guard = writer.records.lock();
            panic!("writer died while holding the lock");
        })
        .join();
        assert!(died.is_err());

        pool.record(record(2, Outcome::Fail));
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.snapshot().count(Outcome::Fail), 1);
    }

    #[test]
    fn test_record_set_queries() {
        let set = RecordSet::new(vec![
            record(300, Outcome::Ok),
            record(100, Outcome::Fail),
            record(200, Outcome::Ok),
        ]);
        assert_eq!(set.count(Outcome::Ok), 2);
        assert_eq!(set.count(Outcome::Fail), 1);
        assert_eq!(set.send_span_ms(), Some((100, 300)));
        assert_eq!(RecordSet::default().send_span_ms(), None);
    }

    #[test]
    fn test_concat() {
        let a = RecordSet::new(vec![record(1, Outcome::Ok)]);
        let b = RecordSet::new(vec![record(2, Outcome::Fail), record(3, Outcome::Ok)]);
        let all = RecordSet::concat([a, b]);
        assert_eq!(all.len(), 3);
        assert_eq!(all.records()[1].send_ts_ms, 2);
    }
}
