use crate::message::MessageKind;
use crate::samples::{Outcome, RecordSet};
use crate::stats::ThroughputBucket;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::info;

pub const LATENCY_FILE: &str = "latency_data.csv";
pub const THROUGHPUT_FILE: &str = "throughput.csv";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LatencyRow {
    send_timestamp: i64,
    message_type: MessageKind,
    latency_ms: u64,
    status_code: Outcome,
    room_id: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ThroughputRow {
    bucket_start_sec: u64,
    messages: u64,
    duration_sec: f64,
    messages_per_sec: f64,
}

fn create(path: &Path) -> Result<csv::Writer<File>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {:?}", parent))?;
    }
    csv::Writer::from_path(path).with_context(|| format!("Failed to create {:?}", path))
}

/// One row per sample record.
pub fn write_latency_csv(path: &Path, records: &RecordSet) -> Result<()> {
    let mut writer = create(path)?;
    if records.is_empty() {
        writer.write_record([
            "sendTimestamp",
            "messageType",
            "latencyMs",
            "statusCode",
            "roomId",
        ])?;
    }
    for r in records {
        writer.serialize(LatencyRow {
            send_timestamp: r.send_ts_ms,
            message_type: r.kind,
            latency_ms: r.latency_ms,
            status_code: r.outcome,
            room_id: r.room_id,
        })?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_throughput_csv(path: &Path, buckets: &[ThroughputBucket]) -> Result<()> {
    let mut writer = create(path)?;
    if buckets.is_empty() {
        writer.write_record(["bucketStartSec", "messages", "durationSec", "messagesPerSec"])?;
    }
    for b in buckets {
        writer.serialize(ThroughputRow {
            bucket_start_sec: b.start_sec,
            messages: b.messages,
            duration_sec: b.duration_sec,
            messages_per_sec: b.messages_per_sec,
        })?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes both CSV files into `dir` and returns their paths.
pub fn write_csv_results(
    dir: &Path,
    records: &RecordSet,
    buckets: &[ThroughputBucket],
) -> Result<(PathBuf, PathBuf)> {
    let latency = dir.join(LATENCY_FILE);
    let throughput = dir.join(THROUGHPUT_FILE);
    write_latency_csv(&latency, records)?;
    write_throughput_csv(&throughput, buckets)?;
    info!(
        "Wrote {} latency rows to {:?} and {} buckets to {:?}",
        records.len(),
        latency,
        buckets.len(),
        throughput
    );
    Ok((latency, throughput))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::samples::SampleRecord;
    use crate::stats::StatisticsCalculator;

    fn sample_records() -> RecordSet {
        RecordSet::new(vec![
            SampleRecord {
                send_ts_ms: 1_000,
                kind: MessageKind::Text,
                latency_ms: 12,
                outcome: Outcome::Ok,
                room_id: 3,
            },
            SampleRecord {
                send_ts_ms: 12_000,
                kind: MessageKind::Leave,
                latency_ms: 900,
                outcome: Outcome::Fail,
                room_id: 4,
            },
        ])
    }

    #[test]
    fn test_latency_csv_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(LATENCY_FILE);
        write_latency_csv(&path, &sample_records()).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines[0], "sendTimestamp,messageType,latencyMs,statusCode,roomId");
        assert_eq!(lines[1], "1000,TEXT,12,OK,3");
        assert_eq!(lines[2], "12000,LEAVE,900,FAIL,4");
    }

    #[test]
    fn test_throughput_csv_layout() {
        let dir = tempfile::tempdir().unwrap();
        let records = sample_records();
        let buckets = StatisticsCalculator::new(&records).throughput_buckets();
        let (_, path) = write_csv_results(dir.path(), &records, &buckets).unwrap();

        let contents = std::fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines[0], "bucketStartSec,messages,durationSec,messagesPerSec");
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("0,1,10.0,"));
        assert!(lines[2].starts_with("10,1,1.0,"));
    }

    #[test]
    fn test_empty_results_still_have_headers() {
        let dir = tempfile::tempdir().unwrap();
        let (latency, throughput) = write_csv_results(dir.path(), &RecordSet::default(), &[]).unwrap();
        assert_eq!(
            std::fs::read_to_string(latency).unwrap().trim(),
            "sendTimestamp,messageType,latencyMs,statusCode,roomId"
        );
        assert_eq!(
            std::fs::read_to_string(throughput).unwrap().trim(),
            "bucketStartSec,messages,durationSec,messagesPerSec"
        );
    }
}
