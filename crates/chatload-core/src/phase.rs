use crate::config::Config;
use crate::connection::{ConnectionManager, Connector};
use crate::counters::{CounterSnapshot, Counters};
use crate::generator::{GeneratorReport, MessageGenerator};
use crate::queue;
use crate::retry::{RetryPolicy, RetrySettings};
use crate::samples::{RecordSet, SamplePool};
use crate::sender::{MessageSender, SenderContext, SenderReport};
use crate::shutdown::Shutdown;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseKind {
    Warmup,
    Main,
}

impl PhaseKind {
    fn seed_salt(&self) -> u64 {
        match self {
            PhaseKind::Warmup => 0,
            PhaseKind::Main => 1,
        }
    }
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhaseKind::Warmup => f.write_str("warmup"),
            PhaseKind::Main => f.write_str("main"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhasePlan {
    pub kind: PhaseKind,
    pub messages: u64,
    pub threads: usize,
}

impl PhasePlan {
    /// Per-sender quotas; senders whose share would be zero are left out.
    pub fn quotas(&self) -> Vec<u64> {
        (0..self.threads)
            .map(|idx| split_quota(self.messages, self.threads, idx))
            .take_while(|&quota| quota > 0)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunPlan {
    pub warmup: PhasePlan,
    /// None when warmup already covers the whole target
    pub main: Option<PhasePlan>,
}

impl RunPlan {
    pub fn from_config(config: &Config) -> Self {
        let warmup = PhasePlan {
            kind: PhaseKind::Warmup,
            messages: config.warmup_total(),
            threads: config.warmup.threads,
        };
        let main_messages = config.main_total();
        let main = (main_messages > 0).then_some(PhasePlan {
            kind: PhaseKind::Main,
            messages: main_messages,
            threads: config.main_phase.threads,
        });
        Self { warmup, main }
    }

    pub fn total_messages(&self) -> u64 {
        self.warmup.messages + self.main.map_or(0, |m| m.messages)
    }
}

/// Integer share of `total` for worker `idx`; the first `total % workers`
/// workers absorb the remainder.
pub fn split_quota(total: u64, workers: usize, idx: usize) -> u64 {
    if workers == 0 {
        return 0;
    }
    let base = total / workers as u64;
    let rem = total % workers as u64;
    if (idx as u64) < rem {
        base.saturating_add(1)
    } else {
        base
    }
}

/// Round-robin room assignment, rooms numbered from 1.
pub fn room_for(worker_idx: usize, rooms: u32) -> u32 {
    (worker_idx % rooms.max(1) as usize) as u32 + 1
}

fn per_second(count: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        count as f64 / secs
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseReport {
    pub kind: PhaseKind,
    pub messages: u64,
    pub senders_started: usize,
    pub counters: CounterSnapshot,
    pub elapsed_ms: u64,
    /// Successful messages per second of wall time
    pub throughput: f64,
    pub generator: GeneratorReport,
    pub senders: Vec<SenderReport>,
    #[serde(skip)]
    pub records: RecordSet,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverallSummary {
    pub counters: CounterSnapshot,
    pub elapsed_ms: u64,
    pub throughput: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub warmup: PhaseReport,
    pub main: Option<PhaseReport>,
    pub overall: OverallSummary,
    #[serde(skip)]
    pub records: RecordSet,
}

/// Runs warmup then main, each with a fresh queue, counters, sample pool
/// and sender set.
pub struct Orchestrator {
    config: Config,
    connector: Arc<dyn Connector>,
    shutdown: Shutdown,
    progress_every: Option<Duration>,
}

impl Orchestrator {
    pub fn new(config: Config, connector: Arc<dyn Connector>, shutdown: Shutdown) -> Self {
        Self {
            config,
            connector,
            shutdown,
            progress_every: None,
        }
    }

    /// Log a progress line at this interval while a phase runs.
    pub fn with_progress(mut self, every: Duration) -> Self {
        self.progress_every = (!every.is_zero()).then_some(every);
        self
    }

    pub fn plan(&self) -> RunPlan {
        RunPlan::from_config(&self.config)
    }

    pub async fn run(&self) -> RunReport {
        let plan = self.plan();
        let started = Instant::now();

        let warmup = self.run_phase(&plan.warmup).await;

        let main = match plan.main {
            Some(_) if self.shutdown.is_triggered() => {
                warn!("Shutdown requested; skipping main phase");
                None
            }
            Some(main_plan) => Some(self.run_phase(&main_plan).await),
            None => {
                info!("No main phase needed (all messages sent in warmup)");
                None
            }
        };

        let elapsed = started.elapsed();
        let counters = warmup.counters + main.as_ref().map_or_else(CounterSnapshot::default, |m| m.counters);
        let records = RecordSet::concat(
            std::iter::once(warmup.records.clone()).chain(main.as_ref().map(|m| m.records.clone())),
        );

        RunReport {
            overall: OverallSummary {
                counters,
                elapsed_ms: elapsed.as_millis() as u64,
                throughput: per_second(counters.succeeded, elapsed),
            },
            warmup,
            main,
            records,
        }
    }

    pub async fn run_phase(&self, plan: &PhasePlan) -> PhaseReport {
        let quotas = plan.quotas();
        info!(
            "Starting {} phase: {} messages across {} senders",
            plan.kind,
            plan.messages,
            quotas.len()
        );
        let started = Instant::now();

        let counters = Arc::new(Counters::new());
        let samples = Arc::new(SamplePool::with_capacity(plan.messages.min(1 << 20) as usize));
        let manager = Arc::new(ConnectionManager::new(
            Arc::clone(&self.connector),
            Arc::clone(&counters),
            self.config.target.connect_timeout(),
        ));
        let retry = Arc::new(RetryPolicy::new(manager, RetrySettings::from_config(&self.config)));
        let (producer, consumer) = queue::bounded(self.config.load.queue_capacity);

        let generator = MessageGenerator::from_config(&self.config.load, plan.kind.seed_salt());
        let generator_handle = tokio::spawn(generator.run(producer, plan.messages));

        let ctx = SenderContext {
            queue: consumer,
            retry,
            counters: Arc::clone(&counters),
            samples: Arc::clone(&samples),
            poll_timeout: self.config.worker.poll_timeout(),
            shutdown: self.shutdown.clone(),
        };
        let sender_handles: Vec<_> = quotas
            .iter()
            .enumerate()
            .map(|(idx, &quota)| {
                let room_id = room_for(idx, self.config.load.rooms);
                tokio::spawn(MessageSender::new(idx, quota, room_id, ctx.clone()).run())
            })
            .collect();
        // Only senders may hold consumer handles, so the generator stops if they all exit.
        drop(ctx);

        let progress = self
            .progress_every
            .map(|every| tokio::spawn(log_progress(plan.kind, Arc::clone(&counters), every)));

        let generator = match generator_handle.await {
            Ok(report) => report,
            Err(e) => {
                warn!("{} generator task failed: {}", plan.kind, e);
                GeneratorReport {
                    requested: plan.messages,
                    produced: 0,
                }
            }
        };

        let mut senders = Vec::with_capacity(sender_handles.len());
        for handle in sender_handles {
            match handle.await {
                Ok(report) => senders.push(report),
                Err(e) => warn!("{} sender task failed: {}", plan.kind, e),
            }
        }

        if let Some(progress) = progress {
            progress.abort();
        }

        let elapsed = started.elapsed();
        let snapshot = counters.snapshot();
        let report = PhaseReport {
            kind: plan.kind,
            messages: plan.messages,
            senders_started: quotas.len(),
            counters: snapshot,
            elapsed_ms: elapsed.as_millis() as u64,
            throughput: per_second(snapshot.succeeded, elapsed),
            generator,
            senders,
            records: samples.snapshot(),
        };

        info!(
            "{} phase complete: ok={} failed={} in {}ms ({:.2} msg/s)",
            plan.kind, snapshot.succeeded, snapshot.failed, report.elapsed_ms, report.throughput
        );
        report
    }
}

async fn log_progress(kind: PhaseKind, counters: Arc<Counters>, every: Duration) {
    let started = Instant::now();
    let mut ticker = tokio::time::interval(every);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let snap = counters.snapshot();
        info!(
            "Progress [{}]: ok={} failed={} connections={} reconnections={} rate={:.0} msg/s",
            kind,
            snap.succeeded,
            snap.failed,
            snap.connections,
            snap.reconnections,
            per_second(snap.succeeded, started.elapsed())
        );
    }
}
