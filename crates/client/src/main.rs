use anyhow::{Context, Result};
use chatload_core::shutdown::{self, Shutdown};
use chatload_core::{
    write_csv_results, Config, Connector, MockConnector, Orchestrator, PhaseReport, RunReport,
    StatisticsCalculator, StatisticsReport, WsConnector,
};
use clap::Parser;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "chatload")]
#[command(about = "Chat load generator - warmup and main phase against per-room WebSocket endpoints")]
struct Args {
    /// Path to configuration file (defaults are used when omitted)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Connector: mock or ws
    #[arg(long, default_value = "ws")]
    mode: String,

    /// Total messages across both phases (overrides config)
    #[arg(long)]
    total_messages: Option<u64>,

    /// Base WebSocket URL; the room id is appended (overrides config)
    #[arg(long)]
    target: Option<String>,

    /// Log progress every N milliseconds (0 disables)
    #[arg(long, default_value = "1000")]
    print_every_ms: u64,

    /// Directory for CSV and JSON results
    #[arg(long, default_value = "results")]
    results_dir: PathBuf,
}

#[derive(Debug, Serialize)]
struct RunResult<'a> {
    timestamp: String,
    mode: &'a str,
    target: &'a str,
    total_messages: u64,
    run: &'a RunReport,
    statistics: &'a StatisticsReport,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => Config::default(),
    };
    if let Some(total) = args.total_messages {
        config.load.total_messages = total;
    }
    if let Some(target) = &args.target {
        config.target.base_url = target.clone();
    }
    config.validate().context("Invalid configuration after overrides")?;

    let connector: Arc<dyn Connector> = match args.mode.as_str() {
        "mock" => Arc::new(MockConnector::new(Duration::from_millis(2))),
        "ws" => Arc::new(WsConnector::new(config.target.base_url.clone())),
        _ => anyhow::bail!("Invalid mode: {}, must be 'mock' or 'ws'", args.mode),
    };

    info!("Using connector: {} ({})", connector.name(), connector.endpoint(1));
    info!(
        "Total messages: {} | warmup: {} threads x {} | main: {} threads | rooms: {}",
        config.load.total_messages,
        config.warmup.threads,
        config.warmup.messages_per_thread,
        config.main_phase.threads,
        config.load.rooms
    );

    let orchestrator = Orchestrator::new(config.clone(), connector, interrupt_listener())
        .with_progress(Duration::from_millis(args.print_every_ms));
    let report = orchestrator.run().await;

    let statistics = StatisticsCalculator::new(&report.records).report();

    print_phase(&report.warmup);
    if let Some(main) = &report.main {
        print_phase(main);
    }
    print_overall(&report);
    print_statistics(&statistics);

    write_results(&args, &config, &report, &statistics)?;
    Ok(())
}

/// Ctrl-C stops retries and senders; whatever finished is still reported.
fn interrupt_listener() -> Shutdown {
    let (trigger, listener) = shutdown::channel();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Interrupt received, stopping senders");
                trigger.trigger();
            }
            Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
        }
    });
    listener
}

fn write_results(
    args: &Args,
    config: &Config,
    report: &RunReport,
    statistics: &StatisticsReport,
) -> Result<()> {
    let dir: &Path = &args.results_dir;
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create results directory {:?}", dir))?;

    write_csv_results(dir, &report.records, &statistics.buckets)?;

    let now = chrono::Utc::now();
    let result = RunResult {
        timestamp: now.to_rfc3339(),
        mode: &args.mode,
        target: &config.target.base_url,
        total_messages: config.load.total_messages,
        run: report,
        statistics,
    };
    let output_path = dir.join(format!("run_{}.json", now.format("%Y%m%d_%H%M%S")));
    let result_json = serde_json::to_string_pretty(&result)?;
    std::fs::write(&output_path, result_json)
        .with_context(|| format!("Failed to write {:?}", output_path))?;

    info!("Results written to {:?}", output_path);
    Ok(())
}

fn print_phase(phase: &PhaseReport) {
    println!("\n=== {} phase ===", phase.kind);
    println!("Messages planned: {}", phase.messages);
    println!("Senders: {}", phase.senders_started);
    println!("Succeeded: {}", phase.counters.succeeded);
    println!("Failed: {}", phase.counters.failed);
    println!("Connections: {}", phase.counters.connections);
    println!("Reconnections: {}", phase.counters.reconnections);
    println!("Wall time: {}ms", phase.elapsed_ms);
    println!("Throughput: {:.2} msg/s", phase.throughput);
    if phase.generator.stopped_early() {
        println!(
            "Generator stopped early: {}/{} produced",
            phase.generator.produced, phase.generator.requested
        );
    }
}

fn print_overall(report: &RunReport) {
    let overall = &report.overall;
    println!("\n=== Overall ===");
    println!("Succeeded: {}", overall.counters.succeeded);
    println!("Failed: {}", overall.counters.failed);
    println!("Connections: {}", overall.counters.connections);
    println!("Reconnections: {}", overall.counters.reconnections);
    println!("Wall time: {}ms", overall.elapsed_ms);
    println!("Throughput: {:.2} msg/s", overall.throughput);
}

fn print_statistics(stats: &StatisticsReport) {
    println!("\n=== Statistics ({} records) ===", stats.records);
    if stats.is_empty() {
        println!("No records collected.");
        println!();
        return;
    }

    let l = &stats.latency;
    println!("Latency mean: {:.2}ms", l.mean_ms);
    println!("Latency p50: {}ms", l.p50_ms);
    println!("Latency p95: {}ms", l.p95_ms);
    println!("Latency p99: {}ms", l.p99_ms);
    println!("Latency min/max: {}ms / {}ms", l.min_ms, l.max_ms);

    println!("\nMessage types:");
    for share in &stats.kinds {
        println!("  {:<6} {:>10} ({:.2}%)", share.kind, share.count, share.percent);
    }

    println!("\nPer-room throughput:");
    for room in &stats.rooms {
        println!(
            "  room {:>3}: {:>8} msgs  {:.2} msg/s",
            room.room_id, room.messages, room.messages_per_sec
        );
    }
    println!();
}
