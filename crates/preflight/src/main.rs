use anyhow::{Context, Result};
use chatload_core::{Config, Connector, ContentPool, MessageGenerator, WsConnector};
use clap::Parser;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "preflight")]
#[command(about = "Preflight checks before a chat load run (health endpoint + one WebSocket round trip)")]
struct Args {
    /// Path to configuration file (defaults are used when omitted)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Base WebSocket URL (overrides config)
    #[arg(long)]
    target: Option<String>,

    /// Room used for the round-trip probe
    #[arg(long, default_value = "1")]
    room: u32,
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
    let mut cfg = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => Config::default(),
    };
    if let Some(target) = args.target {
        cfg.target.base_url = target;
    }

    info!("Validating target URL...");
    let base = validate_ws_url(&cfg.target.base_url)
        .with_context(|| format!("Invalid target.base_url: {}", cfg.target.base_url))?;
    let health = health_url(&base)?;

    println!();
    println!("=== Preflight ===");
    println!("Target: {}", base);
    println!("Health: {}", health);

    let client = reqwest::Client::builder()
        .timeout(cfg.target.connect_timeout())
        .build()
        .context("Failed to build HTTP client")?;

    let mut failures = 0u64;
    if !check_health(&client, &health).await {
        failures = failures.saturating_add(1);
    }
    if !check_round_trip(&cfg, args.room).await {
        failures = failures.saturating_add(1);
    }

    if failures > 0 {
        anyhow::bail!("Preflight failed: {failures} required check(s) failed");
    }

    println!();
    println!("Preflight OK.");
    Ok(())
}

fn validate_ws_url(raw: &str) -> Result<url::Url> {
    let url = url::Url::parse(raw).with_context(|| format!("Invalid URL: {raw}"))?;

    if url.scheme() != "ws" && url.scheme() != "wss" {
        anyhow::bail!("Target URL must be ws:// or wss:// (got {raw})");
    }
    if url.host_str().is_none() {
        anyhow::bail!("Target URL must include a hostname (got {raw})");
    }
    if url.query().is_some() || url.fragment().is_some() {
        anyhow::bail!("Target URL must not include query/fragment (got {raw})");
    }

    Ok(url)
}

/// Same host and port as the chat endpoint, over HTTP(S), at `/health`.
fn health_url(base: &url::Url) -> Result<url::Url> {
    let mut url = base.clone();
    let scheme = if base.scheme() == "wss" { "https" } else { "http" };
    url.set_scheme(scheme)
        .map_err(|_| anyhow::anyhow!("Cannot derive HTTP URL from {base}"))?;
    url.set_path("/health");
    Ok(url)
}

async fn check_health(client: &reqwest::Client, url: &url::Url) -> bool {
    let start = Instant::now();
    let resp = client.get(url.clone()).send().await;
    let latency_ms = start.elapsed().as_millis() as u64;

    match resp {
        Ok(r) => {
            let status = r.status().as_u16();
            println!("GET {:<10} -> {} ({}ms)", url.path(), status, latency_ms);
            if status != 200 {
                warn!("Health endpoint returned non-200: {}", status);
                return false;
            }
            match r.json::<serde_json::Value>().await {
                Ok(body) => {
                    info!("Health: {}", body);
                    true
                }
                Err(e) => {
                    warn!("Health endpoint returned a non-JSON body: {}", e);
                    false
                }
            }
        }
        Err(e) => {
            println!("GET {:<10} -> ERROR ({}ms)", url.path(), latency_ms);
            warn!("Health request failed: {}", e);
            false
        }
    }
}

async fn check_round_trip(cfg: &Config, room: u32) -> bool {
    let connector = WsConnector::new(cfg.target.base_url.clone());
    let endpoint = connector.endpoint(room);
    let start = Instant::now();

    let mut link = match tokio::time::timeout(cfg.target.connect_timeout(), connector.open(room)).await {
        Ok(Ok(link)) => link,
        Ok(Err(e)) => {
            println!("WS  {:<10} -> CONNECT ERROR", endpoint);
            warn!("Connect failed: {}", e);
            return false;
        }
        Err(_) => {
            println!("WS  {:<10} -> CONNECT TIMEOUT", endpoint);
            return false;
        }
    };
    let connect_ms = start.elapsed().as_millis() as u64;

    let item = match MessageGenerator::new(1, ContentPool::new(1), Some(0)).next_item() {
        Ok(item) => item,
        Err(e) => {
            warn!("Could not build probe message: {}", e);
            return false;
        }
    };

    let sent = Instant::now();
    let reply = link.send_and_wait(&item.payload, cfg.target.ack_timeout()).await;
    let ack_ms = sent.elapsed().as_millis() as u64;
    link.close().await;

    match reply {
        Ok(reply) => {
            println!(
                "WS  {} -> ACK (connect {}ms, ack {}ms)",
                endpoint, connect_ms, ack_ms
            );
            if !reply.contains("\"OK\"") {
                warn!("Probe was answered with a non-OK reply: {}", reply);
            }
            true
        }
        Err(e) => {
            println!("WS  {} -> ERROR ({}ms)", endpoint, ack_ms);
            warn!("Round trip failed: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_url_from_ws_base() {
        let base = validate_ws_url("ws://localhost:8080/chat/").unwrap();
        assert_eq!(health_url(&base).unwrap().as_str(), "http://localhost:8080/health");

        let base = validate_ws_url("wss://chat.example.com/chat/").unwrap();
        assert_eq!(health_url(&base).unwrap().as_str(), "https://chat.example.com/health");
    }

    #[test]
    fn test_rejects_non_ws_urls() {
        assert!(validate_ws_url("http://localhost:8080/chat/").is_err());
        assert!(validate_ws_url("ws://localhost:8080/chat/?x=1").is_err());
        assert!(validate_ws_url("not a url").is_err());
    }
}
