//! workq CLI: exercise a work queue under concurrent load.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::info;
use workq::clock::{Clock, RealClock};
use workq::config::Config;
use workq::telemetry::metrics::OtelQueueMetrics;
use workq::telemetry::work::{record_key_processed, record_worker_finished, start_worker_span};
use workq::telemetry::{TelemetryConfig, init_telemetry};
use workq::{Queue, QueueConfig};

#[derive(Parser)]
#[command(name = "workq", about = "Deduplicating work queue toolbox")]
struct Cli {
    /// TOML config file (defaults to environment variables)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run producers and consumers against one queue and check every key
    /// was processed exactly once
    Stress {
        /// Number of producer threads
        #[arg(long, default_value_t = 10)]
        producers: usize,
        /// Number of consumer threads
        #[arg(long, default_value_t = 3)]
        consumers: usize,
        /// Number of distinct keys, split across producers
        #[arg(long, default_value_t = 1000)]
        keys: u64,
        /// Simulated work per key, in milliseconds
        #[arg(long, default_value_t = 0)]
        work_ms: u64,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Serialize)]
struct StressReport {
    keys: u64,
    processed: u64,
    duplicates: u64,
    missing: u64,
    elapsed_ms: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match cli.config {
        Some(ref path) => Config::load(path)?,
        None => Config::from_env()?,
    };

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "workq".to_string(),
        log_level: config.log_level.clone(),
    })?;

    match cli.command {
        Command::Stress {
            producers,
            consumers,
            keys,
            work_ms,
            json,
        } => {
            cmd_stress(
                &config,
                producers.max(1),
                consumers.max(1),
                keys,
                Duration::from_millis(work_ms),
                json,
            )
            .await
        }
    }
}

async fn cmd_stress(
    config: &Config,
    producers: usize,
    consumers: usize,
    keys: u64,
    work: Duration,
    json: bool,
) -> anyhow::Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(RealClock);
    let queue: Queue<u64> = Queue::with_config(
        QueueConfig::named(config.queue_name.clone())
            .clock(Arc::clone(&clock))
            .metrics(OtelQueueMetrics::new(config.queue_name.clone(), clock))
            .unfinished_work_period(config.unfinished_work_period()),
    );

    let q = queue.clone();
    let interrupt = tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("interrupted, shutting queue down");
        q.shut_down();
    });

    let started = Instant::now();
    let seen: Arc<Mutex<HashMap<u64, u64>>> = Arc::new(Mutex::new(HashMap::new()));

    let mut consumer_handles = Vec::with_capacity(consumers);
    for worker in 0..consumers {
        let q = queue.clone();
        let seen = Arc::clone(&seen);
        consumer_handles.push(tokio::task::spawn_blocking(move || {
            let span = start_worker_span(q.name(), worker);
            let mut processed = 0u64;
            while let Some(key) = q.get() {
                if !work.is_zero() {
                    std::thread::sleep(work);
                }
                *seen.lock().entry(key).or_default() += 1;
                record_key_processed(&span, &key);
                q.done(&key);
                processed += 1;
            }
            record_worker_finished(&span, processed);
        }));
    }

    let producers = producers as u64;
    let mut producer_handles = Vec::new();
    for p in 0..producers {
        let q = queue.clone();
        producer_handles.push(tokio::task::spawn_blocking(move || {
            let mut key = p;
            while key < keys {
                q.add(key);
                key += producers;
            }
        }));
    }

    for handle in producer_handles {
        handle.await?;
    }

    // Keys still queued drain through the consumers; in-flight ones are
    // waited for here.
    let q = queue.clone();
    tokio::task::spawn_blocking(move || q.shut_down_with_drain()).await?;
    for handle in consumer_handles {
        handle.await?;
    }
    interrupt.abort();

    let seen = seen.lock();
    let report = StressReport {
        keys,
        processed: seen.values().sum(),
        duplicates: seen.values().map(|n| n.saturating_sub(1)).sum(),
        missing: (0..keys).filter(|k| !seen.contains_key(k)).count() as u64,
        elapsed_ms: started.elapsed().as_millis() as u64,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Keys:       {}", report.keys);
        println!("Processed:  {}", report.processed);
        println!("Duplicates: {}", report.duplicates);
        println!("Missing:    {}", report.missing);
        println!("Elapsed:    {}ms", report.elapsed_ms);
    }

    if report.duplicates > 0 || report.missing > 0 {
        anyhow::bail!(
            "{} duplicate and {} missing key(s)",
            report.duplicates,
            report.missing
        );
    }
    Ok(())
}
