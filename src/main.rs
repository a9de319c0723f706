//! Chainring demo
//!
//! Runs a diamond pipeline (journal and replicate in parallel, then a
//! business-logic stage gated on both) on a Tokio runtime and reports the
//! throughput.

use anyhow::Context;
use chainring::disruptor::{
    ClosureEventHandler, DefaultEventFactory, Disruptor, DisruptorConfig, Executor,
    TokioExecutor,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "chainring")]
#[command(about = "Diamond pipeline demo over a ring buffer sequencing core")]
#[command(version)]
struct Args {
    /// JSON configuration file; defaults are used when absent
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Number of events to publish
    #[arg(short, long, default_value = "1000000")]
    events: u64,

    /// Seconds to wait for the consumers to drain
    #[arg(long, default_value = "30")]
    drain_timeout: u64,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Debug, Default)]
struct Order {
    id: u64,
    amount: i64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    let config = match &args.config {
        Some(path) => DisruptorConfig::load(path)
            .await
            .with_context(|| format!("loading {}", path.display()))?,
        None => DisruptorConfig::default(),
    };
    info!(?config, events = args.events, "starting chainring demo");

    let executor = Arc::new(TokioExecutor::current()?);
    let mut disruptor = Disruptor::from_config(
        DefaultEventFactory::<Order>::new(),
        &config,
        Arc::clone(&executor) as Arc<dyn Executor>,
    )?;

    let journaled = Arc::new(AtomicU64::new(0));
    let replicated = Arc::new(AtomicI64::new(0));
    let settled = Arc::new(AtomicI64::new(-1));

    let journal = {
        let journaled = Arc::clone(&journaled);
        disruptor.handle_events_with(
            ClosureEventHandler::new(move |_: &Order, _, end_of_batch| {
                if end_of_batch {
                    journaled.fetch_add(1, Ordering::Relaxed);
                }
                Ok(())
            }),
            &[],
        )?
    };
    let replicate = {
        let replicated = Arc::clone(&replicated);
        disruptor.handle_events_with(
            ClosureEventHandler::new(move |order: &Order, _, _| {
                replicated.fetch_add(order.amount, Ordering::Relaxed);
                Ok(())
            }),
            &[],
        )?
    };
    {
        let settled = Arc::clone(&settled);
        disruptor.handle_events_with(
            ClosureEventHandler::new(move |order: &Order, _, _| {
                settled.store(order.id as i64, Ordering::Release);
                Ok(())
            }),
            &[journal, replicate],
        )?;
    }

    disruptor.start()?;
    let disruptor = Arc::new(disruptor);
    let started = Instant::now();

    let producer = Arc::clone(&disruptor);
    let events = args.events;
    tokio::task::spawn_blocking(move || -> chainring::Result<()> {
        for id in 0..events {
            producer.publish_event(|order, _| {
                order.id = id;
                order.amount = (id % 100) as i64;
            })?;
        }
        Ok(())
    })
    .await??;

    let drain_timeout = Duration::from_secs(args.drain_timeout);
    let owner = Arc::clone(&disruptor);
    tokio::task::spawn_blocking(move || owner.shutdown(Some(drain_timeout))).await??;
    executor.join_all().await?;

    let elapsed = started.elapsed();
    let throughput = events as f64 / elapsed.as_secs_f64().max(f64::EPSILON);
    info!(
        events,
        elapsed_ms = elapsed.as_millis() as u64,
        ops_per_sec = throughput as u64,
        journal_batches = journaled.load(Ordering::Relaxed),
        replicated_total = replicated.load(Ordering::Relaxed),
        last_settled = settled.load(Ordering::Acquire),
        "pipeline drained"
    );

    Ok(())
}

fn init_logging(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("invalid log level {level:?}"))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .init();

    Ok(())
}
