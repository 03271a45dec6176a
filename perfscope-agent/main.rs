use anyhow::{bail, Context};
use axum::{extract::State, response::IntoResponse, routing::get, Router};
use clap::Parser;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use perfscope::common::current_tid;
use perfscope::{Collector, PerfCollector, PerfMetricExporter, ScopeMask};

#[derive(Parser, Debug)]
#[command(name = "perfscope")]
#[command(about = "Per-thread and per-scope hardware counter collection")]
struct Args {
    #[arg(long, help = "JSON counter configuration (defaults to reserved set 0)")]
    config: Option<PathBuf>,

    #[arg(long, default_value = "perf", help = "Collector name")]
    name: String,

    #[arg(long, default_value_t = 10, help = "Number of collection rounds")]
    rounds: u32,

    #[arg(long, default_value_t = 100, help = "Milliseconds between collections")]
    interval_ms: u64,

    #[arg(long, default_value_t = 2, help = "Synthetic patrace-<i> workload threads")]
    workers: usize,

    #[arg(long, help = "Write the result document to this JSON file")]
    output: Option<PathBuf>,

    #[arg(long, help = "Write one CSV per thread binding into this directory")]
    csv_dir: Option<PathBuf>,

    #[arg(long, help = "Summarize the series every N rounds")]
    summarize_every: Option<u32>,

    #[arg(long, help = "Serve Prometheus metrics on this address, e.g. 0.0.0.0:8080")]
    listen: Option<SocketAddr>,

    #[arg(long, help = "Per-API mode: direct cycle register reads around scopes")]
    perapi: bool,

    #[arg(short, long, help = "Enable verbose logging")]
    verbose: bool,
}

async fn metrics_handler(State(exporter): State<Arc<PerfMetricExporter>>) -> impl IntoResponse {
    let body = exporter.gather().unwrap_or_else(|e| {
        tracing::error!("Failed to encode metrics: {}", e);
        String::new()
    });
    (
        [("Content-Type", prometheus::TEXT_FORMAT.to_string())],
        body,
    )
}

async fn shutdown_signal(cancel_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::warn!("Shutdown triggered by Ctrl+C"),
        _ = terminate => tracing::warn!("Shutdown triggered by SIGTERM"),
        _ = cancel_token.cancelled() => return,
    }
    cancel_token.cancel();
}

fn spin(iterations: u64) -> u64 {
    let mut acc = 0u64;
    for i in 0..iterations {
        acc = acc.wrapping_mul(31).wrapping_add(std::hint::black_box(i));
    }
    acc
}

/// Spawn `count` threads named `patrace-<i>` that bracket two workloads with
/// scope ids 1 and 2 until cancelled. Returns once every worker is running.
fn spawn_workers(
    count: usize,
    collector: Arc<PerfCollector>,
    cancel_token: CancellationToken,
) -> anyhow::Result<Vec<JoinHandle<()>>> {
    let (ready_tx, ready_rx) = mpsc::channel();
    let mut handles = Vec::with_capacity(count);

    for index in 0..count {
        let collector = Arc::clone(&collector);
        let cancel_token = cancel_token.clone();
        let ready_tx = ready_tx.clone();
        let handle = std::thread::Builder::new()
            .name(format!("patrace-{index}"))
            .spawn(move || {
                let tid = current_tid();
                let _ = ready_tx.send(tid);
                let mask = ScopeMask::REPLAY_THREADS;
                while !cancel_token.is_cancelled() {
                    collector.collect_scope_start(1, mask, tid);
                    std::hint::black_box(spin(20_000));
                    collector.collect_scope_stop(1, mask, tid);

                    collector.collect_scope_start(2, mask, tid);
                    std::hint::black_box(spin(80_000));
                    collector.collect_scope_stop(2, mask, tid);

                    std::thread::sleep(Duration::from_millis(1));
                }
            })
            .with_context(|| format!("failed to spawn worker patrace-{index}"))?;
        handles.push(handle);
    }
    drop(ready_tx);

    for _ in 0..count {
        let tid = ready_rx.recv().context("worker exited before reporting")?;
        tracing::debug!("Worker thread {} running", tid);
    }
    Ok(handles)
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<Value> {
    match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str(&content).with_context(|| format!("invalid JSON in {}", path.display()))
        }
        None => Ok(json!({ "set": 0 })),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    if args.perapi {
        if !perfscope_raw::arch::direct_access_supported() {
            tracing::warn!("Per-API mode without direct PMU access on this platform, scopes use group reads");
        } else if let Some(bits) = *perfscope::common::PMU_COUNTER_BITS {
            tracing::info!("Per-API mode, PMU counters are {} bit", bits);
        }
    }

    let config = load_config(args.config.as_ref())?;
    let collector = Arc::new(PerfCollector::new(config, args.name.clone(), args.perapi));
    if !collector.available() {
        tracing::warn!("perf_event does not look available on this system");
    }

    let cancel_token = CancellationToken::new();
    let workers_token = cancel_token.child_token();
    let workers = spawn_workers(args.workers, Arc::clone(&collector), workers_token.clone())?;

    if !collector.init() {
        cancel_token.cancel();
        bail!("failed to initialize collector {}", args.name);
    }
    tracing::info!(
        "Collector {} instruments {} bindings",
        collector.name(),
        collector.binding_count()
    );

    let exporter = Arc::new(PerfMetricExporter::new()?);
    let server = match args.listen {
        Some(addr) => {
            let app = Router::new()
                .route("/metrics", get(metrics_handler))
                .with_state(Arc::clone(&exporter));
            let listener = tokio::net::TcpListener::bind(addr).await?;
            tracing::warn!("Starting HTTP server on {}", addr);
            let token = cancel_token.clone();
            Some(tokio::spawn(async move {
                axum::serve(listener, app)
                    .with_graceful_shutdown(async move { token.cancelled().await })
                    .await
            }))
        }
        None => None,
    };
    let signal_task = tokio::spawn(shutdown_signal(cancel_token.clone()));

    if !collector.start() {
        cancel_token.cancel();
        bail!("failed to start collector {}", args.name);
    }

    let started = tokio::time::Instant::now();
    let mut interval = tokio::time::interval(Duration::from_millis(args.interval_ms.max(1)));
    interval.tick().await;
    for round in 1..=args.rounds {
        tokio::select! {
            _ = interval.tick() => {}
            _ = cancel_token.cancelled() => {
                tracing::warn!("Collection interrupted after {} rounds", round - 1);
                break;
            }
        }

        let now = started.elapsed().as_micros() as i64;
        if !collector.collect(now) {
            tracing::warn!("Round {} collected with errors", round);
        }
        exporter.update(&collector);

        if let Some(every) = args.summarize_every.filter(|n| *n > 0) {
            if round % every == 0 {
                collector.summarize();
            }
        }
    }

    // Workers stop issuing scope calls before the scope sums are flushed
    let keep_serving = args.listen.is_some() && !cancel_token.is_cancelled();
    if !keep_serving {
        cancel_token.cancel();
    }
    workers_token.cancel();
    for handle in workers {
        if handle.join().is_err() {
            tracing::error!("Worker thread panicked");
        }
    }

    collector.stop();
    collector.postprocess(&[]);

    if let Some(path) = &args.output {
        collector.write_json(path)?;
        tracing::info!("Wrote results to {}", path.display());
    }
    if let Some(dir) = &args.csv_dir {
        std::fs::create_dir_all(dir)?;
        let written = collector.write_csv(dir)?;
        tracing::info!("Wrote {} CSV files to {}", written.len(), dir.display());
    }
    if args.output.is_none() {
        println!("{}", serde_json::to_string_pretty(&collector.results())?);
    }

    if let Some(server) = server {
        if keep_serving {
            tracing::info!("Collection finished, serving metrics until shutdown");
        }
        server.await??;
    }
    cancel_token.cancel();
    let _ = signal_task.await;

    collector.deinit();
    tracing::info!("All tasks completed, exiting");
    Ok(())
}
