//! Drives a simulated connection workload and reports its metrics.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use netmeter_collector::{
    ConnectionMeasurements, DatagramMeasurements, LogSink, Monitoring, NetmeterConfig, PoolKey,
    PoolMeasurements, Registration, Reporter, SocketAddress, WriterSink,
};
use netmeter_common::init_tracing;

/// Aggregate and report simulated connection metrics.
#[derive(Parser, Debug)]
#[command(name = "netmeter")]
#[command(about = "Aggregate and report simulated connection metrics")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,

    /// Number of simulated connections.
    #[arg(long, default_value_t = 8)]
    connections: u16,

    /// Number of distinct remote addresses the connections spread over.
    #[arg(long, default_value_t = 3)]
    remotes: u16,

    /// How long to run before shutting down.
    #[arg(long, default_value_t = 30)]
    duration_secs: u64,

    /// Write encoded batches to stdout instead of logging each point.
    #[arg(long)]
    stdout: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => NetmeterConfig::load_from_file(path)?,
        None => NetmeterConfig::default(),
    };
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }

    init_tracing(&config.logging)?;

    if args.remotes == 0 {
        anyhow::bail!("--remotes must be > 0");
    }

    info!(
        connections = args.connections,
        remotes = args.remotes,
        prefix = %config.monitoring.prefix,
        "Starting netmeter"
    );

    let monitoring = Arc::new(Monitoring::new(config.monitoring.clone()));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = Vec::with_capacity(usize::from(args.connections) + 3);

    for i in 0..args.connections {
        let remote = SocketAddress::new(format!("10.0.0.{}", i % args.remotes + 1), 443)?;
        let local = SocketAddress::new("127.0.0.1", 40000 + i)?;
        let conn = monitoring.net_client().register_guarded(Arc::new(
            ConnectionMeasurements::new(remote)
                .with_local(local)
                .with_side(false),
        ))?;
        tasks.push(tokio::spawn(simulate_connection(
            conn,
            u64::from(i),
            shutdown_rx.clone(),
        )));
    }

    let pool = monitoring.pools().register_guarded(Arc::new(
        PoolMeasurements::new(PoolKey::new("worker", "netmeter-sim")?).with_max_size(4),
    ))?;
    tasks.push(tokio::spawn(simulate_pool(pool, shutdown_rx.clone())));

    let socket = monitoring.datagram().register_guarded(Arc::new(DatagramMeasurements::new(
        SocketAddress::new("127.0.0.1", 9192)?,
    )))?;
    tasks.push(tokio::spawn(simulate_datagram(socket, shutdown_rx.clone())));

    if args.stdout {
        let sink = WriterSink::new(std::io::stdout(), config.reporter.format);
        let reporter = Reporter::new(monitoring.clone(), sink, &config.reporter);
        tasks.push(tokio::spawn(reporter.run(shutdown_rx.clone())));
    } else {
        let reporter = Reporter::new(monitoring.clone(), LogSink, &config.reporter);
        tasks.push(tokio::spawn(reporter.run(shutdown_rx.clone())));
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = tokio::time::sleep(Duration::from_secs(args.duration_secs)) => {
            info!("Run duration elapsed, shutting down...");
        }
    }

    shutdown_tx.send(true)?;

    match tokio::time::timeout(Duration::from_secs(5), join_tasks(tasks)).await {
        Ok(0) => {}
        Ok(failed) => warn!(failed, "Some tasks did not stop cleanly"),
        Err(_) => warn!("Timed out waiting for tasks to stop"),
    }

    let stats = monitoring.net_client().stats();
    info!(
        passes = stats.passes,
        producers_read = stats.producers_read,
        producers_skipped = stats.producers_skipped,
        points_emitted = stats.points_emitted,
        remaining_producers = monitoring.net_client().len(),
        "Final statistics"
    );

    Ok(())
}

/// Wait for every task and return how many panicked or were cancelled.
async fn join_tasks(tasks: Vec<JoinHandle<()>>) -> usize {
    let mut failed = 0;
    for task in tasks {
        if let Err(e) = task.await {
            failed += 1;
            warn!(error = %e, panicked = e.is_panic(), "Task ended abnormally");
        }
    }
    failed
}

async fn simulate_connection(
    conn: Registration<ConnectionMeasurements>,
    seed: u64,
    mut shutdown: watch::Receiver<bool>,
) {
    conn.connected();
    let mut interval = tokio::time::interval(Duration::from_millis(100));
    let mut tick = 0u64;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                tick += 1;
                conn.bytes_written(64 * (seed + 1));
                conn.bytes_read(128 + tick % 512);
                if tick % 97 == seed % 97 {
                    conn.exception_occurred();
                }
            }
            _ = shutdown.changed() => break,
        }
    }

    conn.disconnected();
}

async fn simulate_pool(pool: Registration<PoolMeasurements>, mut shutdown: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(Duration::from_millis(50));
    let mut task = 0u64;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                task += 1;
                let queued_at = Instant::now();
                pool.submitted();
                tokio::time::sleep(Duration::from_millis(task % 5)).await;
                pool.begin(queued_at.elapsed());

                let started = Instant::now();
                tokio::time::sleep(Duration::from_millis(5 + task % 15)).await;
                pool.end(started.elapsed());
            }
            _ = shutdown.changed() => break,
        }
    }
}

async fn simulate_datagram(
    socket: Registration<DatagramMeasurements>,
    mut shutdown: watch::Receiver<bool>,
) {
    let payload = b"some text";
    let mut interval = tokio::time::interval(Duration::from_millis(200));

    loop {
        tokio::select! {
            _ = interval.tick() => {
                socket.bytes_written(payload.len() as u64);
                socket.bytes_read(payload.len() as u64);
            }
            _ = shutdown.changed() => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_join_tasks_counts_panicked_tasks() {
        let tasks = vec![
            tokio::spawn(async {}),
            tokio::spawn(async { panic!("simulated task failure") }),
            tokio::spawn(async {}),
        ];

        assert_eq!(join_tasks(tasks).await, 1);
    }

    #[tokio::test]
    async fn test_simulated_workload_unregisters_on_shutdown() {
        let monitoring = Monitoring::new(Default::default());
        let socket = monitoring
            .datagram()
            .register_guarded(Arc::new(DatagramMeasurements::new(
                SocketAddress::new("127.0.0.1", 9192).unwrap(),
            )))
            .unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(simulate_datagram(socket, shutdown_rx));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(monitoring.datagram().len(), 1);

        shutdown_tx.send(true).unwrap();
        assert_eq!(join_tasks(vec![task]).await, 0);
        assert!(monitoring.datagram().is_empty());
    }
}
