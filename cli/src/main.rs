// SPDX-License-Identifier: Apache-2.0
// Copyright CGNAT Authors

//! The binary's entry point: parse arguments, load configuration, spin up one
//! worker per configured core, an aggregator thread, and the telemetry sinks.
//! Everything below the driver-init prefix that `cgnat_args` hands back as
//! `driver_args` belongs to the packet I/O fabric; this binary wires the core
//! translation engine around whatever fabric is plugged in.

use cgnat_args::{CmdArgs, LogFormat};
use cgnat_config::Config;
use cgnat_nat::CoreContext;
use cgnat_pipeline::{ChannelFabric, Worker};
use cgnat_stats::{aggregate, CounterBlock, Snapshot};
use cgnat_telemetry::{JsonStatsSink, PrometheusSink, SharedSnapshot};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const NANOS_PER_MICROSECOND: f64 = 1000.0;
const AGING_INTERVAL: Duration = Duration::from_secs(30);
const AGGREGATION_INTERVAL: Duration = Duration::from_secs(1);

fn init_logging(args: &CmdArgs) {
    let level = match args.verbose() {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    match args.log_format() {
        LogFormat::Pretty => subscriber.init(),
        LogFormat::Json => subscriber.json().init(),
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock predates the Unix epoch")
        .as_secs()
}

/// Spawns one worker thread per configured core, wired to its own channel-backed
/// fabric, and returns a counter handle per core for the aggregator to read.
fn spawn_workers(config: &Config, stop: &Arc<AtomicBool>) -> Vec<Arc<CounterBlock>> {
    let sessions_per_core = (config.max_sessions_per_customer as usize).saturating_mul(4);
    let mut handles = Vec::with_capacity(config.worker_core_ids.len());

    for _core_id in &config.worker_core_ids {
        let core = CoreContext::new(
            config.public_ips.clone(),
            sessions_per_core,
            config.customer_subnet,
            config.customer_prefix_len,
        );
        let (_rx_tx, rx_rx) = std::sync::mpsc::channel::<Vec<u8>>();
        let (tx_tx, _tx_rx) = std::sync::mpsc::channel::<Vec<u8>>();
        let fabric = ChannelFabric::new(rx_rx, tx_tx);

        let worker_stop = Arc::clone(stop);
        let mut worker = Worker::new(core, fabric, worker_stop, AGING_INTERVAL);
        handles.push(worker.counters_handle());

        std::thread::spawn(move || worker.run(unix_now));
    }
    handles
}

fn spawn_aggregator(counters: Vec<Arc<CounterBlock>>, snapshot: SharedSnapshot, stop: Arc<AtomicBool>) {
    std::thread::spawn(move || {
        while !stop.load(Ordering::Relaxed) {
            std::thread::sleep(AGGREGATION_INTERVAL);
            let refs: Vec<&CounterBlock> = counters.iter().map(Arc::as_ref).collect();
            let aggregated = aggregate(&refs, NANOS_PER_MICROSECOND, unix_now());
            *snapshot
                .write()
                .expect("snapshot lock never poisoned by a panic in a reader") = aggregated;
        }
    });
}

async fn run_telemetry_sinks(config: &Config, snapshot: SharedSnapshot) {
    let mut sinks = tokio::task::JoinSet::new();

    if config.telemetry.prometheus_enabled {
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.telemetry.prometheus_port));
        match PrometheusSink::new(Arc::clone(&snapshot)) {
            Ok(sink) => {
                sinks.spawn(async move {
                    if let Err(err) = sink.serve(addr).await {
                        tracing::error!(%err, "Prometheus sink exited");
                    }
                });
            }
            Err(err) => tracing::error!(%err, "failed to start Prometheus sink"),
        }
    }

    if config.telemetry.json_enabled {
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.telemetry.json_port));
        let sink = JsonStatsSink::new(Arc::clone(&snapshot));
        sinks.spawn(async move {
            if let Err(err) = sink.serve(addr).await {
                tracing::error!(%err, "JSON stats sink exited");
            }
        });
    }

    while sinks.join_next().await.is_some() {}
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CmdArgs::parse_args();
    init_logging(&args);

    let config = Config::load(args.config_path())?;
    tracing::info!(
        port_id = config.port_id,
        workers = config.worker_core_ids.len(),
        public_ips = config.public_ips.len(),
        "starting cgnat"
    );

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || stop.store(true, Ordering::Relaxed))?;
    }

    let counters = spawn_workers(&config, &stop);
    let snapshot: SharedSnapshot = Arc::new(RwLock::new(Snapshot::default()));
    spawn_aggregator(counters, Arc::clone(&snapshot), Arc::clone(&stop));

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run_telemetry_sinks(&config, snapshot));

    Ok(())
}
