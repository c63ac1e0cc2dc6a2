use anyhow::{Context, Result};
use clap::Parser;
use device_registry::{load_config_file, DeviceEvent, HandsetService, ServiceConfig};
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

#[derive(Parser)]
#[command(name = "handset-daemon")]
#[command(about = "Receives handset sensor datagrams and keeps per-device state")]
struct Args {
    /// YAML service config
    #[arg(long)]
    config: Option<String>,

    /// UDP port to listen on
    #[arg(long)]
    port: Option<u16>,

    /// Seconds of silence before a device counts as disconnected
    #[arg(long)]
    timeout_secs: Option<f64>,

    /// Log prometheus metrics at this interval in seconds (0 disables)
    #[arg(long, default_value = "0")]
    metrics_every_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_tracing();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => load_config_file(path)?,
        None => ServiceConfig::default(),
    };
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(secs) = args.timeout_secs {
        config.disconnect_timeout_secs = secs;
    }

    info!("handset-daemon starting");
    info!(
        "Bind: {}  Timeout: {:.1}s  Poll: {}ms",
        config.socket_addr(),
        config.disconnect_timeout_secs,
        config.poll_interval_ms
    );

    let mut service = HandsetService::new(config).context("Failed to create handset service")?;
    let result = match service.start() {
        Ok(addr) => {
            info!("Listening on {addr}");
            run(&mut service, args.metrics_every_secs).await
        }
        Err(e) => Err(e),
    };

    service.stop();
    info!(
        "Handset daemon shutting down ({} device(s) seen)",
        service.registry().len()
    );
    result
}

async fn run(service: &mut HandsetService, metrics_every_secs: u64) -> Result<()> {
    let mut ticker = tokio::time::interval(service.config().poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let metrics_every = Duration::from_secs(metrics_every_secs);
    let mut last_metrics = Instant::now();

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            res = &mut shutdown => {
                if let Err(e) = res {
                    warn!("Failed to listen for ctrl-c: {e}");
                }
                break;
            }
            _ = ticker.tick() => {
                let now = Instant::now();
                let summary = service.poll(now);
                if summary.received {
                    debug!("poll: {:?}", summary.outcome);
                }
                for event in service.drain_events() {
                    report(service, &event, now);
                }
                if !metrics_every.is_zero() && now.duration_since(last_metrics) >= metrics_every {
                    info!("metrics:\n{}", service.metrics().encode_text());
                    last_metrics = now;
                }
            }
        }
    }
    Ok(())
}

fn report(service: &HandsetService, event: &DeviceEvent, now: Instant) {
    match event {
        DeviceEvent::Connected { id } => {
            let name = service
                .device(*id)
                .and_then(|d| d.device_name().map(str::to_owned))
                .unwrap_or_else(|| "unknown".to_string());
            debug!("Handset {id} ({name}) connected");
        }
        DeviceEvent::Disconnected { id, connected_for } => {
            debug!(
                "Handset {id} disconnected after {:.1}s",
                connected_for.as_secs_f64()
            );
        }
    }
    if let Some(device) = service.device(event.device_id()) {
        debug!("{:?}", device.snapshot(now));
    }
}

fn setup_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
