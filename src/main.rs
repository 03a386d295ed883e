use clap::Parser;
use pulse_rx::bus::models::RegisterRequest;
use pulse_rx::bus::{BusClient, BusConfig, BusSubscriber, NodeRegistrar, SupplyHandler, STORAGE_SERVICE};
use pulse_rx::config::Settings;
use pulse_rx::ui::Args;
use pulse_rx::{build_bridge, logging};
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const LOG_TARGET: &str = "pulse_rx::main";

/// How often buffer and bridge counters are logged.
const STATS_INTERVAL: Duration = Duration::from_secs(10);

/// How long to wait for the bus task after shutdown was signalled.
const BUS_STOP_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let config_path = match &args.config {
        Some(path) => PathBuf::from(path),
        None => Settings::default_path(),
    };
    let mut settings = Settings::load(&config_path)?;
    args.apply_to(&mut settings);
    settings.validate()?;

    logging::init(settings.verbose, settings.log_json)?;
    info!(target: LOG_TARGET, "pulse-rx {} starting", env!("CARGO_PKG_VERSION"));
    debug!(target: LOG_TARGET, ?settings, "Effective settings");

    // --- Node registration ---
    let host = hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());
    let node_id = Uuid::new_v4().to_string();
    let registrar = NodeRegistrar::new(&settings.node_server)?;
    let registered = registrar
        .register(&RegisterRequest {
            node_name: format!("{}@{}", settings.node_name, host),
            node_id: node_id.clone(),
            channel_types: vec![STORAGE_SERVICE],
        })
        .await
        .map_err(|e| {
            error!(target: LOG_TARGET, "Can't register node: {}", e);
            e
        })?;

    let server_url = settings.local.clone().unwrap_or(registered.server_url);
    info!(target: LOG_TARGET, "Connecting bus server at [{}]", server_url);

    // --- Bridge ---
    let bridge = Arc::new(build_bridge(&settings));
    if settings.eager_open {
        if let Err(e) = bridge.open_eagerly() {
            warn!(target: LOG_TARGET, "Continuing without audio output: {}", e);
        }
    }

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let mut bus_config = BusConfig::new(&server_url, &node_id, STORAGE_SERVICE);
    bus_config.arguments = format!("{{PulseAudioRx rate={} fragment={}}}", settings.rate, settings.fragment);
    let mut client = BusClient::new(bus_config);
    let handler: Arc<dyn SupplyHandler> = bridge.clone();
    let bus_shutdown_rx = shutdown_tx.subscribe();
    let mut bus_task = tokio::spawn(async move { client.run(handler, bus_shutdown_rx).await });

    let stats_task = {
        let bridge = Arc::clone(&bridge);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(STATS_INTERVAL);
            interval.tick().await;
            loop {
                interval.tick().await;
                let stats = bridge.stats();
                let buffer = bridge.buffer_stats();
                debug!(
                    target: LOG_TARGET,
                    messages = stats.messages,
                    malformed = stats.malformed,
                    frames = stats.frames,
                    buffered = buffer.len,
                    dropped_overflow = buffer.dropped_overflow,
                    underruns = buffer.underruns,
                    session = ?bridge.session_state(),
                    "Bridge statistics"
                );
            }
        })
    };

    // --- Run until Ctrl+C or the bus gives up ---
    let mut exit_error: Option<Box<dyn Error>> = None;
    let interrupted = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => info!(target: LOG_TARGET, "Interrupt received, shutting down."),
                Err(e) => error!(target: LOG_TARGET, "Failed to listen for interrupt: {}", e),
            }
            true
        }
        result = &mut bus_task => {
            match result {
                Ok(Ok(())) => info!(target: LOG_TARGET, "Bus client finished."),
                Ok(Err(e)) => {
                    error!(target: LOG_TARGET, "Can't connect bus server: {}", e);
                    exit_error = Some(Box::new(e));
                }
                Err(e) => {
                    error!(target: LOG_TARGET, "Bus task join error: {}", e);
                    exit_error = Some(Box::new(e));
                }
            }
            false
        }
    };

    if interrupted {
        let _ = shutdown_tx.send(());
        match tokio::time::timeout(BUS_STOP_TIMEOUT, &mut bus_task).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => warn!(target: LOG_TARGET, "Bus client ended with error: {}", e),
            Ok(Err(e)) => error!(target: LOG_TARGET, "Bus task join error: {}", e),
            Err(_) => {
                warn!(target: LOG_TARGET, "Bus client did not stop within {:?}, aborting.", BUS_STOP_TIMEOUT);
                bus_task.abort();
            }
        }
    }

    stats_task.abort();

    let drain_timeout = settings.drain_timeout();
    let closing = Arc::clone(&bridge);
    if let Err(e) = tokio::task::spawn_blocking(move || closing.shutdown(drain_timeout)).await {
        error!(target: LOG_TARGET, "Playback shutdown task failed: {}", e);
    }
    registrar.unregister(&node_id).await;

    match exit_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
