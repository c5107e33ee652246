use brew_scanner::api::{self, ApiContext};
use brew_scanner::config::{self, Config, ConfigError, SinkKind};
use brew_scanner::engine::{Engine, spawn_engine_thread};
use brew_scanner::error::AppError;
use brew_scanner::scale::replay::{DEFAULT_SAMPLE_INTERVAL, ReplayScale, load_recording};
use brew_scanner::scale::{Scale, sample_channel};
use brew_scanner::sink::Sink;
use brew_scanner::sink::influx::InfluxSink;
use brew_scanner::sink::memory::MemorySink;
use brew_scanner::state::AppState;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::Level;

/// Replay source and engine threads of a running scanner.
struct RunningScanner {
    scale: Arc<ReplayScale>,
    stop: Arc<AtomicBool>,
    producer: JoinHandle<()>,
    engine: JoinHandle<Result<(), AppError>>,
}

fn init_tracing(level: &str) {
    let max_level = level.parse::<Level>().unwrap_or(Level::INFO);
    let subscriber = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(max_level)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = config::load_default()?;
    init_tracing(&config.logging.level);
    tracing::info!(
        config_path = config::DEFAULT_CONFIG_PATH,
        app = %config.app.name,
        "brew-scanner starting"
    );

    let settings = config.scanner_settings()?;
    let sink = build_sink(&config)?;
    let database = config.database().to_string();
    let state = Arc::new(RwLock::new(AppState::new()));

    let scanner = match config.replay_path() {
        Some(path) => {
            let samples = load_recording(path)?;
            tracing::info!(path = %path.display(), count = samples.len(), "Recording loaded");
            let scale_section = config.scale.clone().unwrap_or_default();
            let interval = scale_section
                .sample_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_SAMPLE_INTERVAL);
            let scale = Arc::new(ReplayScale::new(
                samples,
                interval,
                scale_section.battery_level,
            ));
            let engine = Engine::new(
                &settings,
                Arc::clone(&scale) as Arc<dyn Scale>,
                Arc::clone(&sink),
                Arc::clone(&state),
            )?
            .with_database(database.clone());
            Some(start_scanner(engine, scale, settings.queue_capacity))
        }
        None => {
            tracing::warn!("No scale source configured in [scale].replay_path, scanner not started");
            None
        }
    };

    let app = api::router(ApiContext {
        state: Arc::clone(&state),
        sink,
        database,
    });
    let port = config.server_port();
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "API server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(scanner) = scanner {
        match tokio::task::spawn_blocking(move || stop_scanner(scanner)).await? {
            Ok(()) | Err(AppError::SourceDisconnected) => tracing::info!("Scanner stopped"),
            Err(err) => tracing::error!(error = %err, "Scanner stopped with error"),
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown requested");
}

fn build_sink(config: &Config) -> Result<Arc<dyn Sink>, ConfigError> {
    let timeout = config.sink_timeout()?;
    match config.sink_kind() {
        SinkKind::Memory => {
            tracing::info!("Using in-memory sink");
            Ok(Arc::new(MemorySink::new()))
        }
        SinkKind::Influx => {
            let section = config.sink.clone().unwrap_or_default();
            let endpoint = section
                .endpoint
                .filter(|endpoint| !endpoint.is_empty())
                .ok_or_else(|| {
                    ConfigError::Invalid("[sink].endpoint is required for influx".to_string())
                })?;
            tracing::info!(%endpoint, database = config.database(), "Using InfluxDB sink");
            Ok(Arc::new(InfluxSink::new(
                endpoint,
                section.username,
                section.password,
                timeout,
            )))
        }
    }
}

fn start_scanner(engine: Engine, scale: Arc<ReplayScale>, queue_capacity: usize) -> RunningScanner {
    let (sender, receiver) = sample_channel(queue_capacity);
    let stop = Arc::new(AtomicBool::new(false));
    let producer = scale.start(sender);
    let engine = spawn_engine_thread(engine, receiver, Arc::clone(&stop));
    RunningScanner {
        scale,
        stop,
        producer,
        engine,
    }
}

/// Stop the engine first so queued samples are drained, then release the scale.
fn stop_scanner(scanner: RunningScanner) -> Result<(), AppError> {
    scanner.stop.store(true, Ordering::Relaxed);
    let result = match scanner.engine.join() {
        Ok(result) => result,
        Err(_) => {
            tracing::error!("Scanner thread panicked");
            Ok(())
        }
    };
    if let Err(err) = scanner.scale.disconnect() {
        tracing::warn!(error = %err, "Failed to disconnect scale");
    }
    if scanner.producer.join().is_err() {
        tracing::error!("Replay thread panicked");
    }
    result
}
