//! Service bootstrap and run loop
//!
//! This module handles:
//! - Command-line arguments
//! - Logging initialization
//! - Configuration validation and one-shot writes
//! - Starting the configured poll strategy and tearing it down on shutdown

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use clap::{Parser, Subcommand};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::codec::SampleEncoder;
use crate::config::{ServiceConfig, DEFAULT_CONFIG_PATH};
use crate::error::{ModlogError, Result};
use crate::events::{EventBus, PollEvent};
use crate::poll::{BackgroundPoller, ConcurrentStateStore, PollEngine, PollMode, PollStrategy};
use crate::runtime::LifecycleManager;
use crate::sink::CsvSink;
use crate::transport::{self, SharedTransport};

/// Bound on flushing queued events at shutdown
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Command-line arguments for modlog
#[derive(Parser, Clone, Debug)]
#[command(
    name = "modlog",
    version = env!("CARGO_PKG_VERSION"),
    about = "Modbus register logger",
    long_about = None
)]
pub struct Args {
    /// Configuration file (yaml, toml or json)
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short = 'l', long)]
    pub log_level: Option<String>,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Clone, Debug, PartialEq)]
pub enum Command {
    /// Poll registers until Ctrl+C / SIGTERM (default)
    Run,
    /// Load and validate the configuration, then exit
    Validate,
    /// Apply one configured write and exit
    Write {
        /// Name of the write entry
        #[arg(long)]
        name: String,
        /// Value to write instead of the configured one
        #[arg(long)]
        value: Option<f64>,
    },
}

/// Initialize logging from arguments and configuration
///
/// Log root directory priority:
/// 1. MODLOG_LOG_DIR environment variable
/// 2. `service.log_dir` from the config file
/// 3. Default "logs"
pub fn initialize_logging(args: &Args, config: &ServiceConfig) -> Result<()> {
    let config_dir = config
        .service
        .log_dir
        .as_ref()
        .and_then(|p| p.to_str());
    common::logging::init_log_root(config_dir);

    let level = args
        .log_level
        .as_deref()
        .unwrap_or(config.service.log_level.as_str());

    let log_config = common::LogConfig {
        service_name: config.service.name.clone(),
        log_dir: Some(common::logging::get_log_root().join(&config.service.name)),
        console_level: common::logging::parse_level(level),
        ansi: !args.no_color,
    };

    common::logging::init_with_config(log_config)
        .map_err(|e| ModlogError::config(format!("Failed to init logging: {}", e)))
}

/// Log a summary of an already validated configuration
pub fn validate_configuration(config: &ServiceConfig) -> Result<()> {
    config.validate()?;

    let store = config.build_store()?;
    info!(
        "Connection: {:?} {}:{} (timeout {} ms)",
        config.connection.kind,
        config.connection.host,
        config.connection.port,
        config.connection.timeout_ms
    );
    info!(
        "Polling: {} every {} ms",
        config.polling.mode, config.polling.interval_ms
    );
    info!(
        "Found {} register(s), {} enabled",
        store.len(),
        store.enabled_count()
    );
    for spec in store.iter() {
        info!(
            "  {}: device {} address {} x{} {}{}",
            spec.name(),
            spec.device_id(),
            spec.address(),
            spec.word_count(),
            spec.kind(),
            if spec.is_enabled() { "" } else { " (disabled)" }
        );
    }
    for write in config.write_specs()? {
        info!(
            "  write {}: device {} address {} {} = {}",
            write.name, write.device_id, write.address, write.kind, write.value
        );
    }
    Ok(())
}

fn open_transport(config: &ServiceConfig) -> Result<SharedTransport> {
    let store = config.build_store()?;
    let transport: SharedTransport =
        Arc::new(Mutex::new(transport::from_config(&config.connection, &store)));

    let mut guard = transport.lock();
    match guard.connect() {
        Ok(()) => info!("Connected: {}", guard.connection_info()),
        Err(e) => warn!(
            "Cannot connect to {}: {}; retrying on each request",
            guard.connection_info(),
            e
        ),
    }
    drop(guard);
    Ok(transport)
}

/// Apply the named write once
pub fn run_write(config: &ServiceConfig, name: &str, value: Option<f64>) -> Result<()> {
    let mut spec = config.find_write(name)?;
    if let Some(value) = value {
        spec = spec.with_value(value);
    }

    let transport = open_transport(config)?;
    let outcome = {
        let mut guard = transport.lock();
        let outcome = SampleEncoder::default().write(&spec, &mut **guard);
        guard.close();
        outcome
    };

    if outcome.success {
        info!("{}", outcome.message);
        Ok(())
    } else {
        Err(ModlogError::protocol(outcome.message))
    }
}

/// Poll until a shutdown signal arrives
pub async fn run(config: ServiceConfig) -> Result<()> {
    let mut lifecycle = LifecycleManager::new();

    let transport = open_transport(&config)?;
    lifecycle.register("modbus transport", Arc::clone(&transport), |transport| {
        transport.lock().close();
        Ok(())
    });

    let events = EventBus::new();
    let rx = events.subscribe();

    match config.polling.mode {
        PollMode::Cooperative => start_cooperative(&config, transport, events, rx, &mut lifecycle)?,
        PollMode::Background => start_background(&config, transport, events, rx, &mut lifecycle)?,
    }

    let signal = common::shutdown::wait_for_shutdown().await;
    info!("Received {}, shutting down", signal);

    let report = tokio::task::block_in_place(|| lifecycle.cleanup());
    if report.is_clean() {
        info!("Shutdown complete ({} resources released)", report.total());
    } else {
        for failure in &report.failed {
            warn!("{}", failure);
        }
    }
    Ok(())
}

fn sink_path(config: &ServiceConfig) -> Option<PathBuf> {
    config
        .sink
        .enabled
        .then(|| config.sink.resolved_path(&Local::now()))
}

fn stop_strategy(strategy: &mut dyn PollStrategy) {
    info!("Stopping {} poller", strategy.mode());
    strategy.stop();
}

fn start_cooperative(
    config: &ServiceConfig,
    transport: SharedTransport,
    events: EventBus,
    rx: UnboundedReceiver<PollEvent>,
    lifecycle: &mut LifecycleManager,
) -> Result<()> {
    let mut engine = PollEngine::new(config.build_store()?)
        .with_transport(transport)
        .with_events(events.clone());

    let started = match sink_path(config) {
        Some(path) => engine.start(&path),
        None => engine.start_in_memory(),
    };
    if !started {
        return Err(ModlogError::io("Cannot open the CSV sink"));
    }

    register_drain(lifecycle, events, tokio::spawn(drain_events(rx, None)));

    let engine = Arc::new(Mutex::new(engine));
    let period = config.polling.interval();
    let ticker = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                tokio::task::block_in_place(|| engine.lock().tick());
            }
        })
    };

    lifecycle.register("poll engine", (engine, ticker), |(engine, ticker)| {
        ticker.abort();
        stop_strategy(&mut *engine.lock());
        Ok(())
    });
    Ok(())
}

fn start_background(
    config: &ServiceConfig,
    transport: SharedTransport,
    events: EventBus,
    rx: UnboundedReceiver<PollEvent>,
    lifecycle: &mut LifecycleManager,
) -> Result<()> {
    let store = config.build_store()?;
    let sink = match sink_path(config) {
        Some(path) => Some(CsvSink::open(&path, &store.enabled_names())?),
        None => None,
    };

    register_drain(lifecycle, events.clone(), tokio::spawn(drain_events(rx, sink)));

    let state_store = Arc::new(ConcurrentStateStore::new(config.polling.max_points));
    let mut poller = BackgroundPoller::new(state_store)
        .with_events(events)
        .with_join_timeout(config.polling.join_timeout());
    poller.start(
        Arc::new(RwLock::new(store)),
        transport,
        config.polling.interval(),
    )?;

    lifecycle.register("background poller", poller, |mut poller| {
        stop_strategy(&mut poller);
        Ok(())
    });
    Ok(())
}

/// Cleanup for the drain task, run after the poll strategy has stopped
///
/// Closing the bus ends the drain once it has consumed everything queued.
fn register_drain(lifecycle: &mut LifecycleManager, events: EventBus, drain: JoinHandle<()>) {
    lifecycle.register("event drain", drain, move |handle| {
        events.close();
        finish_drain(handle, DRAIN_TIMEOUT)
    });
}

/// Wait up to `timeout` for the drain task to finish, then abort it
fn finish_drain(mut handle: JoinHandle<()>, timeout: Duration) -> anyhow::Result<()> {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        handle.abort();
        anyhow::bail!("no runtime to drain queued events");
    };

    match runtime.block_on(tokio::time::timeout(timeout, &mut handle)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(anyhow::anyhow!("event drain task failed: {}", e)),
        Err(_) => {
            handle.abort();
            Err(anyhow::anyhow!("queued events not drained within {:?}", timeout))
        },
    }
}

/// Log events; in background mode also persist each batch
async fn drain_events(mut rx: UnboundedReceiver<PollEvent>, mut sink: Option<CsvSink>) {
    while let Some(event) = rx.recv().await {
        match event {
            PollEvent::Sample(e) => debug!("{} = {}", e.register_name, e.value),
            PollEvent::Batch(batch) => {
                info!("Batch of {} values", batch.values.len());
                if let Some(sink) = sink.as_mut() {
                    if let Err(e) = sink.append_row(&batch.timestamp, &batch.to_map()) {
                        warn!("Cannot append to {}: {}", sink.path().display(), e);
                    }
                }
            },
            PollEvent::WriteResult(e) if e.success => info!("{}: {}", e.register_name, e.message),
            PollEvent::WriteResult(e) => warn!("{}: {}", e.register_name, e.message),
            // Already logged where they happened
            PollEvent::Error(e) => debug!("{}", e.message),
        }
    }
}
