//! Cooperative poll engine
//!
//! Single-threaded and externally driven: the caller owns the timer and calls
//! [`PollEngine::tick`] once per interval. Overlapping ticks are the caller's
//! problem; `tick` takes `&mut self`, so safe code cannot overlap them anyway.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

use super::{PollMode, PollState, PollStrategy};
use crate::codec::{SampleDecoder, SampleEncoder, WriteOutcome};
use crate::events::{EventBus, PollEvent, SampleEvent, WriteResultEvent};
use crate::register::{RegisterSpec, RegisterStore, Sample, WriteSpec};
use crate::sink::CsvSink;
use crate::time::{SystemTimeProvider, TimeProvider};
use crate::transport::SharedTransport;

/// Outcome of one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Registers that produced a sample
    pub sampled: usize,
    /// Registers skipped because the read or decode failed
    pub failed: usize,
    /// Whether the row reached the sink
    pub persisted: bool,
}

/// Timer-driven poll loop with ring-buffer history and a flushed CSV sink
pub struct PollEngine {
    store: RegisterStore,
    transport: Option<SharedTransport>,
    sink: Option<CsvSink>,
    events: EventBus,
    clock: Arc<dyn TimeProvider>,
    decoder: SampleDecoder,
    encoder: SampleEncoder,
    state: PollState,
}

impl std::fmt::Debug for PollEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollEngine")
            .field("registers", &self.store.len())
            .field("has_transport", &self.transport.is_some())
            .field("sink", &self.sink.as_ref().map(CsvSink::path))
            .field("state", &self.state)
            .finish()
    }
}

impl PollEngine {
    pub fn new(store: RegisterStore) -> Self {
        Self {
            store,
            transport: None,
            sink: None,
            events: EventBus::new(),
            clock: Arc::new(SystemTimeProvider),
            decoder: SampleDecoder::default(),
            encoder: SampleEncoder::default(),
            state: PollState::Idle,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn TimeProvider>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_transport(mut self, transport: SharedTransport) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Share an existing bus, e.g. one the caller already subscribed to
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    // ========================================================================
    // State transitions
    // ========================================================================

    /// Open the sink for the enabled registers and start accepting ticks
    ///
    /// Returns false and stays idle when the sink cannot be opened. Calling it
    /// while running keeps the current sink and returns true.
    pub fn start(&mut self, sink_path: impl AsRef<Path>) -> bool {
        if self.state == PollState::Running {
            debug!("Poll engine already running");
            return true;
        }

        let columns = self.store.enabled_names();
        match CsvSink::open(sink_path.as_ref(), &columns) {
            Ok(sink) => {
                self.sink = Some(sink);
                self.state = PollState::Running;
                info!(
                    "Poll engine started: {} registers -> {}",
                    columns.len(),
                    sink_path.as_ref().display()
                );
                true
            },
            Err(e) => {
                let message = format!(
                    "Cannot open sink {}: {}",
                    sink_path.as_ref().display(),
                    e
                );
                warn!("{}", message);
                self.events.publish(PollEvent::error(message));
                false
            },
        }
    }

    /// Start without a sink; samples only go to history and events
    pub fn start_in_memory(&mut self) -> bool {
        if self.state != PollState::Running {
            self.state = PollState::Running;
            info!("Poll engine started without sink");
        }
        true
    }

    /// Return to idle and close the sink
    pub fn stop(&mut self) {
        if let Some(mut sink) = self.sink.take() {
            sink.close();
        }
        if self.state != PollState::Idle {
            self.state = PollState::Idle;
            info!("Poll engine stopped");
        }
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == PollState::Running
    }

    // ========================================================================
    // Polling
    // ========================================================================

    /// One pass over every enabled register
    ///
    /// A failing register is logged, reported as an error event and skipped;
    /// the rest of the tick proceeds. All samples of one tick share a
    /// timestamp. No-op while idle or without a transport.
    pub fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();
        if self.state != PollState::Running {
            return report;
        }
        let Some(transport) = self.transport.as_ref() else {
            return report;
        };

        let timestamp = self.clock.now();
        let mut row: HashMap<String, f64> = HashMap::new();

        for spec in self.store.enabled_mut() {
            let result = {
                let mut guard = transport.lock();
                self.decoder.read(spec, &mut **guard)
            };

            match result {
                Ok(value) => {
                    spec.history_mut().push(Sample::new(timestamp, value));
                    row.insert(spec.name().to_string(), value);
                    self.events.publish(PollEvent::Sample(SampleEvent {
                        register_name: spec.name().to_string(),
                        value,
                        timestamp,
                    }));
                    report.sampled += 1;
                },
                Err(e) => {
                    let message = format!("Error reading {}: {}", spec.name(), e);
                    warn!("{}", message);
                    self.events.publish(PollEvent::error(message));
                    report.failed += 1;
                },
            }
        }

        if !row.is_empty() {
            if let Some(sink) = self.sink.as_mut() {
                match sink.append_row(&timestamp, &row) {
                    Ok(()) => report.persisted = sink.is_open(),
                    Err(e) => {
                        let message = format!("Cannot append to {}: {}", sink.path().display(), e);
                        warn!("{}", message);
                        self.events.publish(PollEvent::error(message));
                    },
                }
            }
        }

        debug!(
            "Tick: {} sampled, {} failed, persisted={}",
            report.sampled, report.failed, report.persisted
        );
        report
    }

    /// Apply one write through the attached transport
    pub fn write(&mut self, spec: &WriteSpec) -> WriteOutcome {
        let outcome = match self.transport.as_ref() {
            Some(transport) => {
                let mut guard = transport.lock();
                self.encoder.write(spec, &mut **guard)
            },
            None => WriteOutcome::failed("Modbus not connected"),
        };

        self.events.publish(PollEvent::WriteResult(WriteResultEvent {
            register_name: spec.name.clone(),
            success: outcome.success,
            message: outcome.message.clone(),
        }));
        outcome
    }

    // ========================================================================
    // Register management
    // ========================================================================

    pub fn add_register(&mut self, spec: RegisterSpec) {
        self.store.add(spec);
    }

    pub fn remove_register(&mut self, name: &str) -> bool {
        self.store.remove(name)
    }

    pub fn update_register(&mut self, old_name: &str, spec: RegisterSpec) -> bool {
        self.store.update(old_name, spec)
    }

    pub fn get_register(&self, name: &str) -> Option<&RegisterSpec> {
        self.store.get(name)
    }

    pub fn clear_all_history(&mut self) {
        self.store.clear_all_history();
    }

    pub fn total_sample_count(&self) -> usize {
        self.store.total_sample_count()
    }

    pub fn store(&self) -> &RegisterStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut RegisterStore {
        &mut self.store
    }

    // ========================================================================
    // Collaborators
    // ========================================================================

    pub fn set_transport(&mut self, transport: Option<SharedTransport>) {
        self.transport = transport;
    }

    pub fn has_transport(&self) -> bool {
        self.transport.is_some()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> UnboundedReceiver<PollEvent> {
        self.events.subscribe()
    }

    pub fn sink_path(&self) -> Option<PathBuf> {
        self.sink.as_ref().map(|s| s.path().to_path_buf())
    }
}

impl PollStrategy for PollEngine {
    fn mode(&self) -> PollMode {
        PollMode::Cooperative
    }

    fn state(&self) -> PollState {
        self.state
    }

    fn stop(&mut self) {
        PollEngine::stop(self);
    }

    fn subscribe(&self) -> UnboundedReceiver<PollEvent> {
        self.events.subscribe()
    }
}
