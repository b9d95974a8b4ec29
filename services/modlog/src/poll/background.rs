//! Threaded background poller
//!
//! One dedicated OS thread paces itself with an interruptible sleep. Results
//! land in a [`ConcurrentStateStore`] and go out as one [`BatchEvent`] per pass.
//!
//! Stop protocol: the stop flag lives under the same mutex the worker holds
//! while publishing, so once `stop()` has set it no further event can be
//! published, even if the worker is still stuck inside a transport call.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, RwLock};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, info, warn};

use super::state::ConcurrentStateStore;
use super::{PollMode, PollState, PollStrategy};
use crate::codec::SampleDecoder;
use crate::error::{ModlogError, Result};
use crate::events::{BatchEvent, EventBus, PollEvent};
use crate::register::RegisterStore;
use crate::time::{SystemTimeProvider, TimeProvider};
use crate::transport::SharedTransport;

/// How long `stop()` waits for the worker before detaching it
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Default)]
struct Control {
    stopping: bool,
    exited: bool,
}

#[derive(Debug, Default)]
struct Shared {
    control: Mutex<Control>,
    /// Wakes the worker's sleep on stop and `stop()` on worker exit
    wake: Condvar,
}

/// Marks the worker as exited, including on panic
struct ExitGuard(Arc<Shared>);

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.0.control.lock().exited = true;
        self.0.wake.notify_all();
    }
}

#[derive(Debug)]
struct Worker {
    shared: Arc<Shared>,
    handle: JoinHandle<()>,
}

struct LoopContext {
    shared: Arc<Shared>,
    store: Arc<RwLock<RegisterStore>>,
    transport: SharedTransport,
    state_store: Arc<ConcurrentStateStore>,
    events: EventBus,
    clock: Arc<dyn TimeProvider>,
    decoder: SampleDecoder,
    interval: Duration,
}

/// Background-thread poll strategy
pub struct BackgroundPoller {
    state_store: Arc<ConcurrentStateStore>,
    events: EventBus,
    clock: Arc<dyn TimeProvider>,
    decoder: SampleDecoder,
    join_timeout: Duration,
    worker: Option<Worker>,
}

impl std::fmt::Debug for BackgroundPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundPoller")
            .field("state", &self.state())
            .field("join_timeout", &self.join_timeout)
            .finish()
    }
}

impl BackgroundPoller {
    pub fn new(state_store: Arc<ConcurrentStateStore>) -> Self {
        Self {
            state_store,
            events: EventBus::new(),
            clock: Arc::new(SystemTimeProvider),
            decoder: SampleDecoder::default(),
            join_timeout: DEFAULT_JOIN_TIMEOUT,
            worker: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn TimeProvider>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    /// Spawn the poll thread
    ///
    /// No-op while already running. Fails when `interval` is zero, when a
    /// previously detached worker has not exited yet, or when the thread
    /// cannot be spawned.
    pub fn start(
        &mut self,
        store: Arc<RwLock<RegisterStore>>,
        transport: SharedTransport,
        interval: Duration,
    ) -> Result<()> {
        if interval.is_zero() {
            return Err(ModlogError::validation("poll interval must be greater than zero"));
        }

        match self.state() {
            PollState::Running => {
                debug!("Background poller already running");
                return Ok(());
            },
            PollState::Stopping => {
                return Err(ModlogError::state(
                    "previous poll thread has not exited yet",
                ));
            },
            PollState::Idle => self.reap(),
        }

        let shared = Arc::new(Shared::default());
        let ctx = LoopContext {
            shared: Arc::clone(&shared),
            store,
            transport,
            state_store: Arc::clone(&self.state_store),
            events: self.events.clone(),
            clock: Arc::clone(&self.clock),
            decoder: self.decoder,
            interval,
        };

        self.state_store.start();
        let handle = std::thread::Builder::new()
            .name("modlog-poller".to_string())
            .spawn(move || run(ctx))
            .map_err(|e| {
                self.state_store.stop();
                ModlogError::internal(format!("Cannot spawn poll thread: {}", e))
            })?;

        self.worker = Some(Worker { shared, handle });
        info!("Background poller started, interval {:?}", interval);
        Ok(())
    }

    /// Stop the thread and wait (bounded) for it to exit
    ///
    /// When this returns, no further event will be published. If the worker
    /// is stuck in a transport call past the join timeout it is left to finish
    /// on its own and the state reads `Stopping` until it does.
    pub fn stop(&mut self) {
        let Some(worker) = self.worker.as_ref() else {
            self.state_store.stop();
            return;
        };

        let exited = {
            let mut control = worker.shared.control.lock();
            control.stopping = true;
            worker.shared.wake.notify_all();

            let deadline = Instant::now() + self.join_timeout;
            while !control.exited {
                if worker.shared.wake.wait_until(&mut control, deadline).timed_out() {
                    break;
                }
            }
            control.exited
        };

        self.state_store.stop();
        if exited {
            self.reap();
            info!("Background poller stopped");
        } else {
            warn!(
                "Poll thread did not exit within {:?}; it will finish its current read and exit",
                self.join_timeout
            );
        }
    }

    /// Join a worker that has already exited
    fn reap(&mut self) {
        let exited = self
            .worker
            .as_ref()
            .is_some_and(|w| w.shared.control.lock().exited);
        if !exited {
            return;
        }
        if let Some(worker) = self.worker.take() {
            if worker.handle.join().is_err() {
                error!("Poll thread panicked");
            }
        }
    }

    pub fn state(&self) -> PollState {
        match &self.worker {
            None => PollState::Idle,
            Some(worker) => {
                let control = worker.shared.control.lock();
                if control.exited {
                    PollState::Idle
                } else if control.stopping {
                    PollState::Stopping
                } else {
                    PollState::Running
                }
            },
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == PollState::Running
    }

    pub fn state_store(&self) -> &Arc<ConcurrentStateStore> {
        &self.state_store
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> UnboundedReceiver<PollEvent> {
        self.events.subscribe()
    }
}

impl Drop for BackgroundPoller {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.stop();
        }
    }
}

impl PollStrategy for BackgroundPoller {
    fn mode(&self) -> PollMode {
        PollMode::Background
    }

    fn state(&self) -> PollState {
        BackgroundPoller::state(self)
    }

    fn stop(&mut self) {
        BackgroundPoller::stop(self);
    }

    fn subscribe(&self) -> UnboundedReceiver<PollEvent> {
        self.events.subscribe()
    }
}

// ============================================================================
// Worker loop
// ============================================================================

fn run(ctx: LoopContext) {
    let _exit = ExitGuard(Arc::clone(&ctx.shared));
    debug!("Poll thread running");

    loop {
        if ctx.shared.control.lock().stopping {
            break;
        }

        let registers = ctx.store.read().enabled_detached();
        let timestamp = ctx.clock.now();
        let mut values = Vec::with_capacity(registers.len());

        for spec in &registers {
            let result = {
                let mut guard = ctx.transport.lock();
                ctx.decoder.read(spec, &mut **guard)
            };

            let control = ctx.shared.control.lock();
            if control.stopping {
                return;
            }
            match result {
                Ok(value) => {
                    ctx.state_store.update_at(spec.name(), timestamp, value);
                    values.push((spec.name().to_string(), value));
                },
                Err(e) => {
                    let message = format!("Error reading {}: {}", spec.name(), e);
                    warn!("{}", message);
                    ctx.events.publish(PollEvent::error(message));
                },
            }
        }

        let mut control = ctx.shared.control.lock();
        if control.stopping {
            break;
        }
        if !values.is_empty() {
            ctx.events.publish(PollEvent::Batch(BatchEvent { values, timestamp }));
        }

        let deadline = Instant::now() + ctx.interval;
        while !control.stopping {
            if ctx.shared.wake.wait_until(&mut control, deadline).timed_out() {
                break;
            }
        }
    }

    debug!("Poll thread exiting");
}
