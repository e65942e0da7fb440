use std::{
    sync::{
        Arc, RwLock,
        atomic::{AtomicBool, Ordering},
        mpsc::{Receiver, Sender, channel},
    },
    thread::{self, JoinHandle},
};

use log::{debug, error, info, warn};

use crate::{
    WispError,
    config::EngineConfig,
    ghost::GhostProfile,
    persistence::{PersistenceWorker, SavedRunId},
    tracking::{LocationFix, LocationProvider, LocationUpdate, PermissionState, ProviderFault},
};

use super::{RunSession, SessionEvent, SessionSnapshot, ticker::TickSource};

/// Everything the session engine reacts to, serialized through one channel
#[derive(Debug)]
pub enum EngineInput {
    Fix(LocationFix),
    Permission(PermissionState),
    Fault(ProviderFault),
    /// The location provider will not deliver anything else
    ProviderEnded,
    Tick,
    Command(SessionCommand),
    SaveCompleted(Result<SavedRunId, WispError>),
}

impl From<LocationUpdate> for EngineInput {
    fn from(update: LocationUpdate) -> Self {
        match update {
            LocationUpdate::Fix(fix) => EngineInput::Fix(fix),
            LocationUpdate::Permission(state) => EngineInput::Permission(state),
            LocationUpdate::Fault(fault) => EngineInput::Fault(fault),
        }
    }
}

/// User intents forwarded to the engine thread
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionCommand {
    Pause,
    Resume,
    Stop,
    Save,
    Discard,
    /// Ends the engine thread and hands the session back
    Shutdown,
}

/// Wires a [`RunSession`] to a live location provider, a tick source and an optional
/// persistence worker.
///
/// Every input lands on a single engine thread that owns the session, so state is only
/// ever written from one place. Readers get copies through [`SessionHandle::snapshot`].
pub struct LiveSession {
    config: EngineConfig,
    persistence: Option<PersistenceWorker>,
}

impl LiveSession {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            persistence: None,
        }
    }

    pub fn with_persistence(mut self, worker: PersistenceWorker) -> Self {
        self.persistence = Some(worker);
        self
    }

    /// Starts the provider and the countdown against `ghost`.
    ///
    /// Fails without spawning anything when the provider refuses to start or the ghost
    /// does not validate.
    pub fn start<P, T>(
        self,
        ghost: GhostProfile,
        mut provider: P,
        mut ticks: T,
    ) -> Result<SessionHandle, WispError>
    where
        P: LocationProvider + Send + 'static,
        T: TickSource + Send + 'static,
    {
        let LiveSession {
            config,
            persistence,
        } = self;

        let mut session = RunSession::new(config);
        let events = session.subscribe();
        provider.start()?;
        if let Err(e) = session.start_countdown(ghost) {
            provider.stop();
            return Err(e);
        }

        let (input_sender, input_receiver) = channel::<EngineInput>();
        let snapshot = Arc::new(RwLock::new(session.snapshot()));
        let provider_stop = Arc::new(AtomicBool::new(false));

        ticks.start(input_sender.clone());

        let pump_sender = input_sender.clone();
        let pump_stop = provider_stop.clone();
        thread::spawn(move || pump_provider(provider, pump_sender, pump_stop));

        let engine_snapshot = snapshot.clone();
        let reply = input_sender.clone();
        let engine = thread::spawn(move || {
            run_engine(
                session,
                input_receiver,
                reply,
                ticks,
                persistence,
                engine_snapshot,
            )
        });

        Ok(SessionHandle {
            input: input_sender,
            snapshot,
            events,
            engine: Some(engine),
            provider_stop,
        })
    }
}

/// Forwards provider updates into the engine channel until either side goes away.
///
/// `next_update` may block, so the stop flag is only observed between updates. The
/// thread is never joined; it exits on the next update after shutdown.
fn pump_provider<P: LocationProvider>(
    mut provider: P,
    sink: Sender<EngineInput>,
    stop: Arc<AtomicBool>,
) {
    while !stop.load(Ordering::Relaxed) {
        let input = match provider.next_update() {
            Ok(Some(update)) => EngineInput::from(update),
            Ok(None) => {
                debug!("Location stream ended");
                let _ = sink.send(EngineInput::ProviderEnded);
                break;
            }
            Err(e) => {
                error!("Location provider failed: {}", e);
                let _ = sink.send(EngineInput::Fault(ProviderFault::Failure {
                    description: e.to_string(),
                }));
                break;
            }
        };
        if sink.send(input).is_err() {
            break;
        }
    }
    provider.stop();
}

fn run_engine<T: TickSource>(
    mut session: RunSession,
    inputs: Receiver<EngineInput>,
    reply: Sender<EngineInput>,
    mut ticks: T,
    mut persistence: Option<PersistenceWorker>,
    snapshot: Arc<RwLock<SessionSnapshot>>,
) -> RunSession {
    // a save handed to the worker that has not reported back yet
    let mut save_in_flight = false;
    for input in &inputs {
        match input {
            EngineInput::Fix(fix) => {
                session.on_fix(&fix);
            }
            EngineInput::Permission(state) => session.on_permission(state),
            EngineInput::Fault(fault) => session.on_provider_fault(fault),
            EngineInput::ProviderEnded => session.on_provider_ended(),
            EngineInput::Tick => session.tick(),
            EngineInput::Command(SessionCommand::Pause) => session.pause(),
            EngineInput::Command(SessionCommand::Resume) => session.resume(),
            EngineInput::Command(SessionCommand::Stop) => {
                session.stop();
            }
            EngineInput::Command(SessionCommand::Save) if save_in_flight => {
                debug!("Save already in progress, ignoring request");
            }
            EngineInput::Command(SessionCommand::Save) => {
                save_in_flight = request_save(&mut session, persistence.as_ref(), &reply)
            }
            EngineInput::Command(SessionCommand::Discard) => {
                session.discard();
            }
            EngineInput::Command(SessionCommand::Shutdown) => {
                debug!("Session engine shutting down");
                break;
            }
            EngineInput::SaveCompleted(Ok(id)) => {
                save_in_flight = false;
                session.mark_saved(id)
            }
            EngineInput::SaveCompleted(Err(e)) => {
                save_in_flight = false;
                session.mark_save_failed(&e)
            }
        }

        // the timer never outlives the live phases
        if !session.phase().is_live() && ticks.is_running() {
            debug!("Cancelling ticks, session is {}", session.phase());
            ticks.cancel();
        }

        match snapshot.write() {
            Ok(mut guard) => *guard = session.snapshot(),
            Err(_) => error!("Session snapshot lock poisoned"),
        }
    }

    ticks.cancel();
    if let Some(worker) = persistence.as_mut() {
        worker.shutdown();
    }
    session
}

/// Hands the finished run to the worker. Returns whether a save is now in flight.
fn request_save(
    session: &mut RunSession,
    persistence: Option<&PersistenceWorker>,
    reply: &Sender<EngineInput>,
) -> bool {
    let request = match session.prepare_save() {
        Ok(request) => request,
        Err(e) => {
            warn!("Ignoring save request: {}", e);
            return false;
        }
    };
    let Some(worker) = persistence else {
        session.mark_save_failed(&WispError::PersistenceFailure {
            reason: "no persistence adapter configured".to_string(),
        });
        return false;
    };
    match worker.submit(request, reply.clone()) {
        Ok(()) => {
            info!("Save requested");
            true
        }
        Err(e) => {
            session.mark_save_failed(&e);
            false
        }
    }
}

/// Control surface of a running [`LiveSession`]
pub struct SessionHandle {
    input: Sender<EngineInput>,
    snapshot: Arc<RwLock<SessionSnapshot>>,
    events: Receiver<SessionEvent>,
    engine: Option<JoinHandle<RunSession>>,
    provider_stop: Arc<AtomicBool>,
}

impl SessionHandle {
    pub fn pause(&self) -> Result<(), WispError> {
        self.send(SessionCommand::Pause)
    }

    pub fn resume(&self) -> Result<(), WispError> {
        self.send(SessionCommand::Resume)
    }

    pub fn stop(&self) -> Result<(), WispError> {
        self.send(SessionCommand::Stop)
    }

    pub fn save(&self) -> Result<(), WispError> {
        self.send(SessionCommand::Save)
    }

    pub fn discard(&self) -> Result<(), WispError> {
        self.send(SessionCommand::Discard)
    }

    pub fn send(&self, command: SessionCommand) -> Result<(), WispError> {
        self.input.send(EngineInput::Command(command))?;
        Ok(())
    }

    /// Latest published state. Never blocks on the engine for long.
    pub fn snapshot(&self) -> SessionSnapshot {
        match self.snapshot.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn events(&self) -> &Receiver<SessionEvent> {
        &self.events
    }

    /// Stops the engine and returns the session as it ended.
    pub fn shutdown(mut self) -> Result<RunSession, WispError> {
        self.close()
    }

    fn close(&mut self) -> Result<RunSession, WispError> {
        self.provider_stop.store(true, Ordering::Relaxed);
        let engine = self.engine.take().ok_or(WispError::EngineThreadPanicked)?;
        // the engine may already be gone; joining tells us how it ended
        let _ = self.input.send(EngineInput::Command(SessionCommand::Shutdown));
        engine.join().map_err(|_| WispError::EngineThreadPanicked)
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if self.engine.is_some() {
            if let Err(e) = self.close() {
                error!("Session engine did not shut down cleanly: {}", e);
            }
        }
    }
}
