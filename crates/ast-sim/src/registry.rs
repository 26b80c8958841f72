//! ---
//! ast_section: "04-simulation-orchestration"
//! ast_subsection: "module"
//! ast_type: "source"
//! ast_scope: "code"
//! ast_description: "Concurrency-safe session registry and worker supervision."
//! ast_version: "v0.1.0"
//! ast_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ast_metrics::SessionMetrics;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::session::{
    SessionDigest, SessionRecord, SessionResult, SessionSnapshot, SessionSpec, SessionState,
};
use crate::simulator::SimulatorClient;
use crate::telemetry::TelemetrySink;
use crate::worker::SessionWorker;

/// Pacing and snapshot options applied to every session.
#[derive(Debug, Clone)]
pub struct RegistryOptions {
    /// Interval between telemetry samples while a session is running.
    pub telemetry_interval: Duration,
    /// Simulated duration of each worker stage.
    pub stage_duration: Duration,
    /// Trailing log lines included in status snapshots.
    pub log_tail: usize,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            telemetry_interval: Duration::from_secs(1),
            stage_duration: Duration::from_secs(1),
            log_tail: 50,
        }
    }
}

/// Errors returned by registry operations.
///
/// Worker failures are not among them: a failed worker is data on its
/// session record, never an error crossing the registry boundary.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// Malformed start configuration; no session was created.
    #[error("invalid session config: {0}")]
    InvalidSpec(String),
    /// The referenced session id was never created.
    #[error("session {0} not found")]
    NotFound(String),
    /// Stop requested on a session that already finished. Idempotent no-op.
    #[error("session {id} is already terminal ({state:?})")]
    AlreadyTerminal {
        /// Session id.
        id: String,
        /// Terminal state the session is in.
        state: SessionState,
    },
    /// Result requested before the session completed.
    #[error("session {id} is not completed yet ({state:?})")]
    NotReady {
        /// Session id.
        id: String,
        /// Current state of the session.
        state: SessionState,
    },
    /// Stop without an id, but nothing is running.
    #[error("no active sessions found")]
    NoActiveSessions,
}

/// Acknowledgement returned by a successful start.
#[derive(Debug, Clone, Serialize)]
pub struct StartAck {
    /// Newly allocated session id.
    pub session_id: String,
    /// Initial state, always `Starting`.
    pub state: SessionState,
}

/// Acknowledgement returned by a successful stop request.
#[derive(Debug, Clone, Serialize)]
pub struct StopAck {
    /// Session the cancellation was routed to.
    pub session_id: String,
    /// State after the request, `Stopping`; the worker finishes the
    /// transition to `Completed` asynchronously.
    pub state: SessionState,
}

pub(crate) struct SessionHandle {
    pub(crate) id: String,
    created_seq: u64,
    pub(crate) record: Mutex<SessionRecord>,
    cancel: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionHandle {
    fn is_terminal(&self) -> bool {
        self.record.lock().state.is_terminal()
    }

    fn request_cancel(&self) {
        let _ = self.cancel.send(true);
    }

    async fn join(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(err) = task.await {
                warn!(session = %self.id, error = %err, "session worker join error");
            }
        }
    }
}

/// Concurrency-safe table of simulation sessions.
///
/// The registry's own lock guards only the id→handle map; every record has
/// its own lock, so unrelated sessions (and their telemetry loops) never
/// serialize against each other. Constructed once at process start and
/// passed by handle to the API facade.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<SessionHandle>>>,
    simulator: Arc<dyn SimulatorClient>,
    sink: Arc<dyn TelemetrySink>,
    options: RegistryOptions,
    metrics: Option<SessionMetrics>,
    next_seq: AtomicU64,
}

impl SessionRegistry {
    /// Registry with default pacing.
    pub fn new(simulator: Arc<dyn SimulatorClient>, sink: Arc<dyn TelemetrySink>) -> Self {
        Self::with_options(simulator, sink, RegistryOptions::default())
    }

    /// Registry with explicit pacing options.
    pub fn with_options(
        simulator: Arc<dyn SimulatorClient>,
        sink: Arc<dyn TelemetrySink>,
        options: RegistryOptions,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            simulator,
            sink,
            options,
            metrics: None,
            next_seq: AtomicU64::new(0),
        }
    }

    /// Attach a metrics handle; subsequent session activity is counted.
    pub fn with_metrics(mut self, metrics: SessionMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Validate the spec, create a `Starting` record, and launch exactly one
    /// worker. Returns immediately; never blocks on the worker.
    pub fn start(&self, spec: SessionSpec) -> Result<StartAck, RegistryError> {
        spec.validate().map_err(RegistryError::InvalidSpec)?;

        let id = format!("sim-{}", Uuid::new_v4());
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let handle = Arc::new(SessionHandle {
            id: id.clone(),
            created_seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            record: Mutex::new(SessionRecord::new(id.clone(), spec)),
            cancel: cancel_tx,
            task: Mutex::new(None),
        });
        self.sessions.write().insert(id.clone(), handle.clone());

        let worker = SessionWorker {
            handle: handle.clone(),
            simulator: self.simulator.clone(),
            sink: self.sink.clone(),
            metrics: self.metrics.clone(),
            telemetry_interval: self.options.telemetry_interval,
            stage_duration: self.options.stage_duration,
        };
        let task = tokio::spawn(worker.run(cancel_rx));
        *handle.task.lock() = Some(task);
        if let Some(metrics) = &self.metrics {
            metrics.inc_started();
            metrics.inc_active();
        }

        info!(session = %id, "simulation session started");
        Ok(StartAck {
            session_id: id,
            state: SessionState::Starting,
        })
    }

    /// Read-only snapshot of one session, without blocking its worker.
    pub fn status(&self, id: &str) -> Result<SessionSnapshot, RegistryError> {
        let handle = self.lookup(id)?;
        let snapshot = handle.record.lock().snapshot(self.options.log_tail);
        Ok(snapshot)
    }

    /// Digest list covering every known session, newest first.
    pub fn digest(&self) -> Vec<SessionDigest> {
        let handles: Vec<Arc<SessionHandle>> = self.sessions.read().values().cloned().collect();
        let mut entries: Vec<(u64, SessionDigest)> = handles
            .iter()
            .map(|handle| (handle.created_seq, handle.record.lock().digest()))
            .collect();
        entries.sort_by(|a, b| b.0.cmp(&a.0));
        entries.into_iter().map(|(_, digest)| digest).collect()
    }

    /// Request cooperative cancellation. With no id, targets the most
    /// recently started non-terminal session. Returns as soon as the signal
    /// is flipped; the worker unwinds asynchronously.
    pub fn stop(&self, id: Option<&str>) -> Result<StopAck, RegistryError> {
        let handle = match id {
            Some(id) => self.lookup(id)?,
            None => self.most_recent_active()?,
        };

        {
            let mut record = handle.record.lock();
            if record.state.is_terminal() {
                return Err(RegistryError::AlreadyTerminal {
                    id: handle.id.clone(),
                    state: record.state,
                });
            }
            record.advance(SessionState::Stopping);
        }
        handle.request_cancel();

        info!(session = %handle.id, "session stop requested");
        Ok(StopAck {
            session_id: handle.id.clone(),
            state: SessionState::Stopping,
        })
    }

    /// Result summary; `NotReady` for every state except `Completed`.
    pub fn result(&self, id: &str) -> Result<SessionResult, RegistryError> {
        let handle = self.lookup(id)?;
        let record = handle.record.lock();
        match (&record.state, &record.result) {
            (SessionState::Completed, Some(result)) => Ok(result.clone()),
            _ => Err(RegistryError::NotReady {
                id: handle.id.clone(),
                state: record.state,
            }),
        }
    }

    /// Number of sessions that have not reached a terminal state.
    pub fn active_count(&self) -> usize {
        self.sessions
            .read()
            .values()
            .filter(|handle| !handle.is_terminal())
            .count()
    }

    /// Cancel every live worker and wait for all of them to unwind.
    /// Deterministic shutdown: no worker task outlives this call.
    pub async fn shutdown(&self) {
        let handles: Vec<Arc<SessionHandle>> = self.sessions.read().values().cloned().collect();
        for handle in &handles {
            handle.record.lock().advance(SessionState::Stopping);
            handle.request_cancel();
        }
        for handle in &handles {
            handle.join().await;
        }
        info!(sessions = handles.len(), "session registry drained");
    }

    fn lookup(&self, id: &str) -> Result<Arc<SessionHandle>, RegistryError> {
        self.sessions
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(id.to_owned()))
    }

    fn most_recent_active(&self) -> Result<Arc<SessionHandle>, RegistryError> {
        self.sessions
            .read()
            .values()
            .filter(|handle| !handle.is_terminal())
            .max_by_key(|handle| handle.created_seq)
            .cloned()
            .ok_or(RegistryError::NoActiveSessions)
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.sessions.read().len())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
