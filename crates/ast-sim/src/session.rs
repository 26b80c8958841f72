//! ---
//! ast_section: "04-simulation-orchestration"
//! ast_subsection: "module"
//! ast_type: "source"
//! ast_scope: "code"
//! ast_description: "Session records, lifecycle states, and read-only views."
//! ast_version: "v0.1.0"
//! ast_owner: "tbd"
//! ---
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Truck id substituted when a session is started without a vehicle list.
pub const DEFAULT_TRUCK_ID: &str = "truck-default";

/// Lifecycle state of a simulation session.
///
/// Transitions only ever move forward: `Starting → Running → Completed` on
/// the happy path, with `Stopping` inserted on user-requested cancellation
/// and `Errored` reachable from any non-terminal state. `Completed` and
/// `Errored` are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Worker spawned, simulator setup not yet finished.
    Starting,
    /// Stage sequence and telemetry loop are executing.
    Running,
    /// Cancellation requested; worker is unwinding.
    Stopping,
    /// Terminal: session finished, `result` populated.
    Completed,
    /// Terminal: setup or a stage failed, `last_error` populated.
    Errored,
}

impl SessionState {
    /// Whether no further transition is permitted from this state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Errored)
    }

    fn rank(&self) -> u8 {
        match self {
            SessionState::Starting => 0,
            SessionState::Running => 1,
            SessionState::Stopping => 2,
            SessionState::Completed | SessionState::Errored => 3,
        }
    }
}

/// Caller-supplied parameters for a session, immutable after creation.
///
/// Unknown fields are retained verbatim so dashboards can round-trip
/// whatever extra knobs they attach.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionSpec {
    /// Optional map identifier loaded into the simulator before spawning.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map: Option<String>,
    /// Trucks to simulate; empty means a single default vehicle.
    #[serde(default)]
    pub truck_ids: Vec<String>,
    /// Opaque passthrough parameters.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl SessionSpec {
    /// Structural validation applied before any worker is launched.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(map) = &self.map {
            if map.trim().is_empty() {
                return Err("map identifier must not be blank".to_owned());
            }
        }
        for truck_id in &self.truck_ids {
            if truck_id.trim().is_empty() {
                return Err("truck ids must not be blank".to_owned());
            }
        }
        Ok(())
    }

    /// Vehicle list with the default-truck substitution applied.
    pub fn effective_truck_ids(&self) -> Vec<String> {
        if self.truck_ids.is_empty() {
            vec![DEFAULT_TRUCK_ID.to_owned()]
        } else {
            self.truck_ids.clone()
        }
    }
}

/// One timestamped, append-only session log line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLine {
    /// Wall-clock time the line was produced.
    pub timestamp: DateTime<Utc>,
    /// Free-form message.
    pub message: String,
}

impl LogLine {
    /// Stamp a message with the current time.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            message: message.into(),
        }
    }
}

/// Structured summary produced when a session completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResult {
    /// Total distance covered by all vehicles, kilometres.
    pub distance_km: f64,
    /// Mean of all observed vehicle speeds, km/h.
    pub average_speed_kph: f64,
    /// Vehicle faults hit while sampling telemetry.
    pub incidents: u32,
    /// Hard decelerations observed between consecutive telemetry samples.
    pub emergency_braking: u32,
    /// Sharp heading changes observed between consecutive telemetry samples.
    pub lane_departures: u32,
    /// Wall-clock duration of the session in seconds.
    pub completion_time_secs: u64,
    /// Telemetry samples forwarded to the sink.
    pub telemetry_samples: u64,
    /// Stages that ran to completion before the session ended.
    pub stages_completed: usize,
}

/// Mutable state of one session. Mutated only by its owning worker and by
/// the registry's cancellation path; always behind the handle's lock.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    /// Opaque unique id, primary key into the registry. Never reused.
    pub id: String,
    /// Current lifecycle state.
    pub state: SessionState,
    /// Caller-supplied parameters, immutable after creation.
    pub spec: SessionSpec,
    /// Creation time.
    pub started_at: DateTime<Utc>,
    /// Set exactly once, when a terminal state is reached.
    pub ended_at: Option<DateTime<Utc>>,
    /// Append-only log; length is monotonically non-decreasing.
    pub log: Vec<LogLine>,
    /// Populated if and only if `state == Completed`.
    pub result: Option<SessionResult>,
    /// Populated if and only if `state == Errored`.
    pub last_error: Option<String>,
}

impl SessionRecord {
    /// Fresh record in the `Starting` state.
    pub fn new(id: impl Into<String>, spec: SessionSpec) -> Self {
        Self {
            id: id.into(),
            state: SessionState::Starting,
            spec,
            started_at: Utc::now(),
            ended_at: None,
            log: Vec::new(),
            result: None,
            last_error: None,
        }
    }

    /// Attempt a forward transition. Backward or out-of-terminal moves are
    /// silently ignored and reported as `false`.
    pub fn advance(&mut self, next: SessionState) -> bool {
        if self.state.is_terminal() || next.rank() <= self.state.rank() {
            return false;
        }
        self.state = next;
        true
    }

    /// Append a log line.
    pub fn append_log(&mut self, message: impl Into<String>) {
        self.log.push(LogLine::new(message));
    }

    /// Terminal transition to `Completed`, stamping `ended_at` and storing
    /// the result in the same critical section so no reader can observe
    /// `Completed` without a result.
    pub fn finalize_completed(&mut self, result: SessionResult) -> bool {
        if !self.advance(SessionState::Completed) {
            return false;
        }
        self.result = Some(result);
        self.ended_at = Some(Utc::now());
        true
    }

    /// Terminal transition to `Errored`, storing the failure description.
    pub fn finalize_errored(&mut self, error: impl Into<String>) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = SessionState::Errored;
        self.last_error = Some(error.into());
        self.ended_at = Some(Utc::now());
        true
    }

    /// Read-only copy for status queries, with the log truncated to the
    /// trailing `log_tail` lines.
    pub fn snapshot(&self, log_tail: usize) -> SessionSnapshot {
        let skip = self.log.len().saturating_sub(log_tail);
        SessionSnapshot {
            id: self.id.clone(),
            state: self.state,
            started_at: self.started_at,
            ended_at: self.ended_at,
            log_len: self.log.len(),
            log: self.log[skip..].to_vec(),
            result: self.result.clone(),
            last_error: self.last_error.clone(),
        }
    }

    /// Compact listing entry for the digest view.
    pub fn digest(&self) -> SessionDigest {
        let elapsed_seconds = if self.state.is_terminal() {
            None
        } else {
            Some((Utc::now() - self.started_at).num_seconds().max(0) as u64)
        };
        SessionDigest {
            id: self.id.clone(),
            state: self.state,
            started_at: self.started_at,
            elapsed_seconds,
        }
    }
}

/// Consistent point-in-time view of a session record.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    /// Session id.
    pub id: String,
    /// State at snapshot time.
    pub state: SessionState,
    /// Creation time.
    pub started_at: DateTime<Utc>,
    /// Termination time, if terminal.
    pub ended_at: Option<DateTime<Utc>>,
    /// Total log length (the `log` field may be truncated).
    pub log_len: usize,
    /// Trailing log lines.
    pub log: Vec<LogLine>,
    /// Result, present only for completed sessions.
    pub result: Option<SessionResult>,
    /// Failure description, present only for errored sessions.
    pub last_error: Option<String>,
}

/// Compact per-session entry returned when status is queried without an id.
#[derive(Debug, Clone, Serialize)]
pub struct SessionDigest {
    /// Session id.
    pub id: String,
    /// State at query time.
    pub state: SessionState,
    /// Creation time.
    pub started_at: DateTime<Utc>,
    /// Seconds since start for live sessions, absent once terminal.
    pub elapsed_seconds: Option<u64>,
}
