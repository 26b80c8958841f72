//! ---
//! ast_section: "04-simulation-orchestration"
//! ast_subsection: "module"
//! ast_type: "source"
//! ast_scope: "code"
//! ast_description: "Per-session worker task: stage sequence and telemetry loop."
//! ast_version: "v0.1.0"
//! ast_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use ast_metrics::SessionMetrics;
use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep};
use tracing::{debug, error, info, warn};

use crate::registry::SessionHandle;
use crate::session::{SessionResult, SessionState};
use crate::simulator::{
    SimulatorClient, SimulatorError, SimulatorWorld, VehicleHandle, VehicleState,
};
use crate::telemetry::{TelemetrySample, TelemetrySink};

/// Fixed stage sequence every session runs through, in order.
pub(crate) const STAGES: [&str; 8] = [
    "Loading map and assets",
    "Spawning autonomous trucks",
    "Setting up sensors",
    "Configuring traffic",
    "Executing route plan",
    "Processing sensor data",
    "Running autonomous driving logic",
    "Collecting performance metrics",
];

const STOP_LOG_LINE: &str = "Simulation stopped by request";

/// Speed drop between consecutive samples of one truck that counts as an
/// emergency braking event, km/h.
const HARD_BRAKE_DROP_KPH: f64 = 8.0;

/// Heading change between consecutive samples of one truck that counts as a
/// lane departure, degrees.
const LANE_DRIFT_DEG: f64 = 3.0;

/// Everything a telemetry loop accumulated before it was asked to stop.
#[derive(Debug, Default, Clone, Copy)]
struct TelemetryTotals {
    samples: u64,
    distance_km: f64,
    speed_sum: f64,
    speed_count: u64,
    incidents: u32,
    emergency_braking: u32,
    lane_departures: u32,
}

impl TelemetryTotals {
    fn average_speed_kph(&self) -> f64 {
        if self.speed_count == 0 {
            0.0
        } else {
            self.speed_sum / self.speed_count as f64
        }
    }

    /// Fold one truck's movement between consecutive samples into the run
    /// totals: distance covered, hard decelerations, sharp heading changes.
    fn accumulate_motion(&mut self, prev: &VehicleState, next: &VehicleState) {
        self.distance_km += planar_distance_km(
            prev.latitude,
            prev.longitude,
            next.latitude,
            next.longitude,
        );
        if prev.speed_kph - next.speed_kph > HARD_BRAKE_DROP_KPH {
            self.emergency_braking += 1;
        }
        if heading_delta_deg(prev.heading_deg, next.heading_deg).abs() > LANE_DRIFT_DEG {
            self.lane_departures += 1;
        }
    }
}

/// Owns one session from spawn to terminal state. Exactly one worker exists
/// per session; it is the only writer of forward state transitions besides
/// the registry's `Stopping` mark.
pub(crate) struct SessionWorker {
    pub(crate) handle: Arc<SessionHandle>,
    pub(crate) simulator: Arc<dyn SimulatorClient>,
    pub(crate) sink: Arc<dyn TelemetrySink>,
    pub(crate) metrics: Option<SessionMetrics>,
    pub(crate) telemetry_interval: Duration,
    pub(crate) stage_duration: Duration,
}

impl SessionWorker {
    pub(crate) async fn run(self, mut cancel: watch::Receiver<bool>) {
        let session_id = self.handle.id.clone();

        let (world, vehicles) = match self.setup(&mut cancel).await {
            Ok(Some(pair)) => pair,
            Ok(None) => {
                self.finish_completed(0, TelemetryTotals::default());
                return;
            }
            Err(err) => {
                self.finish_errored(err);
                return;
            }
        };

        let stopped_before_running = {
            let mut record = self.handle.record.lock();
            if !record.advance(SessionState::Running) {
                // A stop landed between setup and here.
                true
            } else {
                record.append_log(format!(
                    "Simulation running with {} vehicles",
                    vehicles.len()
                ));
                false
            }
        };
        if stopped_before_running {
            self.teardown(&world, &vehicles).await;
            self.log(STOP_LOG_LINE);
            self.finish_completed(0, TelemetryTotals::default());
            return;
        }
        info!(session = %session_id, vehicles = vehicles.len(), "session running");

        let (stop_tx, stop_rx) = watch::channel(false);
        let telemetry = self.spawn_telemetry_loop(
            world.clone(),
            vehicles.clone(),
            cancel.clone(),
            stop_rx,
        );

        let mut stages_completed = 0;
        let mut cancelled = false;
        for stage in STAGES {
            if *cancel.borrow() {
                cancelled = true;
                break;
            }
            self.log(stage);
            if wait_out_stage(self.stage_duration, &mut cancel).await {
                cancelled = true;
                break;
            }
            stages_completed += 1;
        }

        let _ = stop_tx.send(true);
        let totals = match telemetry.await {
            Ok(totals) => totals,
            Err(err) => {
                warn!(session = %session_id, error = %err, "telemetry loop join error");
                TelemetryTotals::default()
            }
        };
        self.teardown(&world, &vehicles).await;

        if cancelled {
            self.log(STOP_LOG_LINE);
        } else {
            self.log("Simulation completed successfully");
        }
        self.finish_completed(stages_completed, totals);
    }

    /// Connect, load the map, and spawn one vehicle per truck. `Ok(None)`
    /// means a cancellation was observed at a check-point.
    async fn setup(
        &self,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<Option<(Arc<dyn SimulatorWorld>, Vec<VehicleHandle>)>, SimulatorError> {
        if *cancel.borrow() {
            self.log(STOP_LOG_LINE);
            return Ok(None);
        }

        let spec = self.handle.record.lock().spec.clone();
        self.log(format!(
            "Connecting to simulator at {}",
            self.simulator.endpoint()
        ));
        let world = self.simulator.connect().await?;

        if let Some(map) = &spec.map {
            self.log(format!("Loading map {map}"));
            world.load_map(map).await?;
        }

        let mut vehicles = Vec::new();
        for truck_id in spec.effective_truck_ids() {
            if *cancel.borrow() {
                self.teardown(&world, &vehicles).await;
                self.log(STOP_LOG_LINE);
                return Ok(None);
            }
            let vehicle = world.spawn_vehicle(&truck_id, None).await?;
            self.log(format!("Spawned vehicle for truck {truck_id}"));
            vehicles.push(vehicle);
        }
        Ok(Some((world, vehicles)))
    }

    /// Sample every vehicle on a fixed interval until either the stage
    /// sequence finishes or the session is cancelled. Runs concurrently with
    /// the stage sequence; shares no lock with it.
    fn spawn_telemetry_loop(
        &self,
        world: Arc<dyn SimulatorWorld>,
        vehicles: Vec<VehicleHandle>,
        mut cancel: watch::Receiver<bool>,
        mut stop: watch::Receiver<bool>,
    ) -> JoinHandle<TelemetryTotals> {
        let sink = self.sink.clone();
        let session_id = self.handle.id.clone();
        let period = self.telemetry_interval;

        tokio::spawn(async move {
            let mut totals = TelemetryTotals::default();
            let mut last_state: HashMap<String, VehicleState> = HashMap::new();
            let mut seq: u64 = 0;
            let mut ticker = interval(period);

            loop {
                tokio::select! {
                    _ = stop.changed() => break,
                    changed = cancel.changed() => {
                        if changed.is_err() || *cancel.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        seq += 1;
                        for vehicle in &vehicles {
                            match world.vehicle_state(vehicle).await {
                                Ok(state) => {
                                    if let Some(prev) = last_state.get(&vehicle.truck_id) {
                                        totals.accumulate_motion(prev, &state);
                                    }
                                    last_state.insert(vehicle.truck_id.clone(), state);
                                    totals.speed_sum += state.speed_kph;
                                    totals.speed_count += 1;

                                    let sample = TelemetrySample::now(
                                        &vehicle.truck_id,
                                        state.latitude,
                                        state.longitude,
                                        state.speed_kph,
                                        state.heading_deg,
                                        seq,
                                    );
                                    match sink.record(sample).await {
                                        Ok(()) => totals.samples += 1,
                                        Err(err) => warn!(
                                            session = %session_id,
                                            truck = %vehicle.truck_id,
                                            error = %err,
                                            "telemetry sink write failed"
                                        ),
                                    }
                                }
                                Err(err) => {
                                    totals.incidents += 1;
                                    warn!(
                                        session = %session_id,
                                        vehicle = %vehicle.vehicle_id,
                                        error = %err,
                                        "telemetry query failed"
                                    );
                                }
                            }
                        }
                    }
                }
            }
            debug!(session = %session_id, samples = totals.samples, "telemetry loop stopped");
            totals
        })
    }

    async fn teardown(&self, world: &Arc<dyn SimulatorWorld>, vehicles: &[VehicleHandle]) {
        for vehicle in vehicles {
            if let Err(err) = world.destroy_vehicle(vehicle).await {
                debug!(
                    session = %self.handle.id,
                    vehicle = %vehicle.vehicle_id,
                    error = %err,
                    "vehicle teardown failed"
                );
            }
        }
    }

    fn log(&self, message: impl Into<String>) {
        let message = message.into();
        debug!(session = %self.handle.id, message = %message, "session log");
        self.handle.record.lock().append_log(message);
    }

    /// Terminal transition for both the natural and the cancelled path: a
    /// cancelled run still completes, with a summary covering whatever it
    /// managed to do.
    fn finish_completed(&self, stages_completed: usize, totals: TelemetryTotals) {
        let mut record = self.handle.record.lock();
        let completion_time_secs = (Utc::now() - record.started_at).num_seconds().max(0) as u64;
        let result = SessionResult {
            distance_km: totals.distance_km,
            average_speed_kph: totals.average_speed_kph(),
            incidents: totals.incidents,
            emergency_braking: totals.emergency_braking,
            lane_departures: totals.lane_departures,
            completion_time_secs,
            telemetry_samples: totals.samples,
            stages_completed,
        };
        if !record.finalize_completed(result) {
            debug!(session = %self.handle.id, state = ?record.state, "completion skipped");
            return;
        }
        if let Some(metrics) = &self.metrics {
            metrics.inc_finished("completed");
            metrics.dec_active();
            metrics.inc_telemetry_samples(totals.samples);
        }
        info!(
            session = %self.handle.id,
            stages = stages_completed,
            samples = totals.samples,
            "session completed"
        );
    }

    fn finish_errored(&self, err: SimulatorError) {
        let mut record = self.handle.record.lock();
        record.append_log(format!("ERROR: {err}"));
        record.finalize_errored(err.to_string());
        if let Some(metrics) = &self.metrics {
            metrics.inc_finished("errored");
            metrics.dec_active();
        }
        error!(session = %self.handle.id, error = %err, "session errored");
    }
}

/// Wait out one stage, returning `true` if a cancellation arrived first.
/// A watch notification that does not carry `true` resumes the wait; the
/// stage only counts once its full duration has elapsed.
async fn wait_out_stage(duration: Duration, cancel: &mut watch::Receiver<bool>) -> bool {
    let stage_sleep = sleep(duration);
    tokio::pin!(stage_sleep);
    loop {
        tokio::select! {
            _ = &mut stage_sleep => return false,
            _ = cancel.changed() => {
                if *cancel.borrow() {
                    return true;
                }
            }
        }
    }
}

/// Signed smallest angle from `prev` to `next`, in `(-180, 180]` degrees.
fn heading_delta_deg(prev: f64, next: f64) -> f64 {
    let delta = (next - prev).rem_euclid(360.0);
    if delta > 180.0 {
        delta - 360.0
    } else {
        delta
    }
}

/// Equirectangular distance between two coordinates, adequate at the scale
/// a session covers.
fn planar_distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let mean_lat = ((lat1 + lat2) / 2.0).to_radians();
    let dx = (lon2 - lon1) * 111.0 * mean_lat.cos();
    let dy = (lat2 - lat1) * 111.0;
    (dx * dx + dy * dy).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_sequence_is_eight_stages() {
        assert_eq!(STAGES.len(), 8);
        assert_eq!(STAGES[0], "Loading map and assets");
        assert_eq!(STAGES[7], "Collecting performance metrics");
    }

    #[test]
    fn planar_distance_of_one_latitude_degree() {
        let d = planar_distance_km(37.0, -122.0, 38.0, -122.0);
        assert!((d - 111.0).abs() < 0.5);
    }

    #[tokio::test]
    async fn stage_wait_resumes_after_a_non_cancel_notification() {
        let (tx, mut rx) = watch::channel(false);
        let waiter = tokio::spawn(async move {
            wait_out_stage(Duration::from_millis(50), &mut rx).await
        });
        // Re-sending the current value notifies without cancelling.
        tx.send(false).unwrap();
        assert!(!waiter.await.unwrap());
    }

    #[tokio::test]
    async fn stage_wait_ends_early_on_cancellation() {
        let (tx, mut rx) = watch::channel(false);
        tx.send(true).unwrap();
        assert!(wait_out_stage(Duration::from_secs(60), &mut rx).await);
    }

    #[test]
    fn hard_braking_and_swerves_count_toward_the_run_totals() {
        let prev = VehicleState {
            latitude: 37.40,
            longitude: -122.10,
            speed_kph: 52.0,
            heading_deg: 358.0,
        };
        let braked_and_swerved = VehicleState {
            speed_kph: 31.0,
            heading_deg: 8.0,
            ..prev
        };
        let cruising = VehicleState {
            speed_kph: 50.0,
            heading_deg: 359.5,
            ..prev
        };

        let mut totals = TelemetryTotals::default();
        totals.accumulate_motion(&prev, &braked_and_swerved);
        assert_eq!(totals.emergency_braking, 1);
        assert_eq!(totals.lane_departures, 1);

        totals.accumulate_motion(&prev, &cruising);
        assert_eq!(totals.emergency_braking, 1);
        assert_eq!(totals.lane_departures, 1);
    }

    #[test]
    fn heading_delta_wraps_around_north() {
        assert!((heading_delta_deg(350.0, 5.0) - 15.0).abs() < f64::EPSILON);
        assert!((heading_delta_deg(5.0, 350.0) + 15.0).abs() < f64::EPSILON);
        assert_eq!(heading_delta_deg(90.0, 90.0), 0.0);
    }

    #[test]
    fn totals_average_handles_empty_window() {
        let totals = TelemetryTotals::default();
        assert_eq!(totals.average_speed_kph(), 0.0);
        let totals = TelemetryTotals {
            speed_sum: 90.0,
            speed_count: 2,
            ..Default::default()
        };
        assert!((totals.average_speed_kph() - 45.0).abs() < f64::EPSILON);
    }
}
