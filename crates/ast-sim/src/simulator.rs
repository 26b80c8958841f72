//! ---
//! ast_section: "04-simulation-orchestration"
//! ast_subsection: "module"
//! ast_type: "source"
//! ast_scope: "code"
//! ast_description: "Driving simulator client contract and in-process stub."
//! ast_version: "v0.1.0"
//! ast_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::prelude::*;
use rand_distr::Normal;
use thiserror::Error;
use tracing::debug;

/// Errors surfaced by the external driving simulator.
///
/// These never cross the worker boundary; the worker records them on the
/// session and transitions to `Errored`.
#[derive(Debug, Error)]
pub enum SimulatorError {
    /// The simulator endpoint could not be reached.
    #[error("unable to connect to simulator at {endpoint}: {reason}")]
    Connect {
        /// Endpoint that was dialled.
        endpoint: String,
        /// Underlying failure description.
        reason: String,
    },
    /// The requested map could not be loaded.
    #[error("failed to load map {map}: {reason}")]
    MapLoad {
        /// Map identifier.
        map: String,
        /// Underlying failure description.
        reason: String,
    },
    /// A vehicle could not be spawned.
    #[error("failed to spawn vehicle for truck {truck_id}: {reason}")]
    Spawn {
        /// Truck the vehicle was spawned for.
        truck_id: String,
        /// Underlying failure description.
        reason: String,
    },
    /// A vehicle state query failed.
    #[error("failed to query vehicle {vehicle_id}: {reason}")]
    Query {
        /// Simulator-side vehicle id.
        vehicle_id: String,
        /// Underlying failure description.
        reason: String,
    },
}

/// Simulator-side handle to one spawned vehicle.
#[derive(Debug, Clone)]
pub struct VehicleHandle {
    /// Simulator-assigned actor id.
    pub vehicle_id: String,
    /// Truck this vehicle simulates.
    pub truck_id: String,
}

/// Instantaneous kinematic state of a vehicle.
#[derive(Debug, Clone, Copy)]
pub struct VehicleState {
    /// Latitude, decimal degrees.
    pub latitude: f64,
    /// Longitude, decimal degrees.
    pub longitude: f64,
    /// Ground speed, km/h.
    pub speed_kph: f64,
    /// Compass heading, degrees.
    pub heading_deg: f64,
}

/// A connected simulator world: map control, vehicle spawning, and state
/// queries. Implementations are shared between the stage sequence and the
/// telemetry loop, so all methods take `&self`.
#[async_trait]
pub trait SimulatorWorld: Send + Sync {
    /// Load a named map, replacing the current world content.
    async fn load_map(&self, map: &str) -> Result<(), SimulatorError>;

    /// Spawn an autopilot vehicle for the given truck.
    async fn spawn_vehicle(
        &self,
        truck_id: &str,
        model_hint: Option<&str>,
    ) -> Result<VehicleHandle, SimulatorError>;

    /// Read the vehicle's current position, speed, and heading.
    async fn vehicle_state(&self, vehicle: &VehicleHandle) -> Result<VehicleState, SimulatorError>;

    /// Remove a vehicle from the world.
    async fn destroy_vehicle(&self, vehicle: &VehicleHandle) -> Result<(), SimulatorError>;
}

/// Connection factory for the external simulator.
#[async_trait]
pub trait SimulatorClient: Send + Sync {
    /// Human-readable endpoint, used in logs and error messages.
    fn endpoint(&self) -> String;

    /// Establish a connection and return a world handle.
    async fn connect(&self) -> Result<Arc<dyn SimulatorWorld>, SimulatorError>;
}

/// Map a truck model name onto a simulator vehicle blueprint.
pub fn blueprint_for_model(model: &str) -> &'static str {
    let model = model.to_lowercase();
    if model.contains("volvo") {
        "vehicle.volvo.polestar"
    } else if model.contains("freight") {
        "vehicle.carlamotors.carlacola"
    } else {
        "vehicle.tesla.model3"
    }
}

/// In-process stand-in for the real simulator.
///
/// Vehicles follow a seeded random-walk: speed relaxes toward a cruise
/// target with gaussian noise, heading drifts, and position integrates from
/// both. Deterministic for a fixed seed, which the test suites rely on.
#[derive(Debug)]
pub struct StubSimulator {
    endpoint: String,
    seed: u64,
    fail_connect: AtomicBool,
    fail_spawn: AtomicBool,
}

impl StubSimulator {
    /// Stub pretending to live at the given endpoint.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            seed: 0x7A0C5,
            fail_connect: AtomicBool::new(false),
            fail_spawn: AtomicBool::new(false),
        }
    }

    /// Override the kinematics seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Make every subsequent `connect` fail. Test hook.
    pub fn fail_connections(&self) {
        self.fail_connect.store(true, Ordering::SeqCst);
    }

    /// Make every subsequent `spawn_vehicle` fail. Test hook.
    pub fn fail_spawns(&self) {
        self.fail_spawn.store(true, Ordering::SeqCst);
    }
}

impl Default for StubSimulator {
    fn default() -> Self {
        Self::new("127.0.0.1:2000")
    }
}

#[async_trait]
impl SimulatorClient for StubSimulator {
    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }

    async fn connect(&self) -> Result<Arc<dyn SimulatorWorld>, SimulatorError> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(SimulatorError::Connect {
                endpoint: self.endpoint.clone(),
                reason: "connection refused".to_owned(),
            });
        }
        debug!(endpoint = %self.endpoint, "stub simulator connected");
        Ok(Arc::new(StubWorld {
            inner: Mutex::new(StubWorldState {
                rng: StdRng::seed_from_u64(self.seed),
                vehicles: HashMap::new(),
                next_actor: 1,
            }),
            fail_spawn: self.fail_spawn.load(Ordering::SeqCst),
        }))
    }
}

struct StubWorld {
    inner: Mutex<StubWorldState>,
    fail_spawn: bool,
}

struct StubWorldState {
    rng: StdRng,
    vehicles: HashMap<String, Motion>,
    next_actor: u64,
}

#[derive(Debug, Clone, Copy)]
struct Motion {
    latitude: f64,
    longitude: f64,
    speed_kph: f64,
    heading_deg: f64,
}

const CRUISE_SPEED_KPH: f64 = 48.0;
// Roughly one degree of latitude per 111 km.
const DEG_PER_KM: f64 = 1.0 / 111.0;

#[async_trait]
impl SimulatorWorld for StubWorld {
    async fn load_map(&self, map: &str) -> Result<(), SimulatorError> {
        debug!(map, "stub map loaded");
        Ok(())
    }

    async fn spawn_vehicle(
        &self,
        truck_id: &str,
        model_hint: Option<&str>,
    ) -> Result<VehicleHandle, SimulatorError> {
        if self.fail_spawn {
            return Err(SimulatorError::Spawn {
                truck_id: truck_id.to_owned(),
                reason: "no free spawn points".to_owned(),
            });
        }
        let mut state = self.inner.lock();
        let actor = state.next_actor;
        state.next_actor += 1;
        let vehicle_id = format!("actor-{actor}");
        let latitude = 37.40 + state.rng.gen_range(-0.05..0.05);
        let longitude = -122.10 + state.rng.gen_range(-0.05..0.05);
        let heading_deg = state.rng.gen_range(0.0..360.0);
        state.vehicles.insert(
            vehicle_id.clone(),
            Motion {
                latitude,
                longitude,
                speed_kph: 0.0,
                heading_deg,
            },
        );
        let blueprint = blueprint_for_model(model_hint.unwrap_or_default());
        debug!(truck_id, vehicle_id = %vehicle_id, blueprint, "stub vehicle spawned");
        Ok(VehicleHandle {
            vehicle_id,
            truck_id: truck_id.to_owned(),
        })
    }

    async fn vehicle_state(&self, vehicle: &VehicleHandle) -> Result<VehicleState, SimulatorError> {
        let mut state = self.inner.lock();
        let noise = Normal::new(0.0, 2.0).expect("positive sigma");
        let jitter = noise.sample(&mut state.rng);
        let drift = state.rng.gen_range(-4.0..4.0);
        let motion = state.vehicles.get_mut(&vehicle.vehicle_id).ok_or_else(|| {
            SimulatorError::Query {
                vehicle_id: vehicle.vehicle_id.clone(),
                reason: "vehicle no longer exists".to_owned(),
            }
        })?;

        // Relax toward cruise speed, then integrate one nominal second of
        // travel along the current heading.
        motion.speed_kph += (CRUISE_SPEED_KPH - motion.speed_kph) * 0.3 + jitter;
        motion.speed_kph = motion.speed_kph.clamp(0.0, 90.0);
        motion.heading_deg = (motion.heading_deg + drift).rem_euclid(360.0);
        let step_km = motion.speed_kph / 3600.0;
        let heading_rad = motion.heading_deg.to_radians();
        motion.latitude += step_km * DEG_PER_KM * heading_rad.cos();
        motion.longitude += step_km * DEG_PER_KM * heading_rad.sin();

        Ok(VehicleState {
            latitude: motion.latitude,
            longitude: motion.longitude,
            speed_kph: motion.speed_kph,
            heading_deg: motion.heading_deg,
        })
    }

    async fn destroy_vehicle(&self, vehicle: &VehicleHandle) -> Result<(), SimulatorError> {
        self.inner.lock().vehicles.remove(&vehicle.vehicle_id);
        Ok(())
    }
}
