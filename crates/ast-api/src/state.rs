//! ---
//! ast_section: "05-http-facade"
//! ast_subsection: "module"
//! ast_type: "source"
//! ast_scope: "code"
//! ast_description: "Shared API state handed to every handler."
//! ast_version: "v0.1.0"
//! ast_owner: "tbd"
//! ---
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use ast_common::Mode;
use ast_core::{AlertService, RouteService, TruckService, UserService, VisionService};
use ast_sim::SessionRegistry;

/// Shared API state exposed to handlers.
pub struct ApiState {
    /// Truck fleet controller.
    pub trucks: TruckService,
    /// Alert controller.
    pub alerts: AlertService,
    /// Route controller.
    pub routes: RouteService,
    /// Operator account controller.
    pub users: UserService,
    /// Camera-feed detection pipeline.
    pub vision: VisionService,
    /// Simulation session registry.
    pub registry: Arc<SessionRegistry>,
    /// Deployment mode the daemon was started in.
    pub mode: Mode,
    start: Instant,
}

impl ApiState {
    /// Bundle the controllers and registry behind one handle.
    pub fn new(
        trucks: TruckService,
        alerts: AlertService,
        routes: RouteService,
        users: UserService,
        vision: VisionService,
        registry: Arc<SessionRegistry>,
        mode: Mode,
    ) -> Self {
        Self {
            trucks,
            alerts,
            routes,
            users,
            vision,
            registry,
            mode,
            start: Instant::now(),
        }
    }

    /// Seconds since the API state was constructed.
    pub fn uptime_seconds(&self) -> u64 {
        self.start.elapsed().as_secs()
    }
}

impl fmt::Debug for ApiState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiState")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}
