//! fleetgrid-api: HTTP control API for FleetGrid.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | POST | `/add_task` | Route one task to the next running worker |
//! | POST | `/update_containers` | Set the replica target and reconcile |
//! | GET | `/get_tasks_status` | In-flight task count per worker |
//! | GET | `/workers` | Target, worker records and dispatch totals |
//! | GET | `/healthz` | Liveness |

pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use fleetgrid_dispatch::TaskRouter;
use fleetgrid_scaler::FleetManager;
use fleetgrid_state::FleetState;

pub use error::ApiError;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub fleet: FleetState,
    pub router: TaskRouter,
    pub manager: Arc<FleetManager>,
    /// Reported by `/workers` before any target is set.
    pub default_image: String,
}

/// Build the control API router.
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/add_task", post(handlers::add_task))
        .route("/update_containers", post(handlers::update_containers))
        .route("/get_tasks_status", get(handlers::get_tasks_status))
        .route("/workers", get(handlers::list_workers))
        .route("/healthz", get(handlers::healthz))
        .with_state(state)
}
