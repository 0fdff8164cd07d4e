//! HTTP server and shutdown lifecycle
//!
//! Provides the request pipeline:
//! - `/health` - Liveness with uptime (503 once draining)
//! - `/api` - Hostname echo
//!
//! Also provides graceful shutdown handling for SIGTERM/SIGINT.

pub mod coordinator;
mod error;
mod middleware;
mod routes;
mod serve;
pub mod shutdown;

pub use coordinator::{Phase, ShutdownCoordinator, Termination};
pub use error::{ApiError, ErrorDetail};
pub use middleware::RequestContext;
pub use routes::{build_router, routes, with_pipeline, ApiResponse, AppState, HealthResponse};
pub use serve::{bind, run_server};
pub use shutdown::{
    shutdown_channel, termination_signals, ShutdownController, ShutdownSignal, ShutdownState,
};

#[cfg(test)]
#[path = "routes_test.rs"]
mod routes_tests;

#[cfg(test)]
#[path = "shutdown_test.rs"]
mod shutdown_tests;

#[cfg(test)]
#[path = "coordinator_test.rs"]
mod coordinator_tests;

#[cfg(test)]
#[path = "serve_test.rs"]
mod serve_tests;
