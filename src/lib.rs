//! Placement-aware HTTP service with graceful shutdown.
//!
//! Serves `/health` and `/api`, logs every request as structured JSON, and
//! enriches completed-request records with the availability zone and cluster
//! the process runs in. Termination signals move the process through
//! RUNNING -> DRAINING -> TERMINATED within a bounded deadline.

pub mod config;
pub mod logging;
pub mod metadata;
pub mod server;
