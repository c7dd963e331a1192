//! Library surface for the dockwatch agent (used by the binary and integration tests).

pub mod args;
pub mod config;
pub mod diff;
pub mod dispatch;
pub mod docker;
pub mod exec;
pub mod queue;
pub mod resources;
pub mod session;
pub mod telemetry;
pub mod types;
pub mod watcher;
