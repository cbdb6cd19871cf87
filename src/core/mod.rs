//! Core modules: the database handle, the operation catalog and dispatcher,
//! the insights memo, the broadcast hub, and the transports around them.

pub mod broadcast;
pub mod catalog;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod insights;
pub mod policy;
pub mod prompts;
pub mod rpc;
pub mod server;
pub mod telemetry;
