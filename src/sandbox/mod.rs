//! Sandbox module containing all execution-related components.

pub mod config;
pub mod executor;
pub mod external;
pub mod graph;
pub mod harness;
pub mod host_api;
pub mod limits;
pub mod session;
pub mod trace;
pub mod vector;
pub mod vm;
