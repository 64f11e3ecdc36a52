//! Automatic login on the campus SonicWall captive portals
//!
//! Detects a captive portal, finds a reachable gateway and authenticates
//! against its api. The binary in `main.rs` wires the real stores and
//! clients together.

pub mod config;
pub mod http_client;
pub mod services;
pub mod store;
pub mod types;
