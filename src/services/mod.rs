//! Login logic
//!
//! This module contains the connectivity detection and login state machine,
//! separated from console and storage concerns. Services only return values;
//! presenting them is up to the caller.

pub mod connectivity;
pub mod portal;
pub mod retry;
pub mod session;
pub mod sleeper;
