//! Cubetrack - track time in Hackaru by turning a Timeular cube
//!
//! This library provides the pieces of the bridge:
//! - Orientation stream adapter: cube transports, debouncing, reconnection
//! - Session client: Hackaru authentication and activity start/stop
//! - Tracking controller: maps stable faces to tasks and drives the session
//! - Config loading and the credential store
//! - CLI command parsing and execution
//!
//! # Example
//!
//! ```no_run
//! use cubetrack::cli::{exit_code, report, run};
//!
//! fn main() {
//!     if let Err(e) = run() {
//!         report(&e);
//!         std::process::exit(exit_code(&e));
//!     }
//! }
//! ```

pub mod cli;
pub mod config;
pub mod controller;
pub mod device;
pub mod error;
pub mod models;
pub mod remote;
pub mod repo;
pub mod session;
pub mod utils;
