//! Ride-hailing backend: passenger and rider accounts plus the ride
//! lifecycle state machine, served as a JSON REST API.

pub mod app;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod memory;
pub mod otp;
pub mod rides;
pub mod state;

pub use app::build_app;
pub use state::AppState;
