//! Step definitions for the behavioural test suite.

pub mod config_steps;
pub mod supervisor_steps;

pub use config_steps::ConfigWorld;
pub use supervisor_steps::SupervisorWorld;
