#![cfg_attr(docsrs, feature(doc_cfg))]

//! Library components for the plugmy supervisor.
//!
//! # Overview
//! This crate keeps the local `plug-my-ai` daemon available:
//! - [`probe::ReachabilityProbe`] checks whether the daemon answers.
//! - [`registrar::ServiceRegistrar`] manages the launchd login agent.
//! - [`process::ProcessSupervisor`] runs the daemon as a restarted subprocess.
//! - [`poller::StatusPoller`] reports status snapshots on a timer.
//! - [`update::UpdateCoordinator`] quiesces everything before an update.
//! - [`orchestrator::Supervisor`] ties these together behind a startup policy.
//!
//! # Examples
//! ```rust,no_run
//! use plugmy_supervisor::config::Config;
//! use plugmy_supervisor::orchestrator::Supervisor;
//!
//! # async fn docs() -> Result<(), Box<dyn std::error::Error>> {
//! let (cfg, _command) = Config::load()?;
//! let supervisor = Supervisor::from_config(&cfg)?;
//! let availability = supervisor.startup().await;
//! println!("daemon available: {}", availability.is_available());
//! supervisor.shutdown().await;
//! # Ok(())
//! # }
//! ```
pub mod config;
pub mod logging;
pub mod orchestrator;
pub mod poller;
pub mod probe;
pub mod process;
pub mod registrar;
pub mod supervisor;
pub mod update;
