//! Entry point for the plugmy supervisor binary.
//! Keeps the local daemon available and exposes one-shot maintenance commands.

use anyhow::{Result, anyhow};
use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

use plugmy_supervisor::config::{Command, Config};
use plugmy_supervisor::orchestrator::Supervisor;
use plugmy_supervisor::probe::ReachabilityProbe;
use plugmy_supervisor::process::{LaunchSettings, ProcessSupervisor};
use plugmy_supervisor::registrar::ServiceRegistrar;
use plugmy_supervisor::update::UpdateCoordinator;
use plugmy_supervisor::{logging, supervisor};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    logging::init();
    let (config, command) =
        Config::load().map_err(|e| anyhow!("failed to load configuration: {e}"))?;

    match command {
        Command::Run => {
            let supervisor = Supervisor::from_config(&config)?;
            let exit = supervisor::run(&supervisor).await;
            tracing::info!(?exit, "Supervisor exiting");
            Ok(ExitCode::SUCCESS)
        }
        Command::Status => {
            let snapshot = ReachabilityProbe::new(config.status_url())?
                .probe(config.probe_timeout())
                .await;
            let mut out = std::io::stdout().lock();
            serde_json::to_writer_pretty(&mut out, &snapshot)?;
            writeln!(out)?;
            Ok(if snapshot.reachable {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Autostart => {
            let enabled = ServiceRegistrar::from_config(&config).toggle().await?;
            writeln!(
                std::io::stdout(),
                "start at login {}",
                if enabled { "enabled" } else { "disabled" }
            )?;
            Ok(ExitCode::SUCCESS)
        }
        Command::PrepareInstall => {
            // A separate process owns no subprocess; only the agent is unloaded.
            let coordinator = UpdateCoordinator::new(
                ProcessSupervisor::new(LaunchSettings::from_config(&config)),
                Arc::new(ServiceRegistrar::from_config(&config)),
                config.install_grace(),
            );
            coordinator.prepare_for_install(|| ()).await;
            Ok(ExitCode::SUCCESS)
        }
    }
}
