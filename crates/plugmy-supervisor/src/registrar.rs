//! Persistent login agent management.
//!
//! The registrar owns the agent property list that lets launchd start the
//! daemon at login independently of the supervisor. Registration state is
//! never cached: it is whatever the filesystem says at the time of asking.
//!
//! Descriptor writes are atomic (temporary file, then rename) so launchd
//! never reads a partial file. Service manager calls are best effort: their
//! failures are logged and swallowed here. A failed bootout followed by a
//! successful delete leaves launchd managing an undescribed agent; this is a
//! known blind spot of that policy.

pub mod descriptor;
pub mod launchctl;

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::config::Config;
use descriptor::{DescriptorError, DescriptorTemplate, ServiceDescriptor};
use launchctl::{Launchctl, ServiceManager, ServiceManagerError};

/// Errors surfaced by registrar operations.
#[derive(Debug, Error)]
pub enum RegistrarError {
    /// Writing or deleting the descriptor failed.
    #[error("failed to persist service descriptor {path:?}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The descriptor could not be encoded; nothing was written.
    #[error("failed to encode service descriptor for {path:?}: {source}")]
    Encoding {
        path: PathBuf,
        #[source]
        source: DescriptorError,
    },
}

pub type Result<T> = std::result::Result<T, RegistrarError>;

/// Resolves the daemon binary's current location.
pub type BinaryLocator = Arc<dyn Fn() -> PathBuf + Send + Sync>;

/// Manages the login agent descriptor and its registration with launchd.
pub struct ServiceRegistrar {
    descriptor_path: PathBuf,
    template: DescriptorTemplate,
    locate_binary: BinaryLocator,
    manager: Arc<dyn ServiceManager>,
}

impl std::fmt::Debug for ServiceRegistrar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistrar")
            .field("descriptor_path", &self.descriptor_path)
            .field("template", &self.template)
            .finish_non_exhaustive()
    }
}

impl ServiceRegistrar {
    pub fn new(
        descriptor_path: PathBuf,
        template: DescriptorTemplate,
        locate_binary: BinaryLocator,
        manager: Arc<dyn ServiceManager>,
    ) -> Self {
        Self {
            descriptor_path,
            template,
            locate_binary,
            manager,
        }
    }

    /// Build a registrar driving `launchctl` as configured.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let manager = Launchctl::for_current_user(
            &config.launchctl_path,
            std::time::Duration::from_millis(config.service_manager_timeout_ms),
        );
        Self::from_config_with_manager(config, Arc::new(manager))
    }

    /// Build a registrar for `config` using `manager` for launchd calls.
    #[must_use]
    pub fn from_config_with_manager(config: &Config, manager: Arc<dyn ServiceManager>) -> Self {
        let template = DescriptorTemplate::new(
            config.service_label.clone(),
            config.daemon_args.clone(),
            config.log_dir.clone(),
            plugmy_lib::DAEMON_BINARY_NAME,
        );
        let locator_cfg = config.clone();
        Self::new(
            config.descriptor_path(),
            template,
            Arc::new(move || locator_cfg.resolve_daemon_binary()),
            manager,
        )
    }

    /// Location of the descriptor file.
    #[must_use]
    pub fn descriptor_path(&self) -> &Path {
        &self.descriptor_path
    }

    /// Descriptor for the daemon binary's current location.
    #[must_use]
    pub fn current_descriptor(&self) -> ServiceDescriptor {
        self.template.descriptor_for(&(self.locate_binary)())
    }

    /// Whether a descriptor is installed. Always read from disk.
    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.descriptor_path.is_file()
    }

    /// Write `descriptor`, replacing any previous one.
    ///
    /// Parent directories are created as needed.
    ///
    /// # Errors
    /// Returns [`RegistrarError::Encoding`] when the descriptor cannot be
    /// represented as a property list, and [`RegistrarError::Persistence`]
    /// when the directory or file cannot be written.
    pub async fn install(&self, descriptor: &ServiceDescriptor) -> Result<()> {
        let path = self.descriptor_path.clone();
        let contents = descriptor
            .to_plist()
            .map_err(|source| RegistrarError::Encoding {
                path: path.clone(),
                source,
            })?;
        let written = tokio::task::spawn_blocking({
            let path = path.clone();
            move || write_atomically(&path, &contents)
        })
        .await
        .unwrap_or_else(|e| Err(io::Error::other(e)));
        written.map_err(|source| RegistrarError::Persistence {
            path: path.clone(),
            source,
        })?;
        tracing::info!(path = %path.display(), program = %descriptor.program.display(), "Login agent installed");
        Ok(())
    }

    /// Unload the agent and delete its descriptor.
    ///
    /// The unload is best effort. A descriptor that is already gone is not an
    /// error.
    ///
    /// # Errors
    /// Returns [`RegistrarError::Persistence`] when an existing descriptor
    /// cannot be deleted.
    pub async fn remove(&self) -> Result<()> {
        self.bootout_best_effort().await;
        match tokio::fs::remove_file(&self.descriptor_path).await {
            Ok(()) => {
                tracing::info!(path = %self.descriptor_path.display(), "Login agent removed");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(RegistrarError::Persistence {
                path: self.descriptor_path.clone(),
                source,
            }),
        }
    }

    /// Unload the agent but keep the descriptor, preserving the user's
    /// start-at-login choice across an update. No-op when not registered.
    pub async fn bootout_only(&self) {
        if !self.is_registered() {
            return;
        }
        self.bootout_best_effort().await;
        tracing::info!(path = %self.descriptor_path.display(), "Login agent booted out; descriptor preserved");
    }

    /// Rewrite the descriptor for the binary's current location and load it.
    ///
    /// Repairs a descriptor left pointing at a moved or replaced binary.
    /// Returns `false` without touching anything when not registered.
    ///
    /// # Errors
    /// Returns the [`install`](Self::install) error when the rewrite fails;
    /// the agent is not loaded in that case.
    pub async fn bootstrap_if_registered(&self) -> Result<bool> {
        if !self.is_registered() {
            return Ok(false);
        }
        self.install(&self.current_descriptor()).await?;
        if let Err(e) = self.manager.bootstrap(&self.descriptor_path).await {
            log_manager_failure("bootstrap", &self.descriptor_path, &e);
        } else {
            tracing::info!(path = %self.descriptor_path.display(), "Login agent bootstrapped");
        }
        Ok(true)
    }

    /// Install the agent when absent, remove it when present.
    ///
    /// Returns the new registration state.
    ///
    /// # Errors
    /// Propagates the [`RegistrarError`] from the install or remove.
    pub async fn toggle(&self) -> Result<bool> {
        if self.is_registered() {
            self.remove().await?;
            Ok(false)
        } else {
            self.install(&self.current_descriptor()).await?;
            Ok(true)
        }
    }

    async fn bootout_best_effort(&self) {
        if let Err(e) = self.manager.bootout(&self.descriptor_path).await {
            log_manager_failure("bootout", &self.descriptor_path, &e);
        }
    }
}

fn log_manager_failure(action: &str, path: &Path, error: &ServiceManagerError) {
    tracing::warn!(action, path = %path.display(), error = %error, "Service manager call failed; continuing");
}

/// Write `contents` to a sibling temporary file, sync it, then rename it over
/// `path`.
fn write_atomically(path: &Path, contents: &[u8]) -> io::Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "descriptor path has no parent"))?;
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests;
