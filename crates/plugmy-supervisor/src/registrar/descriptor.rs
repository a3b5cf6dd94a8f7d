//! Login agent descriptors and their property-list encoding.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// `PATH` given to the agent; launchd does not inherit a login shell's.
pub const AGENT_PATH: &str = "/usr/local/bin:/usr/bin:/bin:/opt/homebrew/bin";

/// Errors raised while encoding a descriptor.
#[derive(Debug, Error)]
pub enum DescriptorError {
    /// XML 1.0 has no representation for the character, escaped or not.
    #[error("{field} contains a character a property list cannot carry: {value:?}")]
    IllegalCharacter { field: &'static str, value: String },
    #[error("failed to encode property list: {0}")]
    Encode(#[from] plist::Error),
}

/// Declaration telling launchd how and when to run the daemon.
///
/// The environment is an overlay: launchd merges it onto the inherited
/// environment and the overlay wins on collisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "AgentPlist")]
pub struct ServiceDescriptor {
    pub label: String,
    pub program: PathBuf,
    pub arguments: Vec<String>,
    pub environment: BTreeMap<String, String>,
    pub stdout_path: PathBuf,
    pub stderr_path: PathBuf,
    pub run_at_load: bool,
    pub keep_alive: bool,
}

/// The launchd key layout of a [`ServiceDescriptor`].
#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct AgentPlist {
    label: String,
    /// launchd expects the program path as the first element.
    program_arguments: Vec<String>,
    run_at_load: bool,
    keep_alive: bool,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    environment_variables: BTreeMap<String, String>,
    standard_out_path: String,
    standard_error_path: String,
}

impl From<ServiceDescriptor> for AgentPlist {
    fn from(d: ServiceDescriptor) -> Self {
        let program_arguments = std::iter::once(d.program.to_string_lossy().into_owned())
            .chain(d.arguments)
            .collect();
        Self {
            label: d.label,
            program_arguments,
            run_at_load: d.run_at_load,
            keep_alive: d.keep_alive,
            environment_variables: d.environment,
            standard_out_path: d.stdout_path.to_string_lossy().into_owned(),
            standard_error_path: d.stderr_path.to_string_lossy().into_owned(),
        }
    }
}

impl ServiceDescriptor {
    /// Encode as an XML property list.
    ///
    /// # Errors
    /// Returns [`DescriptorError::IllegalCharacter`] when any value holds a
    /// character XML 1.0 forbids, and [`DescriptorError::Encode`] when the
    /// encoder fails.
    pub fn to_plist(&self) -> Result<Vec<u8>, DescriptorError> {
        self.check_characters()?;
        let mut out = Vec::new();
        plist::to_writer_xml(&mut out, self)?;
        Ok(out)
    }

    fn check_characters(&self) -> Result<(), DescriptorError> {
        check("Label", &self.label)?;
        check("ProgramArguments", &self.program.to_string_lossy())?;
        for arg in &self.arguments {
            check("ProgramArguments", arg)?;
        }
        for (key, value) in &self.environment {
            check("EnvironmentVariables", key)?;
            check("EnvironmentVariables", value)?;
        }
        check("StandardOutPath", &self.stdout_path.to_string_lossy())?;
        check("StandardErrorPath", &self.stderr_path.to_string_lossy())
    }
}

fn check(field: &'static str, value: &str) -> Result<(), DescriptorError> {
    if value.chars().all(is_xml_char) {
        Ok(())
    } else {
        Err(DescriptorError::IllegalCharacter {
            field,
            value: value.to_owned(),
        })
    }
}

/// The XML 1.0 `Char` production. Surrogates cannot occur in a `char`.
fn is_xml_char(c: char) -> bool {
    matches!(c, '\t' | '\n' | '\r' | '\u{20}'..='\u{FFFD}' | '\u{10000}'..)
}

/// Everything about a descriptor except the program location.
///
/// The program path is supplied at derivation time so a descriptor always
/// reflects where the daemon binary lives *now*.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorTemplate {
    pub label: String,
    pub arguments: Vec<String>,
    pub environment: BTreeMap<String, String>,
    pub log_dir: PathBuf,
    pub log_stem: String,
}

impl DescriptorTemplate {
    /// Template with the agent defaults: `PATH` overlay, logs named after
    /// `log_stem` inside `log_dir`.
    #[must_use]
    pub fn new(
        label: impl Into<String>,
        arguments: Vec<String>,
        log_dir: impl Into<PathBuf>,
        log_stem: impl Into<String>,
    ) -> Self {
        let mut environment = BTreeMap::new();
        environment.insert("PATH".to_owned(), AGENT_PATH.to_owned());
        Self {
            label: label.into(),
            arguments,
            environment,
            log_dir: log_dir.into(),
            log_stem: log_stem.into(),
        }
    }

    /// Derive the descriptor for the daemon binary at `program`.
    #[must_use]
    pub fn descriptor_for(&self, program: &Path) -> ServiceDescriptor {
        ServiceDescriptor {
            label: self.label.clone(),
            program: program.to_path_buf(),
            arguments: self.arguments.clone(),
            environment: self.environment.clone(),
            stdout_path: self.log_dir.join(format!("{}.stdout.log", self.log_stem)),
            stderr_path: self.log_dir.join(format!("{}.stderr.log", self.log_stem)),
            run_at_load: true,
            keep_alive: true,
        }
    }
}
