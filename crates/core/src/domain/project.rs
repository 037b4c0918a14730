use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProjectKind {
    #[default]
    Effect,
    Instrument,
}

impl ProjectKind {
    /// Category string the generation script expects.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Effect => "Fx",
            Self::Instrument => "Instrument",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "effect" | "fx" => Some(Self::Effect),
            "instrument" => Some(Self::Instrument),
            _ => None,
        }
    }
}

/// Everything the orchestrator needs to generate one plugin project.
///
/// Field values come from the surrounding UI or CLI as plain strings and
/// are passed to the generation script as opaque definition values; the
/// only rewriting applied anywhere is identifier legalization for the
/// class and project names.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProjectSpec {
    pub vendor_name: String,
    pub vendor_email: String,
    pub vendor_homepage: String,
    pub vendor_namespace: Option<String>,
    pub plugin_name: String,
    /// Explicit class name; derived from `plugin_name` when absent.
    pub class_name: Option<String>,
    pub bundle_identifier: String,
    pub filename_prefix: String,
    pub kind: ProjectKind,
    pub sdk_dir: PathBuf,
    pub output_dir: PathBuf,
    pub script_path: PathBuf,
}

impl ProjectSpec {
    pub fn validate(&self) -> Result<()> {
        if self.plugin_name.is_empty() {
            return Err(CoreError::Validation(
                "plugin name must not be empty".to_string(),
            ));
        }
        if self.bundle_identifier.is_empty() {
            return Err(CoreError::Validation(
                "bundle identifier must not be empty".to_string(),
            ));
        }
        if self.output_dir.as_os_str().is_empty() {
            return Err(CoreError::Validation(
                "output directory must not be empty".to_string(),
            ));
        }
        if !self.sdk_dir.is_dir() {
            return Err(CoreError::Validation(format!(
                "SDK directory does not exist: {}",
                self.sdk_dir.display()
            )));
        }
        Ok(())
    }

    /// Name of the generated build project: the plugin name with every
    /// illegal identifier character replaced.
    pub fn project_name(&self) -> String {
        legalize_identifier(&self.plugin_name).0
    }

    /// Effective class name: the explicit one, or the legalized plugin
    /// name when none was given.
    pub fn effective_class_name(&self) -> String {
        match &self.class_name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => legalize_identifier(&self.plugin_name).0,
        }
    }

    /// Directory the generation step will create the project in.
    pub fn project_dir(&self) -> PathBuf {
        self.output_dir.join(&self.plugin_name)
    }
}

/// Replace every character outside `[0-9A-Za-z_]` with `_`.
///
/// Returns the sanitized string and how many positions were replaced so
/// callers can tell the user their input was adjusted.
pub fn legalize_identifier(input: &str) -> (String, usize) {
    let mut replaced = 0;
    let out = input
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                replaced += 1;
                '_'
            }
        })
        .collect();
    (out, replaced)
}
