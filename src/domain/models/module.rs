//! Module definition and runtime status models.
//!
//! A module is a unit of feature logic that lives in its own directory under
//! the modules root. The directory holds a `module.yaml` definition, the
//! module's `config.yml` and any stores the module owns.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// File that marks a directory as a module definition.
pub const DEFINITION_FILE: &str = "module.yaml";

/// Per-module configuration file, generated from defaults when absent.
pub const CONFIG_FILE: &str = "config.yml";

/// Parsed contents of `module.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleManifest {
    /// Unique module name. Must match the directory name.
    pub name: String,

    /// Module release version.
    #[serde(default = "default_version")]
    pub version: String,

    /// Version of the configuration shape this definition expects.
    #[serde(default = "default_config_version")]
    pub config_version: u32,

    /// Human-readable description.
    #[serde(default)]
    pub description: String,

    /// Disabled modules are discovered but never loaded.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

const fn default_config_version() -> u32 {
    1
}

const fn default_enabled() -> bool {
    true
}

impl ModuleManifest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: default_version(),
            config_version: default_config_version(),
            description: String::new(),
            enabled: true,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_config_version(mut self, version: u32) -> Self {
        self.config_version = version;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Structural validation of the definition.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("name cannot be empty".to_string());
        }
        if !self
            .name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
        {
            return Err(format!(
                "name '{}' may only contain lowercase letters, digits, '_' and '-'",
                self.name
            ));
        }
        if self.version.trim().is_empty() {
            return Err("version cannot be empty".to_string());
        }
        if self.config_version == 0 {
            return Err("config_version must be at least 1".to_string());
        }
        Ok(())
    }
}

/// A discovered module definition: identity plus filesystem location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDescriptor {
    pub manifest: ModuleManifest,
    /// The module's directory.
    pub path: PathBuf,
}

impl ModuleDescriptor {
    pub fn new(manifest: ModuleManifest, path: impl Into<PathBuf>) -> Self {
        Self {
            manifest,
            path: path.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    pub fn enabled(&self) -> bool {
        self.manifest.enabled
    }

    pub fn definition_path(&self) -> PathBuf {
        self.path.join(DEFINITION_FILE)
    }

    pub fn config_path(&self) -> PathBuf {
        self.path.join(CONFIG_FILE)
    }

    /// Directory where the module keeps its owned stores.
    pub fn data_dir(&self) -> &Path {
        &self.path
    }
}

/// Attachment state of a loaded module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleState {
    /// Handlers are registered with the dispatcher.
    Attached,
    /// Handlers have been removed and the shutdown hook is running.
    Detaching,
}

impl ModuleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Attached => "attached",
            Self::Detaching => "detaching",
        }
    }
}

/// Snapshot of a loaded module, as reported by `list_loaded`.
#[derive(Debug, Clone, Serialize)]
pub struct ModuleStatus {
    pub name: String,
    pub version: String,
    pub state: ModuleState,
    pub critical: bool,
    pub loaded_at: DateTime<Utc>,
    pub path: PathBuf,
}
