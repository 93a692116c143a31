//! Module discovery and configuration resolution.
//!
//! Scans the modules root for `<name>/module.yaml` definitions. Scanning is
//! non-fatal: a definition that fails to parse or validate is reported and
//! skipped, and the scan goes on with the remaining directories.

use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde_json::Value;

use crate::domain::errors::{DiscoveryError, LifecycleError};
use crate::domain::models::{ModuleDescriptor, ModuleManifest, DEFINITION_FILE};
use crate::domain::ports::Module;

/// Result of scanning the modules root.
#[derive(Debug, Default)]
pub struct ScanResult {
    /// Valid definitions, sorted by name.
    pub descriptors: Vec<ModuleDescriptor>,
    /// Directories that look like modules but could not be read.
    pub skipped: Vec<(PathBuf, DiscoveryError)>,
}

/// Directories starting with `_` or `.` are never modules.
fn is_candidate(path: &Path) -> bool {
    path.is_dir()
        && path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| !n.starts_with('_') && !n.starts_with('.'))
}

/// Scan `root` for module definitions.
pub fn scan_modules(root: &Path) -> ScanResult {
    let mut result = ScanResult::default();

    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(path = %root.display(), error = %e, "Failed to read modules directory");
            return result;
        }
    };

    for entry in entries {
        let path = match entry {
            Ok(entry) => entry.path(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read directory entry");
                continue;
            }
        };
        if !is_candidate(&path) {
            continue;
        }

        match read_descriptor(&path) {
            Ok(descriptor) => result.descriptors.push(descriptor),
            Err(e) => result.skipped.push((path, e)),
        }
    }

    result.descriptors.sort_by(|a, b| a.name().cmp(b.name()));
    result
}

/// Read and validate the definition in `dir`.
pub fn read_descriptor(dir: &Path) -> Result<ModuleDescriptor, DiscoveryError> {
    let definition_path = dir.join(DEFINITION_FILE);
    if !definition_path.is_file() {
        return Err(DiscoveryError::MissingDefinition(dir.to_path_buf()));
    }

    let content = std::fs::read_to_string(&definition_path).map_err(|source| DiscoveryError::Io {
        path: definition_path.clone(),
        source,
    })?;
    let manifest: ModuleManifest =
        serde_yaml::from_str(&content).map_err(|source| DiscoveryError::ManifestParse {
            path: definition_path.clone(),
            source,
        })?;

    let directory = dir
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();
    if manifest.name != directory {
        return Err(DiscoveryError::NameMismatch {
            directory,
            declared: manifest.name,
        });
    }

    manifest.validate().map_err(|reason| DiscoveryError::InvalidManifest {
        name: manifest.name.clone(),
        reason,
    })?;

    Ok(ModuleDescriptor::new(manifest, dir))
}

/// Environment prefix for a module's configuration overrides,
/// e.g. `OAK_MODULE_TICKETS__`.
pub fn env_prefix(name: &str) -> String {
    format!("OAK_MODULE_{}__", name.to_uppercase().replace('-', "_"))
}

/// Write `config.yml` from the module's defaults if it does not exist yet.
fn ensure_config_file(descriptor: &ModuleDescriptor, defaults: &Value) -> Result<bool, String> {
    let path = descriptor.config_path();
    if path.exists() {
        return Ok(false);
    }
    let yaml = serde_yaml::to_string(defaults).map_err(|e| format!("cannot render default configuration: {e}"))?;
    std::fs::write(&path, yaml).map_err(|e| format!("cannot write {}: {e}", path.display()))?;
    Ok(true)
}

/// Resolve and validate the configuration of `module`.
///
/// Precedence (lowest to highest): the module's declared defaults,
/// `config.yml`, `OAK_MODULE_<NAME>__*` environment variables.
pub fn resolve_config(descriptor: &ModuleDescriptor, module: &dyn Module) -> Result<Value, LifecycleError> {
    let name = descriptor.name();
    let invalid = |errors: Vec<String>| LifecycleError::ConfigValidation {
        module: name.to_string(),
        errors,
    };

    if descriptor.manifest.config_version != module.config_version() {
        return Err(invalid(vec![format!(
            "definition declares config_version {} but the implementation expects {}",
            descriptor.manifest.config_version,
            module.config_version()
        )]));
    }

    let defaults = module.default_config();
    if ensure_config_file(descriptor, &defaults).map_err(|e| invalid(vec![e]))? {
        tracing::info!(module = %name, path = %descriptor.config_path().display(), "Generated default configuration");
    }

    let config: Value = Figment::new()
        .merge(Serialized::defaults(defaults))
        .merge(Yaml::file(descriptor.config_path()))
        .merge(Env::prefixed(&env_prefix(name)).split("__"))
        .extract()
        .map_err(|e| invalid(e.into_iter().map(|e| e.to_string()).collect()))?;

    module.validate_config(&config).map_err(invalid)?;
    Ok(config)
}
