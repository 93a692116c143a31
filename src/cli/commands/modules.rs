//! `oak modules`: inspect and scaffold module definitions.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;
use serde_json::Value;

use crate::adapters::modules::ModuleCatalog;
use crate::cli::load_config;
use crate::cli::output::{list_table, output, render_list, CommandOutput};
use crate::domain::models::{ModuleManifest, DEFINITION_FILE};
use crate::services::{read_descriptor, resolve_config, scan_modules};

#[derive(Args, Debug)]
pub struct ModulesArgs {
    #[command(subcommand)]
    pub command: ModulesCommands,
}

#[derive(Subcommand, Debug)]
pub enum ModulesCommands {
    /// List module definitions in the modules directory
    List,
    /// Resolve and validate a module's configuration without loading it
    Check {
        /// Module name
        name: String,
    },
    /// Write definitions for built-in modules that have none yet
    Init,
}

#[derive(Debug, Serialize)]
pub struct ModuleRow {
    pub name: String,
    pub version: String,
    pub enabled: bool,
    pub builtin: bool,
    pub configured: bool,
    pub path: PathBuf,
}

#[derive(Debug, Serialize)]
pub struct SkippedRow {
    pub path: PathBuf,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct ModuleListOutput {
    pub modules: Vec<ModuleRow>,
    pub skipped: Vec<SkippedRow>,
}

impl CommandOutput for ModuleListOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["name", "version", "enabled", "builtin", "config", "path"]);
        for m in &self.modules {
            table.add_row(vec![
                m.name.clone(),
                m.version.clone(),
                yes_no(m.enabled).to_string(),
                yes_no(m.builtin).to_string(),
                if m.configured { "present" } else { "default" }.to_string(),
                m.path.display().to_string(),
            ]);
        }
        let mut out = render_list("module", &table, self.modules.len());
        for skipped in &self.skipped {
            out.push_str(&format!("\nskipped {}: {}", skipped.path.display(), skipped.error));
        }
        out
    }

    fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[derive(Debug, Serialize)]
pub struct CheckOutput {
    pub name: String,
    pub config: Value,
}

impl CommandOutput for CheckOutput {
    fn to_human(&self) -> String {
        let yaml = serde_yaml::to_string(&self.config).unwrap_or_default();
        format!("{}: configuration is valid\n{}", self.name, yaml.trim_end())
    }

    fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[derive(Debug, Default, Serialize)]
pub struct InitOutput {
    pub created: Vec<String>,
    pub existing: Vec<String>,
}

impl CommandOutput for InitOutput {
    fn to_human(&self) -> String {
        let mut lines = Vec::new();
        for name in &self.created {
            lines.push(format!("created: {name}"));
        }
        for name in &self.existing {
            lines.push(format!("exists: {name}"));
        }
        lines.join("\n")
    }

    fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

const fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

pub async fn execute(args: ModulesArgs, config_path: Option<&Path>, json_mode: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let root = PathBuf::from(&config.modules_dir);
    let catalog = ModuleCatalog::builtin();

    match args.command {
        ModulesCommands::List => output(&list(&root, &catalog), json_mode),
        ModulesCommands::Check { name } => output(&check(&root, &catalog, &name)?, json_mode),
        ModulesCommands::Init => output(&init(&root, &catalog)?, json_mode),
    }
    Ok(())
}

pub fn list(root: &Path, catalog: &ModuleCatalog) -> ModuleListOutput {
    let scan = scan_modules(root);
    ModuleListOutput {
        modules: scan
            .descriptors
            .iter()
            .map(|d| ModuleRow {
                name: d.name().to_string(),
                version: d.manifest.version.clone(),
                enabled: d.enabled(),
                builtin: catalog.contains(d.name()),
                configured: d.config_path().exists(),
                path: d.path.clone(),
            })
            .collect(),
        skipped: scan
            .skipped
            .into_iter()
            .map(|(path, err)| SkippedRow {
                path,
                error: err.to_string(),
            })
            .collect(),
    }
}

/// Resolve a module's configuration exactly as a load would.
///
/// Writes `config.yml` from defaults when it is missing.
pub fn check(root: &Path, catalog: &ModuleCatalog, name: &str) -> Result<CheckOutput> {
    let descriptor = read_descriptor(&root.join(name)).with_context(|| format!("Module '{name}' is not defined"))?;
    let module = catalog
        .create(name)
        .with_context(|| format!("No implementation is registered for module '{name}'"))?;
    let config = resolve_config(&descriptor, module.as_ref())?;
    Ok(CheckOutput {
        name: name.to_string(),
        config,
    })
}

/// Scaffold `module.yaml` for every built-in module without a definition.
pub fn init(root: &Path, catalog: &ModuleCatalog) -> Result<InitOutput> {
    let mut out = InitOutput::default();
    for name in catalog.names() {
        let dir = root.join(name);
        let definition = dir.join(DEFINITION_FILE);
        if definition.exists() {
            out.existing.push(name.to_string());
            continue;
        }
        std::fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;
        let manifest = ModuleManifest::new(name).with_description(format!("Built-in {name} module"));
        let yaml = serde_yaml::to_string(&manifest).context("Failed to serialize module definition")?;
        std::fs::write(&definition, yaml).with_context(|| format!("Failed to write {}", definition.display()))?;
        out.created.push(name.to_string());
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::CONFIG_FILE;

    #[test]
    fn test_init_then_list_and_check() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = ModuleCatalog::builtin();

        let first = init(dir.path(), &catalog).unwrap();
        assert_eq!(first.created, vec!["admin", "tickets"]);
        let second = init(dir.path(), &catalog).unwrap();
        assert!(second.created.is_empty());
        assert_eq!(second.existing.len(), 2);

        let listed = list(dir.path(), &catalog);
        assert_eq!(listed.modules.len(), 2);
        assert!(listed.modules.iter().all(|m| m.builtin && !m.configured));

        let checked = check(dir.path(), &catalog, "tickets").unwrap();
        assert!(checked.config["categories"].is_array());
        assert!(dir.path().join("tickets").join(CONFIG_FILE).exists());
    }

    #[test]
    fn test_check_unknown_module_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(check(dir.path(), &ModuleCatalog::builtin(), "polls").is_err());
    }
}
