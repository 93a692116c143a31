//! Module contract port.
//!
//! Every unit of feature logic the host can load implements [`Module`]. The
//! lifecycle manager drives the hooks; a module never registers itself with
//! the dispatcher directly. Instead it declares its handlers on the
//! [`ModuleContext`] during `on_load`, and the manager attaches them only
//! after the hook returned successfully.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::domain::errors::ModuleError;
use crate::domain::models::{Config, ModuleDescriptor};
use crate::domain::ports::delivery::ReminderDelivery;
use crate::domain::ports::dispatcher::{EventHandler, Registration, Route};
use crate::domain::ports::operator::OperatorHandle;

/// File name of the store a module owns inside its directory.
pub const MODULE_DATABASE_FILE: &str = "data.db";

/// Host-provided collaborators handed to every module on load.
#[derive(Clone)]
pub struct HostServices {
    pub settings: Arc<Config>,
    pub delivery: Arc<dyn ReminderDelivery>,
    /// Present when the host serves operator commands.
    pub operator: Option<OperatorHandle>,
}

impl std::fmt::Debug for HostServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostServices")
            .field("modules_dir", &self.settings.modules_dir)
            .field("operator", &self.operator.is_some())
            .finish_non_exhaustive()
    }
}

/// Everything a module sees while its load hook runs.
pub struct ModuleContext {
    descriptor: ModuleDescriptor,
    config: Value,
    host: HostServices,
    registrations: Vec<Registration>,
}

impl ModuleContext {
    pub fn new(descriptor: ModuleDescriptor, config: Value, host: HostServices) -> Self {
        Self {
            descriptor,
            config,
            host,
            registrations: Vec::new(),
        }
    }

    pub fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    /// Resolved configuration (defaults, `config.yml` and environment merged).
    pub fn config(&self) -> &Value {
        &self.config
    }

    /// Deserialize the resolved configuration into the module's settings type.
    pub fn settings<T: DeserializeOwned>(&self) -> Result<T, ModuleError> {
        serde_json::from_value(self.config.clone()).map_err(|e| ModuleError::Config(e.to_string()))
    }

    pub fn host(&self) -> &HostServices {
        &self.host
    }

    /// Path of the module-owned SQLite store.
    pub fn database_path(&self) -> PathBuf {
        self.descriptor.data_dir().join(MODULE_DATABASE_FILE)
    }

    pub fn database_url(&self) -> String {
        format!("sqlite:{}", self.database_path().display())
    }

    pub fn register_command(&mut self, name: impl Into<String>, handler: Arc<dyn EventHandler>) {
        self.registrations
            .push(Registration::new(Route::Command(name.into()), handler));
    }

    /// Register a persistent interactive control by custom-id prefix.
    pub fn register_control(&mut self, prefix: impl Into<String>, handler: Arc<dyn EventHandler>) {
        self.registrations
            .push(Registration::new(Route::Control(prefix.into()), handler));
    }

    pub fn register_conversation_updates(&mut self, handler: Arc<dyn EventHandler>) {
        self.registrations
            .push(Registration::new(Route::ConversationUpdates, handler));
    }

    pub fn registrations(&self) -> &[Registration] {
        &self.registrations
    }

    pub fn into_registrations(self) -> Vec<Registration> {
        self.registrations
    }
}

/// The contract between the host and a loadable module.
///
/// `on_load` opens owned stores, starts background work and declares
/// handlers. `on_unload` must stop every background task and release every
/// store before it returns; the host has already detached the module's
/// handlers by the time it is called.
#[async_trait]
pub trait Module: Send + Sync {
    /// Stable unique name. Matches the definition directory.
    fn name(&self) -> &str;

    /// Version of the configuration shape this implementation understands.
    fn config_version(&self) -> u32 {
        1
    }

    /// Declared configuration defaults, written to `config.yml` when absent.
    fn default_config(&self) -> Value;

    /// Checks the resolved configuration; returns every problem found.
    fn validate_config(&self, _config: &Value) -> Result<(), Vec<String>> {
        Ok(())
    }

    async fn on_load(&mut self, ctx: &mut ModuleContext) -> Result<(), ModuleError>;

    async fn on_unload(&mut self) -> Result<(), ModuleError>;
}
