//! Module lifecycle manager.
//!
//! Owns the registry and drives every transition:
//!
//! - `load`: resolve config, run `on_load`, attach handlers, record the
//!   instance. Any failure rolls back what the attempt set up.
//! - `unload`: detach handlers (draining in-flight calls), run `on_unload`,
//!   then forget the instance.
//! - `reload`: `unload` followed by `load` as one operation.
//!
//! Transitions for one name are serialized by a per-name lock; the registry
//! lock is only taken for short bookkeeping, never across a hook.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::{Mutex, RwLock};

use crate::adapters::modules::ModuleCatalog;
use crate::domain::errors::{ConflictKind, DiscoveryError, HookPhase, LifecycleError};
use crate::domain::models::{Config, ModuleDescriptor, ModuleStatus, DEFINITION_FILE};
use crate::domain::ports::{EventDispatcher, HostServices, ModuleContext, OperatorHandle, ReminderDelivery};
use crate::services::module_loader::{read_descriptor, resolve_config, scan_modules};
use crate::services::module_registry::ModuleRegistry;

/// Result of an `unload` that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnloadOutcome {
    Unloaded,
    /// Nothing was attached under that name; nothing changed.
    NotLoaded,
}

/// Per-module entry of a `reload_all` run.
#[derive(Debug)]
pub struct ReloadReport {
    pub module: String,
    pub result: Result<(), LifecycleError>,
}

pub struct LifecycleManager {
    modules_dir: PathBuf,
    catalog: ModuleCatalog,
    dispatcher: Arc<dyn EventDispatcher>,
    host: HostServices,
    critical: HashSet<String>,
    registry: RwLock<ModuleRegistry>,
    transitions: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl std::fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("modules_dir", &self.modules_dir)
            .field("catalog", &self.catalog)
            .field("critical", &self.critical)
            .finish_non_exhaustive()
    }
}

impl LifecycleManager {
    pub fn new(
        settings: Arc<Config>,
        catalog: ModuleCatalog,
        dispatcher: Arc<dyn EventDispatcher>,
        delivery: Arc<dyn ReminderDelivery>,
    ) -> Self {
        Self {
            modules_dir: PathBuf::from(&settings.modules_dir),
            critical: settings.critical_modules.iter().cloned().collect(),
            catalog,
            dispatcher,
            host: HostServices {
                settings,
                delivery,
                operator: None,
            },
            registry: RwLock::new(ModuleRegistry::new()),
            transitions: Mutex::new(HashMap::new()),
        }
    }

    /// Give modules a channel back into the host's operator surface.
    #[must_use]
    pub fn with_operator(mut self, operator: OperatorHandle) -> Self {
        self.host.operator = Some(operator);
        self
    }

    pub fn is_critical(&self, name: &str) -> bool {
        self.critical.contains(name)
    }

    pub fn dispatcher(&self) -> &Arc<dyn EventDispatcher> {
        &self.dispatcher
    }

    /// Per-name transition lock. Names that are neither registered nor
    /// backed by a definition on disk get none, so arbitrary operator input
    /// never grows the table.
    async fn transition_lock(&self, name: &str) -> Option<Arc<Mutex<()>>> {
        if !self.registry.read().await.is_known(name) && !self.has_definition(name) {
            return None;
        }
        Some(
            self.transitions
                .lock()
                .await
                .entry(name.to_string())
                .or_default()
                .clone(),
        )
    }

    fn has_definition(&self, name: &str) -> bool {
        !name.is_empty()
            && !name.contains(['/', '\\'])
            && name != "."
            && name != ".."
            && self.modules_dir.join(name).join(DEFINITION_FILE).is_file()
    }

    /// Drop the locks of forgotten modules that no transition is holding.
    async fn prune_transitions(&self, forgotten: &[String]) {
        let mut transitions = self.transitions.lock().await;
        for name in forgotten {
            if transitions.get(name).is_some_and(|lock| Arc::strong_count(lock) == 1) {
                transitions.remove(name);
            }
        }
    }

    #[cfg(test)]
    async fn transition_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.transitions.lock().await.keys().cloned().collect();
        names.sort();
        names
    }

    fn guard(&self, name: &str, force: bool) -> Result<(), LifecycleError> {
        if self.is_critical(name) && !force {
            return Err(LifecycleError::Conflict {
                module: name.to_string(),
                kind: ConflictKind::Protected,
            });
        }
        Ok(())
    }

    /// Scan the modules root and load every definition not seen before.
    ///
    /// Returns the newly discovered names. Broken definitions are logged and
    /// skipped, and so are load failures of individual modules.
    pub async fn discover(&self) -> Vec<String> {
        let scan = scan_modules(&self.modules_dir);
        for (path, err) in &scan.skipped {
            tracing::warn!(path = %path.display(), error = %err, "Skipping invalid module definition");
        }

        let present: HashSet<String> = scan.descriptors.iter().map(|d| d.name().to_string()).collect();
        let mut discovered = Vec::new();

        for descriptor in scan.descriptors {
            let name = descriptor.name().to_string();
            if !self.catalog.contains(&name) {
                tracing::warn!(
                    module = %name,
                    error = %DiscoveryError::UnknownImplementation(name.clone()),
                    "Skipping module definition"
                );
                continue;
            }

            let enabled = descriptor.enabled();
            if !self.registry.write().await.insert_if_absent(descriptor) {
                continue;
            }
            tracing::info!(module = %name, "Discovered module");
            discovered.push(name.clone());

            if !enabled {
                tracing::info!(module = %name, "Module is disabled, not loading");
                continue;
            }
            if let Err(err) = self.load(&name).await {
                tracing::warn!(module = %name, reason = err.reason(), error = %err, "Failed to load discovered module");
            }
        }

        let mut forgotten = Vec::new();
        {
            let mut registry = self.registry.write().await;
            for name in registry.known_names() {
                if !present.contains(&name) && registry.forget(&name) {
                    tracing::info!(module = %name, "Module definition disappeared, forgetting it");
                    forgotten.push(name);
                }
            }
        }
        self.prune_transitions(&forgotten).await;

        discovered
    }

    /// Re-read a module's definition from disk.
    async fn refresh_descriptor(&self, name: &str) -> Result<ModuleDescriptor, LifecycleError> {
        let dir = self.modules_dir.join(name);
        match read_descriptor(&dir) {
            Ok(descriptor) => {
                self.registry.write().await.refresh(descriptor.clone());
                Ok(descriptor)
            }
            Err(DiscoveryError::MissingDefinition(_)) => {
                self.registry.write().await.forget(name);
                Err(LifecycleError::NotFound(name.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn load(&self, name: &str) -> Result<(), LifecycleError> {
        let Some(lock) = self.transition_lock(name).await else {
            return Err(LifecycleError::NotFound(name.to_string()));
        };
        let _transition = lock.lock().await;
        self.load_locked(name).await
    }

    async fn load_locked(&self, name: &str) -> Result<(), LifecycleError> {
        if self.registry.read().await.is_loaded(name) {
            return Err(LifecycleError::Conflict {
                module: name.to_string(),
                kind: ConflictKind::AlreadyLoaded,
            });
        }

        let descriptor = self.refresh_descriptor(name).await?;
        if !descriptor.enabled() {
            return Err(LifecycleError::Conflict {
                module: name.to_string(),
                kind: ConflictKind::Disabled,
            });
        }

        let mut instance = self
            .catalog
            .create(name)
            .ok_or_else(|| DiscoveryError::UnknownImplementation(name.to_string()))?;
        let config = resolve_config(&descriptor, instance.as_ref())?;

        let mut ctx = ModuleContext::new(descriptor, config.clone(), self.host.clone());
        if let Err(source) = instance.on_load(&mut ctx).await {
            // The hook may have opened stores or spawned tasks before failing.
            if let Err(err) = instance.on_unload().await {
                tracing::warn!(module = %name, error = %err, "Cleanup after failed load hook also failed");
            }
            return Err(LifecycleError::HookFailure {
                module: name.to_string(),
                phase: HookPhase::Load,
                source,
            });
        }

        if let Err(source) = self.dispatcher.attach(name, ctx.into_registrations()).await {
            if let Err(err) = instance.on_unload().await {
                tracing::warn!(module = %name, error = %err, "Cleanup after failed registration also failed");
            }
            return Err(LifecycleError::Registration {
                module: name.to_string(),
                source,
            });
        }

        self.registry.write().await.attach(name, instance, config);
        tracing::info!(module = %name, "Module loaded");
        Ok(())
    }

    /// Unload a module. Critical modules require `force`.
    pub async fn unload(&self, name: &str, force: bool) -> Result<UnloadOutcome, LifecycleError> {
        self.guard(name, force)?;
        let Some(lock) = self.transition_lock(name).await else {
            return Ok(UnloadOutcome::NotLoaded);
        };
        let _transition = lock.lock().await;
        self.unload_locked(name).await
    }

    async fn unload_locked(&self, name: &str) -> Result<UnloadOutcome, LifecycleError> {
        let Some(instance) = self.registry.write().await.begin_detach(name) else {
            return Ok(UnloadOutcome::NotLoaded);
        };

        let routes = self.dispatcher.detach(name).await;
        tracing::debug!(module = %name, routes, "Handlers detached");

        let hook = instance.lock().await.on_unload().await;
        self.registry.write().await.remove_instance(name);

        match hook {
            Ok(()) => {
                tracing::info!(module = %name, "Module unloaded");
                Ok(UnloadOutcome::Unloaded)
            }
            Err(source) => {
                tracing::warn!(module = %name, error = %source, "Module unloaded but its shutdown hook failed");
                Err(LifecycleError::HookFailure {
                    module: name.to_string(),
                    phase: HookPhase::Unload,
                    source,
                })
            }
        }
    }

    /// Unload then load a module as one operation.
    ///
    /// If the load half fails after a successful unload, the module stays
    /// unloaded and the failure is reported as `ReloadFailed`.
    pub async fn reload(&self, name: &str, force: bool) -> Result<(), LifecycleError> {
        self.guard(name, force)?;
        let Some(lock) = self.transition_lock(name).await else {
            return Err(LifecycleError::NotFound(name.to_string()));
        };
        let _transition = lock.lock().await;

        let was_loaded = match self.unload_locked(name).await {
            Ok(UnloadOutcome::Unloaded) => true,
            Ok(UnloadOutcome::NotLoaded) => false,
            Err(err @ LifecycleError::HookFailure { .. }) => {
                // The instance is gone regardless; carry on with the load.
                tracing::warn!(module = %name, error = %err, "Continuing reload after failed shutdown hook");
                true
            }
            Err(err) => return Err(err),
        };

        match self.load_locked(name).await {
            Ok(()) => {
                tracing::info!(module = %name, "Module reloaded");
                Ok(())
            }
            Err(source) if was_loaded => Err(LifecycleError::ReloadFailed {
                module: name.to_string(),
                source: Box::new(source),
            }),
            Err(err) => Err(err),
        }
    }

    /// Reload every loaded module, continuing past individual failures.
    ///
    /// Without `force`, critical modules are reported as protected.
    pub async fn reload_all(&self, force: bool) -> Vec<ReloadReport> {
        let names = self.registry.read().await.loaded_names();
        join_all(names.into_iter().map(|name| async move {
            let result = self.reload(&name, force).await;
            ReloadReport { module: name, result }
        }))
        .await
    }

    /// Loaded modules in load order.
    pub async fn list_loaded(&self) -> Vec<ModuleStatus> {
        self.registry.read().await.statuses(&self.critical)
    }

    /// Every known module name, loaded or not.
    pub async fn known_modules(&self) -> Vec<String> {
        self.registry.read().await.known_names()
    }

    pub async fn is_loaded(&self, name: &str) -> bool {
        self.registry.read().await.is_loaded(name)
    }

    /// Unload everything, critical modules included, newest first.
    pub async fn shutdown(&self) {
        let names = self.registry.read().await.loaded_names();
        for name in names.iter().rev() {
            let Some(lock) = self.transition_lock(name).await else {
                continue;
            };
            let _transition = lock.lock().await;
            if let Err(err) = self.unload_locked(name).await {
                tracing::warn!(module = %name, error = %err, "Error while unloading during shutdown");
            }
        }
        tracing::info!(count = names.len(), "All modules unloaded");
    }
}
