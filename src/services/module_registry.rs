//! Registry of known modules and their attached instances.
//!
//! Plain data structure; the lifecycle manager owns it behind a lock and is
//! the only component that mutates it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::domain::models::{ModuleDescriptor, ModuleState, ModuleStatus};
use crate::domain::ports::Module;

/// Shared handle on a running module instance.
pub type ModuleInstance = Arc<Mutex<Box<dyn Module>>>;

/// Runtime state of a loaded module.
pub struct LoadedModule {
    pub instance: ModuleInstance,
    pub config: Value,
    pub loaded_at: DateTime<Utc>,
    pub state: ModuleState,
    /// Monotonic load counter; orders shutdown.
    pub load_order: u64,
}

struct RegistryEntry {
    descriptor: ModuleDescriptor,
    loaded: Option<LoadedModule>,
}

#[derive(Default)]
pub struct ModuleRegistry {
    entries: HashMap<String, RegistryEntry>,
    next_load_order: u64,
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("known", &self.entries.keys().collect::<Vec<_>>())
            .field("loaded", &self.loaded_names())
            .finish()
    }
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_known(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.entries.get(name).is_some_and(|e| e.loaded.is_some())
    }

    pub fn descriptor(&self, name: &str) -> Option<&ModuleDescriptor> {
        self.entries.get(name).map(|e| &e.descriptor)
    }

    /// Record a newly discovered descriptor. Returns `false` if the name was
    /// already known; the existing entry is left untouched.
    pub fn insert_if_absent(&mut self, descriptor: ModuleDescriptor) -> bool {
        let name = descriptor.name().to_string();
        if self.entries.contains_key(&name) {
            return false;
        }
        self.entries.insert(name, RegistryEntry { descriptor, loaded: None });
        true
    }

    /// Replace the descriptor of a module with a freshly read one.
    pub fn refresh(&mut self, descriptor: ModuleDescriptor) {
        let name = descriptor.name().to_string();
        match self.entries.get_mut(&name) {
            Some(entry) => entry.descriptor = descriptor,
            None => {
                self.entries.insert(name, RegistryEntry { descriptor, loaded: None });
            }
        }
    }

    /// Drop a module whose definition disappeared. Loaded modules are kept.
    pub fn forget(&mut self, name: &str) -> bool {
        if self.is_loaded(name) {
            return false;
        }
        self.entries.remove(name).is_some()
    }

    pub fn attach(&mut self, name: &str, instance: Box<dyn Module>, config: Value) {
        self.next_load_order += 1;
        let loaded = LoadedModule {
            instance: Arc::new(Mutex::new(instance)),
            config,
            loaded_at: Utc::now(),
            state: ModuleState::Attached,
            load_order: self.next_load_order,
        };
        if let Some(entry) = self.entries.get_mut(name) {
            entry.loaded = Some(loaded);
        }
    }

    /// Flag an attached module as detaching and hand out its instance.
    pub fn begin_detach(&mut self, name: &str) -> Option<ModuleInstance> {
        let loaded = self.entries.get_mut(name)?.loaded.as_mut()?;
        if loaded.state == ModuleState::Detaching {
            return None;
        }
        loaded.state = ModuleState::Detaching;
        Some(loaded.instance.clone())
    }

    /// Forget the instance of a module; the descriptor stays known.
    pub fn remove_instance(&mut self, name: &str) -> Option<LoadedModule> {
        self.entries.get_mut(name)?.loaded.take()
    }

    pub fn loaded(&self, name: &str) -> Option<&LoadedModule> {
        self.entries.get(name)?.loaded.as_ref()
    }

    /// Names of loaded modules in load order.
    pub fn loaded_names(&self) -> Vec<String> {
        let mut loaded: Vec<(u64, &String)> = self
            .entries
            .iter()
            .filter_map(|(name, e)| e.loaded.as_ref().map(|l| (l.load_order, name)))
            .collect();
        loaded.sort();
        loaded.into_iter().map(|(_, name)| name.clone()).collect()
    }

    pub fn known_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn statuses(&self, critical: &HashSet<String>) -> Vec<ModuleStatus> {
        self.loaded_names()
            .into_iter()
            .filter_map(|name| {
                let entry = self.entries.get(&name)?;
                let loaded = entry.loaded.as_ref()?;
                Some(ModuleStatus {
                    version: entry.descriptor.manifest.version.clone(),
                    state: loaded.state,
                    critical: critical.contains(&name),
                    loaded_at: loaded.loaded_at,
                    path: entry.descriptor.path.clone(),
                    name,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::domain::errors::ModuleError;
    use crate::domain::models::ModuleManifest;
    use crate::domain::ports::ModuleContext;

    struct Noop;

    #[async_trait]
    impl Module for Noop {
        fn name(&self) -> &str {
            "noop"
        }

        fn default_config(&self) -> Value {
            Value::Object(serde_json::Map::new())
        }

        async fn on_load(&mut self, _ctx: &mut ModuleContext) -> Result<(), ModuleError> {
            Ok(())
        }

        async fn on_unload(&mut self) -> Result<(), ModuleError> {
            Ok(())
        }
    }

    fn descriptor(name: &str) -> ModuleDescriptor {
        ModuleDescriptor::new(ModuleManifest::new(name), format!("/modules/{name}"))
    }

    #[test]
    fn test_insert_never_overwrites() {
        let mut registry = ModuleRegistry::new();
        assert!(registry.insert_if_absent(descriptor("tickets")));
        registry.attach("tickets", Box::new(Noop), Value::Null);

        let mut replacement = descriptor("tickets");
        replacement.manifest.version = "9.9.9".to_string();
        assert!(!registry.insert_if_absent(replacement));
        assert!(registry.is_loaded("tickets"));
        assert_eq!(registry.descriptor("tickets").unwrap().manifest.version, "1.0.0");
    }

    #[test]
    fn test_detach_then_remove() {
        let mut registry = ModuleRegistry::new();
        registry.insert_if_absent(descriptor("tickets"));
        registry.attach("tickets", Box::new(Noop), Value::Null);

        assert!(registry.begin_detach("tickets").is_some());
        assert!(registry.begin_detach("tickets").is_none());
        assert_eq!(registry.loaded("tickets").unwrap().state, ModuleState::Detaching);

        assert!(registry.remove_instance("tickets").is_some());
        assert!(!registry.is_loaded("tickets"));
        assert!(registry.is_known("tickets"));
        assert!(registry.begin_detach("tickets").is_none());
    }

    #[test]
    fn test_load_order_and_statuses() {
        let mut registry = ModuleRegistry::new();
        for name in ["tickets", "admin", "polls"] {
            registry.insert_if_absent(descriptor(name));
        }
        registry.attach("tickets", Box::new(Noop), Value::Null);
        registry.attach("admin", Box::new(Noop), Value::Null);

        assert_eq!(registry.loaded_names(), vec!["tickets", "admin"]);
        let critical = HashSet::from(["admin".to_string()]);
        let statuses = registry.statuses(&critical);
        assert_eq!(statuses.len(), 2);
        assert!(!statuses[0].critical);
        assert!(statuses[1].critical);

        assert!(!registry.forget("admin"));
        assert!(registry.forget("polls"));
        assert_eq!(registry.known_names(), vec!["admin", "tickets"]);
    }
}
