//! Compiled-in module implementations.
//!
//! Definitions on disk name a module; the implementation behind that name
//! comes from the [`ModuleCatalog`]. A fresh instance is created for every
//! load, so a reload never reuses state from the previous instance.

pub mod admin;
pub mod tickets;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::ports::Module;

pub use admin::AdminModule;
pub use tickets::TicketsModule;

/// Factory producing a new, unloaded module instance.
pub type ModuleFactory = Arc<dyn Fn() -> Box<dyn Module> + Send + Sync>;

#[derive(Clone, Default)]
pub struct ModuleCatalog {
    factories: BTreeMap<String, ModuleFactory>,
}

impl std::fmt::Debug for ModuleCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleCatalog")
            .field("modules", &self.names())
            .finish()
    }
}

impl ModuleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with every module shipped in this crate.
    pub fn builtin() -> Self {
        Self::new()
            .with("admin", || Box::new(AdminModule::new()))
            .with("tickets", || Box::new(TicketsModule::new()))
    }

    #[must_use]
    pub fn with<F>(mut self, name: &str, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Module> + Send + Sync + 'static,
    {
        self.register(name, factory);
        self
    }

    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> Box<dyn Module> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Arc::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn create(&self, name: &str) -> Option<Box<dyn Module>> {
        self.factories.get(name).map(|factory| factory())
    }

    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }
}
