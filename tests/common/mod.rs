//! Common test utilities for integration tests
//!
//! Provides a configurable test module, a recording delivery channel and a
//! helper that assembles a host over a temporary modules directory.

#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::TempDir;

use oak::adapters::modules::ModuleCatalog;
use oak::domain::errors::{DeliveryError, DomainResult, ModuleError};
use oak::domain::models::{Config, ReminderNotice};
use oak::domain::ports::{
    Event, EventDispatcher, EventHandler, Module, ModuleContext, ReminderDelivery, Reply,
};
use oak::services::{LifecycleManager, LocalDispatcher};

/// Create a temporary directory for test isolation
pub fn temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Setup test logging
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Write `<root>/<name>/module.yaml`. `extra` is appended verbatim.
pub fn write_definition(root: &Path, name: &str, extra: &str) {
    let dir = root.join(name);
    std::fs::create_dir_all(&dir).expect("Failed to create module dir");
    std::fs::write(dir.join("module.yaml"), format!("name: {name}\n{extra}")).expect("Failed to write module.yaml");
}

/// Overwrite a module's `config.yml`.
pub fn write_config(root: &Path, name: &str, yaml: &str) {
    std::fs::write(root.join(name).join("config.yml"), yaml).expect("Failed to write config.yml");
}

/// Ordered record of hook and handler activity across modules.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn record(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|e| *e == entry).count()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.0.lock().unwrap().iter().position(|e| e == entry)
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.position(entry).is_some()
    }
}

#[derive(Clone, Default)]
pub struct Behavior {
    pub fail_load: bool,
    pub fail_unload: bool,
    pub handler_delay: Duration,
    /// Command to register instead of `<name>.ping`.
    pub command: Option<String>,
}

/// Module whose hooks and handler write to a [`Journal`].
pub struct TestModule {
    name: String,
    behavior: Behavior,
    journal: Journal,
}

#[async_trait]
impl Module for TestModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_config(&self) -> Value {
        json!({ "greeting": "hello" })
    }

    fn validate_config(&self, config: &Value) -> Result<(), Vec<String>> {
        match config["greeting"].as_str() {
            Some(g) if !g.is_empty() => Ok(()),
            _ => Err(vec!["greeting must be a non-empty string".to_string()]),
        }
    }

    async fn on_load(&mut self, ctx: &mut ModuleContext) -> Result<(), ModuleError> {
        self.journal.record(format!("load:{}", self.name));
        let command = self
            .behavior
            .command
            .clone()
            .unwrap_or_else(|| format!("{}.ping", self.name));
        let greeting = ctx.config()["greeting"].as_str().unwrap_or_default().to_string();
        ctx.register_command(
            command,
            Arc::new(Echo {
                name: self.name.clone(),
                greeting,
                delay: self.behavior.handler_delay,
                journal: self.journal.clone(),
            }),
        );
        if self.behavior.fail_load {
            return Err(ModuleError::Failed("load hook exploded".to_string()));
        }
        Ok(())
    }

    async fn on_unload(&mut self) -> Result<(), ModuleError> {
        self.journal.record(format!("unload:{}", self.name));
        if self.behavior.fail_unload {
            return Err(ModuleError::Failed("unload hook exploded".to_string()));
        }
        Ok(())
    }
}

struct Echo {
    name: String,
    greeting: String,
    delay: Duration,
    journal: Journal,
}

#[async_trait]
impl EventHandler for Echo {
    async fn handle(&self, _event: &Event) -> DomainResult<Reply> {
        self.journal.record(format!("handle-start:{}", self.name));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.journal.record(format!("handle-end:{}", self.name));
        Ok(Reply::text(format!("{} from {}", self.greeting, self.name)))
    }
}

/// Catalog of [`TestModule`]s sharing one journal.
pub fn test_catalog(journal: &Journal, modules: &[(&str, Behavior)]) -> ModuleCatalog {
    let mut catalog = ModuleCatalog::new();
    for (name, behavior) in modules {
        let name = (*name).to_string();
        let behavior = behavior.clone();
        let journal = journal.clone();
        let module_name = name.clone();
        catalog.register(&name, move || {
            Box::new(TestModule {
                name: module_name.clone(),
                behavior: behavior.clone(),
                journal: journal.clone(),
            })
        });
    }
    catalog
}

pub fn test_config(root: &Path, critical: &[&str]) -> Config {
    let mut config = Config::default();
    config.modules_dir = root.display().to_string();
    config.critical_modules = critical.iter().map(|c| (*c).to_string()).collect();
    config.scheduler.poll_interval_secs = 1;
    config
}

pub struct TestHost {
    pub dir: TempDir,
    pub lifecycle: Arc<LifecycleManager>,
    pub dispatcher: Arc<LocalDispatcher>,
    pub delivery: Arc<RecordingDelivery>,
}

impl TestHost {
    pub fn new(dir: TempDir, catalog: ModuleCatalog, critical: &[&str]) -> Self {
        let (lifecycle, dispatcher, delivery) = build_host(dir.path(), catalog, critical);
        Self {
            dir,
            lifecycle: Arc::new(lifecycle),
            dispatcher,
            delivery,
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Dispatch a command and collect the text replies.
    pub async fn command(&self, event: Event) -> Vec<String> {
        self.dispatcher
            .dispatch(&event)
            .await
            .into_iter()
            .map(|d| match d.result {
                Ok(reply) => reply.as_text().unwrap_or_default().to_string(),
                Err(err) => format!("error: {err}"),
            })
            .collect()
    }
}

/// Assemble an unstarted lifecycle manager with a recording delivery.
pub fn build_host(
    root: &Path,
    catalog: ModuleCatalog,
    critical: &[&str],
) -> (LifecycleManager, Arc<LocalDispatcher>, Arc<RecordingDelivery>) {
    let dispatcher = Arc::new(LocalDispatcher::new());
    let delivery = Arc::new(RecordingDelivery::default());
    let lifecycle = LifecycleManager::new(
        Arc::new(test_config(root, critical)),
        catalog,
        dispatcher.clone() as Arc<dyn EventDispatcher>,
        delivery.clone() as Arc<dyn ReminderDelivery>,
    );
    (lifecycle, dispatcher, delivery)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailMode {
    Unreachable,
    ConversationGone,
}

/// Delivery channel that records notices and can be told to fail.
#[derive(Default)]
pub struct RecordingDelivery {
    conversation: Mutex<Vec<ReminderNotice>>,
    direct: Mutex<Vec<ReminderNotice>>,
    failure: Mutex<Option<FailMode>>,
    direct_failure: Mutex<bool>,
}

impl RecordingDelivery {
    pub fn fail_with(&self, mode: Option<FailMode>) {
        *self.failure.lock().unwrap() = mode;
    }

    pub fn fail_direct(&self, fail: bool) {
        *self.direct_failure.lock().unwrap() = fail;
    }

    pub fn delivered(&self) -> Vec<ReminderNotice> {
        self.conversation.lock().unwrap().clone()
    }

    pub fn direct(&self) -> Vec<ReminderNotice> {
        self.direct.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReminderDelivery for RecordingDelivery {
    async fn deliver_in_conversation(&self, notice: &ReminderNotice) -> Result<(), DeliveryError> {
        match *self.failure.lock().unwrap() {
            Some(FailMode::Unreachable) => Err(DeliveryError::Unreachable("offline".to_string())),
            Some(FailMode::ConversationGone) => Err(DeliveryError::ConversationGone(notice.conversation_id)),
            None => {
                self.conversation.lock().unwrap().push(notice.clone());
                Ok(())
            }
        }
    }

    async fn deliver_direct(&self, notice: &ReminderNotice) -> Result<(), DeliveryError> {
        if *self.direct_failure.lock().unwrap() {
            return Err(DeliveryError::Unreachable("direct messages closed".to_string()));
        }
        self.direct.lock().unwrap().push(notice.clone());
        Ok(())
    }
}

/// Poll `predicate` every 10ms until it holds or `timeout` passes.
pub async fn wait_until<F>(mut predicate: F, timeout: Duration) -> bool
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if predicate() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    predicate()
}
