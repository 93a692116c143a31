//! `oak run`: start the host.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tokio::io::BufReader;

use crate::adapters::delivery;
use crate::adapters::modules::ModuleCatalog;
use crate::cli::load_config;
use crate::domain::ports::{EventDispatcher, OperatorHandle};
use crate::infrastructure::logging::LoggerImpl;
use crate::services::{LifecycleManager, LocalDispatcher, OperatorConsole};

/// Queue depth for operator commands forwarded by modules.
const OPERATOR_QUEUE: usize = 16;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Override the modules directory from configuration
    #[arg(long)]
    pub modules_dir: Option<String>,

    /// Do not read operator commands from stdin; run until ctrl-c
    #[arg(long)]
    pub no_console: bool,
}

pub async fn execute(args: RunArgs, config_path: Option<&Path>) -> Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(dir) = args.modules_dir {
        config.modules_dir = dir;
    }
    let _logger = LoggerImpl::init(&config.logging).context("Failed to initialize logging")?;

    std::fs::create_dir_all(&config.modules_dir)
        .with_context(|| format!("Failed to create modules directory {}", config.modules_dir))?;

    let settings = Arc::new(config);
    let delivery = delivery::from_config(&settings.delivery).context("Failed to set up reminder delivery")?;
    let dispatcher: Arc<dyn EventDispatcher> = Arc::new(LocalDispatcher::new());
    let (operator, requests) = OperatorHandle::channel(OPERATOR_QUEUE);

    let lifecycle = Arc::new(
        LifecycleManager::new(settings.clone(), ModuleCatalog::builtin(), dispatcher, delivery)
            .with_operator(operator),
    );

    let discovered = lifecycle.discover().await;
    let loaded = lifecycle.list_loaded().await;
    tracing::info!(
        modules_dir = %settings.modules_dir,
        discovered = discovered.len(),
        loaded = loaded.len(),
        "host started"
    );

    let console = OperatorConsole::new(lifecycle.clone());
    let server = tokio::spawn(console.clone().serve(requests));

    if args.no_console {
        tokio::signal::ctrl_c().await.context("Failed to listen for ctrl-c")?;
    } else {
        let stdin = BufReader::new(tokio::io::stdin());
        tokio::select! {
            res = console.run(stdin, tokio::io::stdout()) => res.context("Operator console failed")?,
            res = tokio::signal::ctrl_c() => res.context("Failed to listen for ctrl-c")?,
        }
    }

    tracing::info!("shutting down");
    lifecycle.shutdown().await;
    server.abort();
    Ok(())
}
