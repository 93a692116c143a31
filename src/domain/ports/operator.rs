//! Operator command channel.
//!
//! Lifecycle commands reach the host over an mpsc channel so that a module
//! (the admin module) can issue them without holding a reference to the
//! lifecycle manager that owns it.

use tokio::sync::{mpsc, oneshot};

use crate::domain::errors::{DomainError, DomainResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorCommand {
    Load(String),
    Unload { name: String, force: bool },
    Reload { name: String, force: bool },
    ReloadAll { force: bool },
    List,
}

/// A command plus the channel its rendered outcome is sent back on.
#[derive(Debug)]
pub struct OperatorRequest {
    pub command: OperatorCommand,
    pub reply: oneshot::Sender<String>,
}

#[derive(Debug, Clone)]
pub struct OperatorHandle {
    tx: mpsc::Sender<OperatorRequest>,
}

impl OperatorHandle {
    pub fn new(tx: mpsc::Sender<OperatorRequest>) -> Self {
        Self { tx }
    }

    /// Create a handle plus the receiver the host serves requests from.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<OperatorRequest>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    /// Send a command and wait for the host's reply.
    pub async fn send(&self, command: OperatorCommand) -> DomainResult<String> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(OperatorRequest { command, reply })
            .await
            .map_err(|_| DomainError::HostUnavailable("operator channel closed".to_string()))?;
        rx.await
            .map_err(|_| DomainError::HostUnavailable("host dropped the request".to_string()))
    }
}
