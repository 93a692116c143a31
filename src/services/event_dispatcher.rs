//! In-process event dispatcher.
//!
//! Routes are grouped per owning module. Every owner has a gate: handler
//! calls hold the gate for reading while they run, and `detach` closes it
//! under a write lock after removing the routes. Once `detach` returns, no
//! handler of that owner is running and none will be started.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::errors::DispatchError;
use crate::domain::ports::{Dispatched, Event, EventDispatcher, EventHandler, Registration};

struct Attachment {
    gate: Arc<RwLock<bool>>,
    registrations: Vec<Registration>,
}

/// Default [`EventDispatcher`] used by the host.
#[derive(Default)]
pub struct LocalDispatcher {
    attachments: RwLock<HashMap<String, Attachment>>,
}

impl std::fmt::Debug for LocalDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalDispatcher").finish_non_exhaustive()
    }
}

impl LocalDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of routes currently attached for `owner`.
    pub async fn route_count(&self, owner: &str) -> usize {
        self.attachments
            .read()
            .await
            .get(owner)
            .map_or(0, |a| a.registrations.len())
    }
}

#[async_trait]
impl EventDispatcher for LocalDispatcher {
    async fn attach(&self, owner: &str, registrations: Vec<Registration>) -> Result<(), DispatchError> {
        for (i, reg) in registrations.iter().enumerate() {
            if registrations[..i].iter().any(|r| r.route.conflicts_with(&reg.route)) {
                return Err(DispatchError::DuplicateRoute(reg.route.to_string()));
            }
        }

        let mut attachments = self.attachments.write().await;
        if attachments.contains_key(owner) {
            return Err(DispatchError::AlreadyAttached(owner.to_string()));
        }

        for (other, attachment) in attachments.iter() {
            for reg in &registrations {
                if attachment.registrations.iter().any(|r| r.route.conflicts_with(&reg.route)) {
                    return Err(DispatchError::RouteTaken {
                        route: reg.route.to_string(),
                        owner: other.clone(),
                    });
                }
            }
        }

        tracing::debug!(module = %owner, routes = registrations.len(), "attached handlers");
        attachments.insert(
            owner.to_string(),
            Attachment {
                gate: Arc::new(RwLock::new(true)),
                registrations,
            },
        );
        Ok(())
    }

    async fn detach(&self, owner: &str) -> usize {
        let removed = self.attachments.write().await.remove(owner);
        let Some(attachment) = removed else {
            return 0;
        };

        // Waits for in-flight calls holding the gate.
        *attachment.gate.write().await = false;

        tracing::debug!(module = %owner, routes = attachment.registrations.len(), "detached handlers");
        attachment.registrations.len()
    }

    async fn is_attached(&self, owner: &str) -> bool {
        self.attachments.read().await.contains_key(owner)
    }

    async fn dispatch(&self, event: &Event) -> Vec<Dispatched> {
        let targets: Vec<(String, Arc<RwLock<bool>>, Arc<dyn EventHandler>)> = {
            let attachments = self.attachments.read().await;
            attachments
                .iter()
                .flat_map(|(owner, attachment)| {
                    attachment
                        .registrations
                        .iter()
                        .filter(|r| r.route.matches(event))
                        .map(|r| (owner.clone(), attachment.gate.clone(), r.handler.clone()))
                })
                .collect()
        };

        let mut results = Vec::with_capacity(targets.len());
        for (owner, gate, handler) in targets {
            let open = gate.read().await;
            if !*open {
                continue;
            }
            let result = handler.handle(event).await;
            drop(open);

            if let Err(err) = &result {
                tracing::warn!(module = %owner, error = %err, "handler failed");
            }
            results.push(Dispatched { owner, result });
        }
        results
    }
}
