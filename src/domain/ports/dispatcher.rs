//! Event dispatcher port.
//!
//! The dispatcher delivers external events (commands, control interactions,
//! raw conversation updates) to whichever handlers are currently attached.
//! Handlers are attached and detached per owning module, as a set.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::errors::{DispatchError, DomainResult};
use crate::domain::models::{ConversationId, UserId};

/// A command issued by a user, e.g. `remindme 2h`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvocation {
    pub name: String,
    pub args: Vec<String>,
    pub actor_id: UserId,
    pub conversation_id: Option<ConversationId>,
}

/// A press on a persistent interactive control, identified by its custom id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlInteraction {
    pub custom_id: String,
    pub actor_id: UserId,
    pub conversation_id: Option<ConversationId>,
}

/// Raw state change of a conversation (thread).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversationUpdate {
    pub conversation_id: ConversationId,
    pub archived: bool,
    pub locked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Command(CommandInvocation),
    Control(ControlInteraction),
    ConversationUpdate(ConversationUpdate),
}

impl Event {
    pub fn command(name: impl Into<String>, args: &[&str], actor_id: UserId) -> Self {
        Self::Command(CommandInvocation {
            name: name.into(),
            args: args.iter().map(|a| (*a).to_string()).collect(),
            actor_id,
            conversation_id: None,
        })
    }

    pub fn control(custom_id: impl Into<String>, actor_id: UserId) -> Self {
        Self::Control(ControlInteraction {
            custom_id: custom_id.into(),
            actor_id,
            conversation_id: None,
        })
    }

    /// Bind the event to a conversation. No-op for conversation updates.
    #[must_use]
    pub fn in_conversation(mut self, conversation_id: ConversationId) -> Self {
        match &mut self {
            Self::Command(c) => c.conversation_id = Some(conversation_id),
            Self::Control(c) => c.conversation_id = Some(conversation_id),
            Self::ConversationUpdate(_) => {}
        }
        self
    }
}

/// What a handler is attached to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Route {
    /// Exact command name.
    Command(String),
    /// Custom-id prefix of a persistent control.
    Control(String),
    /// Every raw conversation update. May be shared by several modules.
    ConversationUpdates,
}

impl Route {
    pub fn matches(&self, event: &Event) -> bool {
        match (self, event) {
            (Self::Command(name), Event::Command(cmd)) => *name == cmd.name,
            (Self::Control(prefix), Event::Control(ctl)) => ctl.custom_id.starts_with(prefix.as_str()),
            (Self::ConversationUpdates, Event::ConversationUpdate(_)) => true,
            _ => false,
        }
    }

    /// Two routes conflict when one event could reach both exclusively.
    pub fn conflicts_with(&self, other: &Route) -> bool {
        match (self, other) {
            (Self::Command(a), Self::Command(b)) => a == b,
            (Self::Control(a), Self::Control(b)) => a.starts_with(b.as_str()) || b.starts_with(a.as_str()),
            _ => false,
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command(name) => write!(f, "command '{name}'"),
            Self::Control(prefix) => write!(f, "control '{prefix}*'"),
            Self::ConversationUpdates => f.write_str("conversation updates"),
        }
    }
}

/// Handler response, rendered by the chat client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Silent,
    Text(String),
}

impl Reply {
    pub fn text(message: impl Into<String>) -> Self {
        Self::Text(message.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Silent => None,
        }
    }
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &Event) -> DomainResult<Reply>;
}

/// A handler bound to a route, declared by a module during load.
#[derive(Clone)]
pub struct Registration {
    pub route: Route,
    pub handler: Arc<dyn EventHandler>,
}

impl Registration {
    pub fn new(route: Route, handler: Arc<dyn EventHandler>) -> Self {
        Self { route, handler }
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration").field("route", &self.route).finish()
    }
}

/// Result of one handler invocation.
#[derive(Debug)]
pub struct Dispatched {
    pub owner: String,
    pub result: DomainResult<Reply>,
}

#[async_trait]
pub trait EventDispatcher: Send + Sync {
    /// Attach all of `owner`'s handlers, or none of them.
    async fn attach(&self, owner: &str, registrations: Vec<Registration>) -> Result<(), DispatchError>;

    /// Remove `owner`'s routes, then wait for its in-flight calls to finish.
    /// Returns the number of routes removed.
    async fn detach(&self, owner: &str) -> usize;

    async fn is_attached(&self, owner: &str) -> bool;

    /// Deliver an event to every currently attached matching handler.
    async fn dispatch(&self, event: &Event) -> Vec<Dispatched>;
}
