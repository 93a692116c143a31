//! Domain errors for the Oak module host.
//!
//! Each concern carries its own error enum so callers can react to the
//! failure class (skip, reject, roll back, retry) without string matching.

use std::path::PathBuf;

use thiserror::Error;

/// Domain-level errors raised by repositories and services.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    #[error("Ticket for conversation {0} is not open")]
    TicketNotOpen(i64),

    #[error("Conversation {0} is already registered as a ticket")]
    TicketExists(i64),

    #[error("User {user_id} already has an open {category} ticket in conversation {conversation_id}")]
    TicketAlreadyOpen {
        user_id: i64,
        category: String,
        conversation_id: i64,
    },

    #[error("User {user_id} already has an active reminder in conversation {conversation_id}")]
    ReminderAlreadyActive { conversation_id: i64, user_id: i64 },

    #[error("Sequence allocation failed: {0}")]
    Sequence(#[from] SequenceError),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Host unavailable: {0}")]
    HostUnavailable(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}

/// A module definition on disk could not be turned into a descriptor.
///
/// Discovery logs these and keeps scanning.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Missing module.yaml in {0}")]
    MissingDefinition(PathBuf),

    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse module.yaml in {path}: {source}")]
    ManifestParse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("Module directory '{directory}' declares name '{declared}'")]
    NameMismatch { directory: String, declared: String },

    #[error("Manifest validation failed for '{name}': {reason}")]
    InvalidManifest { name: String, reason: String },

    #[error("No implementation is registered for module '{0}'")]
    UnknownImplementation(String),
}

/// Failure raised by a module's own setup or teardown logic.
#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("Store error: {0}")]
    Store(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("{0}")]
    Failed(String),
}

impl From<sqlx::Error> for ModuleError {
    fn from(err: sqlx::Error) -> Self {
        ModuleError::Store(err.to_string())
    }
}

impl From<DomainError> for ModuleError {
    fn from(err: DomainError) -> Self {
        ModuleError::Failed(err.to_string())
    }
}

/// Errors raised by the event dispatcher while attaching handlers.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Route {route} is already registered by module '{owner}'")]
    RouteTaken { route: String, owner: String },

    #[error("Route {0} is registered twice in the same module")]
    DuplicateRoute(String),

    #[error("Module '{0}' is already attached to the dispatcher")]
    AlreadyAttached(String),
}

/// Why a lifecycle transition was refused without touching any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// `load` on a module that already has an attached instance.
    AlreadyLoaded,
    /// `unload`/`reload` on a critical module without override.
    Protected,
    /// The module's definition has `enabled: false`.
    Disabled,
}

impl ConflictKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AlreadyLoaded => "already_loaded",
            Self::Protected => "protected",
            Self::Disabled => "disabled",
        }
    }
}

/// Which module hook failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPhase {
    Load,
    Unload,
}

impl std::fmt::Display for HookPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Load => f.write_str("load"),
            Self::Unload => f.write_str("unload"),
        }
    }
}

/// Errors surfaced by the lifecycle manager.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Module '{0}' not found")]
    NotFound(String),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error("Configuration for '{module}' is invalid: {}", .errors.join("; "))]
    ConfigValidation { module: String, errors: Vec<String> },

    #[error("Module '{module}' rejected: {}", .kind.as_str())]
    Conflict { module: String, kind: ConflictKind },

    #[error("Module '{module}' {phase} hook failed: {source}")]
    HookFailure {
        module: String,
        phase: HookPhase,
        #[source]
        source: ModuleError,
    },

    #[error("Module '{module}' could not attach its handlers: {source}")]
    Registration {
        module: String,
        #[source]
        source: DispatchError,
    },

    #[error("Module '{module}' was unloaded but failed to load again: {source}")]
    ReloadFailed {
        module: String,
        #[source]
        source: Box<LifecycleError>,
    },
}

impl LifecycleError {
    /// Short, stable reason suitable for operator-facing replies.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Discovery(_) => "invalid_definition",
            Self::ConfigValidation { .. } => "config_invalid",
            Self::Conflict { kind, .. } => kind.as_str(),
            Self::HookFailure { .. } => "hook_failed",
            Self::Registration { .. } => "registration_failed",
            Self::ReloadFailed { .. } => "reload_failed",
        }
    }

    /// Name of the module the failure belongs to, when known.
    pub fn module(&self) -> Option<&str> {
        match self {
            Self::NotFound(module)
            | Self::ConfigValidation { module, .. }
            | Self::Conflict { module, .. }
            | Self::HookFailure { module, .. }
            | Self::Registration { module, .. }
            | Self::ReloadFailed { module, .. } => Some(module.as_str()),
            Self::Discovery(DiscoveryError::UnknownImplementation(module)) => Some(module.as_str()),
            Self::Discovery(_) => None,
        }
    }

    /// `"<reason>: <module>"`, the form reported back to operators.
    pub fn summary(&self) -> String {
        match self.module() {
            Some(module) => format!("{}: {}", self.reason(), module),
            None => self.reason().to_string(),
        }
    }
}

/// Errors raised while allocating a sequence number.
#[derive(Debug, Error)]
pub enum SequenceError {
    /// The attempt's transaction was rejected because another writer won.
    #[error("Allocation for category '{category}' lost a race: {message}")]
    Contention { category: String, message: String },

    /// Retries were exhausted; the counter was left untouched. Callers may retry.
    #[error("Allocation for category '{category}' still contended after {attempts} attempts")]
    ContentionExhausted { category: String, attempts: u32 },

    #[error("Database error: {0}")]
    Database(String),
}

impl SequenceError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Contention { .. } | Self::ContentionExhausted { .. }
        )
    }
}

/// Errors reported by a reminder delivery channel.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The recipient or channel could not be reached right now.
    #[error("Recipient unreachable: {0}")]
    Unreachable(String),

    /// The owning conversation no longer exists.
    #[error("Conversation {0} no longer exists")]
    ConversationGone(i64),

    #[error("Delivery rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Transport error: {0}")]
    Transport(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_reason_and_summary() {
        let err = LifecycleError::Conflict {
            module: "tickets".to_string(),
            kind: ConflictKind::AlreadyLoaded,
        };
        assert_eq!(err.reason(), "already_loaded");
        assert_eq!(err.summary(), "already_loaded: tickets");

        let wrapped = LifecycleError::ReloadFailed {
            module: "tickets".to_string(),
            source: Box::new(LifecycleError::ConfigValidation {
                module: "tickets".to_string(),
                errors: vec!["categories must not be empty".to_string()],
            }),
        };
        assert_eq!(wrapped.reason(), "reload_failed");
        assert!(wrapped.to_string().contains("categories must not be empty"));
    }

    #[test]
    fn test_discovery_error_without_module() {
        let err = LifecycleError::from(DiscoveryError::MissingDefinition(PathBuf::from("/x")));
        assert_eq!(err.module(), None);
        assert_eq!(err.summary(), "invalid_definition");
    }

    #[test]
    fn test_sequence_error_retryable() {
        let contended = SequenceError::Contention {
            category: "support".to_string(),
            message: "busy".to_string(),
        };
        assert!(contended.is_retryable());
        assert!(!SequenceError::Database("disk full".to_string()).is_retryable());
    }
}
