//! Error types for entity-store operations.
//!
//! Every error carries an [`ErrorContext`] naming the failed operation and
//! the entity it touched, so log lines stay useful without a backtrace.

use std::fmt;

/// Result type for repository operations
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Kinds of entity held by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Night,
    LaserTarget,
    Observation,
    BlanketClosure,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Entity::Night => "night",
            Entity::LaserTarget => "laser_target",
            Entity::Observation => "observation",
            Entity::BlanketClosure => "blanket_closure",
        })
    }
}

/// Where a repository error happened.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// Repository method name, e.g. `get_laser_target`
    pub operation: Option<&'static str>,
    pub entity: Option<Entity>,
    pub entity_id: Option<String>,
    /// Free-form extras such as the owning night or the offending range
    pub details: Option<String>,
    /// Transient failure; the caller may try again
    pub retryable: bool,
}

impl ErrorContext {
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation: Some(operation),
            ..Default::default()
        }
    }

    pub fn with_entity(mut self, entity: Entity) -> Self {
        self.entity = Some(entity);
        self
    }

    pub fn with_entity_id(mut self, id: impl ToString) -> Self {
        self.entity_id = Some(id.to_string());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields = [
            self.operation.map(|op| format!("operation={}", op)),
            self.entity.map(|entity| format!("entity={}", entity)),
            self.entity_id.as_ref().map(|id| format!("id={}", id)),
            self.details.as_ref().map(|d| format!("details={}", d)),
            self.retryable.then(|| "retryable=true".to_string()),
        ];
        let fields: Vec<String> = fields.into_iter().flatten().collect();
        write!(f, "[{}]", fields.join(", "))
    }
}

/// Error type for repository operations
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// The store could not be reached. Usually transient.
    #[error("Connection error: {message} {context}")]
    ConnectionError {
        message: String,
        context: ErrorContext,
    },

    #[error("Not found: {message} {context}")]
    NotFound {
        message: String,
        context: ErrorContext,
    },

    /// The entity breaks a data invariant and was not stored.
    #[error("Data validation error: {message} {context}")]
    ValidationError {
        message: String,
        context: ErrorContext,
    },

    #[error("Internal error: {message} {context}")]
    InternalError {
        message: String,
        context: ErrorContext,
    },
}

impl RepositoryError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::ConnectionError {
            message: message.into(),
            context: ErrorContext::default().retryable(),
        }
    }

    /// A missing night, target or observation.
    pub fn not_found(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::NotFound {
            message: message.into(),
            context,
        }
    }

    pub fn validation(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::ValidationError {
            message: message.into(),
            context,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.context().retryable
    }

    pub fn context(&self) -> &ErrorContext {
        match self {
            Self::ConnectionError { context, .. }
            | Self::NotFound { context, .. }
            | Self::ValidationError { context, .. }
            | Self::InternalError { context, .. } => context,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_display_lists_set_fields() {
        let context = ErrorContext::new("get_night")
            .with_entity(Entity::Night)
            .with_entity_id(7);
        assert_eq!(context.to_string(), "[operation=get_night, entity=night, id=7]");
    }

    #[test]
    fn test_connection_errors_are_retryable() {
        assert!(RepositoryError::connection("down").is_retryable());
        assert!(!RepositoryError::internal("lock poisoned").is_retryable());
    }

    #[test]
    fn test_message_includes_context() {
        let err = RepositoryError::validation(
            "Observation references an unknown laser target",
            ErrorContext::new("store_observation")
                .with_entity(Entity::Observation)
                .with_details("laser_target=9"),
        );
        let text = err.to_string();
        assert!(text.starts_with("Data validation error:"));
        assert!(text.contains("entity=observation"));
        assert!(text.contains("details=laser_target=9"));
    }
}
