//! Unified error handling
//!
//! Structured error types with context, so that failures can be logged with
//! their internal detail while callers only see the public category.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, error, warn};

pub type WardenResult<T> = Result<T, WardenError>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error context providing additional information for debugging
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Unique error ID, echoed to clients so logs can be correlated
    pub error_id: String,
    pub timestamp: DateTime<Utc>,
    /// Component where the error originated
    pub component: String,
    /// Operation being performed when the error occurred
    pub operation: Option<String>,
    pub metadata: HashMap<String, String>,
    pub recovery_suggestions: Vec<String>,
}

impl ErrorContext {
    pub fn new(component: &str) -> Self {
        Self {
            error_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            component: component.to_string(),
            operation: None,
            metadata: HashMap::new(),
            recovery_suggestions: Vec::new(),
        }
    }

    pub fn with_operation(mut self, operation: &str) -> Self {
        self.operation = Some(operation.to_string());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_suggestion(mut self, suggestion: &str) -> Self {
        self.recovery_suggestions.push(suggestion.to_string());
        self
    }
}

/// Main error type for the Warden system
#[derive(Error, Debug)]
pub enum WardenError {
    /// Malformed caller input
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
        context: ErrorContext,
    },

    #[error("Resource not found: {resource}")]
    NotFound {
        resource: String,
        context: ErrorContext,
    },

    /// Uniqueness violation; existing rows are never overwritten
    #[error("Conflict: {message}")]
    Conflict {
        message: String,
        context: ErrorContext,
    },

    /// Bad, expired, revoked or malformed credential.
    ///
    /// `reason` is for logs only and never leaves the process.
    #[error("Authentication failed: {reason}")]
    Authentication {
        reason: String,
        context: ErrorContext,
    },

    /// Valid identity, insufficient permission
    #[error("Permission denied: {required}")]
    Authorization {
        required: String,
        context: ErrorContext,
    },

    /// Store or mailer unreachable
    #[error("Infrastructure error: {message}")]
    Infrastructure {
        message: String,
        /// Whether the failed operation was a read that may safely be repeated
        idempotent: bool,
        #[source]
        source: Option<BoxError>,
        context: ErrorContext,
    },

    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<BoxError>,
        context: ErrorContext,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<BoxError>,
        context: ErrorContext,
    },
}

impl WardenError {
    pub fn validation(message: impl Into<String>, field: &str, component: &str) -> Self {
        WardenError::Validation {
            message: message.into(),
            field: Some(field.to_string()),
            context: ErrorContext::new(component),
        }
    }

    pub fn not_found(resource: impl Into<String>, component: &str) -> Self {
        WardenError::NotFound {
            resource: resource.into(),
            context: ErrorContext::new(component),
        }
    }

    pub fn conflict(message: impl Into<String>, component: &str) -> Self {
        WardenError::Conflict {
            message: message.into(),
            context: ErrorContext::new(component),
        }
    }

    pub fn authentication(reason: impl Into<String>, component: &str) -> Self {
        WardenError::Authentication {
            reason: reason.into(),
            context: ErrorContext::new(component),
        }
    }

    pub fn authorization(required: impl Into<String>, component: &str) -> Self {
        WardenError::Authorization {
            required: required.into(),
            context: ErrorContext::new(component),
        }
    }

    /// A failed read against a backing store; callers may repeat it.
    pub fn read_failure<E>(operation: &str, component: &str, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::infrastructure(operation, component, true, source)
    }

    /// A failed mutation; never repeated automatically.
    pub fn write_failure<E>(operation: &str, component: &str, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::infrastructure(operation, component, false, source)
    }

    fn infrastructure<E>(operation: &str, component: &str, idempotent: bool, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        WardenError::Infrastructure {
            message: format!("{} failed: {}", operation, source),
            idempotent,
            source: Some(Box::new(source)),
            context: ErrorContext::new(component).with_operation(operation),
        }
    }

    pub fn internal(message: impl Into<String>, component: &str) -> Self {
        WardenError::Internal {
            message: message.into(),
            source: None,
            context: ErrorContext::new(component),
        }
    }

    /// Get the error context
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            WardenError::Validation { context, .. }
            | WardenError::NotFound { context, .. }
            | WardenError::Conflict { context, .. }
            | WardenError::Authentication { context, .. }
            | WardenError::Authorization { context, .. }
            | WardenError::Infrastructure { context, .. }
            | WardenError::Config { context, .. }
            | WardenError::Internal { context, .. } => Some(context),
            WardenError::Io(_) | WardenError::Serialization(_) => None,
        }
    }

    /// Only idempotent reads may be retried; issuance and other mutations never are.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            WardenError::Infrastructure {
                idempotent: true,
                ..
            }
        )
    }

    /// Short machine-readable category
    pub fn code(&self) -> &'static str {
        match self {
            WardenError::Validation { .. } => "validation_error",
            WardenError::NotFound { .. } => "not_found",
            WardenError::Conflict { .. } => "conflict",
            WardenError::Authentication { .. } => "unauthorized",
            WardenError::Authorization { .. } => "permission_denied",
            WardenError::Infrastructure { .. } => "service_unavailable",
            _ => "internal_error",
        }
    }

    /// Message safe to return to a client.
    ///
    /// Authentication failures all collapse to the same text, and
    /// infrastructure/internal details are withheld.
    pub fn public_message(&self) -> String {
        match self {
            WardenError::Validation { message, .. } => message.clone(),
            WardenError::NotFound { resource, .. } => format!("{} not found", resource),
            WardenError::Conflict { message, .. } => message.clone(),
            WardenError::Authentication { .. } => "unauthorized".to_string(),
            WardenError::Authorization { required, .. } => {
                format!("Required permission: {}", required)
            }
            WardenError::Infrastructure { .. } => {
                "The service is temporarily unavailable".to_string()
            }
            _ => "Internal server error".to_string(),
        }
    }

    /// Log the error with an appropriate level
    pub fn log(&self) {
        let error_id = self.context().map(|c| c.error_id.as_str());
        match self {
            WardenError::Authentication { reason, .. } => {
                debug!(error_id = ?error_id, reason = %reason, "Authentication rejected");
            }
            WardenError::Authorization { .. }
            | WardenError::Validation { .. }
            | WardenError::NotFound { .. }
            | WardenError::Conflict { .. } => {
                debug!(error_id = ?error_id, error = %self, "Request rejected");
            }
            WardenError::Infrastructure { idempotent, .. } => {
                warn!(
                    error_id = ?error_id,
                    error = %self,
                    retryable = idempotent,
                    "Backing service failure"
                );
            }
            _ => {
                error!(error_id = ?error_id, error = %self, "Error occurred");
            }
        }
    }
}

/// Convenience macros for creating errors with context
#[macro_export]
macro_rules! config_error {
    ($msg:expr, $component:expr) => {
        $crate::WardenError::Config {
            message: $msg.to_string(),
            source: None,
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check your configuration file and WARDEN__* environment variables"),
        }
    };
    ($msg:expr, $component:expr, $source:expr) => {
        $crate::WardenError::Config {
            message: $msg.to_string(),
            source: Some(Box::new($source)),
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check your configuration file and WARDEN__* environment variables"),
        }
    };
}
