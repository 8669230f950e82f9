//! # Error Types
//!
//! Error taxonomy for the Keelson control plane using `thiserror`.
//!
//! A caller who cannot see a resource always receives `NotFound`; a caller
//! who can see it but lacks the required access receives `PermissionDenied`.

/// Custom result type for Keelson operations
pub type Result<T> = std::result::Result<T, KeelsonError>;

/// Main error type for the Keelson control plane
#[derive(thiserror::Error, Debug)]
pub enum KeelsonError {
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Database and storage errors
    #[error("Database error: {context}")]
    Database {
        #[source]
        source: sqlx::Error,
        context: String,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {context}")]
    Serialization {
        #[source]
        source: serde_json::Error,
        context: String,
    },

    /// Validation errors (malformed access types, question schemas, bind failures)
    #[error("Validation error: {message}")]
    Validation { message: String, field: Option<String> },

    /// Caller could not be authenticated
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    /// Caller lacks the global role required to attempt the operation
    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    /// Resource is visible to the caller but the operation exceeds its access
    #[error("Permission denied: {message}")]
    PermissionDenied { message: String },

    /// Resource is absent or invisible to the caller
    #[error("Resource not found: {resource_type} with ID '{id}'")]
    NotFound { resource_type: String, id: String },

    /// Resource conflict errors (e.g., revision still referenced by a cluster)
    #[error("Resource conflict: {message}")]
    Conflict { message: String, resource_type: String },

    /// Convergence wait exceeded its bound
    #[error("Operation timed out: {operation} after {duration_ms}ms")]
    Timeout { operation: String, duration_ms: u64 },

    /// Internal server errors
    #[error("Internal server error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl KeelsonError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into(), source: None }
    }

    /// Create a configuration error with source
    pub fn config_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Config { message: message.into(), source: Some(source) }
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation { message: message.into(), field: None }
    }

    /// Create a validation error with field information
    pub fn validation_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Validation { message: message.into(), field: Some(field.into()) }
    }

    pub fn unauthorized<S: Into<String>>(message: S) -> Self {
        Self::Unauthorized { message: message.into() }
    }

    pub fn forbidden<S: Into<String>>(message: S) -> Self {
        Self::Forbidden { message: message.into() }
    }

    pub fn permission_denied<S: Into<String>>(message: S) -> Self {
        Self::PermissionDenied { message: message.into() }
    }

    /// Create a not found error
    pub fn not_found<R: Into<String>, I: Into<String>>(resource_type: R, id: I) -> Self {
        Self::NotFound { resource_type: resource_type.into(), id: id.into() }
    }

    /// Create a conflict error
    pub fn conflict<M: Into<String>, R: Into<String>>(message: M, resource_type: R) -> Self {
        Self::Conflict { message: message.into(), resource_type: resource_type.into() }
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(operation: S, duration_ms: u64) -> Self {
        Self::Timeout { operation: operation.into(), duration_ms }
    }

    /// Create an internal server error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into(), source: None }
    }

    /// Wrap a sqlx error with context
    pub fn database<S: Into<String>>(source: sqlx::Error, context: S) -> Self {
        Self::Database { source, context: context.into() }
    }

    /// Get the HTTP status code that should be returned for this error
    pub fn status_code(&self) -> u16 {
        match self {
            KeelsonError::Config { .. } => 500,
            KeelsonError::Database { .. } => 500,
            KeelsonError::Serialization { .. } => 400,
            KeelsonError::Validation { .. } => 422,
            KeelsonError::Unauthorized { .. } => 401,
            KeelsonError::Forbidden { .. } => 403,
            KeelsonError::PermissionDenied { .. } => 403,
            KeelsonError::NotFound { .. } => 404,
            KeelsonError::Conflict { .. } => 409,
            KeelsonError::Timeout { .. } => 408,
            KeelsonError::Internal { .. } => 500,
        }
    }

    /// Stable, machine-readable error code returned in API error bodies
    pub fn code(&self) -> &'static str {
        match self {
            KeelsonError::Config { .. } => "ServerError",
            KeelsonError::Database { .. } => "ServerError",
            KeelsonError::Serialization { .. } => "InvalidFormat",
            KeelsonError::Validation { .. } => "InvalidBodyContent",
            KeelsonError::Unauthorized { .. } => "Unauthorized",
            KeelsonError::Forbidden { .. } => "Forbidden",
            KeelsonError::PermissionDenied { .. } => "PermissionDenied",
            KeelsonError::NotFound { .. } => "NotFound",
            KeelsonError::Conflict { .. } => "Conflict",
            KeelsonError::Timeout { .. } => "Timeout",
            KeelsonError::Internal { .. } => "ServerError",
        }
    }

    /// Check if this error may succeed when the caller retries unchanged.
    ///
    /// The core never retries on its own; this is a hint for polling callers.
    pub fn is_retryable(&self) -> bool {
        matches!(self, KeelsonError::Database { .. } | KeelsonError::Timeout { .. })
    }
}

// Error conversions for common external error types
impl From<sqlx::Error> for KeelsonError {
    fn from(error: sqlx::Error) -> Self {
        Self::Database { source: error, context: "Database operation failed".to_string() }
    }
}

impl From<sqlx::migrate::MigrateError> for KeelsonError {
    fn from(error: sqlx::migrate::MigrateError) -> Self {
        Self::Database {
            source: sqlx::Error::Migrate(Box::new(error)),
            context: "Database migration failed".to_string(),
        }
    }
}

impl From<serde_json::Error> for KeelsonError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization { source: error, context: "JSON serialization failed".to_string() }
    }
}

impl From<config::ConfigError> for KeelsonError {
    fn from(error: config::ConfigError) -> Self {
        Self::config_with_source("Configuration loading failed", Box::new(error))
    }
}

impl From<std::io::Error> for KeelsonError {
    fn from(error: std::io::Error) -> Self {
        Self::Internal { message: "I/O operation failed".to_string(), source: Some(Box::new(error)) }
    }
}

impl From<validator::ValidationErrors> for KeelsonError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
        fields.sort_by(|a, b| a.0.cmp(&b.0));

        let message = fields
            .iter()
            .map(|(field, field_errors)| {
                let error_messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| {
                        e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string())
                    })
                    .collect();
                format!("{}: {}", field, error_messages.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ");

        Self::validation(format!("Validation failed: {}", message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let error = KeelsonError::config("Test configuration error");
        assert!(matches!(error, KeelsonError::Config { .. }));
        assert_eq!(error.to_string(), "Configuration error: Test configuration error");
    }

    #[test]
    fn test_validation_error_field() {
        let error = KeelsonError::validation_field("unknown access type", "members[0].accessType");
        if let KeelsonError::Validation { field, .. } = error {
            assert_eq!(field, Some("members[0].accessType".to_string()));
        } else {
            panic!("expected validation error");
        }
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(KeelsonError::validation("test").status_code(), 422);
        assert_eq!(KeelsonError::unauthorized("test").status_code(), 401);
        assert_eq!(KeelsonError::forbidden("test").status_code(), 403);
        assert_eq!(KeelsonError::permission_denied("test").status_code(), 403);
        assert_eq!(KeelsonError::not_found("clusterTemplate", "ct-1").status_code(), 404);
        assert_eq!(KeelsonError::conflict("test", "revision").status_code(), 409);
        assert_eq!(KeelsonError::timeout("wait", 10).status_code(), 408);
        assert_eq!(KeelsonError::internal("test").status_code(), 500);
    }

    #[test]
    fn test_codes_distinguish_hidden_from_denied() {
        assert_eq!(KeelsonError::not_found("clusterTemplate", "ct-1").code(), "NotFound");
        assert_eq!(KeelsonError::permission_denied("read-only").code(), "PermissionDenied");
        assert_eq!(KeelsonError::forbidden("no role").code(), "Forbidden");
    }

    #[test]
    fn test_retryable_errors() {
        assert!(KeelsonError::timeout("test", 1000).is_retryable());
        assert!(!KeelsonError::validation("test").is_retryable());
        assert!(!KeelsonError::not_found("cluster", "test").is_retryable());
        assert!(!KeelsonError::permission_denied("test").is_retryable());
    }

    #[test]
    fn test_error_conversions() {
        let json_error = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let error: KeelsonError = json_error.into();
        assert!(matches!(error, KeelsonError::Serialization { .. }));
        assert_eq!(error.status_code(), 400);
    }
}
