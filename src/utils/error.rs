use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeskError {
    #[error("Storage error: {0}")]
    StorageError(#[from] rusqlite::Error),

    #[error("Store contention: {message}")]
    ContentionError { message: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpClientError(#[from] reqwest::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing configuration field: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Validation error: {message}")]
    ValidationError { message: String },

    #[error("Background task failed: {0}")]
    TaskError(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Storage,
    Network,
    Configuration,
    Input,
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl DeskError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            DeskError::StorageError(_) | DeskError::ContentionError { .. } => {
                ErrorCategory::Storage
            }
            DeskError::HttpClientError(_) => ErrorCategory::Network,
            DeskError::ConfigError { .. }
            | DeskError::MissingConfigError { .. }
            | DeskError::InvalidConfigValueError { .. } => ErrorCategory::Configuration,
            DeskError::ValidationError { .. } => ErrorCategory::Input,
            DeskError::IoError(_) | DeskError::SerializationError(_) | DeskError::TaskError(_) => {
                ErrorCategory::Internal
            }
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            DeskError::ValidationError { .. } => ErrorSeverity::Low,
            DeskError::ContentionError { .. } => ErrorSeverity::Medium,
            DeskError::StorageError(_)
            | DeskError::HttpClientError(_)
            | DeskError::IoError(_)
            | DeskError::SerializationError(_) => ErrorSeverity::High,
            DeskError::ConfigError { .. }
            | DeskError::MissingConfigError { .. }
            | DeskError::InvalidConfigValueError { .. }
            | DeskError::TaskError(_) => ErrorSeverity::Critical,
        }
    }

    /// Contention is the only failure where repeating the same call can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DeskError::ContentionError { .. })
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            DeskError::ContentionError { .. } => {
                "The database is busy. Repeat the operation in a moment."
            }
            DeskError::StorageError(_) | DeskError::IoError(_) => {
                "Check that the database file is reachable and writable."
            }
            DeskError::HttpClientError(_) => "Check the TLS setup and the configured API base URL.",
            DeskError::ConfigError { .. }
            | DeskError::MissingConfigError { .. }
            | DeskError::InvalidConfigValueError { .. } => {
                "Fix the configuration file or the environment variables and restart."
            }
            DeskError::ValidationError { .. } => "Correct the input and try again.",
            DeskError::SerializationError(_) | DeskError::TaskError(_) => {
                "Report this error to the administrator."
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            DeskError::ContentionError { .. } => {
                "The manager list is busy right now, please try again.".to_string()
            }
            DeskError::ValidationError { message } => message.clone(),
            DeskError::MissingConfigError { field } => {
                format!("Required setting '{}' is missing", field)
            }
            DeskError::InvalidConfigValueError { field, reason, .. } => {
                format!("Setting '{}' is invalid: {}", field, reason)
            }
            other => format!("Internal error: {}", other),
        }
    }
}

pub type Result<T> = std::result::Result<T, DeskError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contention_is_retryable_medium() {
        let err = DeskError::ContentionError {
            message: "database is locked".to_string(),
        };
        assert!(err.is_retryable());
        assert_eq!(err.severity(), ErrorSeverity::Medium);
        assert_eq!(err.category(), ErrorCategory::Storage);
    }

    #[test]
    fn test_config_errors_are_critical() {
        let err = DeskError::MissingConfigError {
            field: "api.api_key".to_string(),
        };
        assert!(!err.is_retryable());
        assert_eq!(err.severity(), ErrorSeverity::Critical);
        assert!(err.user_friendly_message().contains("api.api_key"));
    }
}
