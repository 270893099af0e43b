use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngressError {
    #[error("Network error: {message}")]
    NetworkError { message: String },

    #[error("JAO API error{suffix}: {message}", suffix = status_suffix(.status))]
    ApiError { status: Option<u16>, message: String },

    #[error("Storage error: {message}")]
    StorageError { message: String },

    #[error("Persistence error: {message}")]
    PersistenceError { message: String },

    #[error("Authentication error: {message}")]
    AuthenticationError { message: String },

    #[error("Watermark for corridor '{corridor}' cannot move backwards from {current} to {requested}")]
    WatermarkRegression {
        corridor: String,
        current: String,
        requested: String,
    },

    #[error("Invalid corridor identifier '{value}': {reason}")]
    InvalidCorridor { value: String, reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing configuration field: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Configuration validation failed for '{field}': {message}")]
    ConfigValidationError { field: String, message: String },
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default()
}

/// 錯誤分類，對應 Network / Api / Storage / Persistence 四類失敗
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Network,
    Api,
    Storage,
    Persistence,
    Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl IngressError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }

    pub fn api(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::ApiError {
            status,
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::StorageError {
            message: message.into(),
        }
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        Self::PersistenceError {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NetworkError { .. } => ErrorKind::Network,
            Self::ApiError { .. } | Self::SerializationError(_) => ErrorKind::Api,
            Self::StorageError { .. } | Self::AuthenticationError { .. } | Self::IoError(_) => {
                ErrorKind::Storage
            }
            Self::PersistenceError { .. } | Self::WatermarkRegression { .. } => {
                ErrorKind::Persistence
            }
            Self::InvalidCorridor { .. }
            | Self::ConfigError { .. }
            | Self::MissingConfigError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::ConfigValidationError { .. } => ErrorKind::Config,
        }
    }

    /// 暫時性錯誤：下次排程執行時重試即可
    pub fn is_transient(&self) -> bool {
        match self {
            Self::NetworkError { .. } | Self::StorageError { .. } | Self::IoError(_) => true,
            Self::ApiError { status, .. } => matches!(status, Some(429) | Some(500..=599)),
            _ => false,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.kind() {
            ErrorKind::Network | ErrorKind::Storage => ErrorSeverity::Medium,
            ErrorKind::Api => ErrorSeverity::High,
            ErrorKind::Persistence => ErrorSeverity::Critical,
            ErrorKind::Config => ErrorSeverity::High,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            Self::NetworkError { .. } => {
                "The JAO API could not be reached; the same window is retried on the next run"
            }
            Self::ApiError { .. } | Self::SerializationError(_) => {
                "Check the corridor identifier and the JAO API key; the window is retried on the next run"
            }
            Self::StorageError { .. } | Self::IoError(_) => {
                "Upload was not confirmed; the watermark was left untouched and the window is retried on the next run"
            }
            Self::AuthenticationError { .. } => {
                "Verify tenant_id, client_id and client_secret in the [Authorization] section"
            }
            Self::PersistenceError { .. } => {
                "The watermark state could not be read or written; check access to the state location"
            }
            Self::WatermarkRegression { .. } => {
                "The stored state is ahead of this run; check the system clock and the state file"
            }
            Self::InvalidCorridor { .. } => "Fix the corridor list in the [\"JAO Values\"] section",
            Self::ConfigError { .. }
            | Self::MissingConfigError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::ConfigValidationError { .. } => {
                "Check the configuration file and the environment variables it references"
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.kind() {
            ErrorKind::Config => format!("Configuration problem: {}", self),
            ErrorKind::Persistence => format!("Watermark state problem: {}", self),
            _ => self.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, IngressError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_display_includes_status() {
        let err = IngressError::api(Some(404), "corridor not found");
        assert_eq!(err.to_string(), "JAO API error (HTTP 404): corridor not found");

        let err = IngressError::api(None, "bad payload");
        assert_eq!(err.to_string(), "JAO API error: bad payload");
    }

    #[test]
    fn test_transient_classification() {
        assert!(IngressError::network("timeout").is_transient());
        assert!(IngressError::storage("503").is_transient());
        assert!(IngressError::api(Some(503), "busy").is_transient());
        assert!(!IngressError::api(Some(400), "bad request").is_transient());
        assert!(!IngressError::persistence("disk full").is_transient());
    }

    #[test]
    fn test_persistence_is_most_severe() {
        let persistence = IngressError::persistence("unreachable").severity();
        assert_eq!(persistence, ErrorSeverity::Critical);
        assert!(persistence > IngressError::network("x").severity());
        assert!(persistence > IngressError::api(None, "x").severity());
    }
}
