use crate::components::event_store::models::Operation;
use miette::Diagnostic;
use rust_i18n::t;
use thiserror::Error;

/// Main error type for the application
#[derive(Debug, Error, Diagnostic)]
pub enum Error {
    #[error("{operation} request failed with HTTP {status}")]
    #[diagnostic(code(showroom::remote_request))]
    RemoteRequest { operation: Operation, status: u16 },

    #[error("No delete strategy succeeded for event {event_id} after {attempts} attempts")]
    #[diagnostic(
        code(showroom::delete_exhausted),
        help("every strategy is logged at debug level with its individual failure")
    )]
    DeleteExhausted { event_id: String, attempts: usize },

    #[error("{operation} request could not be sent: {message}")]
    #[diagnostic(code(showroom::network))]
    Network { operation: Operation, message: String },

    #[error("Invalid event: {0}")]
    #[diagnostic(code(showroom::invalid_event))]
    InvalidEvent(String),

    #[error("Unknown appointment type: {0}")]
    #[diagnostic(
        code(showroom::unknown_appointment_type),
        help("add an [appointments.<name>] table to the endpoints file")
    )]
    UnknownAppointmentType(String),

    #[error("Environment error: {0}")]
    #[diagnostic(code(showroom::environment))]
    Environment(String),

    #[error("Configuration error: {0}")]
    #[diagnostic(code(showroom::config))]
    Config(String),

    #[error("Component error: {0}")]
    #[diagnostic(code(showroom::component))]
    Component(String),

    #[error("Subscription error: {0}")]
    #[diagnostic(code(showroom::subscription))]
    Subscription(String),

    #[error(transparent)]
    #[diagnostic(code(showroom::io))]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(showroom::serialization))]
    Serialization(String),

    #[error("Other error: {0}")]
    #[diagnostic(code(showroom::other))]
    Other(String),
}

impl Error {
    /// The store operation this error belongs to, if any
    pub fn operation(&self) -> Option<Operation> {
        match self {
            Error::RemoteRequest { operation, .. } | Error::Network { operation, .. } => {
                Some(*operation)
            }
            Error::DeleteExhausted { .. } => Some(Operation::Delete),
            _ => None,
        }
    }

    /// Message suitable for showing to an end user in the configured locale
    pub fn user_message(&self) -> String {
        self.user_message_in(&rust_i18n::locale())
    }

    /// Message suitable for showing to an end user in the given locale.
    ///
    /// Names the failed operation and never includes raw HTTP status codes.
    pub fn user_message_in(&self, locale: &str) -> String {
        match self {
            Error::RemoteRequest { operation, .. } => {
                let operation = operation.localized(locale);
                t!("errors.remote_request", locale = locale, operation = operation).to_string()
            }
            Error::Network { operation, .. } => {
                let operation = operation.localized(locale);
                t!("errors.network", locale = locale, operation = operation).to_string()
            }
            Error::DeleteExhausted { .. } => t!("errors.delete_exhausted", locale = locale).to_string(),
            Error::InvalidEvent(reason) => {
                t!("errors.invalid_event", locale = locale, reason = reason).to_string()
            }
            Error::UnknownAppointmentType(name) => {
                t!("errors.unknown_appointment_type", locale = locale, name = name).to_string()
            }
            _ => t!("errors.generic", locale = locale).to_string(),
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        Error::Subscription(format!("Redis error: {}", err))
    }
}

/// Type alias for Result with our Error type
pub type SyncResult<T> = Result<T, Error>;

/// Helper to create environment errors
pub fn env_error(var: &str) -> Error {
    Error::Environment(format!("Invalid environment variable: {}", var))
}

/// Helper to create configuration errors
pub fn config_error(message: &str) -> Error {
    Error::Config(message.to_string())
}

/// Helper to create component errors
pub fn component_error(message: &str) -> Error {
    Error::Component(message.to_string())
}

/// Helper to create invalid event errors
pub fn invalid_event(message: &str) -> Error {
    Error::InvalidEvent(message.to_string())
}

/// Helper to create subscription errors
pub fn subscription_error(message: &str) -> Error {
    Error::Subscription(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_names_operation_without_status() {
        let err = Error::RemoteRequest {
            operation: Operation::Update,
            status: 502,
        };
        let message = err.user_message_in("en");
        assert!(message.contains("update"));
        assert!(!message.contains("502"));
    }

    #[test]
    fn test_user_message_portuguese() {
        let err = Error::Network {
            operation: Operation::Create,
            message: "connection refused".to_string(),
        };
        let message = err.user_message_in("pt-BR");
        assert!(message.contains("criar"));
        assert!(!message.contains("connection refused"));
    }

    #[test]
    fn test_operation_mapping() {
        let exhausted = Error::DeleteExhausted {
            event_id: "evt-1".to_string(),
            attempts: 5,
        };
        assert_eq!(exhausted.operation(), Some(Operation::Delete));
        assert_eq!(config_error("bad").operation(), None);
    }
}
