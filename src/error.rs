//! Error types for the DC/OS provider.

use thiserror::Error;

use crate::cli::CliError;
use crate::client::ClientError;
use crate::config::ClusterConfigError;

/// Errors surfaced to the host by resource and data source handlers.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The requested resource was not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// The configuration handed to a handler did not match its schema.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The provider configuration is incomplete or inconsistent.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Logging in to the cluster failed.
    #[error("Unable to authenticate: {0}")]
    Authentication(String),

    /// The cluster answered with a non-success status.
    #[error("DC/OS API error ({status}): {message}")]
    Api {
        /// HTTP status code of the response.
        status: u16,
        /// Body or reason returned by the cluster.
        message: String,
    },

    /// The requested resource or data source type is unknown.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A gRPC transport error occurred.
    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// The sandboxed DC/OS CLI failed.
    #[error("CLI error: {0}")]
    Cli(String),

    /// Operation not implemented.
    #[error("Unimplemented: {0}")]
    Unimplemented(String),

    /// Anything else going wrong inside the provider.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProviderError {
    /// Get the error message as a string.
    pub fn message(&self) -> &str {
        match self {
            Self::NotFound(msg)
            | Self::Validation(msg)
            | Self::Configuration(msg)
            | Self::Authentication(msg)
            | Self::UnknownResource(msg)
            | Self::Cli(msg)
            | Self::Unimplemented(msg)
            | Self::Internal(msg) => msg,
            Self::Api { message, .. } => message,
            Self::Serialization(_) => "serialization error (see Debug output)",
            Self::Transport(_) => "transport error (see Debug output)",
        }
    }

    /// HTTP status of the remote failure, if this error came from the cluster.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<ClientError> for ProviderError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Api { status, message } => Self::Api {
                status: status.as_u16(),
                message,
            },
            ClientError::Decode(e) => Self::Serialization(e),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<CliError> for ProviderError {
    fn from(err: CliError) -> Self {
        Self::Cli(err.to_string())
    }
}

impl From<ClusterConfigError> for ProviderError {
    fn from(err: ClusterConfigError) -> Self {
        Self::Configuration(format!("Unable to get default configuration: {}", err))
    }
}

impl From<ProviderError> for tonic::Status {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::NotFound(msg) => tonic::Status::not_found(msg),
            ProviderError::Validation(msg) => tonic::Status::invalid_argument(msg),
            ProviderError::Configuration(msg) => tonic::Status::failed_precondition(msg),
            ProviderError::Authentication(msg) => tonic::Status::unauthenticated(msg),
            ProviderError::Api { status, message } => match status {
                401 => tonic::Status::unauthenticated(message),
                403 => tonic::Status::permission_denied(message),
                404 => tonic::Status::not_found(message),
                409 => tonic::Status::already_exists(message),
                429 => tonic::Status::resource_exhausted(message),
                503 => tonic::Status::unavailable(message),
                400..=499 => tonic::Status::invalid_argument(message),
                _ => tonic::Status::internal(message),
            },
            ProviderError::UnknownResource(msg) => tonic::Status::not_found(msg),
            ProviderError::Serialization(err) => {
                tonic::Status::invalid_argument(format!("Serialization error: {}", err))
            },
            ProviderError::Transport(err) => {
                tonic::Status::unavailable(format!("Transport error: {}", err))
            },
            ProviderError::Cli(msg) => tonic::Status::aborted(msg),
            ProviderError::Unimplemented(msg) => tonic::Status::unimplemented(msg),
            ProviderError::Internal(msg) => tonic::Status::internal(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProviderError::Configuration("Missing required 'user' field".to_string());
        assert_eq!(
            format!("{}", err),
            "Configuration error: Missing required 'user' field"
        );

        let err = ProviderError::Api {
            status: 409,
            message: "already exists".to_string(),
        };
        assert_eq!(format!("{}", err), "DC/OS API error (409): already exists");

        let err = ProviderError::UnknownResource("dcos_marathon_app".to_string());
        assert_eq!(format!("{}", err), "Unknown resource type: dcos_marathon_app");
    }

    #[test]
    fn test_client_error_keeps_status() {
        let err: ProviderError = ClientError::Api {
            status: reqwest::StatusCode::CONFLICT,
            message: "User already exists".to_string(),
        }
        .into();
        assert_eq!(err.status(), Some(409));
        assert_eq!(err.message(), "User already exists");
    }

    #[test]
    fn test_error_to_status() {
        let status: tonic::Status = ProviderError::Configuration("test".to_string()).into();
        assert_eq!(status.code(), tonic::Code::FailedPrecondition);

        let status: tonic::Status = ProviderError::Authentication("test".to_string()).into();
        assert_eq!(status.code(), tonic::Code::Unauthenticated);

        let status: tonic::Status = ProviderError::Api {
            status: 403,
            message: "forbidden".to_string(),
        }
        .into();
        assert_eq!(status.code(), tonic::Code::PermissionDenied);

        let status: tonic::Status = ProviderError::Api {
            status: 500,
            message: "boom".to_string(),
        }
        .into();
        assert_eq!(status.code(), tonic::Code::Internal);

        let status: tonic::Status = ProviderError::Cli("exit 1".to_string()).into();
        assert_eq!(status.code(), tonic::Code::Aborted);
    }

    #[test]
    fn test_message_method() {
        let err = ProviderError::NotFound("alice".to_string());
        assert_eq!(err.message(), "alice");
        assert_eq!(err.status(), None);
    }
}
