//! Client error types for the Apollo configuration client

/// Error type for Apollo client operations
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("no server available")]
    NoServerAvailable,

    #[error("server returned error: status={status}, body={body}")]
    ServerError { status: u16, body: String },

    #[error("namespace not found: {namespace}")]
    NamespaceNotFound { namespace: String },

    #[error("backup unavailable for namespace: {namespace}")]
    BackupUnavailable { namespace: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("client already initialized")]
    AlreadyInitialized,

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ClientError::NoServerAvailable;
        assert_eq!(err.to_string(), "no server available");

        let err = ClientError::NamespaceNotFound {
            namespace: "application".to_string(),
        };
        assert_eq!(err.to_string(), "namespace not found: application");

        let err = ClientError::ServerError {
            status: 500,
            body: "internal error".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "server returned error: status=500, body=internal error"
        );
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: ClientError = json_err.into();
        assert!(matches!(err, ClientError::Json(_)));
    }
}
