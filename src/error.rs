use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

/// Session-level failures surfaced to the host UI.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("camera/microphone permission denied")]
    PermissionDenied,

    #[error("no usable capture device")]
    DeviceUnavailable,

    #[error("request to {endpoint} failed")]
    Network {
        endpoint: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("{endpoint}: {reason}")]
    Validation { endpoint: String, reason: String },

    #[error("answer upload rejected with status {status}")]
    UploadFailed { status: u16 },
}

impl AppError {
    pub fn network(endpoint: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        AppError::Network {
            endpoint: endpoint.into(),
            source: source.into(),
        }
    }

    pub fn validation(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        AppError::Validation {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }

    /// Upload failures keep the artifact so the candidate can retry.
    pub fn is_recoverable_upload(&self) -> bool {
        matches!(
            self,
            AppError::UploadFailed { .. } | AppError::Network { .. }
        )
    }
}
