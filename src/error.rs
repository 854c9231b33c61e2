use std::time::Duration;
use thiserror::Error;

use crate::auth::CaptchaChallenge;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("client credentials not found")]
    CredentialNotFound,
    #[error("local client session is not initialized")]
    ClientNotInitialized,
    #[error("request to {0} timed out")]
    NetworkTimeout(String),
    #[error("local client rejected the session credentials")]
    SessionInvalidCredentials,
    #[error("authentication failed")]
    AuthFailure,
    #[error("captcha required")]
    CaptchaRequired(CaptchaChallenge),
    #[error("captcha not allowed, a fresh challenge was issued")]
    CaptchaNotAllowed(CaptchaChallenge),
    #[error("start-authentication returned no captcha data")]
    NoCaptchaData,
    #[error("timed out waiting for captcha token")]
    CaptchaTimeout,
    #[error("captcha cancelled")]
    CaptchaCancelled,
    #[error("multifactor authentication required")]
    MultifactorRequired,
    #[error("login token exchange not successful: {0}")]
    AuthNotSuccessful(String),
    #[error("authorization failed with status {0}")]
    AuthorizationFailed(u16),
    #[error("no restriction verdict within {0:?}")]
    RestrictionTimeout(Duration),
    #[error("account {identity} is permanently banned")]
    PermanentBanned { identity: String },
    #[error("operation cancelled")]
    Cancelled,
    #[error("unexpected response from {endpoint}: {detail}")]
    UnexpectedResponse { endpoint: String, detail: String },
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Session and transport failures are worth another attempt after a delay;
    /// protocol-terminal states need a new user-driven login.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::CredentialNotFound
                | Self::ClientNotInitialized
                | Self::NetworkTimeout(_)
                | Self::SessionInvalidCredentials
                | Self::CaptchaNotAllowed(_)
                | Self::CaptchaTimeout
                | Self::RestrictionTimeout(_)
                | Self::Http(_)
        )
    }

    pub(crate) fn unexpected(endpoint: &str, detail: impl Into<String>) -> Self {
        Self::UnexpectedResponse {
            endpoint: endpoint.to_string(),
            detail: detail.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_failures_are_retryable() {
        assert!(Error::CredentialNotFound.is_retryable());
        assert!(Error::NetworkTimeout("/x".to_string()).is_retryable());
        assert!(Error::SessionInvalidCredentials.is_retryable());
    }

    #[test]
    fn protocol_terminal_states_are_not_retryable() {
        assert!(!Error::MultifactorRequired.is_retryable());
        assert!(!Error::AuthFailure.is_retryable());
        assert!(!Error::AuthorizationFailed(500).is_retryable());
        assert!(!Error::PermanentBanned {
            identity: "sub".to_string()
        }
        .is_retryable());
    }
}
