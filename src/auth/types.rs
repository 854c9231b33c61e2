//! Wire models for the local sign-on endpoints.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque challenge material, handed unchanged to the widget and back.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptchaChallenge {
    pub rqdata: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_key: Option<String>,
}

impl CaptchaChallenge {
    #[must_use]
    pub fn new(rqdata: impl Into<String>) -> Self {
        Self {
            rqdata: rqdata.into(),
            site_key: None,
        }
    }

    #[must_use]
    pub fn with_site_key(mut self, key: Option<String>) -> Self {
        self.site_key = key;
        self
    }
}

/// The `type` discriminant of an authenticator response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthState {
    Auth,
    Multifactor,
    Success,
    Error,
    Other(String),
}

impl AuthState {
    fn parse(kind: Option<&str>) -> Self {
        match kind {
            Some("auth") => Self::Auth,
            Some("multifactor") => Self::Multifactor,
            Some("success") => Self::Success,
            Some("error") | None => Self::Error,
            Some(other) => Self::Other(other.to_string()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Auth => "auth",
            Self::Multifactor => "multifactor",
            Self::Success => "success",
            Self::Error => "error",
            Self::Other(other) => other,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct HcaptchaPayload {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct CaptchaPayload {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub hcaptcha: Option<HcaptchaPayload>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct SuccessPayload {
    #[serde(default)]
    pub login_token: Option<String>,
    #[serde(default)]
    pub redirect_url: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct AuthResponse {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub captcha: Option<CaptchaPayload>,
    #[serde(default)]
    pub success: Option<SuccessPayload>,
}

impl AuthResponse {
    /// Decode a response body; bodies that are not objects decode as empty.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_default()
    }

    #[must_use]
    pub fn state(&self) -> AuthState {
        AuthState::parse(self.kind.as_deref())
    }

    #[must_use]
    pub fn error_code(&self) -> Option<&str> {
        self.error.as_deref().filter(|code| !code.is_empty())
    }

    /// The nested challenge, only if it carries non-empty rqdata.
    #[must_use]
    pub fn challenge(&self) -> Option<CaptchaChallenge> {
        let hcaptcha = self.captcha.as_ref()?.hcaptcha.as_ref()?;
        let rqdata = hcaptcha.data.as_deref().filter(|data| !data.is_empty())?;
        Some(CaptchaChallenge::new(rqdata).with_site_key(hcaptcha.key.clone()))
    }

    #[must_use]
    pub fn login_token(&self) -> Option<&str> {
        self.success
            .as_ref()?
            .login_token
            .as_deref()
            .filter(|token| !token.is_empty())
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct LoginTokenResponse {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}
