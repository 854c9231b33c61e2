//! Auth Orchestrator: drives the sign-on protocol against the local client API.
//!
//! start-authentication -> captcha -> submit credentials -> login-token exchange
//! -> authorization grant. Each step is keyed off the `type`/`error`
//! discriminant of the previous response; a login-token exchange is never
//! issued without a `success` discriminant from the credential submission.

pub mod types;

pub use self::types::{AuthResponse, AuthState, CaptchaChallenge};

use crate::{
    captcha::CaptchaBridge,
    error::{Error, Result},
    session::{is_credentials_invalid, ApiResponse, LocalApi},
};
use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use std::{sync::Arc, time::Duration};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use types::LoginTokenResponse;

pub const AUTHENTICATION_PATH: &str = "/rso-authenticator/v1/authentication";
pub const START_AUTHENTICATION_PATH: &str =
    "/rso-authenticator/v1/authentication/riot-identity/start";
pub const LOGIN_TOKEN_PATH: &str = "/rso-auth/v1/session/login-token";
pub const AUTHORIZATION_PATH: &str = "/rso-auth/v2/authorizations/riot-client";

const ERROR_AUTH_FAILURE: &str = "auth_failure";
const ERROR_CAPTCHA_NOT_ALLOWED: &str = "captcha_not_allowed";
const ERROR_INVALID_REQUEST: &str = "invalid_request";
const MAX_CHALLENGE_ATTEMPTS: usize = 3;
const DEFAULT_LANGUAGE: &str = "en_US";

#[derive(Clone, Debug)]
pub struct LoginRequest {
    username: String,
    password: SecretString,
    remember: bool,
    language: String,
}

impl LoginRequest {
    #[must_use]
    pub fn new(username: impl Into<String>, password: SecretString) -> Self {
        Self {
            username: username.into(),
            password,
            remember: false,
            language: DEFAULT_LANGUAGE.to_string(),
        }
    }

    #[must_use]
    pub fn with_remember(mut self, remember: bool) -> Self {
        self.remember = remember;
        self
    }

    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }
}

/// Outcome of probing the current authenticator state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthProbe {
    /// Ready for credential submission.
    Ready,
    /// The session was rebuilt; probe again on the next pass.
    Reinitialized,
    /// A login sequence holds the auth lock.
    Busy,
    /// Neither ready nor fixed by re-initialization; carries the discriminant.
    Invalid(String),
}

#[derive(Debug)]
pub struct Orchestrator<A> {
    api: Arc<A>,
    captcha: Arc<CaptchaBridge>,
    captcha_timeout: Duration,
    login_lock: Mutex<()>,
}

impl<A: LocalApi> Orchestrator<A> {
    #[must_use]
    pub fn new(api: Arc<A>, captcha: Arc<CaptchaBridge>, captcha_timeout: Duration) -> Self {
        Self {
            api,
            captcha,
            captcha_timeout,
            login_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn api(&self) -> &Arc<A> {
        &self.api
    }

    /// Whether a login sequence currently holds the auth lock.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.login_lock.try_lock().is_err()
    }

    /// Run the full sign-on sequence.
    ///
    /// # Errors
    /// Protocol-terminal states (`MultifactorRequired`, `AuthFailure`,
    /// `AuthNotSuccessful`, `AuthorizationFailed`, `NoCaptchaData`) are
    /// surfaced without retry. Transport errors, captcha timeouts and
    /// cancellation propagate as-is.
    #[instrument(skip_all, fields(username = %request.username))]
    pub async fn login(&self, ctx: &CancellationToken, request: &LoginRequest) -> Result<()> {
        let _sequence = self.login_lock.lock().await;

        self.captcha.reset();

        let mut challenge = self.start_authentication(ctx, request).await?;
        let mut attempts = 0;

        let login_token = loop {
            attempts += 1;
            self.captcha.set_challenge(challenge.clone());

            let token = self
                .captcha
                .wait_for_token(ctx, self.captcha_timeout)
                .await?;

            match self.submit_credentials(ctx, request, &token).await {
                Ok(login_token) => break login_token,
                Err(Error::CaptchaNotAllowed(fresh) | Error::CaptchaRequired(fresh))
                    if attempts < MAX_CHALLENGE_ATTEMPTS =>
                {
                    warn!(attempts, "captcha rejected, retrying with a fresh challenge");
                    challenge = fresh;
                }
                Err(err) => return Err(err),
            }
        };

        self.captcha.reset();

        self.exchange_login_token(ctx, &login_token, request.remember)
            .await?;
        self.authorize(ctx).await?;

        info!("sign-on complete");
        Ok(())
    }

    async fn call(
        &self,
        ctx: &CancellationToken,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<ApiResponse> {
        tokio::select! {
            response = self.api.request(ctx, method, path, body) => response,
            () = ctx.cancelled() => Err(Error::Cancelled),
        }
    }

    async fn start_authentication(
        &self,
        ctx: &CancellationToken,
        request: &LoginRequest,
    ) -> Result<CaptchaChallenge> {
        let body = json!({
            "language": request.language,
            "productId": "riot-client",
            "state": "auth",
        });

        let response = self
            .call(ctx, Method::POST, START_AUTHENTICATION_PATH, Some(body))
            .await?;
        let auth = AuthResponse::from_value(&response.body);

        match auth.state() {
            AuthState::Auth => auth.challenge().ok_or(Error::NoCaptchaData),
            state => Err(Error::unexpected(
                START_AUTHENTICATION_PATH,
                format!("status {}, state {}", response.status, state.as_str()),
            )),
        }
    }

    /// Submit credentials with a solved captcha; returns the login token.
    async fn submit_credentials(
        &self,
        ctx: &CancellationToken,
        request: &LoginRequest,
        captcha_token: &str,
    ) -> Result<String> {
        let body = json!({
            "campaign": null,
            "language": request.language,
            "remember": request.remember,
            "riot_identity": {
                "captcha": format!("hcaptcha {captcha_token}"),
                "language": request.language,
                "password": request.password.expose_secret(),
                "remember": request.remember,
                "username": request.username,
            },
        });

        let response = self
            .call(ctx, Method::PUT, AUTHENTICATION_PATH, Some(body))
            .await?;
        let auth = AuthResponse::from_value(&response.body);

        debug!(state = auth.state().as_str(), error = ?auth.error_code(), "credentials submitted");

        if auth.error_code() == Some(ERROR_CAPTCHA_NOT_ALLOWED) {
            return Err(auth
                .challenge()
                .map_or(Error::NoCaptchaData, Error::CaptchaNotAllowed));
        }

        match auth.state() {
            AuthState::Multifactor => Err(Error::MultifactorRequired),
            AuthState::Success => auth.login_token().map(str::to_string).ok_or_else(|| {
                Error::unexpected(AUTHENTICATION_PATH, "success without login token")
            }),
            AuthState::Auth if auth.error_code() == Some(ERROR_AUTH_FAILURE) => {
                Err(Error::AuthFailure)
            }
            AuthState::Auth if auth.error_code().is_none() => Err(auth
                .challenge()
                .map_or(Error::AuthFailure, Error::CaptchaRequired)),
            state => Err(Error::unexpected(
                AUTHENTICATION_PATH,
                format!(
                    "status {}, state {}, error {}",
                    response.status,
                    state.as_str(),
                    auth.error_code().unwrap_or("none")
                ),
            )),
        }
    }

    async fn exchange_login_token(
        &self,
        ctx: &CancellationToken,
        login_token: &str,
        persist: bool,
    ) -> Result<()> {
        let body = json!({
            "authentication_type": "RiotAuth",
            "code_verifier": "",
            "login_token": login_token,
            "persist_login": persist,
        });

        let response = self
            .call(ctx, Method::PUT, LOGIN_TOKEN_PATH, Some(body))
            .await?;
        let exchange: LoginTokenResponse =
            serde_json::from_value(response.body.clone()).unwrap_or_default();

        match exchange.kind.as_deref() {
            Some("authenticated") => Ok(()),
            other => Err(Error::AuthNotSuccessful(
                other.map_or_else(|| format!("status {}", response.status), str::to_string),
            )),
        }
    }

    async fn authorize(&self, ctx: &CancellationToken) -> Result<()> {
        let body = json!({
            "clientId": "riot-client",
            "trustLevels": ["always_trusted"],
        });

        let response = self
            .call(ctx, Method::POST, AUTHORIZATION_PATH, Some(body))
            .await?;

        if response.is_success() {
            Ok(())
        } else {
            Err(Error::AuthorizationFailed(response.status.as_u16()))
        }
    }

    /// Probe the authenticator state without contending with a login sequence.
    ///
    /// # Errors
    /// Transport failures other than rejected session credentials.
    #[instrument(skip_all)]
    pub async fn probe(&self, ctx: &CancellationToken) -> Result<AuthProbe> {
        let Ok(_sequence) = self.login_lock.try_lock() else {
            return Ok(AuthProbe::Busy);
        };

        match self.read_state(ctx).await? {
            ProbeRead::Ready => Ok(AuthProbe::Ready),
            ProbeRead::CredentialsInvalid => Ok(AuthProbe::Reinitialized),
            ProbeRead::Other(state) => {
                debug!(state = %state, "unexpected auth state, re-initializing session");
                self.api.reinitialize(ctx).await?;

                match self.read_state(ctx).await? {
                    ProbeRead::Ready => Ok(AuthProbe::Reinitialized),
                    ProbeRead::CredentialsInvalid => {
                        Ok(AuthProbe::Invalid("CREDENTIALS_INVALID".to_string()))
                    }
                    ProbeRead::Other(state) => {
                        warn!(state = %state, "auth state invalid after re-initialization");
                        Ok(AuthProbe::Invalid(state))
                    }
                }
            }
        }
    }

    async fn read_state(&self, ctx: &CancellationToken) -> Result<ProbeRead> {
        let response = match self.call(ctx, Method::GET, AUTHENTICATION_PATH, None).await {
            Ok(response) => response,
            Err(Error::SessionInvalidCredentials) => return Ok(ProbeRead::CredentialsInvalid),
            Err(err) => return Err(err),
        };

        if is_credentials_invalid(&response) {
            self.api.reinitialize(ctx).await?;
            return Ok(ProbeRead::CredentialsInvalid);
        }

        let auth = AuthResponse::from_value(&response.body);
        let ready = match auth.error_code() {
            Some(ERROR_INVALID_REQUEST) => true,
            Some(_) => false,
            None => auth.state() == AuthState::Auth,
        };

        if ready {
            Ok(ProbeRead::Ready)
        } else {
            Ok(ProbeRead::Other(
                auth.error_code()
                    .map_or_else(|| auth.state().as_str().to_string(), str::to_string),
            ))
        }
    }

    /// Delete the current authentication session.
    ///
    /// # Errors
    /// Transport failures, or a non-success status other than 404.
    #[instrument(skip_all)]
    pub async fn logout(&self, ctx: &CancellationToken) -> Result<()> {
        let response = self
            .call(ctx, Method::DELETE, AUTHENTICATION_PATH, None)
            .await?;

        if response.is_success() || response.status == reqwest::StatusCode::NOT_FOUND {
            info!("authentication session cleared");
            Ok(())
        } else {
            Err(Error::unexpected(
                AUTHENTICATION_PATH,
                format!("logout returned status {}", response.status),
            ))
        }
    }
}

enum ProbeRead {
    Ready,
    CredentialsInvalid,
    Other(String),
}
