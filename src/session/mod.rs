//! Session Manager: the single HTTP client bound to the local client API.
//!
//! The client handle lives behind a read/write lock. Request issuers take the
//! read lock only long enough to clone the handle, so no guard is ever held
//! across network I/O; `initialize`/`reset` take the write lock and swap the
//! session atomically.
//!
//! Security boundary: the local API presents a self-signed certificate on the
//! loopback interface, so certificate validation is disabled for this client
//! only. It never talks to anything but `127.0.0.1`.

use crate::{
    credentials::{Credentials, Locator},
    error::{Error, Result},
    APP_USER_AGENT,
};
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION},
    Client, Method, StatusCode,
};
use serde_json::Value;
use std::{future::Future, pin::Pin, time::Duration};
use tokio::{sync::RwLock, time::sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, instrument, warn, Instrument};
use url::Url;

pub const READY_STATE_PATH: &str = "/rso-auth/configuration/v3/ready-state";

const CREDENTIALS_INVALID: &str = "CREDENTIALS_INVALID";
const READY_POLL_INTERVAL: Duration = Duration::from_millis(500);

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl ApiResponse {
    #[must_use]
    pub fn new(status: StatusCode, body: Value) -> Self {
        Self { status, body }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// The local client API as seen by the orchestrator and the checkers.
///
/// Every operation takes the caller's token; discovery triggered on the way
/// (lazy init, re-init after rejected credentials) unwinds when it fires.
pub trait LocalApi: Send + Sync {
    fn request<'a>(
        &'a self,
        ctx: &'a CancellationToken,
        method: Method,
        path: &'a str,
        body: Option<Value>,
    ) -> BoxFuture<'a, Result<ApiResponse>>;

    /// Discover credentials only if no session is held.
    fn ensure_session<'a>(&'a self, ctx: &'a CancellationToken) -> BoxFuture<'a, Result<()>>;

    /// Drop the current session and discover credentials again.
    fn reinitialize<'a>(&'a self, ctx: &'a CancellationToken) -> BoxFuture<'a, Result<()>>;
}

#[derive(Debug, Clone)]
struct Session {
    client: Client,
    credentials: Credentials,
}

#[derive(Debug)]
pub struct SessionManager {
    locator: Locator,
    request_timeout: Duration,
    session: RwLock<Option<Session>>,
}

impl SessionManager {
    #[must_use]
    pub fn new(locator: Locator, request_timeout: Duration) -> Self {
        Self {
            locator,
            request_timeout,
            session: RwLock::new(None),
        }
    }

    #[must_use]
    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    /// Discover credentials and replace the current session.
    ///
    /// # Errors
    /// Propagates the locator failure verbatim; callers should retry after a delay.
    #[instrument(skip_all)]
    pub async fn initialize(&self, ctx: &CancellationToken) -> Result<()> {
        let credentials = self.locator.locate(ctx).await?;
        self.install(credentials).await
    }

    /// Initialize only if no session is held.
    ///
    /// # Errors
    /// Same as [`SessionManager::initialize`].
    pub async fn ensure_initialized(&self, ctx: &CancellationToken) -> Result<()> {
        if self.is_initialized().await {
            return Ok(());
        }
        self.initialize(ctx).await
    }

    /// Build a client for `credentials` and swap it in.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub async fn install(&self, credentials: Credentials) -> Result<()> {
        let client = build_client(&credentials, self.request_timeout)?;
        let port = credentials.port().to_string();

        *self.session.write().await = Some(Session {
            client,
            credentials,
        });

        info!(port = %port, "local client session initialized");
        Ok(())
    }

    /// Clear the held client so the next request forces re-discovery.
    pub async fn reset(&self) {
        if self.session.write().await.take().is_some() {
            debug!("local client session reset");
        }
    }

    pub async fn is_initialized(&self) -> bool {
        self.session.read().await.is_some()
    }

    /// # Errors
    /// Returns `ClientNotInitialized` if no session is held.
    pub async fn credentials(&self) -> Result<Credentials> {
        self.session
            .read()
            .await
            .as_ref()
            .map(|session| session.credentials.clone())
            .ok_or(Error::ClientNotInitialized)
    }

    async fn current(&self, ctx: &CancellationToken) -> Result<Session> {
        if let Some(session) = self.session.read().await.as_ref() {
            return Ok(session.clone());
        }

        self.initialize(ctx).await?;

        self.session
            .read()
            .await
            .clone()
            .ok_or(Error::ClientNotInitialized)
    }

    /// Poll the readiness endpoint until the client reports ready.
    ///
    /// # Errors
    /// Returns `NetworkTimeout` if `timeout` elapses and `Cancelled` if `ctx` fires.
    #[instrument(skip(self, ctx))]
    pub async fn wait_ready(&self, ctx: &CancellationToken, timeout: Duration) -> Result<()> {
        let poll = async {
            loop {
                match self.send(ctx, Method::GET, READY_STATE_PATH, None).await {
                    Ok(response) if is_ready(&response) => return,
                    Ok(response) => debug!(status = %response.status, "client not ready yet"),
                    Err(err) => debug!("readiness probe failed: {err}"),
                }
                sleep(READY_POLL_INTERVAL).await;
            }
        };

        tokio::select! {
            result = tokio::time::timeout(timeout, poll) => {
                result.map_err(|_| Error::NetworkTimeout(READY_STATE_PATH.to_string()))
            }
            () = ctx.cancelled() => Err(Error::Cancelled),
        }
    }

    async fn send(
        &self,
        ctx: &CancellationToken,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<ApiResponse> {
        let session = self.current(ctx).await?;
        let url = Url::parse(&session.credentials.base_url())
            .and_then(|base| base.join(path))
            .map_err(|err| Error::unexpected(path, err.to_string()))?;

        let span = info_span!("local_api.request", http.method = %method, url = %url);
        let mut request = session.client.request(method, url);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let sent = tokio::select! {
            sent = request.send().instrument(span) => sent,
            () = ctx.cancelled() => return Err(Error::Cancelled),
        };

        let response = match sent {
            Ok(response) => response,
            Err(err) if err.is_timeout() => {
                warn!(path, "local client request timed out, resetting session");
                self.reset().await;
                return Err(Error::NetworkTimeout(path.to_string()));
            }
            Err(err) if err.is_connect() => {
                warn!(path, "local client unreachable, resetting session");
                self.reset().await;
                return Err(Error::Http(err));
            }
            Err(err) => return Err(Error::Http(err)),
        };

        let status = response.status();
        let text = response.text().await?;
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        let response = ApiResponse::new(status, body);

        if is_credentials_invalid(&response) {
            warn!(path, "session credentials rejected, re-initializing");
            if let Err(err) = self.initialize(ctx).await {
                warn!("re-initialization failed: {err}");
                self.reset().await;
            }
            return Err(Error::SessionInvalidCredentials);
        }

        debug!(path, status = %status, "local client response");
        Ok(response)
    }
}

impl LocalApi for SessionManager {
    fn request<'a>(
        &'a self,
        ctx: &'a CancellationToken,
        method: Method,
        path: &'a str,
        body: Option<Value>,
    ) -> BoxFuture<'a, Result<ApiResponse>> {
        Box::pin(self.send(ctx, method, path, body))
    }

    fn ensure_session<'a>(&'a self, ctx: &'a CancellationToken) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.ensure_initialized(ctx))
    }

    fn reinitialize<'a>(&'a self, ctx: &'a CancellationToken) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.reset().await;
            self.initialize(ctx).await
        })
    }
}

fn build_client(credentials: &Credentials, timeout: Duration) -> Result<Client> {
    let mut authorization = HeaderValue::from_str(&credentials.authorization())
        .map_err(|err| Error::unexpected("credentials", err.to_string()))?;
    authorization.set_sensitive(true);

    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, authorization);

    Ok(Client::builder()
        .user_agent(APP_USER_AGENT)
        .default_headers(headers)
        .timeout(timeout)
        .danger_accept_invalid_certs(true)
        .build()?)
}

/// A 401, or a body carrying the `CREDENTIALS_INVALID` code.
#[must_use]
pub fn is_credentials_invalid(response: &ApiResponse) -> bool {
    if response.status == StatusCode::UNAUTHORIZED {
        return true;
    }

    ["errorCode", "error"].iter().any(|key| {
        response
            .body
            .get(key)
            .and_then(Value::as_str)
            .is_some_and(|code| code == CREDENTIALS_INVALID)
    })
}

fn is_ready(response: &ApiResponse) -> bool {
    if !response.is_success() {
        return false;
    }
    response
        .body
        .get("isReady")
        .and_then(Value::as_bool)
        .unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use anyhow::Result;
    use axum::{http::HeaderMap, response::IntoResponse, routing::get, Json, Router};
    use serde_json::json;
    use std::{
        net::{Ipv4Addr, SocketAddr},
        path::{Path, PathBuf},
    };
    use tempfile::TempDir;
    use tokio::net::TcpListener;

    const FRESH: &str = "fresh";
    const STALE: &str = "stale";

    fn manager() -> SessionManager {
        let locator = Locator::new(&Config::default())
            .with_lockfile_paths(Vec::new())
            .with_process_names(vec!["definitely-not-a-real-client".to_string()]);
        SessionManager::new(locator, Duration::from_secs(10))
    }

    fn manager_at(lockfile: &Path, request_timeout: Duration) -> SessionManager {
        let locator = Locator::new(&Config::default())
            .with_lockfile_paths(vec![lockfile.to_path_buf()])
            .with_process_names(vec!["definitely-not-a-real-client".to_string()]);
        SessionManager::new(locator, request_timeout)
    }

    // Plain HTTP stand-in for the local client; only the `FRESH` password is accepted.
    async fn local_client() -> Result<SocketAddr> {
        let expected = Credentials::new("0", FRESH).authorization();

        let router = Router::new()
            .route(
                READY_STATE_PATH,
                get(move |headers: HeaderMap| {
                    let authorized = headers
                        .get(AUTHORIZATION)
                        .and_then(|value| value.to_str().ok())
                        == Some(expected.as_str());
                    async move {
                        if authorized {
                            Json(json!({"isReady": true})).into_response()
                        } else {
                            StatusCode::UNAUTHORIZED.into_response()
                        }
                    }
                }),
            )
            .route("/empty", get(|| async { StatusCode::NO_CONTENT }))
            .route("/text", get(|| async { "plain text" }))
            .route(
                "/rejected",
                get(|| async { Json(json!({"errorCode": "CREDENTIALS_INVALID"})) }),
            )
            .route(
                "/slow",
                get(|| async {
                    sleep(Duration::from_millis(500)).await;
                    Json(json!({}))
                }),
            );

        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, router.into_make_service()).await {
                eprintln!("local client stub stopped: {err}");
            }
        });
        Ok(addr)
    }

    async fn write_lockfile(path: &Path, port: u16, password: &str) -> Result<()> {
        tokio::fs::write(path, format!("Riot Client:1:{port}:{password}:http")).await?;
        Ok(())
    }

    async fn lockfile_for(addr: SocketAddr, password: &str) -> Result<(TempDir, PathBuf)> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("lockfile");
        write_lockfile(&path, addr.port(), password).await?;
        Ok((dir, path))
    }

    #[tokio::test]
    async fn install_and_reset_toggle_initialized() -> Result<()> {
        let manager = manager();
        assert!(!manager.is_initialized().await);
        assert!(matches!(
            manager.credentials().await,
            Err(Error::ClientNotInitialized)
        ));

        manager.install(Credentials::new("50000", "pw")).await?;
        assert!(manager.is_initialized().await);
        assert_eq!(manager.credentials().await?.port(), "50000");

        manager.reset().await;
        assert!(!manager.is_initialized().await);
        Ok(())
    }

    #[tokio::test]
    async fn install_replaces_existing_session() -> Result<()> {
        let manager = manager();
        manager.install(Credentials::new("1", "a")).await?;
        manager.install(Credentials::new("2", "b")).await?;
        assert_eq!(manager.credentials().await?.port(), "2");
        Ok(())
    }

    #[tokio::test]
    async fn request_without_client_propagates_locator_failure() {
        let manager = manager();
        let result = manager
            .request(&CancellationToken::new(), Method::GET, READY_STATE_PATH, None)
            .await;
        assert!(matches!(result, Err(Error::CredentialNotFound)));
    }

    #[tokio::test]
    async fn discovery_observes_caller_cancellation() {
        let manager = manager();
        let ctx = CancellationToken::new();
        ctx.cancel();

        assert!(matches!(
            manager.ensure_session(&ctx).await,
            Err(Error::Cancelled)
        ));
        assert!(matches!(
            manager.reinitialize(&ctx).await,
            Err(Error::Cancelled)
        ));
        assert!(matches!(
            manager.request(&ctx, Method::GET, READY_STATE_PATH, None).await,
            Err(Error::Cancelled)
        ));
    }

    #[tokio::test]
    async fn first_request_discovers_session() -> Result<()> {
        let addr = local_client().await?;
        let (_dir, lockfile) = lockfile_for(addr, FRESH).await?;
        let manager = manager_at(&lockfile, Duration::from_secs(5));
        let ctx = CancellationToken::new();

        let response = manager
            .request(&ctx, Method::GET, READY_STATE_PATH, None)
            .await?;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body, json!({"isReady": true}));
        assert!(manager.is_initialized().await);

        manager.wait_ready(&ctx, Duration::from_secs(2)).await?;
        Ok(())
    }

    #[tokio::test]
    async fn unauthorized_response_rediscovers_session() -> Result<()> {
        let addr = local_client().await?;
        let (_dir, lockfile) = lockfile_for(addr, STALE).await?;
        let manager = manager_at(&lockfile, Duration::from_secs(5));
        let ctx = CancellationToken::new();

        manager.initialize(&ctx).await?;
        // the client restarted with a new secret
        write_lockfile(&lockfile, addr.port(), FRESH).await?;

        let result = manager
            .request(&ctx, Method::GET, READY_STATE_PATH, None)
            .await;
        assert!(matches!(result, Err(Error::SessionInvalidCredentials)));
        assert_eq!(
            manager.credentials().await?.authorization(),
            Credentials::new("0", FRESH).authorization()
        );

        let response = manager
            .request(&ctx, Method::GET, READY_STATE_PATH, None)
            .await?;
        assert!(response.is_success());
        Ok(())
    }

    #[tokio::test]
    async fn credentials_invalid_body_rediscovers_session() -> Result<()> {
        let addr = local_client().await?;
        let (_dir, lockfile) = lockfile_for(addr, FRESH).await?;
        let manager = manager_at(&lockfile, Duration::from_secs(5));
        let ctx = CancellationToken::new();

        let result = manager.request(&ctx, Method::GET, "/rejected", None).await;
        assert!(matches!(result, Err(Error::SessionInvalidCredentials)));
        assert!(manager.is_initialized().await);
        Ok(())
    }

    #[tokio::test]
    async fn failed_rediscovery_leaves_session_reset() -> Result<()> {
        let addr = local_client().await?;
        let (_dir, lockfile) = lockfile_for(addr, STALE).await?;
        let manager = manager_at(&lockfile, Duration::from_secs(5));
        let ctx = CancellationToken::new();

        manager.initialize(&ctx).await?;
        tokio::fs::remove_file(&lockfile).await?;

        let result = manager
            .request(&ctx, Method::GET, READY_STATE_PATH, None)
            .await;
        assert!(matches!(result, Err(Error::SessionInvalidCredentials)));
        assert!(!manager.is_initialized().await);
        Ok(())
    }

    #[tokio::test]
    async fn empty_and_plain_text_bodies_are_decoded() -> Result<()> {
        let addr = local_client().await?;
        let (_dir, lockfile) = lockfile_for(addr, FRESH).await?;
        let manager = manager_at(&lockfile, Duration::from_secs(5));
        let ctx = CancellationToken::new();

        let empty = manager.request(&ctx, Method::GET, "/empty", None).await?;
        assert_eq!(empty.status, StatusCode::NO_CONTENT);
        assert_eq!(empty.body, Value::Null);

        let text = manager.request(&ctx, Method::GET, "/text", None).await?;
        assert_eq!(text.body, Value::String("plain text".to_string()));
        Ok(())
    }

    #[tokio::test]
    async fn timeout_resets_session() -> Result<()> {
        let addr = local_client().await?;
        let (_dir, lockfile) = lockfile_for(addr, FRESH).await?;
        let manager = manager_at(&lockfile, Duration::from_millis(100));
        let ctx = CancellationToken::new();

        let result = manager.request(&ctx, Method::GET, "/slow", None).await;
        assert!(matches!(result, Err(Error::NetworkTimeout(_))));
        assert!(!manager.is_initialized().await);
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_client_resets_session() -> Result<()> {
        let port = {
            let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await?;
            listener.local_addr()?.port()
        };
        let manager = manager();
        manager
            .install(Credentials::new(port.to_string(), "pw").with_protocol("http"))
            .await?;

        let result = manager
            .request(&CancellationToken::new(), Method::GET, READY_STATE_PATH, None)
            .await;
        assert!(matches!(result, Err(Error::Http(_))));
        assert!(!manager.is_initialized().await);
        Ok(())
    }

    #[tokio::test]
    async fn in_flight_request_observes_cancellation() -> Result<()> {
        let addr = local_client().await?;
        let (_dir, lockfile) = lockfile_for(addr, FRESH).await?;
        let manager = manager_at(&lockfile, Duration::from_secs(5));
        let ctx = CancellationToken::new();
        manager.initialize(&ctx).await?;

        tokio::spawn({
            let ctx = ctx.clone();
            async move {
                sleep(Duration::from_millis(50)).await;
                ctx.cancel();
            }
        });

        let result = manager.request(&ctx, Method::GET, "/slow", None).await;
        assert!(matches!(result, Err(Error::Cancelled)));
        Ok(())
    }

    #[test]
    fn credentials_invalid_detection() {
        assert!(is_credentials_invalid(&ApiResponse::new(
            StatusCode::UNAUTHORIZED,
            Value::Null
        )));
        assert!(is_credentials_invalid(&ApiResponse::new(
            StatusCode::OK,
            json!({"errorCode": "CREDENTIALS_INVALID"})
        )));
        assert!(!is_credentials_invalid(&ApiResponse::new(
            StatusCode::OK,
            json!({"type": "auth"})
        )));
    }

    #[test]
    fn ready_state_detection() {
        assert!(is_ready(&ApiResponse::new(StatusCode::OK, Value::Null)));
        assert!(is_ready(&ApiResponse::new(
            StatusCode::OK,
            json!({"isReady": true})
        )));
        assert!(!is_ready(&ApiResponse::new(
            StatusCode::OK,
            json!({"isReady": false})
        )));
        assert!(!is_ready(&ApiResponse::new(
            StatusCode::NOT_FOUND,
            Value::Null
        )));
    }
}
