//! Captcha Bridge: a short-lived loopback server that lets a human solve the
//! sign-on challenge in a browser on behalf of the headless login flow.
//!
//! Endpoints:
//! - `GET /index.html` serves the widget page with the current challenge embedded.
//! - `GET /api/captcha/data` returns `{"rqdata": <challenge>}`.
//! - `POST /api/captcha/token` accepts `{"token": <solved-token>}`.
//!
//! Solved tokens go through a single-slot [`mailbox::TokenMailbox`]; a newer
//! solve replaces an unconsumed one.

pub mod handlers;
pub mod mailbox;

use crate::{
    auth::CaptchaChallenge,
    error::{Error, Result},
};
use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    routing::{get, post},
    Extension, Router,
};
use mailbox::TokenMailbox;
use parking_lot::RwLock;
use std::{
    net::{Ipv4Addr, SocketAddr},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{net::TcpListener, sync::Mutex, task::JoinHandle, time::timeout};
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{debug, debug_span, error, info, instrument, warn, Span};
use ulid::Ulid;

pub const DEFAULT_SITE_KEY: &str = "019f1553-3845-481c-a6f5-5a60ccf6d830";

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// State shared between the bridge and its HTTP handlers.
#[derive(Debug, Default)]
pub struct BridgeState {
    challenge: RwLock<Option<CaptchaChallenge>>,
    mailbox: TokenMailbox,
    in_progress: AtomicBool,
}

impl BridgeState {
    #[must_use]
    pub fn challenge(&self) -> Option<CaptchaChallenge> {
        self.challenge.read().clone()
    }

    pub fn set_challenge(&self, challenge: CaptchaChallenge) {
        *self.challenge.write() = Some(challenge);
    }

    pub fn deliver_token(&self, token: String) {
        self.mailbox.put(token);
    }
}

#[derive(Debug)]
struct ServerHandle {
    addr: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

#[derive(Debug)]
pub struct CaptchaBridge {
    port: u16,
    state: Arc<BridgeState>,
    server: Mutex<Option<ServerHandle>>,
}

impl CaptchaBridge {
    /// A bridge bound to `port` on the loopback interface once started.
    /// Port `0` picks an ephemeral port.
    #[must_use]
    pub fn new(port: u16) -> Self {
        Self {
            port,
            state: Arc::new(BridgeState::default()),
            server: Mutex::new(None),
        }
    }

    /// Start the loopback server.
    ///
    /// Idempotent: when already running, any stale unconsumed token is drained
    /// and the existing address is returned.
    ///
    /// # Errors
    /// Returns an error if the listener cannot be bound.
    #[instrument(skip(self), fields(port = self.port))]
    pub async fn start_server(&self) -> Result<SocketAddr> {
        let mut server = self.server.lock().await;

        if let Some(handle) = server.as_ref() {
            if !handle.task.is_finished() {
                if self.state.mailbox.clear() {
                    debug!("drained stale captcha token on restart");
                }
                return Ok(handle.addr);
            }
        }

        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, self.port)).await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let app = router(self.state.clone());

        let task = tokio::spawn({
            let shutdown = shutdown.clone();
            async move {
                let served = axum::serve(listener, app.into_make_service())
                    .with_graceful_shutdown(async move { shutdown.cancelled().await })
                    .await;
                if let Err(err) = served {
                    error!("captcha server failed: {err}");
                }
            }
        });

        info!("Captcha bridge listening on http://{}/index.html", addr);

        *server = Some(ServerHandle {
            addr,
            shutdown,
            task,
        });

        Ok(addr)
    }

    /// Gracefully stop the server, aborting it if shutdown takes too long.
    pub async fn stop(&self) {
        let Some(handle) = self.server.lock().await.take() else {
            return;
        };

        handle.shutdown.cancel();
        let abort = handle.task.abort_handle();
        if timeout(SHUTDOWN_TIMEOUT, handle.task).await.is_err() {
            warn!("captcha server did not stop within {:?}, aborting", SHUTDOWN_TIMEOUT);
            abort.abort();
        }

        info!("Captcha bridge stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.server
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.task.is_finished())
    }

    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.server.lock().await.as_ref().map(|handle| handle.addr)
    }

    pub fn set_challenge(&self, challenge: CaptchaChallenge) {
        debug!("captcha challenge updated");
        self.state.set_challenge(challenge);
    }

    #[must_use]
    pub fn challenge(&self) -> Option<CaptchaChallenge> {
        self.state.challenge()
    }

    /// Hand a solved token to whoever is waiting, as the callback endpoint does.
    pub fn deliver_token(&self, token: impl Into<String>) {
        self.state.deliver_token(token.into());
    }

    /// Signal that the solving surface went away; a pending wait reports
    /// `CaptchaCancelled`.
    pub fn cancel_pending(&self) {
        self.state.mailbox.put(String::new());
    }

    #[must_use]
    pub fn in_progress(&self) -> bool {
        self.state.in_progress.load(Ordering::SeqCst)
    }

    /// Wait for a solved token.
    ///
    /// # Errors
    /// `CaptchaTimeout` after `wait`, `CaptchaCancelled` on `ctx` cancellation
    /// or the internal cancel signal.
    pub async fn wait_for_token(&self, ctx: &CancellationToken, wait: Duration) -> Result<String> {
        self.state.in_progress.store(true, Ordering::SeqCst);
        let result = self.state.mailbox.take(ctx, wait).await;
        self.state.in_progress.store(false, Ordering::SeqCst);

        match &result {
            Ok(_) => debug!("captcha token received"),
            Err(Error::CaptchaTimeout) => warn!("captcha wait timed out after {:?}", wait),
            Err(err) => debug!("captcha wait ended: {err}"),
        }

        result
    }

    /// Clear challenge and token so a fresh attempt never sees stale state.
    pub fn reset(&self) {
        self.state.mailbox.clear();
        *self.state.challenge.write() = None;
        self.state.in_progress.store(false, Ordering::SeqCst);
    }
}

/// Build the bridge router.
pub fn router(state: Arc<BridgeState>) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/index.html", get(handlers::index))
        .route("/api/captcha/data", get(handlers::data))
        .route("/api/captcha/token", post(handlers::token))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(Extension(state)),
        )
}

// span
fn make_span(request: &Request<Body>) -> Span {
    let path = request.uri().path();
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");

    debug_span!("captcha-request", path, request_id)
}
