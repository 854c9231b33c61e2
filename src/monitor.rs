//! Account Monitor: a low-frequency supervisory loop over the local session.
//!
//! Every step of a tick is best-effort; failures are logged and the loop moves
//! on to the next tick.

use crate::{
    auth::{AuthProbe, Orchestrator},
    credentials::process,
    error::{Error, Result},
    restriction::fetch_verdict,
    session::{BoxFuture, LocalApi},
};
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use std::{sync::Arc, time::Duration};
use tokio::{task::JoinHandle, time::sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

const JITTER_FACTOR: f64 = 0.1;

/// Whether the target client is running.
pub trait Presence: Send + Sync {
    fn is_running(&self) -> BoxFuture<'_, bool>;
}

#[derive(Debug, Clone)]
pub struct ProcessPresence {
    names: Vec<String>,
}

impl ProcessPresence {
    #[must_use]
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }
}

impl Presence for ProcessPresence {
    fn is_running(&self) -> BoxFuture<'_, bool> {
        Box::pin(process::is_running(&self.names))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    ClientNotRunning,
    Healthy,
    Reinitialized,
    Busy,
    LoggedOut(String),
    Invalid(String),
}

struct Shared<A> {
    orchestrator: Arc<Orchestrator<A>>,
    presence: Arc<dyn Presence>,
    expected_identity: RwLock<Option<String>>,
    system_identities: RwLock<Vec<String>>,
}

struct Running {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

pub struct AccountMonitor<A> {
    shared: Arc<Shared<A>>,
    interval: Duration,
    running: Mutex<Option<Running>>,
}

impl<A: LocalApi + 'static> AccountMonitor<A> {
    #[must_use]
    pub fn new(
        orchestrator: Arc<Orchestrator<A>>,
        presence: Arc<dyn Presence>,
        interval: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                orchestrator,
                presence,
                expected_identity: RwLock::new(None),
                system_identities: RwLock::new(Vec::new()),
            }),
            interval,
            running: Mutex::new(None),
        }
    }

    /// The identity this machine is supposed to be signed in as. While set, any
    /// other authenticated identity gets logged out; while unset, only system
    /// identities are.
    pub fn set_expected_identity(&self, identity: Option<String>) {
        *self.shared.expected_identity.write() = identity;
    }

    /// Identities that are always logged out when found holding the session.
    pub fn set_system_identities(&self, identities: Vec<String>) {
        *self.shared.system_identities.write() = identities;
    }

    #[must_use]
    pub fn expected_identity(&self) -> Option<String> {
        self.shared.expected_identity.read().clone()
    }

    /// Start the loop. Returns `false` if it was already running.
    pub fn start(&self) -> bool {
        let mut running = self.running.lock();
        if running.as_ref().is_some_and(|r| !r.task.is_finished()) {
            return false;
        }

        let shutdown = CancellationToken::new();
        let shared = self.shared.clone();
        let interval = self.interval;

        let task = tokio::spawn({
            let shutdown = shutdown.clone();
            async move {
                loop {
                    match shared.tick(&shutdown).await {
                        Ok(outcome) => debug!(?outcome, "monitor tick"),
                        Err(err) => warn!("monitor tick failed: {err}"),
                    }

                    let wait = jittered(interval);
                    debug!("next monitor tick in {:?}", wait);

                    tokio::select! {
                        () = sleep(wait) => {}
                        () = shutdown.cancelled() => break,
                    }
                }
            }
        });

        info!("account monitor started, interval {:?}", self.interval);
        *running = Some(Running { shutdown, task });
        true
    }

    /// Stop the loop and wait for it to exit. A no-op when not running.
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().take() else {
            return;
        };

        running.shutdown.cancel();
        if let Err(err) = running.task.await {
            warn!("monitor task ended abnormally: {err}");
        }
        info!("account monitor stopped");
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .is_some_and(|r| !r.task.is_finished())
    }

    /// Run one supervisory pass.
    ///
    /// # Errors
    /// The first failing step; the loop logs it and carries on.
    pub async fn tick(&self, ctx: &CancellationToken) -> Result<TickOutcome> {
        self.shared.tick(ctx).await
    }
}

impl<A: LocalApi> Shared<A> {
    #[instrument(skip_all)]
    async fn tick(&self, ctx: &CancellationToken) -> Result<TickOutcome> {
        if !self.presence.is_running().await {
            debug!("client process not running, skipping tick");
            return Ok(TickOutcome::ClientNotRunning);
        }

        if self.orchestrator.is_busy() {
            return Ok(TickOutcome::Busy);
        }

        let api = self.orchestrator.api();
        api.ensure_session(ctx).await?;

        // a signed-in session is judged by who holds it, before any re-discovery
        match fetch_verdict(api.as_ref(), ctx).await {
            Ok(Some(verdict)) => {
                if let Some(identity) = verdict.identity {
                    return self.settle(ctx, identity).await;
                }
            }
            Ok(None) => {}
            Err(Error::SessionInvalidCredentials) => return Ok(TickOutcome::Reinitialized),
            Err(err) => return Err(err),
        }

        Ok(match self.orchestrator.probe(ctx).await? {
            AuthProbe::Ready => TickOutcome::Healthy,
            AuthProbe::Reinitialized => TickOutcome::Reinitialized,
            AuthProbe::Busy => TickOutcome::Busy,
            AuthProbe::Invalid(state) => TickOutcome::Invalid(state),
        })
    }

    async fn settle(&self, ctx: &CancellationToken, identity: String) -> Result<TickOutcome> {
        if !self.is_unexpected(&identity) {
            debug!(identity = %identity, "session held by an expected identity");
            return Ok(TickOutcome::Healthy);
        }

        warn!(identity = %identity, "unexpected identity holds the client session, logging out");
        self.orchestrator.logout(ctx).await?;
        Ok(TickOutcome::LoggedOut(identity))
    }

    fn is_unexpected(&self, identity: &str) -> bool {
        if self.system_identities.read().iter().any(|system| system == identity) {
            return true;
        }

        self.expected_identity
            .read()
            .as_deref()
            .is_some_and(|expected| expected != identity)
    }
}

fn jittered(interval: Duration) -> Duration {
    interval.mul_f64(rand::thread_rng().gen_range(1.0 - JITTER_FACTOR..=1.0))
}
