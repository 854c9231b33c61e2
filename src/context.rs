//! Explicit runtime context owning the session, the captcha bridge and the
//! configuration. Everything that used to be process-wide state hangs off a
//! [`Context`] passed to each operation.

use crate::{
    auth::{LoginRequest, Orchestrator},
    captcha::CaptchaBridge,
    config::Config,
    credentials::Locator,
    error::{Error, Result},
    monitor::{AccountMonitor, ProcessPresence},
    restriction::{AccountStore, FileAccountStore, RestrictionChecker, RestrictionVerdict},
    session::SessionManager,
};
use std::{sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

const READY_TIMEOUT: Duration = Duration::from_secs(30);

pub struct Context {
    config: Config,
    session: Arc<SessionManager>,
    captcha: Arc<CaptchaBridge>,
    orchestrator: Arc<Orchestrator<SessionManager>>,
    store: Arc<dyn AccountStore>,
    monitor: AccountMonitor<SessionManager>,
}

impl Context {
    #[must_use]
    pub fn new(config: Config) -> Self {
        let store = Arc::new(FileAccountStore::new(config.accounts_file()));
        Self::with_store(config, store)
    }

    #[must_use]
    pub fn with_store(config: Config, store: Arc<dyn AccountStore>) -> Self {
        let session = Arc::new(SessionManager::new(
            Locator::new(&config),
            config.request_timeout(),
        ));
        let captcha = Arc::new(CaptchaBridge::new(config.captcha_port()));
        let orchestrator = Arc::new(Orchestrator::new(
            session.clone(),
            captcha.clone(),
            config.captcha_timeout(),
        ));
        let monitor = AccountMonitor::new(
            orchestrator.clone(),
            Arc::new(ProcessPresence::new(config.process_names().to_vec())),
            config.monitor_interval(),
        );
        monitor.set_system_identities(config.system_identities().to_vec());

        Self {
            config,
            session,
            captcha,
            orchestrator,
            store,
            monitor,
        }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    #[must_use]
    pub fn captcha(&self) -> &Arc<CaptchaBridge> {
        &self.captcha
    }

    #[must_use]
    pub fn orchestrator(&self) -> &Arc<Orchestrator<SessionManager>> {
        &self.orchestrator
    }

    #[must_use]
    pub fn monitor(&self) -> &AccountMonitor<SessionManager> {
        &self.monitor
    }

    #[must_use]
    pub fn restriction_checker(&self) -> RestrictionChecker<SessionManager> {
        RestrictionChecker::new(
            self.session.clone(),
            self.store.clone(),
            self.config.restriction_timeout(),
        )
    }

    /// Sign in through the captcha bridge, then wait for the restriction
    /// verdict. The signed-in identity becomes the monitor's expected identity.
    ///
    /// # Errors
    /// Any orchestrator or restriction failure; `PermanentBanned` once the ban
    /// has been recorded.
    #[instrument(skip_all)]
    pub async fn login(
        &self,
        ctx: &CancellationToken,
        request: &LoginRequest,
    ) -> Result<RestrictionVerdict> {
        self.session.ensure_initialized(ctx).await?;
        self.session.wait_ready(ctx, READY_TIMEOUT).await?;

        let addr = self.captcha.start_server().await?;
        info!("solve the captcha at http://{addr}/index.html");

        let result = self.orchestrator.login(ctx, request).await;
        self.captcha.stop().await;
        result?;

        match self.restriction_checker().check_account("", ctx).await {
            Ok(verdict) => {
                self.monitor.set_expected_identity(verdict.identity.clone());
                Ok(verdict)
            }
            Err(err @ Error::PermanentBanned { .. }) => {
                warn!("{err}");
                self.monitor.set_expected_identity(None);
                Err(err)
            }
            Err(err) => Err(err),
        }
    }
}
