//! Single-slot token handoff between the callback handler and the orchestrator.
//!
//! `put` never blocks: a token left unconsumed is replaced, so the latest solve
//! always wins. `take` waits for a token, a deadline, or cancellation.

use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::time::Duration;
use tokio::{
    sync::Notify,
    time::{sleep_until, Instant},
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Default)]
pub struct TokenMailbox {
    slot: Mutex<Option<String>>,
    notify: Notify,
}

impl TokenMailbox {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `token`, replacing any unconsumed one. Returns true if a stale
    /// token was discarded.
    pub fn put(&self, token: String) -> bool {
        let replaced = self.slot.lock().replace(token).is_some();
        if replaced {
            debug!("discarded unconsumed captcha token");
        }
        self.notify.notify_one();
        replaced
    }

    /// Drop any unconsumed token.
    pub fn clear(&self) -> bool {
        self.slot.lock().take().is_some()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slot.lock().is_none()
    }

    /// Wait for the next token.
    ///
    /// # Errors
    /// `CaptchaTimeout` once `timeout` elapses; `CaptchaCancelled` if `ctx`
    /// fires or an empty token (the internal cancel signal) is delivered.
    pub async fn take(&self, ctx: &CancellationToken, timeout: Duration) -> Result<String> {
        let deadline = Instant::now() + timeout;

        loop {
            let token = self.slot.lock().take();
            if let Some(token) = token {
                if token.is_empty() {
                    return Err(Error::CaptchaCancelled);
                }
                return Ok(token);
            }

            tokio::select! {
                () = self.notify.notified() => {}
                () = sleep_until(deadline) => return Err(Error::CaptchaTimeout),
                () = ctx.cancelled() => return Err(Error::CaptchaCancelled),
            }
        }
    }
}
