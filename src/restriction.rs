//! Restriction Checker: waits for the post-login restriction verdict and
//! durably records permanently banned identities.

use crate::{
    error::{Error, Result},
    session::{BoxFuture, LocalApi},
};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tokio::{fs, sync::Mutex, time::sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

pub const USERINFO_PATH: &str = "/rso-auth/v1/userinfo";

const POLL_INTERVAL: Duration = Duration::from_millis(500);
const PERMANENT_BAN: &str = "PERMANENT_BAN";
// riot-wide, game, and unscoped
const APPLICABLE_SCOPES: [&str; 3] = ["riot", "lol", ""];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Restriction {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub scope: String,
}

impl Restriction {
    #[must_use]
    pub fn is_permanent_ban(&self) -> bool {
        self.kind == PERMANENT_BAN && APPLICABLE_SCOPES.contains(&self.scope.as_str())
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RestrictionVerdict {
    pub identity: Option<String>,
    pub restrictions: Vec<Restriction>,
}

#[derive(Debug, Default, Deserialize)]
struct UserInfo {
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    ban: Option<BanInfo>,
}

#[derive(Debug, Default, Deserialize)]
struct BanInfo {
    #[serde(default)]
    restrictions: Vec<Restriction>,
}

impl RestrictionVerdict {
    /// Decode the identity endpoint body. `userInfo` may be an embedded JSON
    /// string or an object; `None` means the verdict is not known yet.
    #[must_use]
    pub fn from_userinfo(body: &Value) -> Option<Self> {
        let info: UserInfo = match body.get("userInfo")? {
            Value::String(embedded) if embedded.trim().is_empty() => return None,
            Value::String(embedded) => serde_json::from_str(embedded).ok()?,
            value @ Value::Object(_) => serde_json::from_value(value.clone()).ok()?,
            _ => return None,
        };

        Some(Self {
            identity: info.sub.filter(|sub| !sub.is_empty()),
            restrictions: info.ban.unwrap_or_default().restrictions,
        })
    }

    #[must_use]
    pub fn permanent_ban(&self) -> Option<&Restriction> {
        self.restrictions.iter().find(|r| r.is_permanent_ban())
    }
}

/// Read the current restriction verdict once.
///
/// # Errors
/// Transport failures from the local API.
pub async fn fetch_verdict<A: LocalApi + ?Sized>(
    api: &A,
    ctx: &CancellationToken,
) -> Result<Option<RestrictionVerdict>> {
    let response = api.request(ctx, Method::GET, USERINFO_PATH, None).await?;
    if !response.is_success() {
        debug!(status = %response.status, "userinfo not available");
        return Ok(None);
    }
    Ok(RestrictionVerdict::from_userinfo(&response.body))
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BanRecord {
    pub identity: String,
    pub restriction_type: String,
    pub scope: String,
    pub recorded_at: u64,
}

impl BanRecord {
    #[must_use]
    pub fn new(identity: impl Into<String>, restriction: &Restriction) -> Self {
        let recorded_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_secs());

        Self {
            identity: identity.into(),
            restriction_type: restriction.kind.clone(),
            scope: restriction.scope.clone(),
            recorded_at,
        }
    }
}

/// Durable record of banned accounts.
pub trait AccountStore: Send + Sync {
    fn save_banned(&self, record: BanRecord) -> BoxFuture<'_, Result<()>>;
}

/// JSON file of [`BanRecord`]s, one entry per identity.
#[derive(Debug)]
pub struct FileAccountStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileAccountStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// # Errors
    /// Returns an error if the file exists but cannot be read or decoded.
    pub async fn load(&self) -> Result<Vec<BanRecord>> {
        match fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(Vec::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(err.into()),
        }
    }

    async fn upsert(&self, record: BanRecord) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut records = self.load().await?;
        match records.iter_mut().find(|r| r.identity == record.identity) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // write-then-rename keeps the file whole if we die mid-write
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&records)?).await?;
        fs::rename(&tmp, &self.path).await?;

        Ok(())
    }
}

impl AccountStore for FileAccountStore {
    fn save_banned(&self, record: BanRecord) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.upsert(record))
    }
}

pub struct RestrictionChecker<A> {
    api: Arc<A>,
    store: Arc<dyn AccountStore>,
    deadline: Duration,
    poll_interval: Duration,
}

impl<A: LocalApi> RestrictionChecker<A> {
    #[must_use]
    pub fn new(api: Arc<A>, store: Arc<dyn AccountStore>, deadline: Duration) -> Self {
        Self {
            api,
            store,
            deadline,
            poll_interval: POLL_INTERVAL,
        }
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Poll until a verdict is known.
    ///
    /// An empty `identity` falls back to the identity reported by the verdict.
    ///
    /// # Errors
    /// `PermanentBanned` after the ban has been recorded, the store error if
    /// recording fails, `RestrictionTimeout` when the deadline elapses and
    /// `Cancelled` if `ctx` fires.
    #[instrument(skip(self, ctx))]
    pub async fn check_account(
        &self,
        identity: &str,
        ctx: &CancellationToken,
    ) -> Result<RestrictionVerdict> {
        let poll = async {
            loop {
                match fetch_verdict(self.api.as_ref(), ctx).await {
                    Ok(Some(verdict)) => return verdict,
                    Ok(None) => debug!("restriction verdict not ready"),
                    Err(err) => debug!("userinfo poll failed: {err}"),
                }
                sleep(self.poll_interval).await;
            }
        };

        let verdict = tokio::select! {
            result = tokio::time::timeout(self.deadline, poll) => {
                result.map_err(|_| Error::RestrictionTimeout(self.deadline))?
            }
            () = ctx.cancelled() => return Err(Error::Cancelled),
        };

        let Some(ban) = verdict.permanent_ban() else {
            if verdict.restrictions.is_empty() {
                info!("no account restrictions");
            } else {
                warn!(restrictions = ?verdict.restrictions, "account has non-terminal restrictions");
            }
            return Ok(verdict);
        };

        let identity = if identity.is_empty() {
            verdict.identity.clone().unwrap_or_default()
        } else {
            identity.to_string()
        };

        // recorded outside the deadline so the write is never cut short
        if let Err(err) = self
            .store
            .save_banned(BanRecord::new(identity.clone(), ban))
            .await
        {
            error!("failed to record banned account: {err}");
            return Err(err);
        }

        warn!(scope = %ban.scope, "account permanently banned");
        Err(Error::PermanentBanned { identity })
    }
}
