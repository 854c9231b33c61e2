use crate::credentials::process::DEFAULT_PROCESS_NAMES;
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

pub const DEFAULT_CAPTCHA_PORT: u16 = 6969;
pub const DEFAULT_INSTALL_DIR: &str = r"C:\Riot Games\Riot Client";

const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 10;
const DEFAULT_CAPTCHA_TIMEOUT_SECONDS: u64 = 5 * 60;
const DEFAULT_RESTRICTION_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_MONITOR_INTERVAL_SECONDS: u64 = 30;

#[derive(Clone, Debug)]
pub struct Config {
    captcha_port: u16,
    install_dir: PathBuf,
    lockfile: Option<PathBuf>,
    accounts_file: PathBuf,
    process_names: Vec<String>,
    system_identities: Vec<String>,
    request_timeout: Duration,
    captcha_timeout: Duration,
    restriction_timeout: Duration,
    monitor_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            captcha_port: DEFAULT_CAPTCHA_PORT,
            install_dir: PathBuf::from(DEFAULT_INSTALL_DIR),
            lockfile: None,
            accounts_file: default_accounts_file(),
            process_names: DEFAULT_PROCESS_NAMES.iter().map(ToString::to_string).collect(),
            system_identities: Vec::new(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECONDS),
            captcha_timeout: Duration::from_secs(DEFAULT_CAPTCHA_TIMEOUT_SECONDS),
            restriction_timeout: Duration::from_secs(DEFAULT_RESTRICTION_TIMEOUT_SECONDS),
            monitor_interval: Duration::from_secs(DEFAULT_MONITOR_INTERVAL_SECONDS),
        }
    }
}

#[must_use]
pub fn default_accounts_file() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(env!("CARGO_PKG_NAME"))
        .join("accounts.json")
}

impl Config {
    #[must_use]
    pub fn with_captcha_port(mut self, port: u16) -> Self {
        self.captcha_port = port;
        self
    }

    #[must_use]
    pub fn with_install_dir(mut self, dir: PathBuf) -> Self {
        self.install_dir = dir;
        self
    }

    #[must_use]
    pub fn with_lockfile(mut self, path: Option<PathBuf>) -> Self {
        self.lockfile = path;
        self
    }

    #[must_use]
    pub fn with_accounts_file(mut self, path: PathBuf) -> Self {
        self.accounts_file = path;
        self
    }

    #[must_use]
    pub fn with_process_names(mut self, names: Vec<String>) -> Self {
        self.process_names = names;
        self
    }

    /// Identities the monitor always logs out, such as the client's own
    /// service account.
    #[must_use]
    pub fn with_system_identities(mut self, identities: Vec<String>) -> Self {
        self.system_identities = identities;
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_captcha_timeout(mut self, timeout: Duration) -> Self {
        self.captcha_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_restriction_timeout(mut self, timeout: Duration) -> Self {
        self.restriction_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_monitor_interval(mut self, interval: Duration) -> Self {
        self.monitor_interval = interval;
        self
    }

    #[must_use]
    pub fn captcha_port(&self) -> u16 {
        self.captcha_port
    }

    #[must_use]
    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    #[must_use]
    pub fn lockfile(&self) -> Option<&Path> {
        self.lockfile.as_deref()
    }

    #[must_use]
    pub fn accounts_file(&self) -> &Path {
        &self.accounts_file
    }

    #[must_use]
    pub fn process_names(&self) -> &[String] {
        &self.process_names
    }

    #[must_use]
    pub fn system_identities(&self) -> &[String] {
        &self.system_identities
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    #[must_use]
    pub fn captcha_timeout(&self) -> Duration {
        self.captcha_timeout
    }

    #[must_use]
    pub fn restriction_timeout(&self) -> Duration {
        self.restriction_timeout
    }

    #[must_use]
    pub fn monitor_interval(&self) -> Duration {
        self.monitor_interval
    }
}
