//! Credential Locator: resolves the local client API's port and auth token.
//!
//! Strategy order:
//! 1. the session artifact (`lockfile`) in a fixed list of locations;
//! 2. the process table, by executable name first and then by a partitioned
//!    scan of every command line.
//!
//! Credentials are re-derived on every (re)initialization and never persisted.

pub mod lockfile;
pub mod process;

use crate::{
    config::Config,
    error::{Error, Result},
};
use base64ct::{Base64, Encoding};
use secrecy::{ExposeSecret, SecretString};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

pub const AUTH_USER: &str = "riot";

const DEFAULT_PROTOCOL: &str = "https";

#[derive(Debug, Clone)]
pub struct Credentials {
    port: String,
    auth_header_value: SecretString,
    protocol: &'static str,
}

impl Credentials {
    /// Derive credentials from the client's port and per-session password.
    #[must_use]
    pub fn new(port: impl Into<String>, password: &str) -> Self {
        let blob = Base64::encode_string(format!("{AUTH_USER}:{password}").as_bytes());
        Self {
            port: port.into(),
            auth_header_value: SecretString::from(blob),
            protocol: DEFAULT_PROTOCOL,
        }
    }

    /// Use the scheme advertised by the lockfile. Anything but plain `http`
    /// keeps TLS.
    #[must_use]
    pub fn with_protocol(mut self, protocol: &str) -> Self {
        self.protocol = if protocol.eq_ignore_ascii_case("http") {
            "http"
        } else {
            DEFAULT_PROTOCOL
        };
        self
    }

    #[must_use]
    pub fn port(&self) -> &str {
        &self.port
    }

    /// The base64 `user:password` blob, without the `Basic ` prefix.
    #[must_use]
    pub fn auth_header_value(&self) -> &SecretString {
        &self.auth_header_value
    }

    #[must_use]
    pub fn authorization(&self) -> String {
        format!("Basic {}", self.auth_header_value.expose_secret())
    }

    #[must_use]
    pub fn base_url(&self) -> String {
        format!("{}://127.0.0.1:{}", self.protocol, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct Locator {
    lockfile_paths: Vec<PathBuf>,
    process_names: Vec<String>,
}

impl Locator {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        let lockfile_paths = match config.lockfile() {
            Some(path) => vec![path.to_path_buf()],
            None => lockfile::candidate_paths(config.install_dir()),
        };

        Self {
            lockfile_paths,
            process_names: config.process_names().to_vec(),
        }
    }

    #[must_use]
    pub fn with_lockfile_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.lockfile_paths = paths;
        self
    }

    #[must_use]
    pub fn with_process_names(mut self, names: Vec<String>) -> Self {
        self.process_names = names;
        self
    }

    #[must_use]
    pub fn process_names(&self) -> &[String] {
        &self.process_names
    }

    /// Resolve `(port, token)`.
    ///
    /// # Errors
    /// Returns `CredentialNotFound` once both the lockfile and the process scan
    /// are exhausted, or `Cancelled` if `ctx` fires first.
    #[instrument(skip_all)]
    pub async fn locate(&self, ctx: &CancellationToken) -> Result<Credentials> {
        if let Some(record) = lockfile::read_first(&self.lockfile_paths).await {
            info!(port = %record.port, "credentials found in lockfile");
            let credentials = Credentials::new(record.port, &record.password);
            return Ok(credentials.with_protocol(&record.protocol));
        }

        debug!("no usable lockfile, falling back to process scan");

        if ctx.is_cancelled() {
            return Err(Error::Cancelled);
        }

        match process::find_credentials(&self.process_names, ctx).await {
            Some((port, token)) => {
                info!(port = %port, "credentials found in process command line");
                Ok(Credentials::new(port, &token))
            }
            None if ctx.is_cancelled() => Err(Error::Cancelled),
            None => Err(Error::CredentialNotFound),
        }
    }
}
