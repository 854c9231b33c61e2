//! Session artifact (`lockfile`) written by the running client.
//!
//! The file holds a single colon-delimited record `name:pid:port:password:protocol`.
//! The name and pid are ignored.

use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

pub const LOCKFILE_NAME: &str = "lockfile";

const MIN_FIELDS: usize = 5;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub port: String,
    pub password: String,
    pub protocol: String,
}

/// Parse a lockfile record.
///
/// Records with fewer than five fields, or an empty port/password, are treated
/// as absent.
#[must_use]
pub fn parse(content: &str) -> Option<Record> {
    let fields: Vec<&str> = content.trim().split(':').collect();
    if fields.len() < MIN_FIELDS {
        return None;
    }

    let port = fields[2].trim();
    let password = fields[3].trim();
    if port.is_empty() || password.is_empty() {
        return None;
    }

    Some(Record {
        port: port.to_string(),
        password: password.to_string(),
        protocol: fields[4].trim().to_string(),
    })
}

/// Lockfile locations in preference order: install directory config, per-user
/// local data directory, then the home directory fallback.
#[must_use]
pub fn candidate_paths(install_dir: &Path) -> Vec<PathBuf> {
    let mut paths = vec![install_dir.join("Config").join(LOCKFILE_NAME)];

    if let Some(local) = dirs::data_local_dir() {
        paths.push(client_config_dir(&local).join(LOCKFILE_NAME));
    }

    if let Some(home) = dirs::home_dir() {
        let fallback = client_config_dir(&home.join("AppData").join("Local")).join(LOCKFILE_NAME);
        if !paths.contains(&fallback) {
            paths.push(fallback);
        }
    }

    paths
}

fn client_config_dir(base: &Path) -> PathBuf {
    base.join("Riot Games").join("Riot Client").join("Config")
}

/// Return the first parseable lockfile record among `paths`.
#[instrument(skip_all)]
pub async fn read_first(paths: &[PathBuf]) -> Option<Record> {
    for path in paths {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(err) => {
                debug!(path = %path.display(), "lockfile not readable: {err}");
                continue;
            }
        };

        if let Some(record) = parse(&content) {
            debug!(path = %path.display(), "lockfile found");
            return Some(record);
        }

        debug!(path = %path.display(), "lockfile malformed, ignoring");
    }

    None
}
