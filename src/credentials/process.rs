//! Process-table discovery of the local client's port and auth token.
//!
//! The client is launched with `--app-port=<port>` and
//! `--remoting-auth-token=<token>`. We first look the process up by its
//! executable name; if that fails every process command line is scanned by a
//! pool of workers, one partition each, and the first hit cancels the rest.

use regex::Regex;
use std::{ffi::OsStr, sync::Arc, time::Duration};
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};
use tokio::{
    sync::mpsc,
    task::JoinSet,
    time::{timeout_at, Instant},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

pub const DEFAULT_PROCESS_NAMES: [&str; 2] = ["RiotClientServices.exe", "RiotClientServices"];

const SCAN_TIMEOUT: Duration = Duration::from_secs(10);

/// Matches the two launch flags we need.
#[derive(Debug, Clone)]
pub struct FlagMatcher {
    port: Regex,
    token: Regex,
}

impl FlagMatcher {
    /// # Errors
    /// Returns an error if the flag patterns fail to compile.
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            port: Regex::new(r"--app-port=(\d+)")?,
            token: Regex::new(r#"--remoting-auth-token=([^\s"]+)"#)?,
        })
    }

    /// Extract `(port, token)` from a command line, only when both flags are present.
    #[must_use]
    pub fn extract(&self, command_line: &str) -> Option<(String, String)> {
        let port = self.port.captures(command_line)?.get(1)?.as_str();
        let token = self.token.captures(command_line)?.get(1)?.as_str();
        Some((port.to_string(), token.to_string()))
    }
}

fn snapshot() -> System {
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::All,
        true,
        ProcessRefreshKind::nothing().with_cmd(UpdateKind::Always),
    );
    system
}

fn join_cmd(cmd: &[std::ffi::OsString]) -> String {
    cmd.iter()
        .map(|arg| arg.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}

fn lookup_by_name(names: &[String], matcher: &FlagMatcher) -> (Option<(String, String)>, Vec<String>) {
    let system = snapshot();

    for name in names {
        for process in system.processes_by_exact_name(OsStr::new(name)) {
            if let Some(found) = matcher.extract(&join_cmd(process.cmd())) {
                debug!(pid = %process.pid(), name = %name, "client process found by name");
                return (Some(found), Vec::new());
            }
        }
    }

    let command_lines = system
        .processes()
        .values()
        .map(|process| join_cmd(process.cmd()))
        .filter(|line| !line.is_empty())
        .collect();

    (None, command_lines)
}

/// Pulls `(port, token)` out of one command line.
pub type Extract = Arc<dyn Fn(&str) -> Option<(String, String)> + Send + Sync>;

/// Scan `command_lines` across `workers` partitions; the first hit wins.
///
/// Cancelling `ctx` stops every in-flight partition.
pub async fn scan_partitioned(
    command_lines: Vec<String>,
    extract: Extract,
    workers: usize,
    ctx: &CancellationToken,
) -> Option<(String, String)> {
    if command_lines.is_empty() {
        return None;
    }

    let workers = workers.clamp(1, command_lines.len());
    let chunk_size = command_lines.len().div_ceil(workers);
    let group = ctx.child_token();
    let (tx, mut rx) = mpsc::channel(1);
    let mut tasks = JoinSet::new();

    for chunk in command_lines.chunks(chunk_size) {
        let partition = chunk.to_vec();
        let extract = extract.clone();
        let cancel = group.clone();
        let tx = tx.clone();

        tasks.spawn_blocking(move || {
            for line in &partition {
                if cancel.is_cancelled() {
                    return;
                }
                if let Some(found) = extract(line) {
                    // Only the first sender wins the slot.
                    if tx.try_send(found).is_ok() {
                        cancel.cancel();
                    }
                    return;
                }
            }
        });
    }
    drop(tx);

    let result = tokio::select! {
        found = rx.recv() => found,
        () = group.cancelled() => rx.try_recv().ok(),
    };

    group.cancel();
    while tasks.join_next().await.is_some() {}

    result
}

/// [`scan_partitioned`] bounded by `deadline`.
///
/// The workers get their own token, cancelled on every return path, including
/// a deadline that drops the scan mid-flight.
pub async fn scan_until(
    command_lines: Vec<String>,
    extract: Extract,
    workers: usize,
    ctx: &CancellationToken,
    deadline: Instant,
) -> Option<(String, String)> {
    let scan_ctx = ctx.child_token();
    let _stop_workers = scan_ctx.clone().drop_guard();

    let scan = scan_partitioned(command_lines, extract, workers, &scan_ctx);
    timeout_at(deadline, scan).await.unwrap_or_else(|_| {
        warn!("process scan deadline reached");
        None
    })
}

/// Find the client's `(port, token)` from the process table.
#[instrument(skip(ctx))]
pub async fn find_credentials(names: &[String], ctx: &CancellationToken) -> Option<(String, String)> {
    let matcher = match FlagMatcher::new() {
        Ok(matcher) => Arc::new(matcher),
        Err(err) => {
            warn!("failed to compile flag matcher: {err}");
            return None;
        }
    };

    let deadline = Instant::now() + SCAN_TIMEOUT;

    let lookup = {
        let names = names.to_vec();
        let matcher = matcher.clone();
        tokio::task::spawn_blocking(move || lookup_by_name(&names, &matcher))
    };

    let (found, command_lines) = tokio::select! {
        result = timeout_at(deadline, lookup) => match result {
            Ok(Ok(lookup)) => lookup,
            Ok(Err(err)) => {
                warn!("process lookup task failed: {err}");
                return None;
            }
            Err(_) => {
                warn!("process lookup timed out after {:?}", SCAN_TIMEOUT);
                return None;
            }
        },
        () = ctx.cancelled() => return None,
    };

    if found.is_some() {
        return found;
    }

    debug!(
        processes = command_lines.len(),
        "client not found by name, scanning all command lines"
    );

    let workers = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
    let extract: Extract = Arc::new(move |line: &str| matcher.extract(line));
    scan_until(command_lines, extract, workers, ctx, deadline).await
}

/// Whether any process with one of `names` is running.
pub async fn is_running(names: &[String]) -> bool {
    let names = names.to_vec();
    tokio::task::spawn_blocking(move || {
        let mut system = System::new();
        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing(),
        );
        names
            .iter()
            .any(|name| system.processes_by_exact_name(OsStr::new(name)).next().is_some())
    })
    .await
    .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::sleep;

    #[test]
    fn extract_requires_both_flags() -> Result<()> {
        let matcher = FlagMatcher::new()?;
        assert_eq!(
            matcher.extract("RiotClientServices.exe --app-port=50123 --remoting-auth-token=abc_DEF-1"),
            Some(("50123".to_string(), "abc_DEF-1".to_string()))
        );
        assert_eq!(matcher.extract("client --app-port=50123"), None);
        assert_eq!(matcher.extract("client --remoting-auth-token=abc"), None);
        Ok(())
    }

    #[test]
    fn extract_stops_at_quote() -> Result<()> {
        let matcher = FlagMatcher::new()?;
        assert_eq!(
            matcher.extract(r#""--remoting-auth-token=tok" "--app-port=1""#),
            Some(("1".to_string(), "tok".to_string()))
        );
        Ok(())
    }

    fn flags() -> Result<Extract> {
        let matcher = FlagMatcher::new()?;
        Ok(Arc::new(move |line: &str| matcher.extract(line)))
    }

    // Sleeps per line and counts what it has seen, so a test can tell whether
    // workers are still running.
    fn slow(seen: Arc<AtomicUsize>) -> Extract {
        Arc::new(move |_line: &str| {
            seen.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(1));
            None
        })
    }

    fn filler(count: usize) -> Vec<String> {
        (0..count).map(|i| format!("proc-{i} --flag")).collect()
    }

    async fn assert_workers_stopped(seen: &AtomicUsize, total: usize) {
        sleep(Duration::from_millis(50)).await;
        let settled = seen.load(Ordering::SeqCst);
        sleep(Duration::from_millis(100)).await;
        assert_eq!(seen.load(Ordering::SeqCst), settled, "workers kept scanning");
        assert!(settled < total);
    }

    #[tokio::test]
    async fn scan_partitioned_finds_hit_in_any_partition() -> Result<()> {
        let mut lines = filler(200);
        lines.push("client --app-port=7777 --remoting-auth-token=secret".to_string());

        let ctx = CancellationToken::new();
        let found = scan_partitioned(lines, flags()?, 4, &ctx).await;
        assert_eq!(found, Some(("7777".to_string(), "secret".to_string())));
        Ok(())
    }

    #[tokio::test]
    async fn scan_partitioned_returns_none_without_hit() -> Result<()> {
        let lines: Vec<String> = (0..50).map(|i| format!("proc-{i}")).collect();

        let ctx = CancellationToken::new();
        assert_eq!(scan_partitioned(lines, flags()?, 8, &ctx).await, None);
        Ok(())
    }

    #[tokio::test]
    async fn scan_partitioned_honours_cancellation() -> Result<()> {
        let lines = vec!["client --app-port=1 --remoting-auth-token=t".to_string()];

        let ctx = CancellationToken::new();
        ctx.cancel();
        assert_eq!(scan_partitioned(lines, flags()?, 2, &ctx).await, None);
        Ok(())
    }

    #[tokio::test]
    async fn cancelling_mid_scan_stops_every_partition() {
        let total = 20_000;
        let seen = Arc::new(AtomicUsize::new(0));
        let ctx = CancellationToken::new();

        tokio::spawn({
            let ctx = ctx.clone();
            async move {
                sleep(Duration::from_millis(30)).await;
                ctx.cancel();
            }
        });

        let found = scan_partitioned(filler(total), slow(seen.clone()), 4, &ctx).await;
        assert_eq!(found, None);
        assert_workers_stopped(&seen, total).await;
    }

    #[tokio::test]
    async fn deadline_stops_every_partition() {
        let total = 20_000;
        let seen = Arc::new(AtomicUsize::new(0));
        let ctx = CancellationToken::new();
        let deadline = Instant::now() + Duration::from_millis(30);

        let found = scan_until(filler(total), slow(seen.clone()), 4, &ctx, deadline).await;
        assert_eq!(found, None);
        assert!(!ctx.is_cancelled());
        assert_workers_stopped(&seen, total).await;
    }

    #[tokio::test]
    async fn is_running_is_false_for_unknown_process() {
        let names = vec!["definitely-not-a-real-process-name".to_string()];
        assert!(!is_running(&names).await);
    }
}
