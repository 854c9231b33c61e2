use crate::config::{Config, DEFAULT_INSTALL_DIR};
use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::{path::PathBuf, time::Duration};

pub const ARG_CAPTCHA_PORT: &str = "captcha-port";
pub const ARG_INSTALL_DIR: &str = "install-dir";
pub const ARG_LOCKFILE: &str = "lockfile";
pub const ARG_ACCOUNTS_FILE: &str = "accounts-file";
pub const ARG_CAPTCHA_TIMEOUT: &str = "captcha-timeout-seconds";
pub const ARG_RESTRICTION_TIMEOUT: &str = "restriction-timeout-seconds";
pub const ARG_MONITOR_INTERVAL: &str = "monitor-interval-seconds";
pub const ARG_SYSTEM_IDENTITY: &str = "system-identity";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_CAPTCHA_PORT)
                .long(ARG_CAPTCHA_PORT)
                .help("Loopback port for the captcha bridge")
                .env("RSO_BRIDGE_CAPTCHA_PORT")
                .default_value("6969")
                .global(true)
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_INSTALL_DIR)
                .long(ARG_INSTALL_DIR)
                .help("Client install directory, searched first for the lockfile")
                .env("RSO_BRIDGE_INSTALL_DIR")
                .default_value(DEFAULT_INSTALL_DIR)
                .global(true),
        )
        .arg(
            Arg::new(ARG_LOCKFILE)
                .long(ARG_LOCKFILE)
                .help("Explicit lockfile path, skips the default search order")
                .env("RSO_BRIDGE_LOCKFILE")
                .global(true),
        )
        .arg(
            Arg::new(ARG_ACCOUNTS_FILE)
                .long(ARG_ACCOUNTS_FILE)
                .help("JSON file where permanently banned accounts are recorded")
                .env("RSO_BRIDGE_ACCOUNTS_FILE")
                .global(true),
        )
        .arg(
            Arg::new(ARG_CAPTCHA_TIMEOUT)
                .long(ARG_CAPTCHA_TIMEOUT)
                .help("How long to wait for a solved captcha")
                .env("RSO_BRIDGE_CAPTCHA_TIMEOUT_SECONDS")
                .default_value("300")
                .global(true)
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_RESTRICTION_TIMEOUT)
                .long(ARG_RESTRICTION_TIMEOUT)
                .help("Deadline for the post-login restriction verdict")
                .env("RSO_BRIDGE_RESTRICTION_TIMEOUT_SECONDS")
                .default_value("30")
                .global(true)
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_MONITOR_INTERVAL)
                .long(ARG_MONITOR_INTERVAL)
                .help("Account monitor tick interval")
                .env("RSO_BRIDGE_MONITOR_INTERVAL_SECONDS")
                .default_value("30")
                .global(true)
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_SYSTEM_IDENTITY)
                .long(ARG_SYSTEM_IDENTITY)
                .help("Identity (userinfo sub) the monitor always logs out; repeatable")
                .env("RSO_BRIDGE_SYSTEM_IDENTITY")
                .value_delimiter(',')
                .action(ArgAction::Append)
                .global(true),
        )
}

/// Build the runtime [`Config`] from parsed matches.
///
/// # Errors
/// Returns an error if a defaulted argument is missing.
pub fn config(matches: &ArgMatches) -> Result<Config> {
    let seconds = |name: &str| -> Result<Duration> {
        matches
            .get_one::<u64>(name)
            .copied()
            .map(Duration::from_secs)
            .with_context(|| format!("missing required argument: --{name}"))
    };

    let mut config = Config::default()
        .with_captcha_port(
            matches
                .get_one::<u16>(ARG_CAPTCHA_PORT)
                .copied()
                .context("missing required argument: --captcha-port")?,
        )
        .with_lockfile(matches.get_one::<String>(ARG_LOCKFILE).map(PathBuf::from))
        .with_captcha_timeout(seconds(ARG_CAPTCHA_TIMEOUT)?)
        .with_restriction_timeout(seconds(ARG_RESTRICTION_TIMEOUT)?)
        .with_monitor_interval(seconds(ARG_MONITOR_INTERVAL)?)
        .with_system_identities(
            matches
                .get_many::<String>(ARG_SYSTEM_IDENTITY)
                .map(|ids| ids.filter(|id| !id.is_empty()).cloned().collect())
                .unwrap_or_default(),
        );

    if let Some(dir) = matches.get_one::<String>(ARG_INSTALL_DIR) {
        config = config.with_install_dir(PathBuf::from(dir));
    }

    if let Some(path) = matches.get_one::<String>(ARG_ACCOUNTS_FILE) {
        config = config.with_accounts_file(PathBuf::from(path));
    }

    Ok(config)
}
