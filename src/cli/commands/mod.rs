pub mod client;
pub mod logging;
pub mod login;
pub mod monitor;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    ColorChoice, Command,
};

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("rso-bridge")
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(login::subcommand())
        .subcommand(monitor::subcommand())
        .subcommand(
            Command::new("locate").about("Discover the local client port and credentials"),
        )
        .subcommand(Command::new("logout").about("Delete the current authentication session"));

    let command = client::with_args(command);
    logging::with_args(command)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::time::Duration;

    #[test]
    fn test_new() {
        let command = new();

        assert_eq!(command.get_name(), "rso-bridge");
        assert_eq!(
            command.get_about().map(ToString::to_string),
            Some(env!("CARGO_PKG_DESCRIPTION").to_string())
        );
        assert_eq!(
            command.get_version().map(ToString::to_string),
            Some(env!("CARGO_PKG_VERSION").to_string())
        );
    }

    #[test]
    fn test_login_args() {
        let matches = new().get_matches_from(vec![
            "rso-bridge",
            "login",
            "--username",
            "player",
            "--password",
            "hunter2",
            "--remember",
        ]);

        let Some(("login", sub)) = matches.subcommand() else {
            panic!("expected login subcommand");
        };
        assert_eq!(
            sub.get_one::<String>(login::ARG_USERNAME).cloned(),
            Some("player".to_string())
        );
        assert_eq!(
            sub.get_one::<String>(login::ARG_PASSWORD).cloned(),
            Some("hunter2".to_string())
        );
        assert!(sub.get_flag(login::ARG_REMEMBER));
        assert_eq!(
            sub.get_one::<String>(login::ARG_LANGUAGE).cloned(),
            Some("en_US".to_string())
        );
    }

    #[test]
    fn test_defaults() -> Result<()> {
        let matches = new().get_matches_from(vec!["rso-bridge", "locate"]);
        let config = client::config(&matches)?;

        assert_eq!(config.captcha_port(), 6969);
        assert_eq!(config.captcha_timeout(), Duration::from_secs(300));
        assert_eq!(config.restriction_timeout(), Duration::from_secs(30));
        assert_eq!(config.monitor_interval(), Duration::from_secs(30));
        assert!(config.lockfile().is_none());
        Ok(())
    }

    #[test]
    fn test_global_args_after_subcommand() -> Result<()> {
        let matches = new().get_matches_from(vec![
            "rso-bridge",
            "monitor",
            "--captcha-port",
            "7000",
            "--monitor-interval-seconds",
            "5",
            "--lockfile",
            "/tmp/lockfile",
        ]);
        let config = client::config(&matches)?;

        assert_eq!(config.captcha_port(), 7000);
        assert_eq!(config.monitor_interval(), Duration::from_secs(5));
        assert_eq!(
            config.lockfile().map(|p| p.display().to_string()),
            Some("/tmp/lockfile".to_string())
        );
        Ok(())
    }

    #[test]
    fn test_monitor_identities() -> Result<()> {
        let matches = new().get_matches_from(vec![
            "rso-bridge",
            "monitor",
            "--expected-identity",
            "puuid-1",
            "--system-identity",
            "system-a,system-b",
            "--system-identity",
            "system-c",
        ]);
        let config = client::config(&matches)?;

        assert_eq!(
            config.system_identities(),
            ["system-a", "system-b", "system-c"]
        );
        assert_eq!(
            matches
                .subcommand_matches("monitor")
                .and_then(|m| m.get_one::<String>(monitor::ARG_EXPECTED_IDENTITY).cloned()),
            Some("puuid-1".to_string())
        );
        Ok(())
    }

    #[test]
    fn test_check_env() {
        temp_env::with_vars(
            [
                ("RSO_BRIDGE_USERNAME", Some("player")),
                ("RSO_BRIDGE_PASSWORD", Some("hunter2")),
                ("RSO_BRIDGE_CAPTCHA_PORT", Some("7070")),
                ("RSO_BRIDGE_ACCOUNTS_FILE", Some("/tmp/accounts.json")),
                ("RSO_BRIDGE_LOG_LEVEL", Some("info")),
            ],
            || {
                let matches = new().get_matches_from(vec!["rso-bridge", "login"]);
                assert_eq!(matches.get_one::<u16>("captcha-port").copied(), Some(7070));
                assert_eq!(
                    matches.get_one::<String>("accounts-file").cloned(),
                    Some("/tmp/accounts.json".to_string())
                );
                assert_eq!(matches.get_one::<u8>("verbosity").copied(), Some(2));

                let login = matches.subcommand_matches("login");
                assert_eq!(
                    login.and_then(|m| m.get_one::<String>("username").cloned()),
                    Some("player".to_string())
                );
            },
        );
    }

    #[test]
    fn test_check_log_level_env() {
        // loop cover all possible value_parse
        let levels = ["error", "warn", "info", "debug", "trace"];
        for (index, &level) in levels.iter().enumerate() {
            temp_env::with_vars([("RSO_BRIDGE_LOG_LEVEL", Some(level))], || {
                let matches = new().get_matches_from(vec!["rso-bridge", "logout"]);
                assert_eq!(
                    matches.get_one::<u8>("verbosity").copied(),
                    u8::try_from(index).ok()
                );
            });
        }
    }

    #[test]
    fn test_login_requires_credentials() {
        temp_env::with_vars_unset(["RSO_BRIDGE_USERNAME", "RSO_BRIDGE_PASSWORD"], || {
            let result = new().try_get_matches_from(vec!["rso-bridge", "login"]);
            assert!(result.is_err());
        });
    }
}
