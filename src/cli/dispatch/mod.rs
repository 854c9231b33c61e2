//! Maps validated CLI matches to an [`Action`].

use crate::cli::{
    actions::{locate, login, logout, monitor, Action},
    commands::{client, login as login_args, monitor as monitor_args},
    globals::GlobalArgs,
};
use anyhow::{anyhow, Context, Result};
use secrecy::SecretString;

/// # Errors
/// Returns an error if required arguments are missing or no subcommand was given.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let config = client::config(matches)?;

    match matches.subcommand() {
        Some(("login", sub_m)) => {
            let username = sub_m
                .get_one::<String>(login_args::ARG_USERNAME)
                .cloned()
                .context("missing required argument: --username")?;
            let password = sub_m
                .get_one::<String>(login_args::ARG_PASSWORD)
                .cloned()
                .context("missing required argument: --password")?;

            let mut globals = GlobalArgs::new(username);
            globals.set_password(SecretString::from(password));

            Ok(Action::Login(login::Args {
                config,
                globals,
                remember: sub_m.get_flag(login_args::ARG_REMEMBER),
                language: sub_m
                    .get_one::<String>(login_args::ARG_LANGUAGE)
                    .cloned()
                    .unwrap_or_else(|| "en_US".to_string()),
            }))
        }
        Some(("monitor", sub_m)) => Ok(Action::Monitor(monitor::Args {
            config,
            expected_identity: sub_m
                .get_one::<String>(monitor_args::ARG_EXPECTED_IDENTITY)
                .cloned(),
        })),
        Some(("locate", _)) => Ok(Action::Locate(locate::Args { config })),
        Some(("logout", _)) => Ok(Action::Logout(logout::Args { config })),
        Some((other, _)) => Err(anyhow!("unknown subcommand: {other}")),
        None => Err(anyhow!("missing subcommand")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands;
    use secrecy::ExposeSecret;

    #[test]
    fn test_login_action() -> Result<()> {
        let matches = commands::new().get_matches_from(vec![
            "rso-bridge",
            "--captcha-port",
            "7000",
            "login",
            "--username",
            "player",
            "--password",
            "hunter2",
        ]);

        let Action::Login(args) = handler(&matches)? else {
            return Err(anyhow!("expected login action"));
        };
        assert_eq!(args.globals.username, "player");
        assert_eq!(args.globals.password.expose_secret(), "hunter2");
        assert!(!args.remember);
        assert_eq!(args.config.captcha_port(), 7000);
        Ok(())
    }

    #[test]
    fn test_monitor_action_without_expected_identity() -> Result<()> {
        temp_env::with_vars_unset(["RSO_BRIDGE_EXPECTED_IDENTITY"], || {
            let matches = commands::new().get_matches_from(vec!["rso-bridge", "monitor"]);
            let Action::Monitor(args) = handler(&matches)? else {
                return Err(anyhow!("expected monitor action"));
            };
            assert_eq!(args.expected_identity, None);
            Ok(())
        })
    }

    #[test]
    fn test_simple_actions() -> Result<()> {
        for (name, expected) in [("monitor", "Monitor"), ("locate", "Locate"), ("logout", "Logout")] {
            let matches = commands::new().get_matches_from(vec!["rso-bridge", name]);
            let action = handler(&matches)?;
            assert!(format!("{action:?}").starts_with(expected));
        }
        Ok(())
    }
}
