use clap::{Arg, ArgAction, Command};

pub const ARG_USERNAME: &str = "username";
pub const ARG_PASSWORD: &str = "password";
pub const ARG_REMEMBER: &str = "remember";
pub const ARG_LANGUAGE: &str = "language";

#[must_use]
pub fn subcommand() -> Command {
    Command::new("login")
        .about("Sign in through the captcha bridge, then check account restrictions")
        .arg(
            Arg::new(ARG_USERNAME)
                .short('u')
                .long(ARG_USERNAME)
                .help("Account username")
                .env("RSO_BRIDGE_USERNAME")
                .required(true),
        )
        .arg(
            Arg::new(ARG_PASSWORD)
                .long(ARG_PASSWORD)
                .help("Account password")
                .env("RSO_BRIDGE_PASSWORD")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_REMEMBER)
                .long(ARG_REMEMBER)
                .help("Ask the client to persist the session")
                .env("RSO_BRIDGE_REMEMBER")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(ARG_LANGUAGE)
                .long(ARG_LANGUAGE)
                .help("Sign-on language")
                .env("RSO_BRIDGE_LANGUAGE")
                .default_value("en_US"),
        )
}
