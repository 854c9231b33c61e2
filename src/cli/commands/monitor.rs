use clap::{Arg, Command};

pub const ARG_EXPECTED_IDENTITY: &str = "expected-identity";

#[must_use]
pub fn subcommand() -> Command {
    Command::new("monitor")
        .about("Run the account monitor until interrupted")
        .arg(
            Arg::new(ARG_EXPECTED_IDENTITY)
                .long(ARG_EXPECTED_IDENTITY)
                .help("Identity (userinfo sub) that should hold the session; any other is logged out")
                .env("RSO_BRIDGE_EXPECTED_IDENTITY"),
        )
}
