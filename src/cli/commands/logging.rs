use clap::{builder::ValueParser, Arg, ArgAction, ArgMatches, Command};
use tracing::Level;

pub const ARG_VERBOSITY: &str = "verbosity";

const LEVEL_NAMES: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Accepts a level name or its index in `error..trace`, so the environment
/// can stand in for repeated `-v` flags.
#[must_use]
pub fn level_parser() -> ValueParser {
    ValueParser::from(|value: &str| -> Result<u8, String> {
        let value = value.trim().to_ascii_lowercase();
        LEVEL_NAMES
            .iter()
            .position(|name| *name == value)
            .or_else(|| {
                value
                    .parse::<usize>()
                    .ok()
                    .filter(|index| *index < LEVEL_NAMES.len())
            })
            .and_then(|index| u8::try_from(index).ok())
            .ok_or_else(|| format!("expected one of: {}", LEVEL_NAMES.join(", ")))
    })
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_VERBOSITY)
            .short('v')
            .long("verbose")
            .help("Log verbosity: -v warn, -vv info, -vvv debug, -vvvv trace (default: error)")
            .env("RSO_BRIDGE_LOG_LEVEL")
            .global(true)
            .action(ArgAction::Count)
            .value_parser(level_parser()),
    )
}

/// The level picked on the command line; `None` leaves the error-only default.
#[must_use]
pub fn level(matches: &ArgMatches) -> Option<Level> {
    match matches.get_one::<u8>(ARG_VERBOSITY).copied().unwrap_or(0) {
        0 => None,
        1 => Some(Level::WARN),
        2 => Some(Level::INFO),
        3 => Some(Level::DEBUG),
        _ => Some(Level::TRACE),
    }
}
