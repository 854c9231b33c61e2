use crate::cli::{
    actions::Action,
    commands::{self, logging},
    dispatch, telemetry,
};
use anyhow::Result;

/// Parse the command line, install the subscriber and resolve the [`Action`]
/// the binary should run.
///
/// # Errors
/// Returns an error if telemetry cannot be initialized or the matches do not
/// map to an action.
pub fn start() -> Result<Action> {
    let matches = commands::new().get_matches();

    telemetry::init(logging::level(&matches))?;

    dispatch::handler(&matches)
}
