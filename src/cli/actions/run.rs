use crate::cli::actions::{locate, login, logout, monitor, Action};
use anyhow::Result;

/// Execute the provided action.
// This is the single dispatch point for all CLI actions.
/// # Errors
/// Returns an error if the action fails.
pub async fn execute(action: Action) -> Result<()> {
    match action {
        Action::Login(args) => login::execute(args).await,
        Action::Monitor(args) => monitor::execute(args).await,
        Action::Locate(args) => locate::execute(args).await,
        Action::Logout(args) => logout::execute(args).await,
    }
}
