use crate::{cli::actions::cancel_on_ctrl_c, config::Config, context::Context};
use anyhow::{Context as _, Result};

#[derive(Debug)]
pub struct Args {
    pub config: Config,
}

/// Delete the current authentication session.
/// # Errors
/// Returns an error if the client cannot be reached or rejects the logout.
pub async fn execute(args: Args) -> Result<()> {
    let ctx = cancel_on_ctrl_c();
    let context = Context::new(args.config);

    context
        .session()
        .ensure_initialized(&ctx)
        .await
        .context("could not reach the local client")?;
    context.orchestrator().logout(&ctx).await?;

    println!("logged out");
    Ok(())
}
