use crate::{
    auth::LoginRequest,
    cli::{actions::cancel_on_ctrl_c, globals::GlobalArgs},
    config::Config,
    context::Context,
};
use anyhow::{Context as _, Result};
use tracing::info;

#[derive(Debug)]
pub struct Args {
    pub config: Config,
    pub globals: GlobalArgs,
    pub remember: bool,
    pub language: String,
}

/// Execute the login action.
/// # Errors
/// Returns an error if sign-on fails or the account is permanently banned.
pub async fn execute(args: Args) -> Result<()> {
    let ctx = cancel_on_ctrl_c();
    let context = Context::new(args.config);

    let request = LoginRequest::new(args.globals.username, args.globals.password)
        .with_remember(args.remember)
        .with_language(args.language);

    let verdict = context
        .login(&ctx, &request)
        .await
        .context("sign-on failed")?;

    let identity = verdict.identity.as_deref().unwrap_or("unknown");
    info!(identity, restrictions = verdict.restrictions.len(), "signed in");
    println!("signed in as {identity}");

    for restriction in &verdict.restrictions {
        println!("restriction: {} ({})", restriction.kind, restriction.scope);
    }

    Ok(())
}
