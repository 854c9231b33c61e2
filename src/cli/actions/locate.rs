use crate::{
    cli::actions::cancel_on_ctrl_c, config::Config, credentials::Locator,
};
use anyhow::{Context, Result};

#[derive(Debug)]
pub struct Args {
    pub config: Config,
}

/// Print the discovered local API endpoint. The auth header is never printed.
/// # Errors
/// Returns an error if no credentials can be found.
pub async fn execute(args: Args) -> Result<()> {
    let ctx = cancel_on_ctrl_c();

    let credentials = Locator::new(&args.config)
        .locate(&ctx)
        .await
        .context("could not locate the local client")?;

    println!("port: {}", credentials.port());
    println!("url: {}", credentials.base_url());
    println!("authorization: Basic ***");

    Ok(())
}
