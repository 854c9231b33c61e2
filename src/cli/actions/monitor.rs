use crate::{cli::actions::cancel_on_ctrl_c, config::Config, context::Context};
use anyhow::Result;
use tracing::info;

#[derive(Debug)]
pub struct Args {
    pub config: Config,
    pub expected_identity: Option<String>,
}

/// Run the account monitor until Ctrl-C.
/// # Errors
/// Never fails once started; tick failures are logged by the monitor.
pub async fn execute(args: Args) -> Result<()> {
    let ctx = cancel_on_ctrl_c();
    let context = Context::new(args.config);

    if let Some(identity) = &args.expected_identity {
        info!(identity = %identity, "monitoring for identities other than the expected one");
    }
    context.monitor().set_expected_identity(args.expected_identity);

    context.monitor().start();
    ctx.cancelled().await;
    context.monitor().stop().await;

    Ok(())
}
