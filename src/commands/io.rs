use anyhow::{Context, Result};
use tracing::debug;

use crate::cli::IoArgs;
use crate::client::{Client, FwdClient};
use crate::config::HarnessConfig;
use crate::workspace::Workspace;

/// Run one client operation against the daemon of `args.workdir` and print
/// the decoded record as JSON.
pub async fn cmd_io(args: IoArgs, config: HarnessConfig) -> Result<()> {
    let workspace = Workspace::from_config(&args.workdir, &config)
        .with_context(|| format!("opening workspace {}", args.workdir.display()))?;

    let result = match &args.forwarding_id {
        Some(identifier) => {
            let client = FwdClient::new(&workspace, &config, identifier)?;
            debug!(map = %client.map_path().display(), "using forwarding client");
            client.run_named(&args.op, &args.args).await?
        }
        None => {
            let client = Client::new(&workspace, &config)?;
            client.run_named(&args.op, &args.args).await?
        }
    };

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
