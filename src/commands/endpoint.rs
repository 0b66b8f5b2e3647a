use anyhow::Result;

use crate::cli::EndpointArgs;
use crate::config::HarnessConfig;
use crate::network::{ephemeral_address, ephemeral_host, ephemeral_port};

/// Print a listen endpoint that is free right now.
pub async fn cmd_endpoint(args: EndpointArgs, config: HarnessConfig) -> Result<()> {
    if args.loopback {
        let host = ephemeral_host();
        let port = ephemeral_port(Some(host), 0)?;
        println!("{}:{}", host, port);
    } else {
        let endpoint = ephemeral_address(&config.interface)?;
        println!("{}", endpoint);
    }
    Ok(())
}
