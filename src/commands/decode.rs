use anyhow::{Context, Result};
use std::io::Read;

use crate::cli::DecodeArgs;

/// Decode captured client output and print it as JSON.
pub async fn cmd_decode(args: DecodeArgs) -> Result<()> {
    let raw = match &args.input {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("reading stdin")?;
            buf
        }
    };

    let record = io_proto::decode(&args.op, &raw)?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}
