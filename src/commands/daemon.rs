use anyhow::{Context, Result};
use serde_json::json;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};

use crate::cli::DaemonArgs;
use crate::config::HarnessConfig;
use crate::daemon::{Daemon, DaemonFlavor};
use crate::utils::is_process_alive;
use crate::workspace::Workspace;

/// Start a daemon in `args.workdir`, print its endpoint and block until
/// SIGTERM/SIGINT or until the daemon exits on its own.
pub async fn cmd_daemon(args: DaemonArgs, config: HarnessConfig) -> Result<()> {
    let workspace = Workspace::from_config(&args.workdir, &config)
        .with_context(|| format!("preparing workspace {}", args.workdir.display()))?;

    let flavor = if args.forwarding {
        DaemonFlavor::Forwarding
    } else {
        DaemonFlavor::Standard
    };

    let mut daemon = Daemon::start(flavor, &workspace, &config)
        .await
        .context("starting daemon")?;

    let pid = daemon.pid().unwrap_or_default();
    println!(
        "{}",
        json!({
            "pid": pid,
            "endpoint": daemon.endpoint().to_string(),
            "hosts_file": daemon.hosts_file(),
            "log": daemon.log_path(),
            "mountdir": workspace.mount_dir(),
        })
    );

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut liveness = tokio::time::interval(Duration::from_secs(1));

    tokio::select! {
        _ = sigterm.recv() => {
            info!("received SIGTERM, shutting down daemon");
        }
        _ = sigint.recv() => {
            info!("received SIGINT, shutting down daemon");
        }
        _ = async {
            loop {
                liveness.tick().await;
                if !is_process_alive(pid) {
                    break;
                }
            }
        } => {
            warn!(pid, "daemon exited unexpectedly");
        }
    }

    daemon.shutdown().await.context("stopping daemon")?;
    info!(state = ?daemon.state(), "daemon stopped");
    Ok(())
}
