//! Status command - show the daemon's state

use anyhow::Result;
use vdisplay_core::ipc::{IpcClient, daemon_running};

/// Show daemon status
pub async fn status() -> Result<()> {
    if !daemon_running().await {
        println!("vdisplay daemon is not running");
        println!();
        println!("Start it with: vdisplay serve");
        return Ok(());
    }

    let mut client = IpcClient::connect().await?;
    let status = client.status().await?;

    println!("vdisplay - Status\n");
    println!("  Manager:       {}", status.manager);
    println!("  Outputs:       {}", status.outputs);
    println!("  Backend:       {}", status.backend);
    println!("  Resize policy: {}", status.resize_policy);
    println!("  Idle timeout:  {:.1}s", status.idle_timeout_secs);
    println!("  Uptime:        {}s", status.uptime_secs);
    Ok(())
}
