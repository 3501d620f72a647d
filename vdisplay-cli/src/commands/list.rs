//! List command - show virtual outputs

use anyhow::Result;
use vdisplay_core::ipc::IpcClient;

/// List virtual outputs
pub async fn list(json: bool) -> Result<()> {
    let mut client = IpcClient::connect().await?;
    let outputs = client.list().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outputs)?);
        return Ok(());
    }

    if outputs.is_empty() {
        println!("No virtual outputs. Create one with:");
        println!("  vdisplay create XR-0:1920:1080:60");
        return Ok(());
    }

    println!(
        "{:<16} {:>16} {:>8} {:>6} {:>8} {:>5} {:>8}",
        "NAME", "MODE", "FB", "BUFFER", "POWER", "AR", "IDLE"
    );
    for o in outputs {
        let mode = format!("{}x{}@{}", o.width, o.height, o.refresh);
        let buffer = match (o.has_buffer, o.buffer_kind) {
            (true, Some(kind)) => kind.to_string(),
            _ => "none".to_string(),
        };
        println!(
            "{:<16} {:>16} {:>8} {:>6} {:>8} {:>5} {:>7.1}s",
            o.name,
            mode,
            o.framebuffer_id,
            buffer,
            o.power.to_string(),
            if o.ar_mode { "on" } else { "off" },
            o.idle_seconds
        );
    }
    Ok(())
}
