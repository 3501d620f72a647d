//! Commands that forward a single request to the daemon

use anyhow::Result;
use clap::Args;
use vdisplay_core::ipc::IpcClient;

/// Arguments for the resize command
#[derive(Args)]
pub struct ResizeArgs {
    /// Output name
    pub name: String,

    /// New width in pixels
    pub width: u32,

    /// New height in pixels
    pub height: u32,

    /// New refresh rate in Hz (default: keep current)
    #[arg(short, long)]
    pub refresh: Option<u32>,
}

/// Create a virtual output
pub async fn create(spec: &str) -> Result<()> {
    let mut client = IpcClient::connect().await?;
    client.create(spec).await?;
    let name = spec.split(':').next().unwrap_or(spec);
    let id = client.framebuffer(name).await?;
    println!("Created {} (framebuffer {})", name, id);
    Ok(())
}

/// Delete a virtual output
pub async fn delete(name: &str) -> Result<()> {
    let mut client = IpcClient::connect().await?;
    client.delete(name).await?;
    println!("Deleted {}", name);
    Ok(())
}

/// Resize a virtual output
pub async fn resize(args: ResizeArgs) -> Result<()> {
    let mut client = IpcClient::connect().await?;
    client
        .resize(&args.name, args.width, args.height, args.refresh)
        .await?;

    let outputs = client.list().await?;
    match outputs.iter().find(|o| o.name == args.name) {
        Some(o) if !o.has_buffer => {
            println!(
                "Resized {} to {}x{}@{}, but no buffer could be allocated",
                o.name, o.width, o.height, o.refresh
            );
        }
        Some(o) => {
            println!(
                "Resized {} to {}x{}@{} (framebuffer {})",
                o.name, o.width, o.height, o.refresh, o.framebuffer_id
            );
        }
        None => println!("Resized {}", args.name),
    }
    Ok(())
}

/// Replace the advertised mode list
pub async fn modes(name: &str, modes: &str) -> Result<()> {
    let mut client = IpcClient::connect().await?;
    client.set_modes(name, modes).await?;
    println!("Updated modes of {}", name);
    Ok(())
}

/// Toggle AR mode
pub async fn ar_mode(name: &str, enabled: bool) -> Result<()> {
    let mut client = IpcClient::connect().await?;
    client.set_ar_mode(name, enabled).await?;
    println!("AR mode {} on {}", if enabled { "on" } else { "off" }, name);
    Ok(())
}

/// Print the framebuffer ID
pub async fn framebuffer(name: &str) -> Result<()> {
    let mut client = IpcClient::connect().await?;
    println!("{}", client.framebuffer(name).await?);
    Ok(())
}

/// Stop the daemon
pub async fn stop() -> Result<()> {
    let mut client = IpcClient::connect().await?;
    client.stop().await?;
    println!("vdisplay daemon stopping");
    Ok(())
}
