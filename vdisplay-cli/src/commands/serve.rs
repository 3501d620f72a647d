//! Serve command - run the daemon

use anyhow::{Result, bail};
use clap::Args;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use vdisplay_core::config::ConfigFile;
use vdisplay_core::ipc::{IpcServer, daemon_running};
use vdisplay_core::{DisplayConfig, ResizePolicy, VirtualDisplay};

/// Arguments for the serve command
#[derive(Args)]
pub struct ServeArgs {
    /// Configuration file (default: ~/.config/vdisplay/config.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// DRM card node to allocate buffers on (e.g. /dev/dri/card0)
    #[arg(short, long)]
    pub device: Option<PathBuf>,

    /// Use CPU-mapped dumb buffers only
    #[arg(long)]
    pub no_gpu: bool,

    /// Seconds without a framebuffer read before standby
    #[arg(long)]
    pub idle_timeout: Option<u64>,

    /// Failed-resize behavior (replace, atomic)
    #[arg(long)]
    pub resize_policy: Option<ResizePolicy>,

    /// Skip the outputs listed in the configuration file
    #[arg(long)]
    pub no_startup_outputs: bool,
}

fn build_config(args: &ServeArgs) -> Result<DisplayConfig> {
    let file = match &args.config {
        Some(path) => ConfigFile::load_from(path.clone())?,
        None => ConfigFile::load_or_default(),
    };
    let mut config = DisplayConfig::from_file(&file)?;

    if let Some(device) = &args.device {
        config = config.with_device(device);
    }
    if args.no_gpu {
        config = config.with_gpu_acceleration(false);
    }
    if let Some(secs) = args.idle_timeout {
        config = config.with_idle_timeout(Duration::from_secs(secs));
    }
    if let Some(policy) = args.resize_policy {
        config = config.with_resize_policy(policy);
    }
    if args.no_startup_outputs {
        config.outputs.clear();
    }

    config.validate()?;
    Ok(config)
}

/// Run the daemon until stopped over IPC or interrupted
pub async fn serve(args: ServeArgs) -> Result<()> {
    let config = build_config(&args)?;

    if daemon_running().await {
        bail!("vdisplay daemon is already running");
    }

    let mut display = VirtualDisplay::headless(&config)?;
    let (server, mut requests) = IpcServer::bind()?;

    println!("vdisplay - Serving\n");
    println!("  Socket:  {}", server.path().display());
    println!("  Backend: {}", display.status().backend);
    for output in display.outputs() {
        println!(
            "  Output:  {} {}x{}@{} (framebuffer {})",
            output.name, output.width, output.height, output.refresh, output.framebuffer_id
        );
    }
    println!("\nPress Ctrl+C or run 'vdisplay stop' to exit.");

    let mut ticker = tokio::time::interval(config.tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            accepted = server.accept() => match accepted {
                Ok(stream) => server.spawn_client(stream),
                Err(e) => warn!("Failed to accept IPC connection: {}", e),
            },
            Some(request) = requests.recv() => {
                if !request.apply(&mut display) {
                    break;
                }
            }
            _ = ticker.tick() => {
                display.power_tick();
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    display.shutdown();
    server.cleanup();
    println!("vdisplay stopped");
    Ok(())
}
