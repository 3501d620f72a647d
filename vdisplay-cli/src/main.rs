//! vdisplay CLI
//!
//! Runs the virtual display daemon and talks to it.
//!
//! # Usage
//!
//! ```bash
//! # Start the daemon (creates XR-0 from the default config)
//! vdisplay serve
//!
//! # Create, resize and delete outputs
//! vdisplay create XR-1:2560:1440:90
//! vdisplay resize XR-1 3840 2160
//! vdisplay delete XR-1
//!
//! # Read the framebuffer ID a capture client would import
//! vdisplay fb XR-0
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::EnvFilter;
use vdisplay_core::DisplayError;

/// vdisplay - virtual display outputs with exportable framebuffers
#[derive(Parser)]
#[command(name = "vdisplay")]
#[command(version)]
#[command(about = "Virtual display outputs with exportable framebuffers", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon in the foreground
    Serve(commands::ServeArgs),

    /// Create a virtual output from "<name>:<width>:<height>[:<refresh>]"
    Create {
        /// Output name and mode, e.g. XR-0:1920:1080:60
        spec: String,
    },

    /// Delete a virtual output
    #[command(alias = "rm")]
    Delete {
        /// Output name
        name: String,
    },

    /// Change the resolution (and optionally refresh) of an output
    Resize(commands::ResizeArgs),

    /// Replace the advertised modes with "<w>:<h>:<r>|..."
    Modes {
        /// Output name
        name: String,
        /// Mode list
        modes: String,
    },

    /// Turn AR mode on or off
    ArMode {
        /// Output name
        name: String,
        /// on or off
        #[arg(value_parser = parse_switch)]
        state: bool,
    },

    /// List virtual outputs
    #[command(alias = "ls")]
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Print an output's framebuffer ID (keeps the output active)
    Fb {
        /// Output name
        name: String,
    },

    /// Show daemon status
    Status,

    /// Stop the daemon
    Stop,

    /// Manage the configuration file
    Config(commands::ConfigArgs),
}

fn parse_switch(s: &str) -> std::result::Result<bool, String> {
    match s.to_lowercase().as_str() {
        "on" | "true" | "1" | "yes" => Ok(true),
        "off" | "false" | "0" | "no" => Ok(false),
        _ => Err(format!("expected on or off, got {}", s)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(format!("vdisplay={}", level).parse()?)
                .add_directive(format!("vdisplay_core={}", level).parse()?),
        )
        .with_target(false)
        .init();

    let result = match cli.command {
        Commands::Serve(args) => commands::serve(args).await,
        Commands::Create { spec } => commands::create(&spec).await,
        Commands::Delete { name } => commands::delete(&name).await,
        Commands::Resize(args) => commands::resize(args).await,
        Commands::Modes { name, modes } => commands::modes(&name, &modes).await,
        Commands::ArMode { name, state } => commands::ar_mode(&name, state).await,
        Commands::List { json } => commands::list(json).await,
        Commands::Fb { name } => commands::framebuffer(&name).await,
        Commands::Status => commands::status().await,
        Commands::Stop => commands::stop().await,
        Commands::Config(args) => commands::config(args).await,
    };

    if let Err(e) = &result {
        if let Some(hint) = e.downcast_ref::<DisplayError>().and_then(|d| d.user_hint()) {
            eprintln!("hint: {}", hint);
        }
    }
    result
}
