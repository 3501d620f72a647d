//! Config command - manage configuration files

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use vdisplay_core::config::{ConfigFile, DisplayConfig, sample_config};

/// Arguments for the config command
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show the path to the config file
    Path,

    /// Show the effective configuration
    Show,

    /// Write the sample config file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Print a sample configuration to stdout
    Sample,
}

/// Run config subcommand
pub async fn config(args: ConfigArgs) -> Result<()> {
    let path = ConfigFile::default_path();

    match args.command {
        ConfigCommand::Path => {
            println!("{}", path.display());
            if !path.exists() {
                println!("(file does not exist)");
            }
        }
        ConfigCommand::Show => {
            let file = ConfigFile::load_from(path.clone())?;
            let effective = DisplayConfig::from_file(&file)
                .with_context(|| format!("Invalid configuration in {}", path.display()))?;

            if path.exists() {
                println!("Configuration file: {}\n", path.display());
            } else {
                println!("No configuration file, showing defaults\n");
            }
            match &effective.device {
                Some(device) => println!("  Device:        {}", device.display()),
                None => println!("  Device:        software"),
            }
            println!("  GPU buffers:   {}", effective.gpu_acceleration);
            println!("  Idle timeout:  {:?}", effective.idle_timeout);
            println!("  Tick interval: {:?}", effective.tick_interval);
            println!("  Resize policy: {}", effective.resize_policy);
            println!("  Manager:       {}", effective.manager_name);
            for output in &effective.outputs {
                println!("  Output:        {} {}", output.name, output.mode);
            }
        }
        ConfigCommand::Init { force } => {
            if path.exists() && !force {
                println!("Configuration file already exists: {}", path.display());
                println!("Use --force to overwrite it.");
                return Ok(());
            }

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).context("Failed to create config directory")?;
            }
            std::fs::write(&path, sample_config()).context("Failed to write config file")?;
            println!("Created configuration file: {}", path.display());
        }
        ConfigCommand::Sample => {
            print!("{}", sample_config());
        }
    }

    Ok(())
}
