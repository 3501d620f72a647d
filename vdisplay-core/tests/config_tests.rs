//! Integration tests for configuration system

use std::time::Duration;

use tempfile::TempDir;
use vdisplay_core::config::{ConfigFile, DisplayConfig, ResizePolicy, sample_config};
use vdisplay_core::types::Mode;

#[test]
fn test_sample_config_parses() {
    let file: ConfigFile = toml::from_str(&sample_config()).expect("sample should parse");
    let config = DisplayConfig::from_file(&file).expect("sample should be valid");

    assert_eq!(config.device, None);
    assert!(config.gpu_acceleration);
    assert_eq!(config.idle_timeout, Duration::from_secs(5));
    assert_eq!(config.tick_interval, Duration::from_secs(1));
    assert_eq!(config.resize_policy, ResizePolicy::Replace);
    assert_eq!(config.manager_name, "VIRTUAL-MANAGER");
    assert_eq!(config.outputs.len(), 1);
    assert_eq!(config.outputs[0].name, "XR-0");
    assert_eq!(config.outputs[0].mode, Mode::new(1920, 1080, 60));
}

#[test]
fn test_empty_file_gets_defaults() {
    let file: ConfigFile = toml::from_str("").unwrap();
    let config = DisplayConfig::from_file(&file).unwrap();
    assert_eq!(config.idle_timeout, Duration::from_secs(5));
    assert_eq!(config.outputs.len(), 1);
}

#[test]
fn test_missing_file_loads_defaults() {
    let dir = TempDir::new().unwrap();
    let file = ConfigFile::load_from(dir.path().join("absent.toml")).unwrap();
    assert_eq!(file.device.path, "software");
    assert_eq!(file.outputs.len(), 1);
}

#[test]
fn test_save_and_load_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let mut file = ConfigFile::default_with_outputs();
    file.device.path = "/dev/dri/card1".to_string();
    file.device.gpu_acceleration = false;
    file.power.idle_timeout_secs = 30;
    file.resize.policy = "atomic".to_string();
    file.outputs[0].width = 2560;
    file.outputs[0].height = 1440;
    file.save_to(path.clone()).unwrap();

    let loaded = ConfigFile::load_from(path).unwrap();
    let config = DisplayConfig::from_file(&loaded).unwrap();
    assert_eq!(
        config.device.as_deref(),
        Some(std::path::Path::new("/dev/dri/card1"))
    );
    assert!(!config.gpu_acceleration);
    assert_eq!(config.idle_timeout, Duration::from_secs(30));
    assert_eq!(config.resize_policy, ResizePolicy::Atomic);
    assert_eq!(config.outputs[0].mode, Mode::new(2560, 1440, 60));
}

#[test]
fn test_partial_file() {
    let file: ConfigFile = toml::from_str(
        r#"
[power]
idle_timeout_secs = 2

[[outputs]]
name = "XR-0"
width = 1280
height = 720

[[outputs]]
name = "XR-1"
width = 3840
height = 2160
refresh = 30
"#,
    )
    .unwrap();
    let config = DisplayConfig::from_file(&file).unwrap();

    assert_eq!(config.idle_timeout, Duration::from_secs(2));
    assert_eq!(config.tick_interval, Duration::from_secs(1));
    assert_eq!(config.outputs[0].mode, Mode::new(1280, 720, 60));
    assert_eq!(config.outputs[1].mode, Mode::new(3840, 2160, 30));
}

#[test]
fn test_invalid_files_are_rejected() {
    let bad_policy: ConfigFile = toml::from_str("[resize]\npolicy = \"sometimes\"").unwrap();
    assert!(DisplayConfig::from_file(&bad_policy).is_err());

    let zero_timeout: ConfigFile = toml::from_str("[power]\nidle_timeout_secs = 0").unwrap();
    assert!(DisplayConfig::from_file(&zero_timeout).is_err());

    let clash: ConfigFile = toml::from_str(
        "[[outputs]]\nname = \"VIRTUAL-MANAGER\"\nwidth = 1920\nheight = 1080",
    )
    .unwrap();
    assert!(DisplayConfig::from_file(&clash).is_err());

    let tiny: ConfigFile =
        toml::from_str("[[outputs]]\nname = \"XR-0\"\nwidth = 16\nheight = 16").unwrap();
    assert!(DisplayConfig::from_file(&tiny).is_err());
}

#[test]
fn test_malformed_toml_is_a_config_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[power\nidle_timeout_secs = ").unwrap();

    let err = ConfigFile::load_from(path).unwrap_err();
    assert!(matches!(err, vdisplay_core::DisplayError::Config(_)));
}

#[test]
fn test_resize_policy_names() {
    assert_eq!("replace".parse::<ResizePolicy>().unwrap(), ResizePolicy::Replace);
    assert_eq!("atomic".parse::<ResizePolicy>().unwrap(), ResizePolicy::Atomic);
    assert_eq!(ResizePolicy::Atomic.to_string(), "atomic");
    assert!("maybe".parse::<ResizePolicy>().is_err());
}
