//! Integration tests for the manager endpoint and the property surface

mod mocks;

use mocks::{Fail, Mock, bare_config};
use vdisplay_core::host::OutputHandle;
use vdisplay_core::properties::{CREATE_OUTPUT, DELETE_OUTPUT, PropertyValue};
use vdisplay_core::types::{Connection, Mode};
use vdisplay_core::{DisplayError, OutputRef};

fn text(s: &str) -> PropertyValue {
    PropertyValue::Text(s.to_string())
}

#[test]
fn test_create_and_delete_through_manager() {
    let mock = Mock::new();
    let mut display = mock.display(&bare_config(true));

    display
        .set_property(OutputRef::Manager, CREATE_OUTPUT, text("XR-0:1920:1080"))
        .unwrap();

    let output = display.output_ref("XR-0").expect("registered");
    assert!(matches!(output, OutputRef::Virtual(_)));
    assert_eq!(display.detect(output), Connection::Connected);
    assert_eq!(display.modes(output)[0], Mode::new(1920, 1080, 60));

    let handle = display.registry().get("XR-0").unwrap().output_handle();
    assert_eq!(display.resolve(handle), output);

    let fb = display.read_framebuffer_id("XR-0").unwrap();
    assert_ne!(fb, 0);
    assert_eq!(
        mock.property("XR-0", "FRAMEBUFFER_ID"),
        Some(PropertyValue::Integer(i64::from(fb)))
    );

    display
        .set_property(OutputRef::Manager, DELETE_OUTPUT, text("XR-0"))
        .unwrap();
    assert!(display.output_ref("XR-0").is_none());
    assert_eq!(display.detect(output), Connection::Disconnected);
    assert!(mock.ledger().no_buffer_resources());
}

#[test]
fn test_output_lifecycle_end_to_end() {
    let mock = Mock::new();
    let mut display = mock.display(&bare_config(false));

    display.create_output("XR-0:1920:1080:60").unwrap();
    let id1 = display.read_framebuffer_id("XR-0").unwrap();
    assert_ne!(id1, 0);

    let err = display.create_output("XR-0:1920:1080:60").unwrap_err();
    assert!(matches!(err.root(), DisplayError::AlreadyExists(_)));

    display
        .resize_output("XR-0", Mode::new(3840, 2160, 60))
        .unwrap();
    let id2 = display.read_framebuffer_id("XR-0").unwrap();
    assert_ne!(id2, 0);
    assert_ne!(id2, id1);

    display.delete_output("XR-0").unwrap();
    assert!(display.lookup("XR-0").is_none());
    assert!(mock.ledger().no_buffer_resources());

    display.create_output("XR-0:1920:1080:60").unwrap();
    assert!(display.lookup("XR-0").is_some());
}

#[test]
fn test_name_is_reusable_after_delete() {
    let mock = Mock::new();
    let mut display = mock.display(&bare_config(false));

    display.create_output("XR-0:1920:1080").unwrap();
    let first = display.read_framebuffer_id("XR-0").unwrap();
    display.delete_output("XR-0").unwrap();

    display.create_output("XR-0:2560:1440:90").unwrap();
    let info = display.lookup("XR-0").unwrap();
    assert_eq!((info.width, info.height, info.refresh), (2560, 1440, 90));
    assert_ne!(display.read_framebuffer_id("XR-0").unwrap(), first);
    assert_eq!(display.registry().len(), 1);
}

#[test]
fn test_explicit_refresh_is_used() {
    let mock = Mock::new();
    let mut display = mock.display(&bare_config(false));

    display.create_output("XR-2:1280:720:120").unwrap();
    assert_eq!(display.lookup("XR-2").unwrap().refresh, 120);
}

#[test]
fn test_trailing_nul_is_tolerated() {
    let mock = Mock::new();
    let mut display = mock.display(&bare_config(false));

    display.create_output("XR-1:1280:720\0").unwrap();
    assert!(display.lookup("XR-1").is_some());
    display.delete_output("XR-1\0").unwrap();
    assert!(display.lookup("XR-1").is_none());
}

#[test]
fn test_malformed_payloads_change_nothing() {
    let mock = Mock::new();
    let mut display = mock.display(&bare_config(false));
    mock.clear_events();

    for payload in [
        "",
        "XR-0",
        "XR-0:1920",
        "XR-0:abc:1080",
        "XR-0:1920:1080:60:1",
        "XR-0:0:1080",
        "XR-0:1920:1080:0",
        ":1920:1080",
    ] {
        let err = display.create_output(payload).unwrap_err();
        assert!(
            matches!(err.root(), DisplayError::Validation(_)),
            "{:?} gave {}",
            payload,
            err
        );
    }

    assert!(display.registry().is_empty());
    assert!(mock.events().is_empty());
}

#[test]
fn test_duplicate_create_is_rejected() {
    let mock = Mock::new();
    let mut display = mock.display(&bare_config(false));

    display.create_output("XR-0:1920:1080").unwrap();
    let err = display.create_output("XR-0:1280:720").unwrap_err();
    assert!(matches!(err.root(), DisplayError::AlreadyExists(_)));
    assert_eq!(display.lookup("XR-0").unwrap().width, 1920);
}

#[test]
fn test_delete_unknown_output_fails() {
    let mock = Mock::new();
    let mut display = mock.display(&bare_config(false));
    let err = display.delete_output("XR-7").unwrap_err();
    assert!(matches!(err.root(), DisplayError::NotFound(_)));
}

#[test]
fn test_manager_rejects_non_text_values() {
    let mock = Mock::new();
    let mut display = mock.display(&bare_config(false));
    assert!(
        display
            .set_property(OutputRef::Manager, CREATE_OUTPUT, PropertyValue::Integer(1))
            .is_err()
    );
    assert!(display.registry().is_empty());
}

#[test]
fn test_manager_endpoint_surface() {
    let mock = Mock::new();
    let mut display = mock.display(&bare_config(false));

    assert_eq!(display.output_ref("VIRTUAL-MANAGER"), Some(OutputRef::Manager));
    assert_eq!(display.detect(OutputRef::Manager), Connection::Disconnected);
    assert!(display.modes(OutputRef::Manager).is_empty());
    assert_eq!(
        display.get_property(OutputRef::Manager, CREATE_OUTPUT).unwrap(),
        text("")
    );
    assert_eq!(
        display.get_property(OutputRef::Manager, "non-desktop").unwrap(),
        PropertyValue::Bool(true)
    );
    assert_eq!(
        mock.property("VIRTUAL-MANAGER", "non-desktop"),
        Some(PropertyValue::Bool(true))
    );
}

#[test]
fn test_custom_manager_name() {
    let mock = Mock::new();
    let config = bare_config(false).with_manager_name("XR-MANAGER");
    let mut display = mock.display(&config);

    assert_eq!(display.manager_name(), Some("XR-MANAGER"));
    assert!(display.create_output("XR-MANAGER:1920:1080").is_err());
    display.create_output("VIRTUAL-MANAGER:1920:1080").unwrap();
}

#[test]
fn test_regular_outputs_are_left_to_the_host() {
    let mock = Mock::new();
    let mut display = mock.display(&bare_config(false));
    let regular = display.resolve(OutputHandle(9999));
    assert_eq!(regular, OutputRef::Regular(OutputHandle(9999)));

    let err = display
        .set_property(regular, "WIDTH", PropertyValue::Integer(1280))
        .unwrap_err();
    assert!(matches!(err, DisplayError::Unsupported(_)));
    assert_eq!(display.detect(regular), Connection::Unknown);
}

#[test]
fn test_property_writes_on_virtual_output() {
    let mock = Mock::new();
    let mut display = mock.display(&bare_config(false));
    display.create_output("XR-0:1920:1080").unwrap();
    let output = display.output_ref("XR-0").unwrap();

    display
        .set_property(output, "HEIGHT", PropertyValue::Integer(1200))
        .unwrap();
    display
        .set_property(output, "CUSTOM_MODES", text("1920:1200:60|1280:800:60"))
        .unwrap();
    display
        .set_property(output, "AR_MODE", PropertyValue::Bool(true))
        .unwrap();

    let info = display.lookup("XR-0").unwrap();
    assert_eq!((info.width, info.height), (1920, 1200));
    assert_eq!(
        info.modes,
        vec![Mode::new(1920, 1200, 60), Mode::new(1280, 800, 60)]
    );
    assert!(info.ar_mode);
    assert_eq!(
        display.custom_modes("XR-0").unwrap(),
        "1920:1200:60|1280:800:60"
    );
    assert_eq!(
        mock.property("XR-0", "AR_MODE"),
        Some(PropertyValue::Bool(true))
    );

    assert!(display.set_property(output, "CUSTOM_MODES", text("")).is_err());
    assert!(display.set_property(output, "VIRTUAL_OUTPUT", PropertyValue::Bool(false)).is_err());
    assert!(display.set_property(output, "BRIGHTNESS", PropertyValue::Integer(1)).is_err());
}

#[test]
fn test_failed_create_through_manager_leaves_name_free() {
    let mock = Mock::new();
    let mut display = mock.display(&bare_config(true));
    mock.fail(Fail::GpuCreate);
    mock.fail(Fail::DumbCreate);

    assert!(display.create_output("XR-0:1920:1080").is_err());
    assert!(display.output_ref("XR-0").is_none());

    mock.heal(Fail::DumbCreate);
    display.create_output("XR-0:1920:1080").unwrap();
}

#[test]
fn test_startup_outputs_are_created() {
    let mock = Mock::new();
    let config = bare_config(false)
        .with_output("XR-0", Mode::new(1920, 1080, 60))
        .with_output("XR-1", Mode::new(3840, 2160, 30));
    let display = mock.display(&config);

    let names: Vec<String> = display.outputs().into_iter().map(|o| o.name).collect();
    assert_eq!(names, vec!["XR-0".to_string(), "XR-1".to_string()]);
}

#[test]
fn test_shutdown_removes_manager() {
    let mock = Mock::new();
    let mut display = mock.display(&bare_config(false));
    display.create_output("XR-0:1920:1080").unwrap();

    display.shutdown();
    assert!(mock.ledger().outputs.is_empty());
    assert!(display.create_output("XR-1:1920:1080").is_err());
}
