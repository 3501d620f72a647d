//! Integration tests for error handling

use vdisplay_core::error::{DisplayError, ErrorKind, ResultExt};

#[test]
fn test_error_context_chaining() {
    let base_error = DisplayError::allocation("dumb buffer creation failed");
    let with_context = base_error.with_context("Creating virtual output XR-0");

    let msg = format!("{}", with_context);
    assert!(msg.contains("Creating virtual output XR-0"));
    assert!(msg.contains("dumb buffer creation failed"));
}

#[test]
fn test_error_context_preserves_hint() {
    let base_error = DisplayError::drm("permission denied");
    let hint_before = base_error.user_hint();

    let with_context = base_error.with_context("Opening /dev/dri/card0");
    let hint_after = with_context.user_hint();

    assert_eq!(hint_before, hint_after);
}

#[test]
fn test_result_ext_context() {
    let result: Result<(), DisplayError> = Err(DisplayError::NotFound("XR-3".to_string()));
    let err = result.context("Resizing XR-3").unwrap_err();

    assert!(err.to_string().starts_with("Resizing XR-3: "));
    assert!(matches!(err.root(), DisplayError::NotFound(name) if name == "XR-3"));
}

#[test]
fn test_error_kinds() {
    assert_eq!(DisplayError::validation("bad").kind(), ErrorKind::Validation);
    assert_eq!(
        DisplayError::AlreadyExists("XR-0".to_string()).kind(),
        ErrorKind::Validation
    );
    assert_eq!(DisplayError::allocation("oom").kind(), ErrorKind::Allocation);
    assert_eq!(DisplayError::drm("EACCES").kind(), ErrorKind::Allocation);
    assert_eq!(
        DisplayError::notification("no listeners").kind(),
        ErrorKind::Notification
    );
    assert_eq!(DisplayError::host("refused").kind(), ErrorKind::Other);
}

#[test]
fn test_user_hints() {
    let err = DisplayError::validation("test");
    assert!(err.user_hint().unwrap().contains("<name>:<width>:<height>"));

    let err = DisplayError::NotFound("XR-0".to_string());
    assert!(err.user_hint().unwrap().contains("vdisplay list"));

    let err = DisplayError::drm("test");
    assert!(err.user_hint().unwrap().contains("video"));

    let err = DisplayError::config("test");
    assert!(err.user_hint().unwrap().contains("config.toml"));

    let err = DisplayError::NotRunning;
    assert!(err.user_hint().unwrap().contains("vdisplay serve"));

    assert!(DisplayError::allocation("test").user_hint().is_none());
}

#[test]
fn test_user_recoverable() {
    assert!(DisplayError::validation("test").is_user_recoverable());
    assert!(DisplayError::NotRunning.is_user_recoverable());
    assert!(
        DisplayError::config("test")
            .with_context("Loading config")
            .is_user_recoverable()
    );
    assert!(!DisplayError::allocation("test").is_user_recoverable());
    assert!(!DisplayError::notification("test").is_user_recoverable());
}

#[test]
fn test_io_error_conversion() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
    let err: DisplayError = io.into();
    assert!(matches!(err, DisplayError::Io(_)));
}
