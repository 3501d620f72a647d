//! Wire encodings for manager commands and custom mode lists
//!
//! Clients write colon/pipe delimited strings; they are parsed into typed,
//! validated values here so nothing downstream ever sees the raw payload.
//!
//! - create: `"<name>:<width>:<height>[:<refresh>]"`
//! - delete: `"<name>"`
//! - modes:  `"<w>:<h>:<r>|<w>:<h>:<r>|..."`

use crate::error::{DisplayError, Result};
use crate::types::{DEFAULT_REFRESH, Mode};

/// Longest accepted output name in bytes
pub const MAX_NAME_LEN: usize = 64;

/// Resolutions advertised after the requested mode, largest first
pub const COMMON_RESOLUTIONS: &[(u32, u32)] = &[
    (3840, 2160),
    (2560, 1440),
    (1920, 1200),
    (1920, 1080),
    (1680, 1050),
    (1600, 900),
    (1440, 900),
    (1366, 768),
    (1280, 1024),
    (1280, 800),
    (1280, 720),
    (1024, 768),
];

/// A parsed manager command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagerCommand {
    /// Create a new virtual output
    Create(CreateRequest),
    /// Delete an existing virtual output
    Delete { name: String },
}

/// Parsed `create` payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRequest {
    /// Output name
    pub name: String,
    /// Initial (preferred) mode
    pub mode: Mode,
}

impl CreateRequest {
    /// Parse `"<name>:<width>:<height>[:<refresh>]"`
    pub fn parse(payload: &str) -> Result<Self> {
        let payload = clean(payload);
        let parts: Vec<&str> = payload.split(':').collect();
        if !(3..=4).contains(&parts.len()) {
            return Err(DisplayError::validation(format!(
                "expected <name>:<width>:<height>[:<refresh>], got {:?}",
                payload
            )));
        }

        let name = parts[0];
        validate_name(name)?;

        let width = parse_number(parts[1], "width")?;
        let height = parse_number(parts[2], "height")?;
        let refresh = match parts.get(3) {
            Some(raw) => parse_number(raw, "refresh")?,
            None => DEFAULT_REFRESH,
        };

        Ok(Self {
            name: name.to_string(),
            mode: Mode::validated(width, height, refresh)?,
        })
    }
}

/// Parse a `delete` payload into an output name
pub fn parse_delete(payload: &str) -> Result<String> {
    let name = clean(payload);
    validate_name(name)?;
    Ok(name.to_string())
}

/// Parse `"<w>:<h>:<r>|..."` into a validated, de-duplicated mode list
pub fn parse_mode_list(payload: &str) -> Result<Vec<Mode>> {
    let payload = clean(payload);
    let mut modes: Vec<Mode> = Vec::new();

    for entry in payload.split('|').map(str::trim).filter(|e| !e.is_empty()) {
        let fields: Vec<&str> = entry.split(':').collect();
        if fields.len() != 3 {
            return Err(DisplayError::validation(format!(
                "mode entry {:?} is not <w>:<h>:<r>",
                entry
            )));
        }
        let mode = Mode::validated(
            parse_number(fields[0], "width")?,
            parse_number(fields[1], "height")?,
            parse_number(fields[2], "refresh")?,
        )?;
        if !modes.contains(&mode) {
            modes.push(mode);
        }
    }

    if modes.is_empty() {
        return Err(DisplayError::validation("mode list is empty"));
    }
    Ok(modes)
}

/// Encode a mode list in the wire format
pub fn format_mode_list(modes: &[Mode]) -> String {
    modes
        .iter()
        .map(|m| format!("{}:{}:{}", m.width, m.height, m.refresh))
        .collect::<Vec<_>>()
        .join("|")
}

/// Check that a name is usable as an output name
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(DisplayError::validation("output name is empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(DisplayError::validation(format!(
            "output name longer than {} bytes",
            MAX_NAME_LEN
        )));
    }
    if name
        .chars()
        .any(|c| c == ':' || c == '|' || c.is_whitespace() || c.is_control())
    {
        return Err(DisplayError::validation(format!(
            "output name {:?} contains reserved characters",
            name
        )));
    }
    Ok(())
}

/// Default mode list: the preferred mode, then the common resolutions at the
/// same refresh rate
pub fn default_modes(preferred: Mode) -> Vec<Mode> {
    let mut modes = vec![preferred];
    for &(width, height) in COMMON_RESOLUTIONS {
        let mode = Mode::new(width, height, preferred.refresh);
        if !modes.contains(&mode) {
            modes.push(mode);
        }
    }
    modes
}

// Property payloads coming from X-style clients may carry a trailing NUL
fn clean(payload: &str) -> &str {
    payload.trim_matches(|c: char| c == '\0' || c.is_whitespace())
}

fn parse_number(raw: &str, field: &str) -> Result<u32> {
    raw.trim()
        .parse::<u32>()
        .map_err(|_| DisplayError::validation(format!("{} {:?} is not a number", field, raw)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_create_with_refresh() {
        let req = CreateRequest::parse("XR-0:1920:1080:90").unwrap();
        assert_eq!(req.name, "XR-0");
        assert_eq!(req.mode, Mode::new(1920, 1080, 90));
    }

    #[test]
    fn test_parse_create_defaults_refresh() {
        let req = CreateRequest::parse("XR-1:3840:2160").unwrap();
        assert_eq!(req.mode.refresh, DEFAULT_REFRESH);
    }

    #[test]
    fn test_parse_create_tolerates_trailing_nul() {
        let req = CreateRequest::parse("XR-0:1280:720\0").unwrap();
        assert_eq!(req.mode, Mode::new(1280, 720, 60));
    }

    #[test]
    fn test_parse_create_rejects_bad_payloads() {
        assert!(CreateRequest::parse("").is_err());
        assert!(CreateRequest::parse(":1920:1080").is_err());
        assert!(CreateRequest::parse("XR-0:1920").is_err());
        assert!(CreateRequest::parse("XR-0:abc:1080").is_err());
        assert!(CreateRequest::parse("XR-0:32:1080").is_err());
        assert!(CreateRequest::parse("XR-0:1920:1080:0").is_err());
        assert!(CreateRequest::parse("XR-0:1920:1080:60:1").is_err());
    }

    #[test]
    fn test_parse_delete() {
        assert_eq!(parse_delete("XR-0\n").unwrap(), "XR-0");
        assert!(parse_delete("").is_err());
        assert!(parse_delete("bad name").is_err());
    }

    #[test]
    fn test_parse_mode_list() {
        let modes = parse_mode_list("1920:1080:60|1280:720:120|1920:1080:60").unwrap();
        assert_eq!(
            modes,
            vec![Mode::new(1920, 1080, 60), Mode::new(1280, 720, 120)]
        );
        assert_eq!(format_mode_list(&modes), "1920:1080:60|1280:720:120");
    }

    #[test]
    fn test_parse_mode_list_rejects_garbage() {
        assert!(parse_mode_list("").is_err());
        assert!(parse_mode_list("1920:1080").is_err());
        assert!(parse_mode_list("1920:1080:60|10:10:60").is_err());
    }

    #[test]
    fn test_default_modes_preferred_first() {
        let modes = default_modes(Mode::new(1920, 1080, 72));
        assert_eq!(modes[0], Mode::new(1920, 1080, 72));
        assert_eq!(
            modes.iter().filter(|m| m.size() == (1920, 1080)).count(),
            1
        );
        assert!(modes.iter().all(|m| m.refresh == 72));
    }
}
