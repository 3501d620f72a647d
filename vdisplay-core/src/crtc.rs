//! Virtual scanout engine
//!
//! Software stand-in for a hardware CRTC. It accepts the same calls the
//! display pipeline makes on real CRTCs but never touches hardware: modes,
//! gamma and power levels are stored, cursor calls do nothing (there is no
//! cursor plane), and a bound scanout pixmap is only remembered for capture
//! wiring.
//!
//! Resizing the backing buffer on a mode-set is the registry's job; see
//! [`crate::registry::Registry::crtc_set_mode`].

use tracing::trace;

use crate::error::{DisplayError, Result};
use crate::types::{Mode, Rotation};

/// DPMS level reported by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DpmsMode {
    #[default]
    On,
    Standby,
    Suspend,
    Off,
}

/// Gamma lookup tables, one entry per step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GammaRamp {
    pub red: Vec<u16>,
    pub green: Vec<u16>,
    pub blue: Vec<u16>,
}

impl GammaRamp {
    /// Identity ramp with `size` steps
    pub fn linear(size: usize) -> Self {
        let step = |i: usize| -> u16 {
            if size <= 1 {
                return u16::MAX;
            }
            ((i * usize::from(u16::MAX)) / (size - 1)) as u16
        };
        let channel: Vec<u16> = (0..size).map(step).collect();
        Self {
            red: channel.clone(),
            green: channel.clone(),
            blue: channel,
        }
    }

    pub fn len(&self) -> usize {
        self.red.len()
    }

    pub fn is_empty(&self) -> bool {
        self.red.is_empty()
    }
}

/// Reference to a pixmap bound for scanout (host-defined ID)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixmapRef(pub u32);

/// Software CRTC
#[derive(Debug, Clone, Default)]
pub struct VirtualCrtc {
    mode: Option<Mode>,
    x: i32,
    y: i32,
    rotation: Rotation,
    dpms: DpmsMode,
    gamma: Option<GammaRamp>,
    scanout_pixmap: Option<PixmapRef>,
}

impl VirtualCrtc {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a mode and position. Always succeeds.
    pub fn set_mode(&mut self, mode: Mode, rotation: Rotation, x: i32, y: i32) {
        trace!("virtual CRTC mode {} at {},{} {:?}", mode, x, y, rotation);
        self.mode = Some(mode);
        self.rotation = rotation;
        self.x = x;
        self.y = y;
    }

    /// Turn the CRTC off
    pub fn disable(&mut self) {
        self.mode = None;
        self.scanout_pixmap = None;
    }

    pub fn is_enabled(&self) -> bool {
        self.mode.is_some()
    }

    pub fn mode(&self) -> Option<Mode> {
        self.mode
    }

    pub fn position(&self) -> (i32, i32) {
        (self.x, self.y)
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    /// Record the DPMS level
    pub fn set_dpms(&mut self, dpms: DpmsMode) {
        self.dpms = dpms;
    }

    pub fn dpms(&self) -> DpmsMode {
        self.dpms
    }

    /// Store a gamma ramp; it is never programmed anywhere
    pub fn set_gamma(&mut self, ramp: GammaRamp) -> Result<()> {
        if ramp.red.len() != ramp.green.len() || ramp.red.len() != ramp.blue.len() {
            return Err(DisplayError::validation("gamma channels differ in length"));
        }
        self.gamma = Some(ramp);
        Ok(())
    }

    pub fn gamma(&self) -> Option<&GammaRamp> {
        self.gamma.as_ref()
    }

    // No cursor plane on virtual outputs: the pipeline falls back to
    // software cursors.

    pub fn show_cursor(&mut self) {}

    pub fn hide_cursor(&mut self) {}

    pub fn set_cursor_position(&mut self, _x: i32, _y: i32) {}

    pub fn load_cursor_image(&mut self, _argb: &[u32]) {}

    /// Remember the pixmap the pipeline wants scanned out
    pub fn set_scanout_pixmap(&mut self, pixmap: Option<PixmapRef>) {
        self.scanout_pixmap = pixmap;
    }

    pub fn scanout_pixmap(&self) -> Option<PixmapRef> {
        self.scanout_pixmap
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_set_stores_state() {
        let mut crtc = VirtualCrtc::new();
        assert!(!crtc.is_enabled());

        crtc.set_mode(Mode::new(1920, 1080, 60), Rotation::Rotate90, 10, 20);
        assert_eq!(crtc.mode(), Some(Mode::new(1920, 1080, 60)));
        assert_eq!(crtc.position(), (10, 20));
        assert_eq!(crtc.rotation(), Rotation::Rotate90);

        crtc.disable();
        assert!(!crtc.is_enabled());
    }

    #[test]
    fn test_gamma_is_stored() {
        let mut crtc = VirtualCrtc::new();
        let ramp = GammaRamp::linear(256);
        assert_eq!(ramp.red[0], 0);
        assert_eq!(ramp.red[255], u16::MAX);

        crtc.set_gamma(ramp.clone()).unwrap();
        assert_eq!(crtc.gamma(), Some(&ramp));

        let bad = GammaRamp {
            red: vec![0; 4],
            green: vec![0; 3],
            blue: vec![0; 4],
        };
        assert!(crtc.set_gamma(bad).is_err());
    }

    #[test]
    fn test_cursor_calls_do_nothing() {
        let mut crtc = VirtualCrtc::new();
        crtc.show_cursor();
        crtc.set_cursor_position(5, 5);
        crtc.load_cursor_image(&[0xffff_ffff; 64 * 64]);
        crtc.hide_cursor();
        assert!(!crtc.is_enabled());
    }

    #[test]
    fn test_scanout_pixmap_reference() {
        let mut crtc = VirtualCrtc::new();
        crtc.set_scanout_pixmap(Some(PixmapRef(7)));
        assert_eq!(crtc.scanout_pixmap(), Some(PixmapRef(7)));
    }
}
