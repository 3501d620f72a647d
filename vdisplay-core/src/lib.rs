//! vdisplay Core Library
//!
//! Virtual display outputs that are not backed by physical hardware. Each
//! output owns an off-screen framebuffer that the compositing pipeline renders
//! into exactly as it would for a real monitor, and whose kernel framebuffer
//! ID is exported for zero-copy capture.
//!
//! This library provides:
//! - A registry of named virtual outputs with strict create/resize/delete ordering
//! - An off-screen framebuffer allocator (GBM first, dumb-buffer fallback)
//! - A software scanout engine (virtual CRTC)
//! - A manager control endpoint accepting string commands
//! - An activity-driven Active/Standby power controller
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐    ┌──────────────┐    ┌─────────────────┐
//! │ Manager Endpoint│───▶│   Registry   │───▶│    Allocator    │
//! │ (CREATE/DELETE) │    │ (name → out) │    │ (GBM / dumb bo) │
//! └─────────────────┘    └──────┬───────┘    └────────┬────────┘
//!                               │                     │ FRAMEBUFFER_ID
//!                        ┌──────▼───────┐    ┌────────▼────────┐
//!                        │ Virtual CRTC │    │ Power Controller│
//!                        └──────────────┘    └─────────────────┘
//! ```

pub mod allocator;
pub mod backend;
pub mod command;
pub mod config;
pub mod crtc;
pub mod display;
pub mod error;
pub mod host;
pub mod ipc;
pub mod manager;
pub mod power;
pub mod properties;
pub mod registry;
pub mod types;

pub use config::{DisplayConfig, ResizePolicy};
pub use display::{OutputRef, VirtualDisplay};
pub use error::{DisplayError, Result};
pub use registry::Registry;
pub use types::{FramebufferId, Mode, OutputInfo, PowerState};
