//! CLI command implementations

mod config;
mod control;
mod list;
mod serve;
mod status;

pub use config::{ConfigArgs, config};
pub use control::{ResizeArgs, ar_mode, create, delete, framebuffer, modes, resize, stop};
pub use list::list;
pub use serve::{ServeArgs, serve};
pub use status::status;
