//! WindowSystem service: responsibility and boundaries
//!
//! This module and its submodules wrap the windowing server: window queries
//! (validity, classification, enumeration, pid lookup), input grabs, the
//! primitive operations a tray item performs on its window, and the raw
//! event stream. It MUST NOT contain docking decisions; those belong to
//! the manager.

mod dry_run;
mod r#trait;
mod x11;

pub use self::r#trait::{create_platform, Platform, WindowSystem, WmStateFlag};
