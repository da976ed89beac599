pub mod control;
pub mod platform;
pub mod window;

pub use control::{ControlMessage, DockOptions, IpcRequest, SettingsOverrides, TrayItemSignal};
pub use platform::{PlatformEvent, Visibility, WindowId, NO_WINDOW};
pub use window::WindowInfo;
