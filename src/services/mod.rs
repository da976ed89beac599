pub mod ipc;
pub mod manager;
pub mod scanner;
pub mod tray_item;
pub mod window_system;

#[cfg(test)]
pub mod test_support;

pub use ipc::{claim_or_forward, socket_path};
pub use manager::TrayItemManager;
pub use scanner::create_launcher;
pub use tray_item::create_tray_item_factory;
pub use window_system::create_platform;
