mod r#trait;
mod window_tray_item;

pub use self::r#trait::{create_tray_item_factory, TrayItem, TrayItemFactory};
