use std::rc::Rc;
use tokio::sync::mpsc::UnboundedSender;

use crate::config::DockSettings;
use crate::error::Result;
use crate::events::{ControlMessage, PlatformEvent, WindowId};
use crate::services::window_system::WindowSystem;

/// Элемент трея, представляющий одно закреплённое окно.
///
/// Сигналы жизненного цикла (`TrayItemSignal`) элемент отправляет в канал,
/// полученный при создании; менеджер обрабатывает их в главном цикле.
pub trait TrayItem {
    fn docked_window(&self) -> WindowId;

    /// Показать элемент и убрать окно в трей
    fn show(&mut self) -> Result<()>;

    /// Вернуть окно в обычное (не закреплённое) состояние
    fn restore(&mut self) -> Result<()>;

    fn set_skip_taskbar(&mut self, skip: bool) -> Result<()>;

    /// Событие оконной системы, относящееся к закреплённому окну
    fn handle_platform_event(&mut self, event: &PlatformEvent, window: WindowId);
}

pub trait TrayItemFactory {
    fn create(
        &self,
        window: WindowId,
        settings: &DockSettings,
        signals: UnboundedSender<ControlMessage>,
    ) -> Result<Box<dyn TrayItem>>;
}

/// Factory function to create the tray item factory for the given window system
pub fn create_tray_item_factory(window_system: Rc<dyn WindowSystem>) -> Box<dyn TrayItemFactory> {
    Box::new(super::window_tray_item::WindowTrayItemFactory::new(window_system))
}
