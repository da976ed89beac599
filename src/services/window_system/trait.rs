use crate::error::Result;
use crate::events::{PlatformEvent, WindowId, WindowInfo};
use std::rc::Rc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;

/// Флаги состояния окна (_NET_WM_STATE)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WmStateFlag {
    Sticky,
    SkipTaskbar,
    SkipPager,
}

/// Запросы к оконной системе и примитивные операции над окнами
pub trait WindowSystem {
    fn is_valid_window(&self, window: WindowId) -> bool;

    /// Окно является обычным окном приложения (не подсказка, не панель и т.п.)
    fn is_normal_window(&self, window: WindowId) -> bool;

    fn active_window(&self) -> Option<WindowId>;

    /// Окна верхнего уровня, известные оконному менеджеру
    fn list_windows(&self) -> Result<Vec<WindowInfo>>;

    /// Окно процесса `pid` с наименьшим id, не входящее в `exclude`
    fn pid_to_window(&self, pid: u32, require_normal: bool, exclude: &[WindowId]) -> Option<WindowId> {
        let windows = match self.list_windows() {
            Ok(windows) => windows,
            Err(e) => {
                warn!("Не удалось получить список окон: {}", e);
                return None;
            }
        };

        windows
            .iter()
            .filter(|w| !exclude.contains(&w.id) && w.satisfies(Some(pid), require_normal))
            .map(|w| w.id)
            .min()
    }

    /// Окно клиента для окна-рамки оконного менеджера
    fn client_window(&self, window: WindowId) -> WindowId {
        window
    }

    /// Окно свёрнуто оконным менеджером (WM_STATE = Iconic)
    fn is_iconified(&self, window: WindowId) -> bool;

    /// Захват указателя и клавиатуры для интерактивного выбора окна
    fn grab_input(&self) -> Result<()>;
    fn release_input(&self) -> Result<()>;

    /// Подписка на события окна (уничтожение, фокус, видимость, свойства)
    fn watch_window(&self, window: WindowId) -> Result<()>;
    fn unwatch_window(&self, window: WindowId) -> Result<()>;

    fn hide_window(&self, window: WindowId) -> Result<()>;
    fn show_window(&self, window: WindowId) -> Result<()>;
    fn set_state(&self, window: WindowId, flag: WmStateFlag, enabled: bool) -> Result<()>;
}

/// Источник низкоуровневых событий оконной системы
#[async_trait::async_trait]
pub trait EventSource {
    /// Передаёт события в главный цикл, пока канал открыт
    async fn run(self: Box<Self>, events: UnboundedSender<PlatformEvent>) -> Result<()>;
}

pub struct Platform {
    pub window_system: Rc<dyn WindowSystem>,
    pub event_source: Box<dyn EventSource + Send>,
}

/// Factory function to create the platform backend based on the dry_run flag
pub fn create_platform(dry_run: bool) -> Result<Platform> {
    if dry_run {
        Ok(Platform {
            window_system: Rc::new(super::dry_run::DryRunWindowSystem::new()),
            event_source: Box::new(super::dry_run::DryRunEventSource::new()),
        })
    } else {
        let window_system = super::x11::X11WindowSystem::connect()?;
        let event_source = Box::new(window_system.event_source());
        Ok(Platform {
            window_system: Rc::new(window_system),
            event_source,
        })
    }
}
