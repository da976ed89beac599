use tokio::sync::mpsc::UnboundedSender;
use tokio::time::{interval, Duration};
use tracing::{debug, info};

use super::r#trait::{EventSource, WindowSystem, WmStateFlag};
use crate::error::Result;
use crate::events::{PlatformEvent, WindowId, WindowInfo};

/// Эмуляция оконной системы: любой ненулевой id считается валидным окном,
/// операции только логируются.
pub struct DryRunWindowSystem;

impl DryRunWindowSystem {
    pub fn new() -> Self {
        info!("Dry-run режим - WindowSystem работает в режиме эмуляции");
        Self
    }
}

impl WindowSystem for DryRunWindowSystem {
    fn is_valid_window(&self, window: WindowId) -> bool {
        window != 0
    }

    fn is_normal_window(&self, window: WindowId) -> bool {
        window != 0
    }

    fn active_window(&self) -> Option<WindowId> {
        None
    }

    fn list_windows(&self) -> Result<Vec<WindowInfo>> {
        Ok(Vec::new())
    }

    fn is_iconified(&self, _window: WindowId) -> bool {
        false
    }

    fn grab_input(&self) -> Result<()> {
        info!("[DRY RUN] Захват указателя и клавиатуры");
        Ok(())
    }

    fn release_input(&self) -> Result<()> {
        info!("[DRY RUN] Освобождение указателя и клавиатуры");
        Ok(())
    }

    fn watch_window(&self, window: WindowId) -> Result<()> {
        debug!("[DRY RUN] Подписка на события окна {:#x}", window);
        Ok(())
    }

    fn unwatch_window(&self, window: WindowId) -> Result<()> {
        debug!("[DRY RUN] Отписка от событий окна {:#x}", window);
        Ok(())
    }

    fn hide_window(&self, window: WindowId) -> Result<()> {
        info!("[DRY RUN] Скрытие окна {:#x}", window);
        Ok(())
    }

    fn show_window(&self, window: WindowId) -> Result<()> {
        info!("[DRY RUN] Показ окна {:#x}", window);
        Ok(())
    }

    fn set_state(&self, window: WindowId, flag: WmStateFlag, enabled: bool) -> Result<()> {
        info!("[DRY RUN] {:?} = {} для окна {:#x}", flag, enabled, window);
        Ok(())
    }
}

pub struct DryRunEventSource;

impl DryRunEventSource {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl EventSource for DryRunEventSource {
    async fn run(self: Box<Self>, events: UnboundedSender<PlatformEvent>) -> Result<()> {
        info!("Dry-run режим - источник событий не генерирует событий");

        let mut interval = interval(Duration::from_secs(30));
        loop {
            interval.tick().await;
            if events.is_closed() {
                return Ok(());
            }
            debug!("EventSource работает в dry-run режиме");
        }
    }
}
