use std::rc::Rc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use super::r#trait::{TrayItem, TrayItemFactory};
use crate::config::DockSettings;
use crate::debug_if_enabled;
use crate::error::Result;
use crate::events::{ControlMessage, PlatformEvent, TrayItemSignal, Visibility, WindowId};
use crate::services::window_system::{WindowSystem, WmStateFlag};

/// Элемент трея без собственной отрисовки: управляет видимостью окна и
/// реагирует на его события согласно настройкам закрепления.
pub struct WindowTrayItem {
    window: WindowId,
    settings: DockSettings,
    window_system: Rc<dyn WindowSystem>,
    signals: UnboundedSender<ControlMessage>,
    hidden: bool,
    dead: bool,
}

impl WindowTrayItem {
    pub fn new(
        window: WindowId,
        settings: DockSettings,
        window_system: Rc<dyn WindowSystem>,
        signals: UnboundedSender<ControlMessage>,
    ) -> Self {
        Self {
            window,
            settings,
            window_system,
            signals,
            hidden: false,
            dead: false,
        }
    }

    #[cfg(test)]
    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    fn iconify(&mut self) {
        if self.hidden || self.dead {
            return;
        }
        match self.window_system.hide_window(self.window) {
            Ok(()) => {
                self.hidden = true;
                debug!("Окно {:#x} убрано в трей", self.window);
            }
            Err(e) => warn!("Не удалось скрыть окно {:#x}: {}", self.window, e),
        }
    }

    fn emit(&self, signal: TrayItemSignal) {
        if self.signals.send(ControlMessage::Tray(signal)).is_err() {
            debug!("Главный цикл уже остановлен, сигнал {:?} потерян", signal);
        }
    }

    fn apply_state(&self) -> Result<()> {
        let flags = [
            (WmStateFlag::Sticky, self.settings.sticky),
            (WmStateFlag::SkipPager, self.settings.skip_pager),
            (WmStateFlag::SkipTaskbar, self.settings.skip_taskbar),
        ];
        for (flag, enabled) in flags {
            if enabled {
                self.window_system.set_state(self.window, flag, true)?;
            }
        }
        Ok(())
    }
}

impl TrayItem for WindowTrayItem {
    fn docked_window(&self) -> WindowId {
        self.window
    }

    fn show(&mut self) -> Result<()> {
        self.window_system.watch_window(self.window)?;
        self.apply_state()?;
        info!("Окно {:#x} закреплено в трее", self.window);
        self.iconify();
        Ok(())
    }

    fn restore(&mut self) -> Result<()> {
        if self.dead {
            return Ok(());
        }
        self.window_system.show_window(self.window)?;
        self.hidden = false;
        info!("Окно {:#x} восстановлено", self.window);
        Ok(())
    }

    fn set_skip_taskbar(&mut self, skip: bool) -> Result<()> {
        if self.dead {
            return Ok(());
        }
        self.settings.skip_taskbar = skip;
        self.window_system.set_state(self.window, WmStateFlag::SkipTaskbar, skip)
    }

    fn handle_platform_event(&mut self, event: &PlatformEvent, window: WindowId) {
        debug_if_enabled!("Окно {:#x}: {}", window, event);

        match event {
            PlatformEvent::DestroyNotify { .. } => {
                if !self.dead {
                    self.dead = true;
                    info!("Закреплённое окно {:#x} уничтожено", self.window);
                    self.emit(TrayItemSignal::Died(self.window));
                }
            }
            PlatformEvent::FocusOut { .. } if self.settings.iconify_focus_lost => self.iconify(),
            PlatformEvent::VisibilityNotify {
                state: Visibility::FullyObscured,
                ..
            } if self.settings.iconify_obscured => self.iconify(),
            PlatformEvent::PropertyNotify { .. } if self.settings.iconify_minimized && !self.hidden => {
                if self.window_system.is_iconified(self.window) {
                    self.iconify();
                }
            }
            PlatformEvent::MapNotify { .. } => self.hidden = false,
            _ => {}
        }
    }
}

impl Drop for WindowTrayItem {
    fn drop(&mut self) {
        if !self.dead {
            if let Err(e) = self.window_system.unwatch_window(self.window) {
                debug!("Не удалось отписаться от окна {:#x}: {}", self.window, e);
            }
        }
    }
}

pub struct WindowTrayItemFactory {
    window_system: Rc<dyn WindowSystem>,
}

impl WindowTrayItemFactory {
    pub fn new(window_system: Rc<dyn WindowSystem>) -> Self {
        Self { window_system }
    }
}

impl TrayItemFactory for WindowTrayItemFactory {
    fn create(
        &self,
        window: WindowId,
        settings: &DockSettings,
        signals: UnboundedSender<ControlMessage>,
    ) -> Result<Box<dyn TrayItem>> {
        Ok(Box::new(WindowTrayItem::new(
            window,
            settings.clone(),
            Rc::clone(&self.window_system),
            signals,
        )))
    }
}
