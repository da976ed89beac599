//! In-memory fakes shared by the service tests.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::Rc;
use tokio::sync::mpsc::UnboundedSender;

use crate::config::DockSettings;
use crate::error::{DockError, Result};
use crate::events::{ControlMessage, PlatformEvent, WindowId, WindowInfo};
use crate::services::scanner::ProcessLauncher;
use crate::services::tray_item::{TrayItem, TrayItemFactory};
use crate::services::window_system::{WindowSystem, WmStateFlag};

#[derive(Default)]
pub struct FakeWindowSystem {
    windows: RefCell<Vec<WindowInfo>>,
    iconified: RefCell<HashSet<WindowId>>,
    active: Cell<Option<WindowId>>,
    operations: RefCell<Vec<String>>,
    grab_fails: Cell<bool>,
}

impl FakeWindowSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_window(&self, window: WindowInfo) {
        self.windows.borrow_mut().push(window);
    }

    pub fn set_active(&self, window: Option<WindowId>) {
        self.active.set(window);
    }

    pub fn set_iconified(&self, window: WindowId, iconified: bool) {
        if iconified {
            self.iconified.borrow_mut().insert(window);
        } else {
            self.iconified.borrow_mut().remove(&window);
        }
    }

    pub fn fail_grab(&self) {
        self.grab_fails.set(true);
    }

    pub fn operations(&self) -> Vec<String> {
        self.operations.borrow().clone()
    }

    fn record(&self, operation: String) {
        self.operations.borrow_mut().push(operation);
    }

    fn find(&self, window: WindowId) -> Option<WindowInfo> {
        self.windows.borrow().iter().find(|w| w.id == window).cloned()
    }
}

impl WindowSystem for FakeWindowSystem {
    fn is_valid_window(&self, window: WindowId) -> bool {
        self.find(window).is_some()
    }

    fn is_normal_window(&self, window: WindowId) -> bool {
        self.find(window).is_some_and(|w| w.normal)
    }

    fn active_window(&self) -> Option<WindowId> {
        self.active.get()
    }

    fn list_windows(&self) -> Result<Vec<WindowInfo>> {
        Ok(self.windows.borrow().clone())
    }

    fn is_iconified(&self, window: WindowId) -> bool {
        self.iconified.borrow().contains(&window)
    }

    fn grab_input(&self) -> Result<()> {
        if self.grab_fails.get() {
            return Err(DockError::Grab("занято".to_string()));
        }
        self.record("grab".to_string());
        Ok(())
    }

    fn release_input(&self) -> Result<()> {
        self.record("release".to_string());
        Ok(())
    }

    fn watch_window(&self, window: WindowId) -> Result<()> {
        self.record(format!("watch {:#x}", window));
        Ok(())
    }

    fn unwatch_window(&self, window: WindowId) -> Result<()> {
        self.record(format!("unwatch {:#x}", window));
        Ok(())
    }

    fn hide_window(&self, window: WindowId) -> Result<()> {
        self.record(format!("hide {:#x}", window));
        Ok(())
    }

    fn show_window(&self, window: WindowId) -> Result<()> {
        self.record(format!("show {:#x}", window));
        Ok(())
    }

    fn set_state(&self, window: WindowId, flag: WmStateFlag, enabled: bool) -> Result<()> {
        self.record(format!("state {:#x} {:?} {}", window, flag, enabled));
        Ok(())
    }
}

pub struct FakeLauncher {
    pid: Option<u32>,
    launches: Rc<RefCell<Vec<String>>>,
}

impl FakeLauncher {
    pub fn new(pid: u32) -> Self {
        Self {
            pid: Some(pid),
            launches: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn failing() -> Self {
        Self {
            pid: None,
            launches: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn launches(&self) -> Rc<RefCell<Vec<String>>> {
        Rc::clone(&self.launches)
    }
}

impl ProcessLauncher for FakeLauncher {
    fn launch(&self, command: &str, _args: &[String]) -> Result<u32> {
        self.launches.borrow_mut().push(command.to_string());
        self.pid.ok_or_else(|| DockError::Launch {
            command: command.to_string(),
            reason: "No such file or directory".to_string(),
        })
    }
}

/// Журнал вызовов элементов трея, общий для фабрики и созданных элементов
#[derive(Default)]
pub struct TrayLog {
    pub created: Vec<WindowId>,
    pub settings: Vec<(WindowId, DockSettings)>,
    pub calls: Vec<String>,
    pub events: Vec<(WindowId, PlatformEvent)>,
}

impl TrayLog {
    /// Настройки, с которыми было создано окно (последнее создание)
    pub fn settings_of(&self, window: WindowId) -> Option<DockSettings> {
        self.settings
            .iter()
            .rev()
            .find(|(id, _)| *id == window)
            .map(|(_, settings)| settings.clone())
    }
}

pub struct RecordingTrayItem {
    window: WindowId,
    log: Rc<RefCell<TrayLog>>,
}

impl TrayItem for RecordingTrayItem {
    fn docked_window(&self) -> WindowId {
        self.window
    }

    fn show(&mut self) -> Result<()> {
        self.log.borrow_mut().calls.push(format!("show {:#x}", self.window));
        Ok(())
    }

    fn restore(&mut self) -> Result<()> {
        self.log.borrow_mut().calls.push(format!("restore {:#x}", self.window));
        Ok(())
    }

    fn set_skip_taskbar(&mut self, skip: bool) -> Result<()> {
        self.log
            .borrow_mut()
            .calls
            .push(format!("skip_taskbar {:#x} {}", self.window, skip));
        Ok(())
    }

    fn handle_platform_event(&mut self, event: &PlatformEvent, window: WindowId) {
        self.log.borrow_mut().events.push((window, event.clone()));
    }
}

impl Drop for RecordingTrayItem {
    fn drop(&mut self) {
        self.log.borrow_mut().calls.push(format!("drop {:#x}", self.window));
    }
}

#[derive(Default)]
pub struct RecordingTrayItemFactory {
    log: Rc<RefCell<TrayLog>>,
}

impl RecordingTrayItemFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> Rc<RefCell<TrayLog>> {
        Rc::clone(&self.log)
    }
}

impl TrayItemFactory for RecordingTrayItemFactory {
    fn create(
        &self,
        window: WindowId,
        settings: &DockSettings,
        _signals: UnboundedSender<ControlMessage>,
    ) -> Result<Box<dyn TrayItem>> {
        let mut log = self.log.borrow_mut();
        log.created.push(window);
        log.settings.push((window, settings.clone()));
        drop(log);
        Ok(Box::new(RecordingTrayItem {
            window,
            log: Rc::clone(&self.log),
        }))
    }
}
