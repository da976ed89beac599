use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::platform::WindowId;
use crate::config::DockSettings;
use crate::services::scanner::PatternMode;

/// Сигналы жизненного цикла, которые элемент трея отправляет менеджеру.
/// Те же действия можно запросить у работающего экземпляра через IPC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrayItemSignal {
    /// Пользователь хочет выбрать ещё одно окно
    SelectAnother,
    /// Закреплённое окно было уничтожено
    Died(WindowId),
    Undock(WindowId),
    UndockAll,
    About,
}

/// Сообщения, доставляемые в главный цикл
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    /// Новый запрос на закрепление (первый запуск или повторный вызов)
    Command(DockOptions),
    Tray(TrayItemSignal),
    /// Внешний сигнал завершения (SIGINT/SIGTERM)
    Shutdown,
    /// Закреплённых окон и ожидающих поисков не осталось
    Quit,
}

/// Запрос, который повторный запуск передаёт работающему экземпляру
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "request", content = "body", rename_all = "snake_case")]
pub enum IpcRequest {
    Dock(DockOptions),
    Tray(TrayItemSignal),
}

impl From<IpcRequest> for ControlMessage {
    fn from(request: IpcRequest) -> Self {
        match request {
            IpcRequest::Dock(options) => ControlMessage::Command(options),
            IpcRequest::Tray(signal) => ControlMessage::Tray(signal),
        }
    }
}

/// Переопределения настроек закрепления из командной строки
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsOverrides {
    pub custom_icon: Option<PathBuf>,
    pub attention_icon: Option<PathBuf>,
    pub balloon_timeout_ms: Option<u64>,
    pub sticky: bool,
    pub skip_taskbar: bool,
    pub skip_pager: bool,
    pub iconify_focus_lost: bool,
    pub keep_on_minimize: bool,
    pub iconify_obscured: bool,
}

impl SettingsOverrides {
    pub fn apply_to(&self, base: &DockSettings) -> DockSettings {
        let mut settings = base.clone();
        if self.custom_icon.is_some() {
            settings.custom_icon = self.custom_icon.clone();
        }
        if self.attention_icon.is_some() {
            settings.attention_icon = self.attention_icon.clone();
        }
        if self.balloon_timeout_ms.is_some() {
            settings.balloon_timeout_ms = self.balloon_timeout_ms;
        }
        settings.sticky |= self.sticky;
        settings.skip_taskbar |= self.skip_taskbar;
        settings.skip_pager |= self.skip_pager;
        settings.iconify_focus_lost |= self.iconify_focus_lost;
        settings.iconify_obscured |= self.iconify_obscured;
        if self.keep_on_minimize {
            settings.iconify_minimized = false;
        }
        settings
    }
}

/// Разобранные параметры одного вызова
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DockOptions {
    pub command: Option<String>,
    pub args: Vec<String>,
    pub name_pattern: Option<String>,
    pub pattern_mode: PatternMode,
    pub case_sensitive: bool,
    pub window: Option<WindowId>,
    pub pid: Option<u32>,
    pub active_window: bool,
    pub require_normal: bool,
    pub timeout_secs: Option<u64>,
    pub settings: SettingsOverrides,
}

impl Default for DockOptions {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            name_pattern: None,
            pattern_mode: PatternMode::Normal,
            case_sensitive: false,
            window: None,
            pid: None,
            active_window: false,
            require_normal: true,
            timeout_secs: None,
            settings: SettingsOverrides::default(),
        }
    }
}

impl DockOptions {
    /// Запрос должен быть отложен в сканер (запуск команды и/или поиск по имени)
    pub fn wants_scan(&self) -> bool {
        self.command.is_some() || self.name_pattern.as_deref().is_some_and(|p| !p.is_empty())
    }
}
