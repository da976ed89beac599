//! Scanner: отложенный поиск окон.
//!
//! Хранит очередь запросов "дождаться окна с подходящим заголовком"
//! (при необходимости предварительно запустив команду) и опрашивает
//! оконную систему с фиксированным периодом, пока окно не найдено или
//! не истёк таймаут запроса. Сам ничего не закрепляет: результаты
//! возвращаются менеджеру в виде `ScanEvent`.

mod launcher;
mod pattern;

pub use launcher::{create_launcher, ProcessLauncher};
pub use pattern::{NamePattern, PatternMode};

use smallvec::SmallVec;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::DockSettings;
use crate::error::DockError;
use crate::events::WindowId;
use crate::services::window_system::WindowSystem;

/// Запрос в очереди поиска
#[derive(Debug)]
struct PendingRequest {
    command: Option<String>,
    args: Vec<String>,
    /// Выставляется один раз, сразу после успешного запуска команды
    pid: Option<u32>,
    settings: DockSettings,
    elapsed: Duration,
    timeout: Duration,
    require_normal: bool,
    pattern: NamePattern,
}

impl PendingRequest {
    fn describe(&self) -> String {
        match &self.command {
            Some(command) => format!("{} {}", command, self.pattern),
            None => self.pattern.to_string(),
        }
    }
}

/// Результат шага опроса
#[derive(Debug)]
pub enum ScanEvent {
    WindowFound {
        window: WindowId,
        settings: DockSettings,
    },
    /// Команду не удалось запустить, запрос удалён из очереди
    LaunchFailed(DockError),
    /// Очередь опустела
    Stopped,
}

pub struct Scanner {
    queue: Vec<PendingRequest>,
    interval: Duration,
    launcher: Box<dyn ProcessLauncher>,
}

impl Scanner {
    pub fn new(interval: Duration, launcher: Box<dyn ProcessLauncher>) -> Self {
        Self {
            queue: Vec::new(),
            interval,
            launcher,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Поставить в очередь поиск уже существующего (или будущего) окна
    pub fn enqueue_search(
        &mut self,
        pattern: NamePattern,
        timeout: Duration,
        require_normal: bool,
        settings: DockSettings,
    ) {
        self.enqueue(None, Vec::new(), pattern, timeout, require_normal, settings);
    }

    /// Поставить в очередь запуск команды с последующим поиском её окна
    pub fn enqueue_launch(
        &mut self,
        command: String,
        args: Vec<String>,
        pattern: NamePattern,
        timeout: Duration,
        require_normal: bool,
        settings: DockSettings,
    ) {
        self.enqueue(Some(command), args, pattern, timeout, require_normal, settings);
    }

    fn enqueue(
        &mut self,
        command: Option<String>,
        args: Vec<String>,
        pattern: NamePattern,
        timeout: Duration,
        require_normal: bool,
        settings: DockSettings,
    ) {
        // Нулевой таймаут приводим к одному периоду опроса
        let timeout = timeout.max(self.interval);
        let request = PendingRequest {
            command: command.filter(|c| !c.is_empty()),
            args,
            pid: None,
            settings,
            elapsed: Duration::ZERO,
            timeout,
            require_normal,
            pattern,
        };
        info!(
            "Ожидание окна {} (таймаут {} мс)",
            request.describe(),
            timeout.as_millis()
        );
        self.queue.push(request);
    }

    pub fn is_running(&self) -> bool {
        !self.queue.is_empty()
    }

    #[cfg(test)]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Один шаг опроса. Запросы обрабатываются в порядке очереди; из
    /// нескольких подходящих окон выбирается окно с наименьшим id.
    /// Окна из `exclude` (уже закреплённые) не рассматриваются.
    pub fn poll(&mut self, window_system: &dyn WindowSystem, exclude: &[WindowId]) -> Vec<ScanEvent> {
        let mut events = Vec::new();
        if self.queue.is_empty() {
            return events;
        }

        let mut windows = match window_system.list_windows() {
            Ok(windows) => windows,
            Err(e) => {
                warn!("Не удалось получить список окон: {}", e);
                Vec::new()
            }
        };
        windows.sort_by_key(|w| w.id);

        let mut claimed: SmallVec<[WindowId; 4]> = SmallVec::new();
        let mut index = 0;

        while index < self.queue.len() {
            let request = &mut self.queue[index];

            if request.pid.is_none() {
                if let Some(command) = request.command.as_deref() {
                    match self.launcher.launch(command, &request.args) {
                        Ok(pid) => request.pid = Some(pid),
                        Err(e) => {
                            self.queue.remove(index);
                            events.push(ScanEvent::LaunchFailed(e));
                            continue;
                        }
                    }
                }
            }

            let found = windows.iter().find(|w| {
                !exclude.contains(&w.id)
                    && !claimed.contains(&w.id)
                    && w.satisfies(request.pid, request.require_normal)
                    && request.pattern.is_match(&w.title)
            });

            if let Some(window) = found {
                let request = self.queue.remove(index);
                info!("Найдено окно {} для {}", window, request.describe());
                claimed.push(window.id);
                events.push(ScanEvent::WindowFound {
                    window: window.id,
                    settings: request.settings,
                });
                continue;
            }

            request.elapsed += self.interval;
            if request.elapsed >= request.timeout {
                let request = self.queue.remove(index);
                debug!(
                    "Таймаут поиска {} после {} мс",
                    request.describe(),
                    request.elapsed.as_millis()
                );
                continue;
            }

            index += 1;
        }

        if self.queue.is_empty() {
            debug!("Очередь поиска пуста, опрос остановлен");
            events.push(ScanEvent::Stopped);
        }

        events
    }
}
