use serde::{Deserialize, Serialize};
use std::fmt;

use super::platform::WindowId;

/// Информация об окне верхнего уровня
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowInfo {
    pub id: WindowId,
    pub title: String,
    pub class: String,
    pub pid: Option<u32>,
    /// Окно классифицировано как обычное окно приложения
    pub normal: bool,
}

impl WindowInfo {
    pub fn new(id: WindowId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            class: String::new(),
            pid: None,
            normal: true,
        }
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.class = class.into();
        self
    }

    #[cfg(test)]
    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }

    pub fn with_normal(mut self, normal: bool) -> Self {
        self.normal = normal;
        self
    }

    /// Подходит ли окно под ограничения по процессу и типу окна
    pub fn satisfies(&self, pid: Option<u32>, require_normal: bool) -> bool {
        if require_normal && !self.normal {
            return false;
        }
        match pid {
            Some(pid) => self.pid == Some(pid),
            None => true,
        }
    }
}

impl fmt::Display for WindowInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.class.is_empty() {
            write!(f, "{:#x} \"{}\"", self.id, self.title)
        } else {
            write!(f, "{:#x} \"{}\" ({})", self.id, self.title, self.class)
        }
    }
}
