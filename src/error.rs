use thiserror::Error;

use crate::events::WindowId;

#[derive(Error, Debug)]
pub enum DockError {
    #[error("Ошибка конфигурации: {0}")]
    Config(#[from] anyhow::Error),

    #[error("Ошибка ввода-вывода: {0}")]
    Io(#[from] std::io::Error),

    #[error("Не удалось подключиться к X серверу: {0}")]
    X11Connect(#[from] x11rb::errors::ConnectError),

    #[error("Ошибка соединения с X сервером: {0}")]
    X11Connection(#[from] x11rb::errors::ConnectionError),

    #[error("X сервер вернул ошибку: {0}")]
    X11Reply(#[from] x11rb::errors::ReplyError),

    #[error("Ошибка сериализации: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Неверный идентификатор окна: {0:#x}")]
    InvalidWindow(WindowId),

    #[error("Неверный шаблон имени окна '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Невозможно закрепить активное окно: ни одно окно не имеет фокуса")]
    NoActiveWindow,

    #[error("Не удалось запустить '{command}': {reason}")]
    Launch { command: String, reason: String },

    #[error("Окно {0:#x} уже закреплено в трее")]
    AlreadyDocked(WindowId),

    #[error("Не удалось захватить указатель: {0}")]
    Grab(String),

    #[error("Ошибка IPC: {0}")]
    Ipc(String),

    #[error("Внутренняя ошибка: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, DockError>;

// Удобные макросы для создания ошибок
#[macro_export]
macro_rules! dock_error {
    (grab, $($arg:tt)*) => {
        $crate::error::DockError::Grab(format!($($arg)*))
    };
    (ipc, $($arg:tt)*) => {
        $crate::error::DockError::Ipc(format!($($arg)*))
    };
    (internal, $($arg:tt)*) => {
        $crate::error::DockError::Internal(format!($($arg)*))
    };
}
