//! Состояние интерактивного выбора окна мышью.
//!
//! Idle -> Grabbing -> {Completed, Cancelled, TimedOut} -> Idle.
//! Сессию завершает ровно одно из: нажатие кнопки мыши, отпускание Escape,
//! истечение срока. После завершения события ввода игнорируются до нового
//! вызова `begin`.

use tokio::time::Instant;

use crate::dock_error;
use crate::error::Result;
use crate::events::platform::ESCAPE_KEYCODE;
use crate::events::{WindowId, NO_WINDOW};

/// Кнопка, которой выбирается окно
pub const SELECT_BUTTON: u8 = 1;
/// Значение кнопки, если выбор не был завершён нажатием
pub const NO_BUTTON: u8 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrabOutcome {
    Completed { button: u8, window: WindowId },
    Cancelled,
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GrabState {
    Idle,
    Grabbing { deadline: Instant },
    Finished(GrabOutcome),
}

/// Результат сессии: окно (0, если не выбрано) и кнопка (`NO_BUTTON`, если не нажата)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub window: WindowId,
    pub button: u8,
}

impl Selection {
    /// Выбрано окно основной кнопкой мыши
    pub fn selected_window(&self) -> Option<WindowId> {
        (self.button == SELECT_BUTTON && self.window != NO_WINDOW).then_some(self.window)
    }
}

#[derive(Debug)]
pub struct GrabSession {
    state: GrabState,
}

impl Default for GrabSession {
    fn default() -> Self {
        Self::new()
    }
}

impl GrabSession {
    pub fn new() -> Self {
        Self {
            state: GrabState::Idle,
        }
    }

    pub fn begin(&mut self, deadline: Instant) -> Result<()> {
        if !matches!(self.state, GrabState::Idle) {
            return Err(dock_error!(grab, "выбор окна уже выполняется"));
        }
        self.state = GrabState::Grabbing { deadline };
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, GrabState::Grabbing { .. })
    }

    /// Дедлайн активной сессии
    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            GrabState::Grabbing { deadline } => Some(deadline),
            _ => None,
        }
    }

    /// Нажатие кнопки мыши: завершает сессию, если она активна
    pub fn on_button_press(&mut self, button: u8, child: WindowId) -> bool {
        self.finish_with(GrabOutcome::Completed { button, window: child })
    }

    /// Отпускание клавиши: отменяет сессию, если это Escape
    pub fn on_key_release(&mut self, keycode: u8) -> bool {
        keycode == ESCAPE_KEYCODE && self.finish_with(GrabOutcome::Cancelled)
    }

    /// Истечение срока; срабатывает только если `now` не раньше дедлайна
    pub fn expire(&mut self, now: Instant) -> bool {
        match self.state {
            GrabState::Grabbing { deadline } if now >= deadline => self.finish_with(GrabOutcome::TimedOut),
            _ => false,
        }
    }

    /// Принудительная отмена (например, закрыт канал событий)
    pub fn abort(&mut self) -> bool {
        self.finish_with(GrabOutcome::Cancelled)
    }

    pub fn outcome(&self) -> Option<GrabOutcome> {
        match self.state {
            GrabState::Finished(outcome) => Some(outcome),
            _ => None,
        }
    }

    /// Забрать результат и вернуться в Idle
    pub fn take_selection(&mut self) -> Selection {
        let selection = match self.state {
            GrabState::Finished(GrabOutcome::Completed { button, window }) => Selection { window, button },
            _ => Selection {
                window: NO_WINDOW,
                button: NO_BUTTON,
            },
        };
        self.state = GrabState::Idle;
        selection
    }

    fn finish_with(&mut self, outcome: GrabOutcome) -> bool {
        if !self.is_active() {
            return false;
        }
        self.state = GrabState::Finished(outcome);
        true
    }
}
