use std::fmt;

/// Идентификатор окна X11 (0 означает "нет окна")
pub type WindowId = u32;

pub const NO_WINDOW: WindowId = 0;

/// Keycode клавиши Escape на стандартной раскладке X11
pub const ESCAPE_KEYCODE: u8 = 9;

/// Степень перекрытия окна
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Visibility {
    Unobscured,
    PartiallyObscured,
    FullyObscured,
}

/// Низкоуровневое событие оконной системы.
///
/// Событие передаётся в диспетчер по значению и освобождается по выходу
/// из обработки, независимо от количества получателей.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformEvent {
    FocusOut { window: WindowId },
    DestroyNotify { window: WindowId },
    UnmapNotify { window: WindowId },
    MapNotify { window: WindowId },
    VisibilityNotify { window: WindowId, state: Visibility },
    PropertyNotify { window: WindowId, atom: u32 },
    ButtonPress { button: u8, child: WindowId },
    KeyRelease { keycode: u8 },
    Other,
}

impl PlatformEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PlatformEvent::FocusOut { .. } => "FocusOut",
            PlatformEvent::DestroyNotify { .. } => "DestroyNotify",
            PlatformEvent::UnmapNotify { .. } => "UnmapNotify",
            PlatformEvent::MapNotify { .. } => "MapNotify",
            PlatformEvent::VisibilityNotify { .. } => "VisibilityNotify",
            PlatformEvent::PropertyNotify { .. } => "PropertyNotify",
            PlatformEvent::ButtonPress { .. } => "ButtonPress",
            PlatformEvent::KeyRelease { .. } => "KeyRelease",
            PlatformEvent::Other => "Other",
        }
    }
}

impl fmt::Display for PlatformEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlatformEvent::FocusOut { window }
            | PlatformEvent::DestroyNotify { window }
            | PlatformEvent::UnmapNotify { window }
            | PlatformEvent::MapNotify { window }
            | PlatformEvent::VisibilityNotify { window, .. }
            | PlatformEvent::PropertyNotify { window, .. } => {
                write!(f, "{}({:#x})", self.name(), window)
            }
            PlatformEvent::ButtonPress { button, child } => {
                write!(f, "ButtonPress(button={}, child={:#x})", button, child)
            }
            PlatformEvent::KeyRelease { keycode } => write!(f, "KeyRelease({})", keycode),
            PlatformEvent::Other => write!(f, "Other"),
        }
    }
}
