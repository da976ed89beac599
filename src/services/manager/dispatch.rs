use super::TrayItemManager;
use crate::debug_if_enabled;
use crate::events::{PlatformEvent, WindowId, NO_WINDOW};
use crate::trace_if_enabled;

/// Куда направить событие
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classified {
    /// Событие окна: передаётся записям реестра с этим id
    Window(WindowId),
    /// Кандидат на завершение выбора окна
    GrabButton { button: u8, child: WindowId },
    /// Кандидат на отмену выбора окна
    GrabKey { keycode: u8 },
    Ignored,
}

/// Классификация события. Каждое событие попадает ровно в одну категорию.
pub fn classify(event: &PlatformEvent) -> Classified {
    match *event {
        PlatformEvent::FocusOut { window } => Classified::Window(window),
        PlatformEvent::DestroyNotify { window } => Classified::Window(window),
        PlatformEvent::UnmapNotify { window }
        | PlatformEvent::MapNotify { window }
        | PlatformEvent::VisibilityNotify { window, .. }
        | PlatformEvent::PropertyNotify { window, .. } => Classified::Window(window),
        PlatformEvent::ButtonPress { button, child } => Classified::GrabButton { button, child },
        PlatformEvent::KeyRelease { keycode } => Classified::GrabKey { keycode },
        PlatformEvent::Other => Classified::Ignored,
    }
}

impl TrayItemManager {
    /// Обработать событие оконной системы. Событие принадлежит диспетчеру
    /// и освобождается здесь при любом исходе.
    pub fn dispatch(&mut self, event: PlatformEvent) {
        match classify(&event) {
            Classified::Window(NO_WINDOW) | Classified::Ignored => {}
            Classified::Window(window) => {
                let routed = self.route(&event, window);
                if routed == 0 {
                    trace_if_enabled!("{} не относится к закреплённым окнам", event);
                }
            }
            Classified::GrabButton { button, child } => {
                if self.grab.on_button_press(button, child) {
                    debug_if_enabled!("Выбор окна завершён: кнопка {}, окно {:#x}", button, child);
                }
            }
            Classified::GrabKey { keycode } => {
                if self.grab.on_key_release(keycode) {
                    debug_if_enabled!("Выбор окна отменён клавишей Escape");
                }
            }
        }
    }

    /// Передать событие всем записям реестра с данным id
    pub fn route(&mut self, event: &PlatformEvent, window: WindowId) -> usize {
        let mut routed = 0;
        for item in self.registry.iter_mut().filter(|item| item.docked_window() == window) {
            item.handle_platform_event(event, window);
            routed += 1;
        }
        routed
    }
}
