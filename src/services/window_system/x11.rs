use std::sync::Arc;
use std::thread;
use tokio::sync::{mpsc::UnboundedSender, oneshot};
use tracing::{debug, info, warn};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{
    Atom, AtomEnum, ChangeWindowAttributesAux, ClientMessageEvent, ConnectionExt as _, EventMask,
    GrabMode, GrabStatus, Visibility as XVisibility, Window,
};
use x11rb::protocol::Event;
use x11rb::rust_connection::RustConnection;

use super::r#trait::{EventSource, WindowSystem, WmStateFlag};
use crate::dock_error;
use crate::error::Result;
use crate::events::{PlatformEvent, Visibility, WindowId, WindowInfo};

x11rb::atom_manager! {
    pub Atoms: AtomsCookie {
        _NET_CLIENT_LIST,
        _NET_ACTIVE_WINDOW,
        _NET_WM_PID,
        _NET_WM_NAME,
        _NET_WM_WINDOW_TYPE,
        _NET_WM_WINDOW_TYPE_NORMAL,
        _NET_WM_STATE,
        _NET_WM_STATE_STICKY,
        _NET_WM_STATE_SKIP_TASKBAR,
        _NET_WM_STATE_SKIP_PAGER,
        WM_STATE,
        UTF8_STRING,
    }
}

const ICONIC_STATE: u32 = 3;
const NET_WM_STATE_REMOVE: u32 = 0;
const NET_WM_STATE_ADD: u32 = 1;
/// Источник запроса "приложение" для _NET_ACTIVE_WINDOW / _NET_WM_STATE
const SOURCE_APPLICATION: u32 = 1;
const MAX_PROPERTY_LENGTH: u32 = 4096;
const MAX_FRAME_DEPTH: usize = 4;

/// Реализация поверх одного XCB соединения.
///
/// Ошибки протокола x11rb возвращает в ответе на конкретный запрос, поэтому
/// проверки валидности окна просто анализируют ответ и ничего не пишут в
/// консоль; глобальный обработчик ошибок не нужен.
pub struct X11WindowSystem {
    conn: Arc<RustConnection>,
    root: Window,
    atoms: Atoms,
}

impl X11WindowSystem {
    pub fn connect() -> Result<Self> {
        let (conn, screen_num) = x11rb::connect(None)?;
        let root = conn.setup().roots[screen_num].root;
        let atoms = Atoms::new(&conn)?.reply()?;

        info!("Подключено к X серверу, экран {}, корневое окно {:#x}", screen_num, root);

        Ok(Self {
            conn: Arc::new(conn),
            root,
            atoms,
        })
    }

    pub fn event_source(&self) -> X11EventSource {
        X11EventSource {
            conn: Arc::clone(&self.conn),
        }
    }

    fn property32(&self, window: Window, property: Atom, type_: impl Into<Atom>) -> Option<Vec<u32>> {
        let reply = self
            .conn
            .get_property(false, window, property, type_, 0, MAX_PROPERTY_LENGTH)
            .ok()?
            .reply()
            .ok()?;
        reply.value32().map(|values| values.collect())
    }

    fn text_property(&self, window: Window, property: Atom, type_: impl Into<Atom>) -> Option<String> {
        let reply = self
            .conn
            .get_property(false, window, property, type_, 0, MAX_PROPERTY_LENGTH)
            .ok()?
            .reply()
            .ok()?;
        if reply.value.is_empty() {
            return None;
        }
        Some(String::from_utf8_lossy(&reply.value).into_owned())
    }

    fn window_title(&self, window: Window) -> String {
        self.text_property(window, self.atoms._NET_WM_NAME, self.atoms.UTF8_STRING)
            .or_else(|| self.text_property(window, AtomEnum::WM_NAME.into(), AtomEnum::ANY))
            .unwrap_or_default()
    }

    fn window_class(&self, window: Window) -> String {
        // WM_CLASS = "instance\0class\0"
        self.text_property(window, AtomEnum::WM_CLASS.into(), AtomEnum::STRING)
            .and_then(|value| value.split('\0').nth(1).map(str::to_string))
            .unwrap_or_default()
    }

    fn window_pid(&self, window: Window) -> Option<u32> {
        self.property32(window, self.atoms._NET_WM_PID, AtomEnum::CARDINAL)
            .and_then(|values| values.first().copied())
    }

    fn has_wm_state(&self, window: Window) -> bool {
        self.property32(window, self.atoms.WM_STATE, self.atoms.WM_STATE)
            .is_some_and(|values| !values.is_empty())
    }

    fn client_list(&self) -> Result<Vec<Window>> {
        if let Some(clients) = self.property32(self.root, self.atoms._NET_CLIENT_LIST, AtomEnum::WINDOW) {
            return Ok(clients);
        }

        // Без EWMH: дочерние окна корня, у которых есть клиент с WM_STATE
        debug!("_NET_CLIENT_LIST недоступен, обходим дерево окон");
        let tree = self.conn.query_tree(self.root)?.reply()?;
        Ok(tree
            .children
            .into_iter()
            .filter_map(|child| self.find_client(child, MAX_FRAME_DEPTH))
            .collect())
    }

    fn find_client(&self, window: Window, depth: usize) -> Option<Window> {
        if self.has_wm_state(window) {
            return Some(window);
        }
        if depth == 0 {
            return None;
        }
        let tree = self.conn.query_tree(window).ok()?.reply().ok()?;
        tree.children
            .into_iter()
            .find_map(|child| self.find_client(child, depth - 1))
    }

    fn send_client_message(&self, window: Window, message_type: Atom, data: [u32; 5]) -> Result<()> {
        let event = ClientMessageEvent::new(32, window, message_type, data);
        self.conn.send_event(
            false,
            self.root,
            EventMask::SUBSTRUCTURE_REDIRECT | EventMask::SUBSTRUCTURE_NOTIFY,
            event,
        )?;
        self.conn.flush()?;
        Ok(())
    }
}

impl WindowSystem for X11WindowSystem {
    fn is_valid_window(&self, window: WindowId) -> bool {
        if window == 0 {
            return false;
        }
        matches!(
            self.conn.get_window_attributes(window).map(|cookie| cookie.reply()),
            Ok(Ok(_))
        )
    }

    fn is_normal_window(&self, window: WindowId) -> bool {
        let attributes = match self.conn.get_window_attributes(window).map(|cookie| cookie.reply()) {
            Ok(Ok(attributes)) => attributes,
            _ => return false,
        };
        if attributes.override_redirect {
            return false;
        }

        match self.property32(window, self.atoms._NET_WM_WINDOW_TYPE, AtomEnum::ATOM) {
            Some(types) if !types.is_empty() => types.contains(&self.atoms._NET_WM_WINDOW_TYPE_NORMAL),
            // Тип не задан: по EWMH такое окно считается обычным
            _ => true,
        }
    }

    fn active_window(&self) -> Option<WindowId> {
        self.property32(self.root, self.atoms._NET_ACTIVE_WINDOW, AtomEnum::WINDOW)
            .and_then(|values| values.first().copied())
            .filter(|&window| window != 0)
    }

    fn list_windows(&self) -> Result<Vec<WindowInfo>> {
        let windows = self
            .client_list()?
            .into_iter()
            .map(|id| {
                let mut info = WindowInfo::new(id, self.window_title(id))
                    .with_class(self.window_class(id))
                    .with_normal(self.is_normal_window(id));
                info.pid = self.window_pid(id);
                info
            })
            .collect();
        Ok(windows)
    }

    fn client_window(&self, window: WindowId) -> WindowId {
        self.find_client(window, MAX_FRAME_DEPTH).unwrap_or(window)
    }

    fn is_iconified(&self, window: WindowId) -> bool {
        self.property32(window, self.atoms.WM_STATE, self.atoms.WM_STATE)
            .and_then(|values| values.first().copied())
            == Some(ICONIC_STATE)
    }

    fn grab_input(&self) -> Result<()> {
        let pointer = self
            .conn
            .grab_pointer(
                false,
                self.root,
                EventMask::BUTTON_PRESS,
                GrabMode::ASYNC,
                GrabMode::ASYNC,
                x11rb::NONE,
                x11rb::NONE,
                x11rb::CURRENT_TIME,
            )?
            .reply()?;
        if pointer.status != GrabStatus::SUCCESS {
            return Err(dock_error!(grab, "указатель занят ({:?})", pointer.status));
        }

        let keyboard = self
            .conn
            .grab_keyboard(false, self.root, x11rb::CURRENT_TIME, GrabMode::ASYNC, GrabMode::ASYNC)?
            .reply()?;
        if keyboard.status != GrabStatus::SUCCESS {
            self.conn.ungrab_pointer(x11rb::CURRENT_TIME)?;
            self.conn.flush()?;
            return Err(dock_error!(grab, "клавиатура занята ({:?})", keyboard.status));
        }

        self.conn.flush()?;
        Ok(())
    }

    fn release_input(&self) -> Result<()> {
        self.conn.ungrab_pointer(x11rb::CURRENT_TIME)?;
        self.conn.ungrab_keyboard(x11rb::CURRENT_TIME)?;
        self.conn.flush()?;
        Ok(())
    }

    fn watch_window(&self, window: WindowId) -> Result<()> {
        let mask = EventMask::STRUCTURE_NOTIFY
            | EventMask::PROPERTY_CHANGE
            | EventMask::VISIBILITY_CHANGE
            | EventMask::FOCUS_CHANGE;
        self.conn
            .change_window_attributes(window, &ChangeWindowAttributesAux::new().event_mask(mask))?;
        self.conn.flush()?;
        Ok(())
    }

    fn unwatch_window(&self, window: WindowId) -> Result<()> {
        self.conn.change_window_attributes(
            window,
            &ChangeWindowAttributesAux::new().event_mask(EventMask::NO_EVENT),
        )?;
        self.conn.flush()?;
        Ok(())
    }

    fn hide_window(&self, window: WindowId) -> Result<()> {
        self.conn.unmap_window(window)?;
        self.conn.flush()?;
        Ok(())
    }

    fn show_window(&self, window: WindowId) -> Result<()> {
        self.conn.map_window(window)?;
        self.send_client_message(
            window,
            self.atoms._NET_ACTIVE_WINDOW,
            [SOURCE_APPLICATION, x11rb::CURRENT_TIME, 0, 0, 0],
        )
    }

    fn set_state(&self, window: WindowId, flag: WmStateFlag, enabled: bool) -> Result<()> {
        let state = match flag {
            WmStateFlag::Sticky => self.atoms._NET_WM_STATE_STICKY,
            WmStateFlag::SkipTaskbar => self.atoms._NET_WM_STATE_SKIP_TASKBAR,
            WmStateFlag::SkipPager => self.atoms._NET_WM_STATE_SKIP_PAGER,
        };
        let action = if enabled { NET_WM_STATE_ADD } else { NET_WM_STATE_REMOVE };
        self.send_client_message(
            window,
            self.atoms._NET_WM_STATE,
            [action, state, 0, SOURCE_APPLICATION, 0],
        )
    }
}

/// Чтение событий XCB в отдельном потоке с передачей в главный цикл
pub struct X11EventSource {
    conn: Arc<RustConnection>,
}

impl X11EventSource {
    fn pump(conn: &RustConnection, events: &UnboundedSender<PlatformEvent>) -> Result<()> {
        loop {
            let event = conn.wait_for_event()?;
            if events.send(convert_event(event)).is_err() {
                debug!("Главный цикл закрыл канал событий");
                return Ok(());
            }
        }
    }
}

#[async_trait::async_trait]
impl EventSource for X11EventSource {
    async fn run(self: Box<Self>, events: UnboundedSender<PlatformEvent>) -> Result<()> {
        info!("Запуск приёма событий X11");

        let (done_tx, done_rx) = oneshot::channel();
        let conn = Arc::clone(&self.conn);
        thread::Builder::new()
            .name("x11-events".to_string())
            .spawn(move || {
                let result = Self::pump(&conn, &events);
                if let Err(e) = &result {
                    warn!("Приём событий X11 остановлен: {}", e);
                }
                let _ = done_tx.send(result);
            })?;

        done_rx
            .await
            .map_err(|_| dock_error!(internal, "поток событий X11 завершился аварийно"))?
    }
}

fn convert_event(event: Event) -> PlatformEvent {
    match event {
        Event::FocusOut(e) => PlatformEvent::FocusOut { window: e.event },
        Event::DestroyNotify(e) => PlatformEvent::DestroyNotify { window: e.window },
        Event::UnmapNotify(e) => PlatformEvent::UnmapNotify { window: e.window },
        Event::MapNotify(e) => PlatformEvent::MapNotify { window: e.window },
        Event::VisibilityNotify(e) => PlatformEvent::VisibilityNotify {
            window: e.window,
            state: match e.state {
                XVisibility::UNOBSCURED => Visibility::Unobscured,
                XVisibility::PARTIALLY_OBSCURED => Visibility::PartiallyObscured,
                _ => Visibility::FullyObscured,
            },
        },
        Event::PropertyNotify(e) => PlatformEvent::PropertyNotify {
            window: e.window,
            atom: e.atom,
        },
        Event::ButtonPress(e) => PlatformEvent::ButtonPress {
            button: e.detail,
            child: e.child,
        },
        Event::KeyRelease(e) => PlatformEvent::KeyRelease { keycode: e.detail },
        _ => PlatformEvent::Other,
    }
}
