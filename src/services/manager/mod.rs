//! Manager: реестр закреплённых окон и главный цикл.
//!
//! Менеджер владеет сканером, реестром и сессией выбора окна. Все они
//! живут в одном потоке управления; события оконной системы, сообщения
//! управления и тики сканера приходят через `next_wakeup`. Этот же
//! источник использует ожидание выбора окна, поэтому во время выбора
//! сканер и сообщения управления продолжают обрабатываться.

mod command;
mod dispatch;
mod grab;

use grab::GrabSession;

use smallvec::SmallVec;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::time::{interval, sleep_until, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::{Config, DockSettings};
use crate::dock_error;
use crate::error::{DockError, Result};
use crate::events::{ControlMessage, DockOptions, PlatformEvent, TrayItemSignal, WindowId};
use crate::services::scanner::{ProcessLauncher, ScanEvent, Scanner};
use crate::services::tray_item::{TrayItem, TrayItemFactory};
use crate::services::window_system::WindowSystem;

pub struct TrayItemManager {
    window_system: Rc<dyn WindowSystem>,
    factory: Box<dyn TrayItemFactory>,
    scanner: Scanner,
    /// Закреплённые окна в порядке добавления
    registry: Vec<Box<dyn TrayItem>>,
    grab: GrabSession,
    events: UnboundedReceiver<PlatformEvent>,
    control_rx: UnboundedReceiver<ControlMessage>,
    control_tx: UnboundedSender<ControlMessage>,
    /// Команды ждут, пока главный цикл не освободится от выбора окна
    pending_commands: VecDeque<DockOptions>,
    /// Создаётся при первом ожидании: `interval` требует запущенного runtime
    scan_tick: Option<Interval>,
    was_scanning: bool,
    stop: Option<Stop>,
    dock_defaults: DockSettings,
    default_timeout: Duration,
    grab_timeout: Duration,
}

/// Причина остановки главного цикла
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    /// Закреплённых окон, поисков и команд не осталось
    Idle,
    /// SIGINT/SIGTERM или закрытый канал управления
    Shutdown,
    EventsLost,
}

/// Что разбудило главный цикл
#[derive(Debug)]
enum Wakeup {
    Control(Option<ControlMessage>),
    Platform(Option<PlatformEvent>),
    ScanTick,
    GrabDeadline,
}

impl TrayItemManager {
    pub fn new(
        config: &Config,
        window_system: Rc<dyn WindowSystem>,
        factory: Box<dyn TrayItemFactory>,
        launcher: Box<dyn ProcessLauncher>,
        events: UnboundedReceiver<PlatformEvent>,
        control_tx: UnboundedSender<ControlMessage>,
        control_rx: UnboundedReceiver<ControlMessage>,
    ) -> Self {
        Self {
            window_system,
            factory,
            scanner: Scanner::new(config.scan_interval(), launcher),
            registry: Vec::new(),
            grab: GrabSession::new(),
            events,
            control_rx,
            control_tx,
            pending_commands: VecDeque::new(),
            scan_tick: None,
            was_scanning: false,
            stop: None,
            dock_defaults: config.dock.clone(),
            default_timeout: Duration::from_secs(config.scanner.default_timeout_secs),
            grab_timeout: config.grab_timeout(),
        }
    }

    fn is_docked(&self, window: WindowId) -> bool {
        self.registry.iter().any(|item| item.docked_window() == window)
    }

    /// Закреплённые окна в порядке добавления
    pub fn docked_windows(&self) -> SmallVec<[WindowId; 8]> {
        self.registry.iter().map(|item| item.docked_window()).collect()
    }

    /// Нет закреплённых окон, поисков, отложенных команд и выбора окна
    fn is_idle(&self) -> bool {
        self.registry.is_empty()
            && !self.scanner.is_running()
            && self.pending_commands.is_empty()
            && !self.grab.is_active()
    }

    /// Закрепить окно. Повторное закрепление отклоняется, существующая
    /// запись не меняется.
    pub fn dock(&mut self, window: WindowId, settings: DockSettings) -> Result<()> {
        if self.is_docked(window) {
            return Err(DockError::AlreadyDocked(window));
        }

        // При ошибке show элемент уничтожается здесь же и в реестр не попадает
        let mut item = self.factory.create(window, &settings, self.control_tx.clone())?;
        item.show()?;

        debug!("Окно {:#x} добавлено в реестр: {:?}", window, settings);
        self.registry.push(item);
        Ok(())
    }

    /// Удалить запись и уничтожить элемент трея
    pub fn remove(&mut self, window: WindowId) -> bool {
        let Some(index) = self.registry.iter().position(|item| item.docked_window() == window) else {
            return false;
        };

        let item = self.registry.remove(index);
        drop(item);
        debug!("Окно {:#x} удалено из реестра", window);

        self.check_termination();
        true
    }

    /// Вернуть окно в обычное состояние и удалить его из реестра
    pub fn undock(&mut self, window: WindowId) -> bool {
        let Some(item) = self.registry.iter_mut().find(|item| item.docked_window() == window) else {
            return false;
        };

        if let Err(e) = item.restore() {
            warn!("Не удалось восстановить окно {:#x}: {}", window, e);
        }
        if let Err(e) = item.set_skip_taskbar(false) {
            warn!("Не удалось вернуть окно {:#x} на панель задач: {}", window, e);
        }
        info!("Окно {:#x} откреплено", window);

        self.remove(window)
    }

    pub fn undock_all(&mut self) {
        for window in self.docked_windows() {
            self.undock(window);
        }
    }

    /// Запросить выход, если закреплённых окон и ожидающих поисков нет.
    /// Возвращает true, если запрос отправлен.
    pub fn check_termination(&self) -> bool {
        if !self.registry.is_empty() || self.scanner.is_running() {
            return false;
        }

        info!("Закреплённых окон и ожидающих поисков нет, завершение работы");
        if self.control_tx.send(ControlMessage::Quit).is_err() {
            debug!("Главный цикл уже остановлен");
        }
        true
    }

    /// Шаг сканера: закрепить найденные окна и обработать остановку
    pub fn poll_scanner(&mut self) {
        let exclude = self.docked_windows();
        let events = self.scanner.poll(self.window_system.as_ref(), &exclude);

        for event in events {
            match event {
                ScanEvent::WindowFound { window, settings } => {
                    if let Err(e) = self.dock(window, settings) {
                        warn!("{}", e);
                    }
                }
                ScanEvent::LaunchFailed(e) => error!("{}", e),
                ScanEvent::Stopped => {
                    self.check_termination();
                }
            }
        }
    }

    /// Сигнал элемента трея. Повторный выбор окна ставится в очередь
    /// команд и выполняется главным циклом.
    pub fn handle_tray_signal(&mut self, signal: TrayItemSignal) {
        debug!("Сигнал элемента трея: {:?}", signal);
        match signal {
            TrayItemSignal::SelectAnother => self.pending_commands.push_back(DockOptions::default()),
            TrayItemSignal::Died(window) => {
                self.remove(window);
            }
            TrayItemSignal::Undock(window) => {
                if !self.undock(window) {
                    warn!("Окно {:#x} не закреплено", window);
                }
            }
            TrayItemSignal::UndockAll => self.undock_all(),
            TrayItemSignal::About => info!(
                "{} v{}: {}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION"),
                env!("CARGO_PKG_DESCRIPTION")
            ),
        }
    }

    /// Дождаться следующего события. Во время выбора окна добавляется
    /// ветка дедлайна; она опрашивается последней, поэтому уже пришедшее
    /// нажатие побеждает истечение срока.
    async fn next_wakeup(&mut self) -> Wakeup {
        let scanning = self.scanner.is_running();
        let period = self.scanner.interval();
        let scan_tick = self.scan_tick.get_or_insert_with(|| {
            let mut tick = interval(period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tick
        });
        if scanning && !self.was_scanning {
            // Первый опрос через один период после постановки в очередь
            scan_tick.reset();
        }
        self.was_scanning = scanning;

        let deadline = self.grab.deadline();

        tokio::select! {
            biased;
            message = self.control_rx.recv() => Wakeup::Control(message),
            event = self.events.recv() => Wakeup::Platform(event),
            _ = scan_tick.tick(), if scanning => Wakeup::ScanTick,
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => Wakeup::GrabDeadline,
        }
    }

    fn handle_wakeup(&mut self, wakeup: Wakeup) {
        match wakeup {
            Wakeup::Control(Some(ControlMessage::Command(options))) => {
                if self.grab.is_active() {
                    debug!("Команда отложена до завершения выбора окна");
                }
                self.pending_commands.push_back(options);
            }
            Wakeup::Control(Some(ControlMessage::Tray(signal))) => self.handle_tray_signal(signal),
            Wakeup::Control(Some(ControlMessage::Quit)) => {
                if self.quit_is_stale() {
                    debug!("Запрос на выход устарел, продолжаем работу");
                } else {
                    self.request_stop(Stop::Idle);
                }
            }
            Wakeup::Control(Some(ControlMessage::Shutdown)) => {
                info!("Получен сигнал завершения");
                self.request_stop(Stop::Shutdown);
            }
            Wakeup::Control(None) => self.request_stop(Stop::Shutdown),
            Wakeup::Platform(Some(event)) => self.dispatch(event),
            Wakeup::Platform(None) => {
                error!("Источник событий оконной системы остановлен");
                self.request_stop(Stop::EventsLost);
            }
            Wakeup::ScanTick => self.poll_scanner(),
            Wakeup::GrabDeadline => {
                self.grab.expire(Instant::now());
            }
        }
    }

    /// Между запросом на выход и его обработкой могли прийти новые
    /// сообщения. Сообщения, уже стоящие в канале, разбираются здесь же:
    /// выход уместен, только если после них менеджер по-прежнему простаивает.
    fn quit_is_stale(&mut self) -> bool {
        loop {
            if !self.is_idle() {
                return true;
            }
            match self.control_rx.try_recv() {
                Ok(ControlMessage::Quit) => {}
                Ok(message) => self.handle_wakeup(Wakeup::Control(Some(message))),
                Err(_) => return false,
            }
        }
    }

    fn request_stop(&mut self, stop: Stop) {
        if self.stop.is_none() {
            self.stop = Some(stop);
        }
        // Указатель освобождает ожидающий select_window
        self.grab.abort();
    }

    async fn process_pending_commands(&mut self) {
        while self.stop.is_none() {
            let Some(options) = self.pending_commands.pop_front() else {
                break;
            };
            self.process_command(options).await;
        }
    }

    /// Главный цикл. Завершается, когда делать больше нечего, по
    /// `Shutdown` (после открепления всех окон) или при остановке
    /// источника событий.
    pub async fn run(mut self) -> Result<()> {
        info!("Менеджер трея запущен");

        let stop = loop {
            self.process_pending_commands().await;
            if let Some(stop) = self.stop {
                break stop;
            }
            let wakeup = self.next_wakeup().await;
            self.handle_wakeup(wakeup);
        };

        match stop {
            Stop::Idle => {}
            Stop::Shutdown => {
                if !self.pending_commands.is_empty() {
                    warn!("Не обработано команд: {}", self.pending_commands.len());
                }
                info!("Открепление всех окон");
                self.undock_all();
            }
            Stop::EventsLost => {
                self.undock_all();
                return Err(dock_error!(internal, "канал событий оконной системы закрыт"));
            }
        }

        info!("Менеджер трея остановлен");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::WindowInfo;
    use crate::services::test_support::{FakeLauncher, FakeWindowSystem, RecordingTrayItemFactory, TrayLog};
    use std::cell::RefCell;
    use tokio::sync::mpsc::unbounded_channel;

    pub(super) struct Harness {
        pub manager: TrayItemManager,
        pub ws: Rc<FakeWindowSystem>,
        pub log: Rc<RefCell<TrayLog>>,
        pub events_tx: UnboundedSender<PlatformEvent>,
        pub control_tx: UnboundedSender<ControlMessage>,
    }

    impl Harness {
        /// Количество сообщений Quit в очереди управления
        pub fn drain_quits(&mut self) -> usize {
            let mut quits = 0;
            while let Ok(message) = self.manager.control_rx.try_recv() {
                if message == ControlMessage::Quit {
                    quits += 1;
                }
            }
            quits
        }
    }

    pub(super) fn harness() -> Harness {
        harness_with(Config::default(), FakeLauncher::new(1))
    }

    pub(super) fn harness_with(config: Config, launcher: FakeLauncher) -> Harness {
        let ws = Rc::new(FakeWindowSystem::new());
        let factory = RecordingTrayItemFactory::new();
        let log = factory.log();
        let (events_tx, events_rx) = unbounded_channel();
        let (control_tx, control_rx) = unbounded_channel();

        let manager = TrayItemManager::new(
            &config,
            ws.clone(),
            Box::new(factory),
            Box::new(launcher),
            events_rx,
            control_tx.clone(),
            control_rx,
        );

        Harness {
            manager,
            ws,
            log,
            events_tx,
            control_tx,
        }
    }

    #[test]
    fn test_duplicate_dock_rejected() {
        let mut h = harness();

        h.manager.dock(0x100, DockSettings::default()).unwrap();
        let err = h.manager.dock(0x100, DockSettings::default()).unwrap_err();

        assert!(matches!(err, DockError::AlreadyDocked(0x100)));
        assert_eq!(h.log.borrow().created, vec![0x100]);
        assert_eq!(h.manager.docked_windows().as_slice(), &[0x100]);
    }

    #[test]
    fn test_single_quit_on_last_removal() {
        let mut h = harness();
        h.manager.dock(1, DockSettings::default()).unwrap();
        h.manager.dock(2, DockSettings::default()).unwrap();

        assert!(h.manager.remove(1));
        assert_eq!(h.drain_quits(), 0);

        assert!(h.manager.remove(2));
        assert_eq!(h.drain_quits(), 1);

        // Повторное удаление ничего не делает
        assert!(!h.manager.remove(2));
        assert_eq!(h.drain_quits(), 0);
    }

    #[test]
    fn test_no_quit_while_scanning() {
        let mut h = harness();
        h.manager.dock(7, DockSettings::default()).unwrap();
        h.manager
            .scanner
            .enqueue_search(
                crate::services::scanner::NamePattern::compile("x", Default::default(), false).unwrap(),
                Duration::from_secs(1),
                true,
                DockSettings::default(),
            );

        h.manager.remove(7);
        assert_eq!(h.drain_quits(), 0);
        assert!(h.manager.scanner.is_running());
    }

    #[test]
    fn test_undock_restores_and_clears_skip_taskbar() {
        let mut h = harness();
        h.manager.dock(0x10, DockSettings::default()).unwrap();
        h.manager.dock(0x20, DockSettings::default()).unwrap();

        h.manager.undock_all();

        let calls = h.log.borrow().calls.clone();
        assert_eq!(
            calls,
            vec![
                "show 0x10",
                "show 0x20",
                "restore 0x10",
                "skip_taskbar 0x10 false",
                "drop 0x10",
                "restore 0x20",
                "skip_taskbar 0x20 false",
                "drop 0x20",
            ]
        );
        assert!(h.manager.docked_windows().is_empty());
        assert_eq!(h.drain_quits(), 1);
    }

    #[test]
    fn test_scanner_window_found_is_docked() {
        let mut h = harness();
        h.ws.add_window(WindowInfo::new(0x3c00007, "XClock"));
        h.manager.scanner.enqueue_search(
            crate::services::scanner::NamePattern::compile("xclock", Default::default(), false).unwrap(),
            Duration::from_secs(1),
            true,
            DockSettings {
                sticky: true,
                ..Default::default()
            },
        );

        h.manager.poll_scanner();

        assert!(h.manager.is_docked(0x3c00007));
        assert!(h.log.borrow().settings_of(0x3c00007).is_some_and(|s| s.sticky));
        assert!(!h.manager.scanner.is_running());
        assert_eq!(h.drain_quits(), 0);
    }

    #[test]
    fn test_tray_signals() {
        let mut h = harness();
        h.manager.dock(0x1, DockSettings::default()).unwrap();
        h.manager.dock(0x2, DockSettings::default()).unwrap();

        h.manager.handle_tray_signal(TrayItemSignal::Died(0x1));
        assert_eq!(h.manager.docked_windows().as_slice(), &[0x2]);
        assert!(!h.log.borrow().calls.contains(&"restore 0x1".to_string()));

        h.manager.handle_tray_signal(TrayItemSignal::Undock(0x2));
        assert!(h.log.borrow().calls.contains(&"restore 0x2".to_string()));
        assert_eq!(h.drain_quits(), 1);

        // Сигнал для неизвестного окна игнорируется
        h.manager.handle_tray_signal(TrayItemSignal::Undock(0x99));
        h.manager.handle_tray_signal(TrayItemSignal::About);
        assert_eq!(h.drain_quits(), 0);

        h.manager.handle_tray_signal(TrayItemSignal::SelectAnother);
        assert_eq!(h.manager.pending_commands.len(), 1);
        assert!(!h.manager.is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_quits_after_search_timeout() {
        let h = harness();
        let options = DockOptions {
            name_pattern: Some("nothing-matches".to_string()),
            timeout_secs: Some(1),
            ..Default::default()
        };
        h.control_tx.send(ControlMessage::Command(options)).unwrap();

        let start = tokio::time::Instant::now();
        h.manager.run().await.unwrap();

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(1));
        assert!(elapsed < Duration::from_millis(1200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_launch_and_shutdown() {
        let h = harness_with(Config::default(), FakeLauncher::new(4242));
        let ws = h.ws.clone();
        let log = h.log.clone();
        let control_tx = h.control_tx.clone();

        let options = DockOptions {
            command: Some("xclock".to_string()),
            timeout_secs: Some(5),
            ..Default::default()
        };
        control_tx.send(ControlMessage::Command(options)).unwrap();

        let driver = async {
            tokio::time::sleep(Duration::from_millis(1200)).await;
            ws.add_window(WindowInfo::new(0x3c00007, "xclock").with_pid(4242));
            tokio::time::sleep(Duration::from_millis(500)).await;
            assert_eq!(log.borrow().created, vec![0x3c00007]);
            control_tx.send(ControlMessage::Shutdown).unwrap();
        };

        let (result, ()) = tokio::join!(h.manager.run(), driver);
        result.unwrap();

        let calls = log.borrow().calls.clone();
        assert!(calls.contains(&"restore 0x3c00007".to_string()));
        assert_eq!(calls.last().map(String::as_str), Some("drop 0x3c00007"));
    }

    #[tokio::test]
    async fn test_run_ignores_stale_quit() {
        let mut h = harness();
        h.manager.dock(0x5, DockSettings::default()).unwrap();
        h.control_tx.send(ControlMessage::Quit).unwrap();
        h.control_tx.send(ControlMessage::Tray(TrayItemSignal::Died(0x5))).unwrap();

        h.manager.run().await.unwrap();
    }

    #[tokio::test]
    async fn test_run_serves_command_queued_behind_quit() {
        let h = harness();
        h.ws.add_window(WindowInfo::new(0x42, "Terminal"));

        // Quit уже в очереди, когда повторный запуск передал команду
        h.control_tx.send(ControlMessage::Quit).unwrap();
        h.control_tx
            .send(ControlMessage::Command(DockOptions {
                window: Some(0x42),
                ..Default::default()
            }))
            .unwrap();
        h.control_tx.send(ControlMessage::Tray(TrayItemSignal::Died(0x42))).unwrap();

        h.manager.run().await.unwrap();

        assert_eq!(h.log.borrow().created, vec![0x42]);
    }

    #[tokio::test]
    async fn test_run_stops_when_events_lost() {
        let Harness {
            mut manager,
            log,
            events_tx,
            ..
        } = harness();
        manager.dock(0x9, DockSettings::default()).unwrap();
        drop(events_tx);

        assert!(manager.run().await.is_err());
        assert!(log.borrow().calls.contains(&"restore 0x9".to_string()));
    }
}
