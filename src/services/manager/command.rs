use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::grab::{GrabOutcome, SELECT_BUTTON};
use super::TrayItemManager;
use crate::error::{DockError, Result};
use crate::events::{DockOptions, WindowId};
use crate::services::scanner::NamePattern;

impl TrayItemManager {
    /// Обработать запрос на закрепление из командной строки или от
    /// повторного запуска. Ошибки пользовательского ввода логируются,
    /// после чего проверяется условие завершения.
    pub async fn process_command(&mut self, options: DockOptions) {
        if let Err(e) = self.try_process_command(options).await {
            warn!("{}", e);
            self.check_termination();
        }
    }

    async fn try_process_command(&mut self, options: DockOptions) -> Result<()> {
        let settings = options.settings.apply_to(&self.dock_defaults);

        if options.wants_scan() {
            let pattern = NamePattern::compile(
                options.name_pattern.as_deref().unwrap_or(""),
                options.pattern_mode,
                options.case_sensitive,
            )?;
            let timeout = options
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(self.default_timeout);

            match options.command {
                Some(command) => self.scanner.enqueue_launch(
                    command,
                    options.args,
                    pattern,
                    timeout,
                    options.require_normal,
                    settings,
                ),
                None => self
                    .scanner
                    .enqueue_search(pattern, timeout, options.require_normal, settings),
            }
            return Ok(());
        }

        let window = if let Some(window) = options.window {
            if !self.window_system.is_valid_window(window) {
                return Err(DockError::InvalidWindow(window));
            }
            Some(window)
        } else if options.active_window {
            Some(self.window_system.active_window().ok_or(DockError::NoActiveWindow)?)
        } else if let Some(pid) = options.pid {
            let exclude = self.docked_windows();
            let window = self
                .window_system
                .pid_to_window(pid, options.require_normal, &exclude);
            if window.is_none() {
                warn!("У процесса {} нет подходящих окон", pid);
            }
            window
        } else {
            self.select_window(options.require_normal).await?
        };

        match window {
            Some(window) => self.dock(window, settings),
            None => {
                self.check_termination();
                Ok(())
            }
        }
    }

    /// Интерактивный выбор окна щелчком мыши. Пока сессия активна, главный
    /// цикл продолжает работать: закреплённые окна получают события, сканер
    /// опрашивается, сигналы трея обрабатываются, новые команды ждут в очереди.
    pub async fn select_window(&mut self, require_normal: bool) -> Result<Option<WindowId>> {
        let deadline = Instant::now() + self.grab_timeout;
        self.grab.begin(deadline)?;

        if let Err(e) = self.window_system.grab_input() {
            self.grab.abort();
            self.grab.take_selection();
            return Err(e);
        }
        info!("Выберите окно щелчком левой кнопки мыши (Escape для отмены)");

        self.finish_selection(require_normal).await
    }

    /// Дождаться завершения начатой сессии и определить выбранное окно
    async fn finish_selection(&mut self, require_normal: bool) -> Result<Option<WindowId>> {
        while self.grab.is_active() {
            let wakeup = self.next_wakeup().await;
            self.handle_wakeup(wakeup);
        }

        if let Err(e) = self.window_system.release_input() {
            warn!("Не удалось освободить указатель: {}", e);
        }

        let outcome = self.grab.outcome();
        let selection = self.grab.take_selection();
        match outcome {
            Some(GrabOutcome::TimedOut) => warn!("Время выбора окна истекло"),
            Some(GrabOutcome::Cancelled) => info!("Выбор окна отменён"),
            Some(GrabOutcome::Completed { button, .. }) if button != SELECT_BUTTON => {
                info!("Выбор окна прерван кнопкой {}", button)
            }
            _ => {}
        }

        let Some(child) = selection.selected_window() else {
            return Ok(None);
        };

        let window = self.window_system.client_window(child);
        debug!("Выбрано окно {:#x} (рамка {:#x})", window, child);

        if require_normal && !self.window_system.is_normal_window(window) {
            warn!("Окно {:#x} не является обычным окном приложения, закрепляется как есть", window);
        }
        Ok(Some(window))
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::harness;
    use crate::config::DockSettings;
    use crate::events::platform::ESCAPE_KEYCODE;
    use crate::events::{ControlMessage, DockOptions, PlatformEvent, SettingsOverrides, TrayItemSignal, WindowInfo};
    use crate::services::scanner::PatternMode;
    use std::time::Duration;
    use tokio::time::Instant;

    #[tokio::test]
    async fn test_explicit_window_docked() {
        let mut h = harness();
        h.ws.add_window(WindowInfo::new(0x1234, "Terminal"));

        let options = DockOptions {
            window: Some(0x1234),
            settings: SettingsOverrides {
                skip_pager: true,
                ..Default::default()
            },
            ..Default::default()
        };
        h.manager.process_command(options).await;

        assert_eq!(h.manager.docked_windows().as_slice(), &[0x1234]);
        assert!(h.log.borrow().settings_of(0x1234).is_some_and(|s| s.skip_pager));
        assert_eq!(h.drain_quits(), 0);
    }

    #[tokio::test]
    async fn test_invalid_window_terminates() {
        let mut h = harness();
        let options = DockOptions {
            window: Some(0xdead),
            ..Default::default()
        };
        h.manager.process_command(options).await;

        assert!(h.log.borrow().created.is_empty());
        assert_eq!(h.drain_quits(), 1);
    }

    #[tokio::test]
    async fn test_invalid_window_keeps_running_when_docked() {
        let mut h = harness();
        h.manager.dock(0x1, DockSettings::default()).unwrap();

        let options = DockOptions {
            window: Some(0xdead),
            ..Default::default()
        };
        h.manager.process_command(options).await;
        assert_eq!(h.drain_quits(), 0);
    }

    #[tokio::test]
    async fn test_pid_resolution_skips_docked() {
        let mut h = harness();
        h.ws.add_window(WindowInfo::new(0x20, "a").with_pid(77));
        h.ws.add_window(WindowInfo::new(0x30, "b").with_pid(77));
        h.manager.dock(0x20, DockSettings::default()).unwrap();

        let options = DockOptions {
            pid: Some(77),
            ..Default::default()
        };
        h.manager.process_command(options).await;
        assert_eq!(h.manager.docked_windows().as_slice(), &[0x20, 0x30]);
    }

    #[tokio::test]
    async fn test_pid_without_window_terminates() {
        let mut h = harness();
        let options = DockOptions {
            pid: Some(12345),
            ..Default::default()
        };
        h.manager.process_command(options).await;
        assert_eq!(h.drain_quits(), 1);
    }

    #[tokio::test]
    async fn test_active_window() {
        let mut h = harness();
        let options = DockOptions {
            active_window: true,
            ..Default::default()
        };
        h.manager.process_command(options.clone()).await;
        assert_eq!(h.drain_quits(), 1);

        h.ws.set_active(Some(0x77));
        h.manager.process_command(options).await;
        assert_eq!(h.manager.docked_windows().as_slice(), &[0x77]);
    }

    #[tokio::test]
    async fn test_invalid_regex_reported() {
        let mut h = harness();
        let options = DockOptions {
            name_pattern: Some("(unclosed".to_string()),
            pattern_mode: PatternMode::Regex,
            ..Default::default()
        };
        h.manager.process_command(options).await;

        assert!(!h.manager.scanner.is_running());
        assert_eq!(h.drain_quits(), 1);
    }

    #[tokio::test]
    async fn test_scan_request_enqueued() {
        let mut h = harness();
        let options = DockOptions {
            command: Some("xclock".to_string()),
            name_pattern: Some("xclock".to_string()),
            ..Default::default()
        };
        h.manager.process_command(options).await;

        assert!(h.manager.scanner.is_running());
        assert_eq!(h.drain_quits(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_grab_selects_client_window() {
        let mut h = harness();
        h.ws.add_window(WindowInfo::new(0x4400001, "Editor"));
        h.events_tx
            .send(PlatformEvent::ButtonPress {
                button: 1,
                child: 0x4400001,
            })
            .unwrap();

        h.manager.process_command(DockOptions::default()).await;

        assert_eq!(h.manager.docked_windows().as_slice(), &[0x4400001]);
        assert_eq!(h.ws.operations()[..2], ["grab".to_string(), "release".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_grab_escape_cancels() {
        let mut h = harness();
        h.events_tx
            .send(PlatformEvent::KeyRelease { keycode: 38 })
            .unwrap();
        h.events_tx
            .send(PlatformEvent::KeyRelease {
                keycode: ESCAPE_KEYCODE,
            })
            .unwrap();

        let selected = h.manager.select_window(true).await.unwrap();

        assert_eq!(selected, None);
        assert_eq!(h.ws.operations(), vec!["grab", "release"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_grab_times_out() {
        let mut h = harness();
        let start = tokio::time::Instant::now();

        let selected = h.manager.select_window(true).await.unwrap();

        assert_eq!(selected, None);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(20_000));
        assert!(elapsed < Duration::from_millis(20_100));
        assert!(!h.manager.grab.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_grab_other_button_aborts_non_normal_accepted() {
        let mut h = harness();
        h.ws.add_window(WindowInfo::new(0x50, "Dock").with_normal(false));

        h.events_tx
            .send(PlatformEvent::ButtonPress { button: 3, child: 0x50 })
            .unwrap();
        assert_eq!(h.manager.select_window(false).await.unwrap(), None);

        // Необычное окно, выбранное вручную, закрепляется с предупреждением
        h.events_tx
            .send(PlatformEvent::ButtonPress { button: 1, child: 0x50 })
            .unwrap();
        assert_eq!(h.manager.select_window(true).await.unwrap(), Some(0x50));

        h.events_tx
            .send(PlatformEvent::ButtonPress { button: 1, child: 0x50 })
            .unwrap();
        assert_eq!(h.manager.select_window(false).await.unwrap(), Some(0x50));
    }

    #[tokio::test]
    async fn test_grab_failure_reported() {
        let mut h = harness();
        h.ws.fail_grab();

        assert!(h.manager.select_window(true).await.is_err());
        assert!(!h.manager.grab.is_active());

        h.manager.process_command(DockOptions::default()).await;
        assert_eq!(h.drain_quits(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_select_another_uses_grab() {
        let mut h = harness();
        h.ws.add_window(WindowInfo::new(0x61, "First"));
        h.ws.add_window(WindowInfo::new(0x62, "Second"));
        h.manager.dock(0x61, DockSettings::default()).unwrap();

        h.events_tx
            .send(PlatformEvent::ButtonPress { button: 1, child: 0x62 })
            .unwrap();
        h.manager
            .handle_tray_signal(TrayItemSignal::SelectAnother);
        h.manager.process_pending_commands().await;

        assert_eq!(h.manager.docked_windows().as_slice(), &[0x61, 0x62]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_press_beats_deadline() {
        let mut h = harness();
        h.ws.add_window(WindowInfo::new(0x4400001, "Editor"));

        let deadline = Instant::now() + Duration::from_secs(20);
        h.manager.grab.begin(deadline).unwrap();
        h.events_tx
            .send(PlatformEvent::ButtonPress {
                button: 1,
                child: 0x4400001,
            })
            .unwrap();
        tokio::time::advance(Duration::from_secs(20)).await;
        assert_eq!(Instant::now(), deadline);

        let selected = h.manager.finish_selection(true).await.unwrap();
        assert_eq!(selected, Some(0x4400001));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_grab() {
        let h = harness();
        let ws = h.ws.clone();
        let control_tx = h.control_tx.clone();
        control_tx
            .send(ControlMessage::Command(DockOptions::default()))
            .unwrap();

        let start = Instant::now();
        let driver = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            control_tx.send(ControlMessage::Shutdown).unwrap();
        };
        let (result, ()) = tokio::join!(h.manager.run(), driver);
        result.unwrap();

        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(ws.operations(), vec!["grab", "release"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scanner_keeps_polling_during_grab() {
        let mut h = harness();
        let ws = h.ws.clone();
        let log = h.log.clone();
        let events_tx = h.events_tx.clone();

        for (pattern, timeout_secs) in [("xclock", 5), ("nothing-matches", 1)] {
            h.manager
                .process_command(DockOptions {
                    name_pattern: Some(pattern.to_string()),
                    timeout_secs: Some(timeout_secs),
                    ..Default::default()
                })
                .await;
        }

        let driver = async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            ws.add_window(WindowInfo::new(0x3c00007, "xclock"));
            tokio::time::sleep(Duration::from_millis(1000)).await;
            assert_eq!(log.borrow().created, vec![0x3c00007]);
            events_tx
                .send(PlatformEvent::KeyRelease {
                    keycode: ESCAPE_KEYCODE,
                })
                .unwrap();
        };
        let (selected, ()) = tokio::join!(h.manager.select_window(true), driver);

        assert_eq!(selected.unwrap(), None);
        assert!(!h.manager.scanner.is_running());
        assert_eq!(h.manager.docked_windows().as_slice(), &[0x3c00007]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tray_signal_handled_during_grab() {
        let mut h = harness();
        h.manager.dock(0x5, DockSettings::default()).unwrap();
        let control_tx = h.control_tx.clone();
        let events_tx = h.events_tx.clone();
        let log = h.log.clone();

        let driver = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            control_tx
                .send(ControlMessage::Tray(TrayItemSignal::Died(0x5)))
                .unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
            assert!(log.borrow().calls.contains(&"drop 0x5".to_string()));
            events_tx
                .send(PlatformEvent::KeyRelease {
                    keycode: ESCAPE_KEYCODE,
                })
                .unwrap();
        };
        let (selected, ()) = tokio::join!(h.manager.select_window(true), driver);

        assert_eq!(selected.unwrap(), None);
        assert!(h.manager.docked_windows().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_command_deferred_until_grab_ends() {
        let h = harness();
        h.ws.add_window(WindowInfo::new(0x42, "Editor"));
        h.ws.add_window(WindowInfo::new(0x77, "Terminal"));
        let control_tx = h.control_tx.clone();
        let events_tx = h.events_tx.clone();
        let log = h.log.clone();

        control_tx
            .send(ControlMessage::Command(DockOptions::default()))
            .unwrap();

        let driver = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            control_tx
                .send(ControlMessage::Command(DockOptions {
                    window: Some(0x77),
                    ..Default::default()
                }))
                .unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
            assert!(log.borrow().created.is_empty());

            events_tx
                .send(PlatformEvent::ButtonPress { button: 1, child: 0x42 })
                .unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
            assert_eq!(log.borrow().created, vec![0x42, 0x77]);
            control_tx.send(ControlMessage::Shutdown).unwrap();
        };
        let (result, ()) = tokio::join!(h.manager.run(), driver);
        result.unwrap();
    }
}
