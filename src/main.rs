use anyhow::Result;
use clap::{ArgGroup, Parser};
use std::path::PathBuf;
use tokio::sync::mpsc::unbounded_channel;
use tracing::{error, info, warn};

mod config;
mod error;
mod events;
mod services;
mod utils;

use config::Config;
use events::{ControlMessage, DockOptions, IpcRequest, SettingsOverrides, TrayItemSignal, WindowId};
use services::scanner::PatternMode;
use services::window_system::Platform;
use services::{
    claim_or_forward, create_launcher, create_platform, create_tray_item_factory, socket_path,
    TrayItemManager,
};

#[derive(Parser, Debug)]
#[command(name = "traydock", version)]
#[command(about = "Закрепляет окна произвольных приложений в системном трее")]
#[command(group(ArgGroup::new("action").multiple(false)))]
struct Args {
    /// Не проверять, что окно является обычным окном приложения
    #[arg(short = 'b')]
    no_normal_check: bool,

    /// Сколько секунд ждать появления окна
    #[arg(short = 'd', value_name = "SECONDS")]
    timeout: Option<u64>,

    /// Режим сопоставления имени: n (обычный), r (regex), w (wildcard)
    #[arg(short = 'e', value_name = "MODE", value_parser = parse_pattern_mode, default_value = "n")]
    pattern_mode: PatternMode,

    /// Закрепить активное окно
    #[arg(short = 'f')]
    active_window: bool,

    /// Своя иконка
    #[arg(short = 'i', value_name = "PATH")]
    icon: Option<PathBuf>,

    /// Иконка для окна, требующего внимания
    #[arg(short = 'I', value_name = "PATH")]
    attention_icon: Option<PathBuf>,

    /// Учитывать регистр при сопоставлении имени
    #[arg(short = 'j')]
    case_sensitive: bool,

    /// Убирать окно в трей при потере фокуса
    #[arg(short = 'l')]
    iconify_focus_lost: bool,

    /// Не убирать окно в трей при сворачивании
    #[arg(short = 'm')]
    keep_on_minimize: bool,

    /// Шаблон имени окна
    #[arg(short = 'n', value_name = "PATTERN")]
    name: Option<String>,

    /// Убирать окно в трей, когда оно полностью перекрыто
    #[arg(short = 'o')]
    iconify_obscured: bool,

    /// Длительность всплывающих уведомлений в секундах
    #[arg(short = 'p', value_name = "SECONDS")]
    balloon_timeout: Option<u64>,

    /// Отключить всплывающие уведомления (то же, что -p 0)
    #[arg(short = 'q')]
    quiet: bool,

    /// Убрать окно из пейджера
    #[arg(short = 'r')]
    skip_pager: bool,

    /// Показывать окно на всех рабочих столах
    #[arg(short = 's')]
    sticky: bool,

    /// Убрать окно с панели задач
    #[arg(short = 't')]
    skip_taskbar: bool,

    /// Идентификатор окна (десятичный или 0x...)
    #[arg(short = 'w', value_name = "WINDOW_ID", value_parser = parse_window_id)]
    window: Option<WindowId>,

    /// Идентификатор процесса, окно которого нужно закрепить
    #[arg(short = 'x', value_name = "PID")]
    pid: Option<u32>,

    /// Открепить окно в работающем экземпляре
    #[arg(long, value_name = "WINDOW_ID", value_parser = parse_window_id, group = "action")]
    undock: Option<WindowId>,

    /// Открепить все окна в работающем экземпляре
    #[arg(long, group = "action")]
    undock_all: bool,

    /// Выбрать ещё одно окно щелчком мыши в работающем экземпляре
    #[arg(long, group = "action")]
    select_another: bool,

    /// Вывести в журнал работающего экземпляра сведения о программе
    #[arg(long, group = "action")]
    about: bool,

    /// Путь к файлу конфигурации
    #[arg(long, default_value = "traydock.toml")]
    config: PathBuf,

    /// Режим сухого запуска (без X сервера)
    #[arg(long)]
    dry_run: bool,

    /// Уровень логирования (по умолчанию из конфигурации)
    #[arg(long)]
    log_level: Option<String>,

    /// Команда для запуска и её аргументы
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "COMMAND")]
    command: Vec<String>,
}

impl Args {
    /// Действие над работающим экземпляром либо запрос на закрепление
    fn request(&self) -> IpcRequest {
        let signal = if let Some(window) = self.undock {
            Some(TrayItemSignal::Undock(window))
        } else if self.undock_all {
            Some(TrayItemSignal::UndockAll)
        } else if self.select_another {
            Some(TrayItemSignal::SelectAnother)
        } else if self.about {
            Some(TrayItemSignal::About)
        } else {
            None
        };

        match signal {
            Some(signal) => IpcRequest::Tray(signal),
            None => IpcRequest::Dock(self.dock_options()),
        }
    }

    fn dock_options(&self) -> DockOptions {
        let balloon_timeout_ms = if self.quiet {
            Some(0)
        } else {
            self.balloon_timeout.map(|secs| secs * 1000)
        };

        let mut command = self.command.iter().cloned();

        DockOptions {
            command: command.next(),
            args: command.collect(),
            name_pattern: self.name.clone(),
            pattern_mode: self.pattern_mode,
            case_sensitive: self.case_sensitive,
            window: self.window,
            pid: self.pid,
            active_window: self.active_window,
            require_normal: !self.no_normal_check,
            timeout_secs: self.timeout,
            settings: SettingsOverrides {
                custom_icon: self.icon.clone(),
                attention_icon: self.attention_icon.clone(),
                balloon_timeout_ms,
                sticky: self.sticky,
                skip_taskbar: self.skip_taskbar,
                skip_pager: self.skip_pager,
                iconify_focus_lost: self.iconify_focus_lost,
                keep_on_minimize: self.keep_on_minimize,
                iconify_obscured: self.iconify_obscured,
            },
        }
    }
}

fn parse_pattern_mode(value: &str) -> std::result::Result<PatternMode, String> {
    value.parse::<PatternMode>().map_err(|e| e.to_string())
}

fn parse_window_id(value: &str) -> std::result::Result<WindowId, String> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => WindowId::from_str_radix(hex, 16),
        None => value.parse::<WindowId>(),
    };
    parsed.map_err(|e| format!("неверный идентификатор окна '{}': {}", value, e))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Загрузка конфигурации
    let config = Config::load(&args.config)?;

    // Инициализация системы логирования
    let level = args.log_level.as_deref().unwrap_or(&config.logging.level);
    init_tracing(level, &config.logging.format)?;

    info!("Запуск traydock v{}", env!("CARGO_PKG_VERSION"));
    info!("Конфигурация загружена из: {:?}", args.config);

    let request = args.request();

    // Повторный запуск передаёт запрос работающему экземпляру
    let socket = socket_path(&config.ipc);
    let Some(ipc_server) = claim_or_forward(&socket, &request).await? else {
        return Ok(());
    };

    let options = match request {
        IpcRequest::Dock(options) => options,
        IpcRequest::Tray(signal) => {
            warn!("traydock не запущен, действие {:?} не выполнено", signal);
            return Ok(());
        }
    };
    info!("Ожидание повторных запусков на {:?}", ipc_server.path());

    if args.dry_run {
        warn!("Режим сухого запуска - X сервер не используется");
    }

    let Platform {
        window_system,
        event_source,
    } = create_platform(args.dry_run)?;

    let (events_tx, events_rx) = unbounded_channel();
    let (control_tx, control_rx) = unbounded_channel();

    let manager = TrayItemManager::new(
        &config,
        window_system.clone(),
        create_tray_item_factory(window_system),
        create_launcher(args.dry_run),
        events_rx,
        control_tx.clone(),
        control_rx,
    );

    info!("Все компоненты инициализированы");

    // Запуск фоновых задач
    let events_handle = tokio::spawn(async move {
        if let Err(e) = event_source.run(events_tx).await {
            error!("Ошибка в источнике событий: {}", e);
        }
    });
    let ipc_tx = control_tx.clone();
    let ipc_handle = tokio::spawn(async move {
        if let Err(e) = ipc_server.run(ipc_tx).await {
            error!("Ошибка в IPC сервере: {}", e);
        }
    });
    let signal_tx = control_tx.clone();
    let signal_handle = tokio::spawn(async move {
        if let Err(e) = utils::listen_for_shutdown(signal_tx).await {
            error!("Ошибка при ожидании сигнала завершения: {}", e);
        }
    });

    // Первый запрос обрабатывается так же, как запросы повторных запусков
    if control_tx.send(ControlMessage::Command(options)).is_err() {
        anyhow::bail!("Канал управления закрыт до запуска менеджера");
    }
    drop(control_tx);

    let result = manager.run().await;

    info!("Завершение работы...");

    // Задача IPC удаляет сокет при отмене
    ipc_handle.abort();
    signal_handle.abort();
    events_handle.abort();
    let _ = ipc_handle.await;

    result?;
    info!("traydock завершил работу");
    Ok(())
}

fn init_tracing(level: &str, format: &str) -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;

    let registry = tracing_subscriber::registry().with(filter);
    if format == "compact" {
        registry.with(tracing_subscriber::fmt::layer().compact()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    Ok(())
}
