use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    pub logging: LoggingConfig,
    pub scanner: ScannerConfig,
    pub grab: GrabConfig,
    #[serde(default)]
    pub dock: DockSettings,
    #[serde(default)]
    pub ipc: IpcConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ScannerConfig {
    /// Период опроса очереди поиска
    pub interval_ms: u64,
    /// Таймаут поиска окна, если он не задан в командной строке
    pub default_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GrabConfig {
    /// Максимальная длительность интерактивного выбора окна
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct IpcConfig {
    #[serde(default)]
    pub socket_path: Option<PathBuf>,
}

/// Настройки закрепления одного окна
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DockSettings {
    pub custom_icon: Option<PathBuf>,
    pub attention_icon: Option<PathBuf>,
    /// None - значение по умолчанию элемента трея, 0 - без уведомлений
    pub balloon_timeout_ms: Option<u64>,
    pub sticky: bool,
    pub skip_taskbar: bool,
    pub skip_pager: bool,
    pub iconify_focus_lost: bool,
    pub iconify_minimized: bool,
    pub iconify_obscured: bool,
}

impl Default for DockSettings {
    fn default() -> Self {
        Self {
            custom_icon: None,
            attention_icon: None,
            balloon_timeout_ms: None,
            sticky: false,
            skip_taskbar: false,
            skip_pager: false,
            iconify_focus_lost: false,
            iconify_minimized: true,
            iconify_obscured: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
            scanner: ScannerConfig {
                interval_ms: 100,
                default_timeout_secs: 5,
            },
            grab: GrabConfig { timeout_ms: 20_000 },
            dock: DockSettings::default(),
            ipc: IpcConfig::default(),
        }
    }
}

impl Config {
    /// Загружает конфигурацию: значения по умолчанию, затем TOML файл
    /// (если он существует), затем переменные окружения `TRAYDOCK_*`.
    pub fn load<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let config_path = config_path.as_ref();

        let figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("TRAYDOCK_").split("__"));

        let config: Config = figment
            .extract()
            .with_context(|| format!("Не удалось загрузить конфигурацию из {:?}", config_path))?;

        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        // Валидация настроек логирования
        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!("Неверный уровень логирования: {}", self.logging.level),
        }

        match self.logging.format.as_str() {
            "pretty" | "compact" => {}
            _ => anyhow::bail!("Неверный формат логирования: {}", self.logging.format),
        }

        if self.scanner.interval_ms < 10 {
            anyhow::bail!("scanner.interval_ms должно быть минимум 10");
        }

        if self.scanner.default_timeout_secs == 0 {
            anyhow::bail!("scanner.default_timeout_secs должно быть больше 0");
        }

        if self.grab.timeout_ms == 0 {
            anyhow::bail!("grab.timeout_ms должно быть больше 0");
        }

        Ok(())
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scanner.interval_ms)
    }

    pub fn grab_timeout(&self) -> Duration {
        Duration::from_millis(self.grab.timeout_ms)
    }
}
