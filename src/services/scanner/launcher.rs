use std::process::Stdio;
use tracing::{debug, info};

use crate::error::{DockError, Result};

/// Запуск внешних программ для последующего поиска их окон
pub trait ProcessLauncher {
    /// Запускает команду и возвращает pid процесса
    fn launch(&self, command: &str, args: &[String]) -> Result<u32>;
}

/// Запуск через tokio::process. Процесс не отслеживается после старта,
/// завершившихся потомков забирает runtime.
pub struct SystemLauncher;

impl SystemLauncher {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessLauncher for SystemLauncher {
    fn launch(&self, command: &str, args: &[String]) -> Result<u32> {
        debug!("Запуск команды: {} {:?}", command, args);

        let child = tokio::process::Command::new(command)
            .args(args)
            .stdin(Stdio::null())
            .spawn()
            .map_err(|e| DockError::Launch {
                command: command.to_string(),
                reason: e.to_string(),
            })?;

        let pid = child.id().ok_or_else(|| DockError::Launch {
            command: command.to_string(),
            reason: "процесс завершился сразу после запуска".to_string(),
        })?;

        info!("Запущен '{}' (pid {})", command, pid);
        Ok(pid)
    }
}

/// Dry-run: процесс не запускается, возвращается фиктивный pid
pub struct DryRunLauncher;

impl ProcessLauncher for DryRunLauncher {
    fn launch(&self, command: &str, args: &[String]) -> Result<u32> {
        info!("[DRY RUN] Запуск '{}' с аргументами {:?}", command, args);
        Ok(u32::MAX)
    }
}

pub fn create_launcher(dry_run: bool) -> Box<dyn ProcessLauncher> {
    if dry_run {
        Box::new(DryRunLauncher)
    } else {
        Box::new(SystemLauncher::new())
    }
}
