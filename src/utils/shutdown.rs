use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

use crate::error::Result;
use crate::events::ControlMessage;

/// Дождаться SIGINT или SIGTERM и передать главному циклу `Shutdown`
pub async fn listen_for_shutdown(control_tx: UnboundedSender<ControlMessage>) -> Result<()> {
    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Получен сигнал завершения (Ctrl+C)");
        }
        _ = sigterm.recv() => {
            info!("Получен сигнал завершения (SIGTERM)");
        }
    }

    if control_tx.send(ControlMessage::Shutdown).is_err() {
        debug!("Главный цикл уже остановлен");
    }
    Ok(())
}
