//! Единственный экземпляр на дисплей.
//!
//! Первый запуск занимает Unix-сокет и принимает запросы; последующие
//! запуски передают свой запрос (`IpcRequest`) одной строкой JSON и
//! завершаются. Каждое соединение обслуживается отдельной задачей с
//! ограничением по времени и размеру запроса.

use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::IpcConfig;
use crate::dock_error;
use crate::error::Result;
use crate::events::{ControlMessage, IpcRequest};

/// Сколько ждать строку запроса от клиента
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_REQUEST_BYTES: u64 = 64 * 1024;

/// Ответ работающего экземпляра
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct IpcResponse {
    pub status: IpcStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum IpcStatus {
    Ok,
    Error,
}

impl IpcResponse {
    pub fn ok() -> Self {
        Self {
            status: IpcStatus::Ok,
            message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: IpcStatus::Error,
            message: Some(message.into()),
        }
    }
}

/// Путь к сокету: из конфигурации либо `$XDG_RUNTIME_DIR/traydock-<DISPLAY>.sock`
pub fn socket_path(config: &IpcConfig) -> PathBuf {
    if let Some(path) = &config.socket_path {
        return path.clone();
    }

    let dir = std::env::var_os("XDG_RUNTIME_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir);
    let display = std::env::var("DISPLAY").unwrap_or_default();
    let display: String = display
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();

    dir.join(format!("traydock-{}.sock", display))
}

/// Занять сокет или передать запрос уже работающему экземпляру.
/// `None` означает, что запрос передан и текущий процесс должен завершиться.
pub async fn claim_or_forward(path: &Path, request: &IpcRequest) -> Result<Option<IpcServer>> {
    match UnixStream::connect(path).await {
        Ok(stream) => {
            forward(stream, request).await?;
            Ok(None)
        }
        Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::ConnectionRefused) => {
            if path.exists() {
                debug!("Удаление устаревшего сокета {:?}", path);
                std::fs::remove_file(path)?;
            }
            let listener = UnixListener::bind(path)?;
            info!("IPC сокет: {:?}", path);
            Ok(Some(IpcServer {
                listener,
                path: path.to_path_buf(),
            }))
        }
        Err(e) => Err(e.into()),
    }
}

async fn forward(stream: UnixStream, request: &IpcRequest) -> Result<()> {
    let (reader, mut writer) = stream.into_split();

    let mut line = serde_json::to_string(request)?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;

    let mut response = String::new();
    BufReader::new(reader).read_line(&mut response).await?;
    if response.trim().is_empty() {
        return Err(dock_error!(ipc, "работающий экземпляр не ответил"));
    }

    let response: IpcResponse = serde_json::from_str(response.trim())?;
    match response.status {
        IpcStatus::Ok => {
            info!("Запрос передан работающему экземпляру");
            Ok(())
        }
        IpcStatus::Error => Err(dock_error!(
            ipc,
            "{}",
            response.message.unwrap_or_else(|| "запрос отклонён".to_string())
        )),
    }
}

/// Сервер запросов от последующих запусков. Удаляет сокет при уничтожении.
pub struct IpcServer {
    listener: UnixListener,
    path: PathBuf,
}

impl IpcServer {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Принимать запросы, пока открыт канал управления
    pub async fn run(self, control_tx: UnboundedSender<ControlMessage>) -> Result<()> {
        loop {
            let (stream, _) = match self.listener.accept().await {
                Ok(connection) => connection,
                Err(e) => {
                    warn!("Ошибка accept на IPC сокете: {}", e);
                    continue;
                }
            };
            if control_tx.is_closed() {
                return Ok(());
            }

            let control_tx = control_tx.clone();
            tokio::spawn(async move {
                if let Err(e) = Self::serve(stream, control_tx).await {
                    warn!("Ошибка обработки IPC запроса: {}", e);
                }
            });
        }
    }

    async fn serve(stream: UnixStream, control_tx: UnboundedSender<ControlMessage>) -> Result<()> {
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader.take(MAX_REQUEST_BYTES));
        let mut line = String::new();

        let response = match timeout(REQUEST_TIMEOUT, reader.read_line(&mut line)).await {
            Ok(read) => {
                read?;
                Self::accept(&line, &control_tx)
            }
            Err(_) => IpcResponse::error("запрос не получен вовремя"),
        };

        let mut reply = serde_json::to_string(&response)?;
        reply.push('\n');
        writer.write_all(reply.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }

    fn accept(line: &str, control_tx: &UnboundedSender<ControlMessage>) -> IpcResponse {
        if line.len() as u64 >= MAX_REQUEST_BYTES && !line.ends_with('\n') {
            return IpcResponse::error("запрос слишком длинный");
        }

        match serde_json::from_str::<IpcRequest>(line.trim()) {
            Ok(request) => {
                debug!("IPC запрос: {:?}", request);
                match control_tx.send(request.into()) {
                    Ok(()) => IpcResponse::ok(),
                    Err(_) => IpcResponse::error("экземпляр завершает работу"),
                }
            }
            Err(e) => IpcResponse::error(format!("неверный запрос: {}", e)),
        }
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            debug!("Не удалось удалить сокет {:?}: {}", self.path, e);
        }
    }
}
