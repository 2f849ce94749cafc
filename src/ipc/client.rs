//! Local socket connection to a running Avogadro2.
//!
//! This module provides `RpcConnection`, which connects to the local socket
//! server Avogadro2 registers under a short name (`"avogadro"`) and sends
//! length-prefixed JSON-RPC 2.0 requests to it.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::ipc::framing::{decode_frame, encode_frame};
use crate::models::{JsonRpcResponse, RpcMessage};

#[cfg(unix)]
type Transport = tokio::net::UnixStream;

#[cfg(windows)]
type Transport = tokio::net::windows::named_pipe::NamedPipeClient;

/// Name Avogadro2 registers its local socket server under.
pub const DEFAULT_SERVER_NAME: &str = "avogadro";

/// Default time to wait for a reply in `read_reply` callers.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Bytes pulled off the socket per read while waiting for a reply.
const READ_CHUNK_SIZE: usize = 8192;

/// IPC-specific error types.
#[derive(Debug, Error)]
pub enum IpcError {
    /// The endpoint could not be opened.
    #[error("Failed to connect to server: {endpoint}")]
    Connection {
        /// Server name that was requested
        endpoint: String,
        #[source]
        source: io::Error,
    },

    /// A write was attempted while the connection is closed.
    #[error("Not connected to server: {endpoint}")]
    NotConnected {
        /// Server name of the closed connection
        endpoint: String,
    },

    /// The transport rejected or failed the write.
    #[error("Failed to write message: {0}")]
    Write(#[source] io::Error),

    /// Payload does not fit behind a 4-byte length prefix.
    #[error("Message of {0} bytes is too large to frame")]
    FrameTooLarge(usize),

    /// The message could not be encoded as JSON.
    #[error("Failed to serialize message: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The reply could not be decoded.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Server returned a JSON-RPC error response.
    #[error("Server error {code}: {message}")]
    ServerError {
        /// JSON-RPC error code
        code: i32,
        /// Error message
        message: String,
        /// Optional additional data
        data: Option<serde_json::Value>,
    },

    /// I/O error while reading a reply.
    #[error("I/O error: {0}")]
    Io(#[source] io::Error),
}

/// Resolve a server name to the endpoint the OS knows it by.
///
/// Follows the Qt `QLocalServer` convention used by Avogadro2:
/// - absolute paths are used as-is
/// - other names live in the temp dir (`$TMPDIR`, falling back to `/tmp`)
#[cfg(unix)]
pub fn endpoint_path(server_name: &str) -> PathBuf {
    let path = Path::new(server_name);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::temp_dir().join(server_name)
    }
}

/// Resolve a server name to the endpoint the OS knows it by.
///
/// On Windows the server is a named pipe, `\\.\pipe\<name>`.
#[cfg(windows)]
pub fn endpoint_path(server_name: &str) -> PathBuf {
    if server_name.starts_with(r"\\.\pipe\") {
        PathBuf::from(server_name)
    } else {
        PathBuf::from(format!(r"\\.\pipe\{}", server_name))
    }
}

#[cfg(unix)]
async fn open_transport(endpoint: &Path) -> io::Result<Transport> {
    Transport::connect(endpoint).await
}

#[cfg(windows)]
async fn open_transport(endpoint: &Path) -> io::Result<Transport> {
    tokio::net::windows::named_pipe::ClientOptions::new().open(endpoint)
}

/// Connection to an Avogadro2 local socket server.
///
/// The handle is either open or closed. Writes on a closed handle fail
/// with `IpcError::NotConnected` without touching any socket, and a failed
/// write closes the handle.
///
/// # Example
///
/// ```ignore
/// use avogadro_rpc::ipc::{RpcConnection, DEFAULT_SERVER_NAME};
/// use avogadro_rpc::models::RpcMessage;
///
/// let mut conn = RpcConnection::connect(DEFAULT_SERVER_NAME).await?;
/// conn.send_message(&RpcMessage::methane()).await?;
/// conn.disconnect().await?;
/// ```
pub struct RpcConnection {
    /// Server name as given by the caller.
    server_name: String,
    /// Open transport, `None` once closed.
    stream: Option<Transport>,
    /// Counter for `update_displayed_molecule` request ids.
    id_counter: AtomicU64,
    /// Received bytes not yet decoded into a reply frame.
    read_buf: Vec<u8>,
}

impl RpcConnection {
    /// Create a closed handle for `server_name`.
    pub fn new(server_name: &str) -> Self {
        Self {
            server_name: server_name.to_string(),
            stream: None,
            id_counter: AtomicU64::new(0),
            read_buf: Vec::new(),
        }
    }

    /// Connect to the server registered under `server_name`.
    ///
    /// # Errors
    ///
    /// Returns `IpcError::Connection` if:
    /// - The server name is empty
    /// - No server is listening under that name
    /// - Permission denied
    pub async fn connect(server_name: &str) -> Result<Self, IpcError> {
        let mut connection = Self::new(server_name);
        connection.connect_to_server().await?;
        Ok(connection)
    }

    /// Server name this handle connects to.
    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// Whether the handle holds an open transport.
    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// (Re)open the transport, dropping any existing one first.
    pub async fn connect_to_server(&mut self) -> Result<(), IpcError> {
        if self.server_name.is_empty() {
            return Err(self.connection_error(io::Error::new(
                io::ErrorKind::InvalidInput,
                "server name is empty",
            )));
        }

        self.close();

        let endpoint = endpoint_path(&self.server_name);
        debug!("Connecting to {}", endpoint.display());

        let stream = open_transport(&endpoint)
            .await
            .map_err(|e| self.connection_error(e))?;
        self.stream = Some(stream);

        info!("Connected to server: {}", self.server_name);
        Ok(())
    }

    /// Connect unless already open.
    pub async fn reconnect_if_needed(&mut self) -> Result<(), IpcError> {
        if self.is_open() {
            return Ok(());
        }
        self.connect_to_server().await
    }

    /// Serialize, frame, and write one message.
    ///
    /// The frame is handed to the transport whole or not at all. Call
    /// `flush` or `disconnect` afterwards to make sure it left the process.
    pub async fn send_message(&mut self, message: &RpcMessage) -> Result<(), IpcError> {
        let json = message.to_json()?;
        let frame = encode_frame(&json).map_err(|_| IpcError::FrameTooLarge(json.len()))?;

        let Some(stream) = self.stream.as_mut() else {
            return Err(IpcError::NotConnected {
                endpoint: self.server_name.clone(),
            });
        };

        if let Err(e) = stream.write_all(&frame).await {
            warn!("Write to {} failed: {}", self.server_name, e);
            self.close();
            return Err(IpcError::Write(e));
        }

        debug!(
            "Sent {} (id {}, {} bytes)",
            message.method,
            message.id,
            json.len()
        );
        Ok(())
    }

    /// Send a `loadMolecule` request with the next request id.
    ///
    /// Reconnects first if the handle is closed. Returns the id used, so
    /// callers can match it against a reply.
    pub async fn update_displayed_molecule(
        &mut self,
        format: &str,
        content: &str,
    ) -> Result<String, IpcError> {
        self.reconnect_if_needed().await?;

        let id = self.next_id().to_string();
        let message = RpcMessage::load_molecule(id.clone(), format, content);
        self.send_message(&message).await?;
        Ok(id)
    }

    /// Push any buffered bytes to the OS.
    pub async fn flush(&mut self) -> Result<(), IpcError> {
        match self.stream.as_mut() {
            Some(stream) => stream.flush().await.map_err(IpcError::Write),
            None => Err(IpcError::NotConnected {
                endpoint: self.server_name.clone(),
            }),
        }
    }

    /// Flush and shut down the write side. The handle is closed afterwards.
    ///
    /// Disconnecting a closed handle is a no-op.
    pub async fn disconnect(&mut self) -> Result<(), IpcError> {
        self.read_buf.clear();
        if let Some(mut stream) = self.stream.take() {
            stream.flush().await.map_err(IpcError::Write)?;
            stream.shutdown().await.map_err(IpcError::Write)?;
            debug!("Disconnected from server: {}", self.server_name);
        }
        Ok(())
    }

    /// Wait up to `wait` for a reply frame and decode it.
    ///
    /// Returns `Ok(None)` if no complete frame arrived in time. Bytes of a
    /// partly received frame stay buffered on the connection, so the next
    /// call picks up where this one stopped. When several frames have
    /// already arrived only the last one is decoded; earlier replies are
    /// dropped.
    ///
    /// A reply carrying a JSON-RPC `error` member is logged and returned as
    /// `IpcError::ServerError`. An oversized or truncated frame closes the
    /// connection, since the stream can no longer be resynchronized.
    pub async fn read_reply(&mut self, wait: Duration) -> Result<Option<JsonRpcResponse>, IpcError> {
        if !self.is_open() {
            return Err(IpcError::NotConnected {
                endpoint: self.server_name.clone(),
            });
        }

        let mut body = match timeout(wait, self.next_frame()).await {
            Err(_) => return Ok(None),
            Ok(result) => result?,
        };

        while let Some(newer) = self.take_buffered_frame()? {
            debug!("Dropping superseded reply ({} bytes)", body.len());
            body = newer;
        }

        parse_reply(&body).map(Some)
    }

    /// Read from the socket until one whole frame is buffered.
    ///
    /// Cancel-safe: a read either completes and lands in `read_buf`, or
    /// consumes nothing.
    async fn next_frame(&mut self) -> Result<Vec<u8>, IpcError> {
        let mut chunk = vec![0u8; READ_CHUNK_SIZE];
        loop {
            if let Some(body) = self.take_buffered_frame()? {
                return Ok(body);
            }

            let Some(stream) = self.stream.as_mut() else {
                return Err(IpcError::NotConnected {
                    endpoint: self.server_name.clone(),
                });
            };

            let n = match stream.read(&mut chunk).await {
                Ok(n) => n,
                Err(e) => {
                    self.close();
                    return Err(IpcError::Io(e));
                }
            };
            if n == 0 {
                self.close();
                return Err(IpcError::Protocol("Connection closed by server".to_string()));
            }
            self.read_buf.extend_from_slice(&chunk[..n]);
        }
    }

    fn take_buffered_frame(&mut self) -> Result<Option<Vec<u8>>, IpcError> {
        decode_frame(&mut self.read_buf).map_err(|e| {
            warn!("Bad reply frame from {}: {}", self.server_name, e);
            self.close();
            IpcError::Protocol(e.to_string())
        })
    }

    /// Drop the transport and anything half-read from it.
    fn close(&mut self) {
        self.stream = None;
        self.read_buf.clear();
    }

    fn next_id(&self) -> u64 {
        self.id_counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn connection_error(&self, source: io::Error) -> IpcError {
        IpcError::Connection {
            endpoint: self.server_name.clone(),
            source,
        }
    }
}

/// Decode a reply body, turning JSON-RPC errors into `IpcError::ServerError`.
fn parse_reply(body: &[u8]) -> Result<JsonRpcResponse, IpcError> {
    let value: serde_json::Value = serde_json::from_slice(body).map_err(|e| {
        warn!("Reply from Avogadro2 is not JSON: {}", String::from_utf8_lossy(body));
        IpcError::Protocol(format!("Reply is not valid JSON: {}", e))
    })?;

    if !value.is_object() {
        warn!("Reply from Avogadro2 is not an object: {}", value);
        return Err(IpcError::Protocol("Reply is not a JSON object".to_string()));
    }

    let response: JsonRpcResponse = serde_json::from_value(value)
        .map_err(|e| IpcError::Protocol(format!("Failed to parse reply: {}", e)))?;

    if let Some(err) = response.error {
        warn!(
            code = err.code,
            "Error received from RPC to Avogadro2: {}", err.message
        );
        return Err(IpcError::ServerError {
            code: err.code,
            message: err.message,
            data: err.data,
        });
    }

    Ok(response)
}
