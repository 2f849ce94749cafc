//! Avogadro2 RPC Library
//!
//! This library provides the pieces used to drive a running Avogadro2
//! over its local socket server:
//!
//! - `ipc` - connection, endpoint resolution and length-prefixed framing
//! - `models` - JSON-RPC request and response types
//!
//! ```ignore
//! use avogadro_rpc::ipc::{RpcConnection, DEFAULT_SERVER_NAME};
//! use avogadro_rpc::models::RpcMessage;
//!
//! let mut conn = RpcConnection::connect(DEFAULT_SERVER_NAME).await?;
//! conn.send_message(&RpcMessage::methane()).await?;
//! conn.disconnect().await?;
//! ```

pub mod ipc;
pub mod models;
