//! IPC client for sending molecules to a running Avogadro2.
//!
//! Avogadro2 runs a local socket server (a Unix domain socket on Linux and
//! macOS, a named pipe on Windows) registered under the name `"avogadro"`.
//! Clients send JSON-RPC 2.0 requests over it.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐        Local socket          ┌─────────────────────┐
//! │  avogadro-load  │  ───────────────────────────►│     Avogadro2       │
//! │ (RpcConnection) │   JSON-RPC 2.0 + framing     │  (QLocalServer)     │
//! └─────────────────┘                              └─────────────────────┘
//! ```
//!
//! # Protocol
//!
//! Each message is a 4-byte big-endian length followed by the JSON bytes:
//!
//! ```text
//! <u32 BE length>{"jsonrpc":"2.0","id":"1","method":"loadMolecule","params":{...}}
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use avogadro_rpc::ipc::{RpcConnection, DEFAULT_SERVER_NAME};
//!
//! let mut conn = RpcConnection::connect(DEFAULT_SERVER_NAME).await?;
//! conn.update_displayed_molecule("xyz", xyz_text).await?;
//! conn.disconnect().await?;
//! ```

mod client;
mod framing;

pub use client::{
    endpoint_path, IpcError, RpcConnection, DEFAULT_REPLY_TIMEOUT, DEFAULT_SERVER_NAME,
};
pub use framing::{
    decode_frame, encode_frame, read_frame, write_frame, LENGTH_PREFIX_SIZE, MAX_MESSAGE_SIZE,
};
