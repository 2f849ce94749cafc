//! JSON-RPC message types exchanged with Avogadro2.
//!
//! Field order in these structs is the key order on the wire; serde_json
//! serializes struct fields in declaration order.

use serde::{Deserialize, Serialize};

/// JSON-RPC protocol version sent with every request.
pub const JSONRPC_VERSION: &str = "2.0";

/// Method that replaces the molecule shown in the Avogadro2 window.
pub const LOAD_MOLECULE_METHOD: &str = "loadMolecule";

/// Methane in XYZ format.
pub const METHANE_XYZ: &str = "5\n\
                               XYZ file\n\
                               C      0.00000    0.00000    0.00000\n\
                               H      0.00000    0.00000    1.08900\n\
                               H      1.02672    0.00000   -0.36300\n\
                               H     -0.51336   -0.88916   -0.36300\n\
                               H     -0.51336    0.88916   -0.36300";

/// Parameters of a `loadMolecule` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoleculeParams {
    /// File format understood by Avogadro2 (e.g. `xyz`, `cml`).
    pub format: String,
    /// Molecule text in that format.
    pub content: String,
}

/// A JSON-RPC 2.0 request carrying a molecule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcMessage {
    pub jsonrpc: String,
    pub id: String,
    pub method: String,
    pub params: MoleculeParams,
}

impl RpcMessage {
    /// Build a `loadMolecule` request.
    pub fn load_molecule(id: impl Into<String>, format: &str, content: &str) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.into(),
            method: LOAD_MOLECULE_METHOD.to_string(),
            params: MoleculeParams {
                format: format.to_string(),
                content: content.to_string(),
            },
        }
    }

    /// The fixed request sent by `avogadro-load`: methane as XYZ, id `"1"`.
    pub fn methane() -> Self {
        Self::load_molecule("1", "xyz", METHANE_XYZ)
    }

    /// Serialize to compact JSON bytes.
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

/// JSON-RPC error object returned by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// JSON-RPC response. Avogadro2 replies with either `result` or `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}
