use alloy::primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

/// A `Registered(who, name)` event in wire form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredEvent {
    pub who: Address,
    pub name: String,
}

/// Response from the relayer's `POST /relay` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayResponse {
    pub tx_hash: B256,
    /// Whether the forwarded call succeeded. The nonce is consumed either way.
    pub success: bool,
    pub return_data: Bytes,
    pub gas_used: u64,
    #[serde(default)]
    pub events: Vec<RegisteredEvent>,
    /// Decoded revert reason of the forwarded call, when it failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
}

/// Response from `GET /nonce/{address}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NonceResponse {
    pub address: Address,
    pub nonce: U256,
}

/// Response from `GET /forwarder`: everything a client needs to sign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwarderInfo {
    pub forwarder: Address,
    pub registry: Address,
    pub chain_id: u64,
    pub name: String,
    pub version: String,
}

/// Error body returned by the relayer for any non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}
