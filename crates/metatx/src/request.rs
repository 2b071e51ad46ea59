use alloy::primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};

use crate::{ForwardRequest, MetaTxError, DEFAULT_REQUEST_GAS, NO_VALUE};

/// Partial request supplied by the caller; the signer fills in the rest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestInput {
    pub from: Address,
    pub to: Address,
    pub data: Bytes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas: Option<U256>,
}

impl RequestInput {
    pub fn new(from: Address, to: Address, data: Bytes) -> Self {
        Self {
            from,
            to,
            data,
            value: None,
            gas: None,
        }
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_gas(mut self, gas: u64) -> Self {
        self.gas = Some(U256::from(gas));
        self
    }

    /// Complete the request with the sender's current forwarder nonce.
    pub fn into_request(self, nonce: U256) -> ForwardRequest {
        ForwardRequest {
            from: self.from,
            to: self.to,
            value: self.value.unwrap_or(NO_VALUE),
            gas: self.gas.unwrap_or(U256::from(DEFAULT_REQUEST_GAS)),
            nonce,
            data: self.data,
        }
    }
}

/// A complete forward request together with the signer's EIP-712 signature.
///
/// This is what a client hands to a relayer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedRequest {
    pub request: ForwardRequest,
    /// `0x`-prefixed hex, 65 bytes `r || s || v`.
    pub signature: String,
}

impl SignedRequest {
    /// Decode the hex signature into raw bytes.
    pub fn signature_bytes(&self) -> Result<Bytes, MetaTxError> {
        let raw = self
            .signature
            .strip_prefix("0x")
            .unwrap_or(&self.signature);
        alloy::hex::decode(raw)
            .map(Bytes::from)
            .map_err(|e| MetaTxError::InvalidSignature(format!("invalid hex signature: {e}")))
    }
}

/// Outcome of `execute`: whether the forwarded call succeeded and what it returned.
///
/// A `success == false` result is still a successful forwarder transaction:
/// the nonce was consumed and only the inner call reverted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteResult {
    pub success: bool,
    pub return_data: Bytes,
}

impl ExecuteResult {
    /// Decode the `(bool, bytes)` output of `execute`.
    pub fn abi_decode(output: &[u8]) -> Result<Self, MetaTxError> {
        use alloy::sol_types::SolValue;
        let (success, return_data) = <(bool, Bytes)>::abi_decode_params(output)
            .map_err(|e| MetaTxError::Revert(format!("malformed execute output: {e}")))?;
        Ok(Self {
            success,
            return_data,
        })
    }

    /// Treat an inner revert as an error, decoding an `Error(string)` reason when present.
    pub fn into_result(self) -> Result<Bytes, MetaTxError> {
        if self.success {
            return Ok(self.return_data);
        }
        Err(MetaTxError::ForwardedCallFailed {
            reason: crate::ledger::decode_revert_reason(&self.return_data),
        })
    }
}
