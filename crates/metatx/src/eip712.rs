//! EIP-712 typed-data hashing and signature recovery for forward requests.
//!
//! Provides functions for:
//! - Building the forwarder's EIP-712 domain ([`forwarder_domain`], [`domain_separator`])
//! - Computing signing hashes ([`signing_hash`])
//! - Recovering the signer with EIP-2 malleability protection ([`recover_signer`])
//! - Encoding signatures to hex ([`encode_signature_hex`])
//!
//! The domain binds a signature to one forwarder instance on one chain; the
//! forwarder recomputes exactly this hash, so any divergence here makes every
//! signature fail.

use std::borrow::Cow;

use alloy::primitives::{Address, Signature, B256, U256};
use alloy::sol_types::{Eip712Domain, SolStruct};

use crate::{ForwardRequest, ForwarderConfig, MetaTxError};

/// Build the EIP-712 domain of the forwarder deployed at `verifying_contract`.
pub fn forwarder_domain(config: &ForwarderConfig, verifying_contract: Address) -> Eip712Domain {
    Eip712Domain {
        name: Some(Cow::Owned(config.eip712_domain_name.clone())),
        version: Some(Cow::Owned(config.eip712_domain_version.clone())),
        chain_id: Some(U256::from(config.chain_id)),
        verifying_contract: Some(verifying_contract),
        salt: None,
    }
}

/// `hashStruct(EIP712Domain)` for the given forwarder.
pub fn domain_separator(config: &ForwarderConfig, verifying_contract: Address) -> B256 {
    forwarder_domain(config, verifying_contract).hash_struct()
}

/// Compute the digest a signer signs: `keccak256(0x1901 || domainSeparator || hashStruct(req))`.
pub fn signing_hash(
    request: &ForwardRequest,
    config: &ForwarderConfig,
    verifying_contract: Address,
) -> B256 {
    let domain = forwarder_domain(config, verifying_contract);
    request.eip712_signing_hash(&domain)
}

/// secp256k1 curve order N / 2. Signatures with s above this are malleable (EIP-2).
const SECP256K1_N_DIV_2: U256 = U256::from_limbs([
    0xDFE92F46681B20A0,
    0x5D576E7357A4501D,
    0xFFFFFFFFFFFFFFFF,
    0x7FFFFFFFFFFFFFFF,
]);

/// Recover the address that signed `request` for the forwarder at `verifying_contract`.
///
/// Rejects signatures that are not 65 bytes and high-s signatures (EIP-2).
/// The caller compares the result against `request.from`.
pub fn recover_signer(
    request: &ForwardRequest,
    signature_bytes: &[u8],
    config: &ForwarderConfig,
    verifying_contract: Address,
) -> Result<Address, MetaTxError> {
    if signature_bytes.len() != 65 {
        return Err(MetaTxError::InvalidSignature(format!(
            "signature must be 65 bytes, got {}",
            signature_bytes.len()
        )));
    }

    // from_raw() accepts v in {0, 1, 27, 28} and normalizes it to a parity bit.
    let sig = Signature::from_raw(signature_bytes)
        .map_err(|e| MetaTxError::InvalidSignature(format!("invalid signature: {e}")))?;

    if sig.s() > SECP256K1_N_DIV_2 {
        return Err(MetaTxError::InvalidSignature(
            "high-s signature rejected (EIP-2 malleability)".to_string(),
        ));
    }

    let hash = signing_hash(request, config, verifying_contract);
    sig.recover_address_from_prehash(&hash)
        .map_err(|e| MetaTxError::InvalidSignature(format!("recovery failed: {e}")))
}

/// Encode a Signature to a hex string with 0x prefix (65 bytes -> 0x + 130 hex).
/// Uses Electrum notation: v = 27 or 28 in the last byte.
pub fn encode_signature_hex(sig: &Signature) -> String {
    format!("0x{}", alloy::hex::encode(sig.as_bytes()))
}
