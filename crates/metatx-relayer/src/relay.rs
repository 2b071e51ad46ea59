//! The relay decision: whitelist, verify, then execute with padded gas.

use metatx::devnet::Devnet;
use metatx::ledger::decode_revert_reason;
use metatx::registry::registrations;
use metatx::{RegisteredEvent, RelayResponse, SignedRequest};

use crate::error::RelayError;
use crate::state::AppState;

/// Submit `signed` on behalf of its signer.
///
/// Targets outside the whitelist are refused before any work is done. A
/// request the forwarder would reject fails with [`RelayError::Rejected`] and
/// costs the relayer nothing. Once submitted, the nonce is consumed even if
/// the forwarded call reverts; that outcome is reported in the response.
pub fn relay(state: &AppState, signed: &SignedRequest) -> Result<RelayResponse, RelayError> {
    let target = signed.request.to;
    if !state.is_whitelisted(target) {
        tracing::warn!(
            from = %signed.request.from,
            %target,
            "relay refused: target not whitelisted"
        );
        return Err(RelayError::NotWhitelisted(target));
    }

    let receipt = state.devnet.execute(state.relayer_address, signed)?;
    let result =
        Devnet::execute_result(&receipt).map_err(|e| RelayError::Internal(e.to_string()))?;

    let error_reason = (!result.success).then(|| decode_revert_reason(&result.return_data));
    if let Some(reason) = &error_reason {
        tracing::warn!(
            tx = %receipt.tx_hash,
            from = %signed.request.from,
            %target,
            reason = %reason,
            "forwarded call reverted; nonce consumed"
        );
    }

    let events = registrations(&receipt.logs)
        .into_iter()
        .map(|e| RegisteredEvent {
            who: e.who,
            name: e.name,
        })
        .collect();

    Ok(RelayResponse {
        tx_hash: receipt.tx_hash,
        success: result.success,
        return_data: result.return_data,
        gas_used: receipt.gas_used,
        events,
        error_reason,
    })
}
