//! Client-side construction and signing of forward requests.
//!
//! The signer completes a [`RequestInput`] with the sender's current forwarder
//! nonce and the network's chain id, then signs the EIP-712 digest. Both values
//! come from a [`NonceSource`], which is either a local [`Devnet`](crate::devnet::Devnet),
//! a JSON-RPC provider ([`RpcForwarder`](crate::rpc::RpcForwarder)) or a relayer
//! ([`RelayClient`](crate::http_client::RelayClient)).

use alloy::primitives::{Address, U256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;

use crate::eip712::{encode_signature_hex, signing_hash};
use crate::{ForwardRequest, ForwarderConfig, MetaTxError, RequestInput, SignedRequest};

/// Read access to the two pieces of chain state a signer needs.
pub trait NonceSource: Send + Sync {
    /// `getNonce(from)` on the forwarder at `forwarder`.
    fn nonce_of(
        &self,
        forwarder: Address,
        from: Address,
    ) -> impl std::future::Future<Output = Result<U256, MetaTxError>> + Send;

    /// Chain id of the network the forwarder lives on.
    fn chain_id(&self) -> impl std::future::Future<Output = Result<u64, MetaTxError>> + Send;
}

/// Build and sign a forward request for `input`.
///
/// `value` defaults to 0 and `gas` to 1,000,000. The nonce and chain id are
/// fetched from `source`; the chain id it reports overrides `config.chain_id`.
/// No state is modified anywhere.
pub async fn sign_meta_tx_request<N: NonceSource>(
    signer: &PrivateKeySigner,
    source: &N,
    forwarder: Address,
    config: &ForwarderConfig,
    input: RequestInput,
) -> Result<SignedRequest, MetaTxError> {
    if input.from != signer.address() {
        return Err(MetaTxError::SigningError(format!(
            "request is from {} but the signing key belongs to {}",
            input.from,
            signer.address()
        )));
    }

    let chain_id = source.chain_id().await?;
    if chain_id != config.chain_id {
        tracing::debug!(
            configured = config.chain_id,
            reported = chain_id,
            "using chain id reported by the network"
        );
    }
    let nonce = source.nonce_of(forwarder, input.from).await?;

    let request = input.into_request(nonce);
    let config = config.clone().with_chain_id(chain_id);
    sign_request(signer, request, &config, forwarder)
}

/// Sign an already complete request. The caller is responsible for the nonce.
pub fn sign_request(
    signer: &PrivateKeySigner,
    request: ForwardRequest,
    config: &ForwarderConfig,
    forwarder: Address,
) -> Result<SignedRequest, MetaTxError> {
    let hash = signing_hash(&request, config, forwarder);
    let sig = signer
        .sign_hash_sync(&hash)
        .map_err(|e| MetaTxError::SigningError(format!("signing failed: {e}")))?;

    tracing::debug!(
        from = %request.from,
        to = %request.to,
        nonce = %request.nonce,
        %forwarder,
        "forward request signed"
    );

    Ok(SignedRequest {
        request,
        signature: encode_signature_hex(&sig),
    })
}
