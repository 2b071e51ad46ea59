//! Forwarder and registry access on a remote chain through an alloy provider.
//!
//! [`RpcForwarder`] wraps one deployed forwarder: reads (`getNonce`, `verify`)
//! go out as `eth_call`, and [`RpcForwarder::execute`] submits the request from
//! the provider's wallet. It also serves as a [`NonceSource`] for signing.

use std::time::Duration;

use alloy::primitives::{Address, TxHash, U256};
use alloy::providers::Provider;

use crate::signer::NonceSource;
use crate::{IMinimalForwarder, IRegistry, MetaTxError, SignedRequest, RELAY_GAS_PADDING};

const SEND_TIMEOUT: Duration = Duration::from_secs(30);
const RECEIPT_TIMEOUT: Duration = Duration::from_secs(60);

/// A forwarder deployed on a remote chain, reached through an alloy provider.
pub struct RpcForwarder<P> {
    provider: P,
    forwarder: Address,
}

impl<P: Provider> RpcForwarder<P> {
    pub fn new(provider: P, forwarder: Address) -> Self {
        Self {
            provider,
            forwarder,
        }
    }

    pub fn address(&self) -> Address {
        self.forwarder
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// `getNonce(from)`.
    pub async fn get_nonce(&self, from: Address) -> Result<U256, MetaTxError> {
        nonce_at(&self.provider, self.forwarder, from).await
    }

    /// `verify(req, signature)` as an `eth_call`.
    pub async fn verify(&self, signed: &SignedRequest) -> Result<bool, MetaTxError> {
        let contract = IMinimalForwarder::new(self.forwarder, &self.provider);
        contract
            .verify(signed.request.clone(), signed.signature_bytes()?)
            .call()
            .await
            .map_err(|e| MetaTxError::ProviderError(format!("verify failed: {e}")))
    }

    /// Submit `execute(req, signature)` from the provider's wallet.
    ///
    /// The relayer pays for gas: the limit is `request.gas` plus the relay
    /// padding and the transaction carries `request.value`. A reverted
    /// transaction is an error. Whether the forwarded call itself succeeded is
    /// not visible in a receipt; check the target's events or state.
    pub async fn execute(&self, signed: &SignedRequest) -> Result<TxHash, MetaTxError> {
        let gas_limit = u64::try_from(signed.request.gas)
            .map_err(|_| MetaTxError::InsufficientGas {
                required: u64::MAX,
                available: u64::MAX,
            })?
            .saturating_add(RELAY_GAS_PADDING);

        let contract = IMinimalForwarder::new(self.forwarder, &self.provider);
        let call = contract
            .execute(signed.request.clone(), signed.signature_bytes()?)
            .value(signed.request.value)
            .gas(gas_limit);

        let pending = tokio::time::timeout(SEND_TIMEOUT, call.send())
            .await
            .map_err(|_| {
                MetaTxError::ProviderError("execute send timed out after 30s".to_string())
            })?
            .map_err(|e| MetaTxError::ProviderError(format!("execute send failed: {e}")))?;

        let receipt = tokio::time::timeout(RECEIPT_TIMEOUT, pending.get_receipt())
            .await
            .map_err(|_| {
                MetaTxError::ProviderError("execute receipt timed out after 60s".to_string())
            })?
            .map_err(|e| MetaTxError::ProviderError(format!("execute receipt failed: {e}")))?;

        if !receipt.status() {
            return Err(MetaTxError::Revert(format!(
                "execute reverted in {}",
                receipt.transaction_hash
            )));
        }

        tracing::info!(
            tx = %receipt.transaction_hash,
            from = %signed.request.from,
            to = %signed.request.to,
            gas_used = receipt.gas_used,
            "meta-transaction submitted"
        );
        Ok(receipt.transaction_hash)
    }
}

async fn nonce_at<P: Provider>(
    provider: &P,
    forwarder: Address,
    from: Address,
) -> Result<U256, MetaTxError> {
    IMinimalForwarder::new(forwarder, provider)
        .getNonce(from)
        .call()
        .await
        .map_err(|e| MetaTxError::ProviderError(format!("getNonce failed: {e}")))
}

/// `owners(name)` on a registry contract.
pub async fn owner_of<P: Provider>(
    provider: &P,
    registry: Address,
    name: &str,
) -> Result<Address, MetaTxError> {
    IRegistry::new(registry, provider)
        .owners(name.to_string())
        .call()
        .await
        .map_err(|e| MetaTxError::ProviderError(format!("owners failed: {e}")))
}

/// `names(owner)` on a registry contract.
pub async fn name_of<P: Provider>(
    provider: &P,
    registry: Address,
    owner: Address,
) -> Result<String, MetaTxError> {
    IRegistry::new(registry, provider)
        .names(owner)
        .call()
        .await
        .map_err(|e| MetaTxError::ProviderError(format!("names failed: {e}")))
}

impl<P: Provider> NonceSource for RpcForwarder<P> {
    async fn nonce_of(&self, forwarder: Address, from: Address) -> Result<U256, MetaTxError> {
        nonce_at(&self.provider, forwarder, from).await
    }

    async fn chain_id(&self) -> Result<u64, MetaTxError> {
        self.provider
            .get_chain_id()
            .await
            .map_err(|e| MetaTxError::ProviderError(format!("eth_chainId failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Bytes, U64};
    use alloy::providers::ProviderBuilder;
    use alloy::sol_types::SolValue;
    use alloy::transports::mock::Asserter;

    const FORWARDER: Address = Address::new([0x5f; 20]);

    fn mocked() -> (RpcForwarder<impl Provider>, Asserter) {
        let asserter = Asserter::new();
        let provider = ProviderBuilder::new()
            .disable_recommended_fillers()
            .connect_mocked_client(asserter.clone());
        (RpcForwarder::new(provider, FORWARDER), asserter)
    }

    #[tokio::test]
    async fn test_nonce_source_reads_nonce_and_chain_id() {
        let (forwarder, asserter) = mocked();

        asserter.push_success(&Bytes::from(U256::from(7u64).abi_encode()));
        let nonce = forwarder
            .nonce_of(FORWARDER, Address::repeat_byte(0x01))
            .await
            .unwrap();
        assert_eq!(nonce, U256::from(7u64));

        asserter.push_success(&U64::from(31337u64));
        assert_eq!(forwarder.chain_id().await.unwrap(), 31337);
    }

    #[tokio::test]
    async fn test_rpc_failure_is_provider_error() {
        let (forwarder, asserter) = mocked();
        asserter.push_failure_msg("header not found");

        let err = forwarder.get_nonce(Address::repeat_byte(0x01)).await.unwrap_err();
        assert!(matches!(err, MetaTxError::ProviderError(_)));
    }

    #[tokio::test]
    async fn test_registry_owner_is_decoded() {
        let (forwarder, asserter) = mocked();
        let owner = Address::repeat_byte(0x5a);
        asserter.push_success(&Bytes::from(owner.abi_encode()));

        let registry = Address::repeat_byte(0xe7);
        let got = owner_of(forwarder.provider(), registry, "meta-txs").await.unwrap();
        assert_eq!(got, owner);
    }
}
