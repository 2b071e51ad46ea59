//! A local development network with the forwarder and registry pre-deployed.
//!
//! [`Devnet`] wraps a [`Ledger`] behind a mutex so it can be shared by a
//! relayer and any number of clients. Every transaction takes the lock for its
//! full duration, which gives the strict serialization forwarder nonces rely on.

use std::sync::{Arc, Mutex, MutexGuard};

use alloy::primitives::{address, Address, Bytes, U256};
use alloy::sol_types::{SolCall, SolValue};

use crate::forwarder::INSUFFICIENT_GAS_REASON;
use crate::ledger::{decode_revert_reason, Ledger, Receipt, Transaction};
use crate::nonce_store::NonceStore;
use crate::signer::NonceSource;
use crate::{
    ExecuteResult, ForwarderConfig, IMinimalForwarder, MetaTxError, MinimalForwarder, Registry,
    SignedRequest, RELAY_GAS_PADDING,
};

/// First well-known development account. Deploys the forwarder and registry.
pub const DEPLOYER: Address = address!("f39fd6e51aad88f6f4ce6ab8827279cfffb92266");

pub struct Devnet {
    ledger: Mutex<Ledger>,
    config: ForwarderConfig,
    forwarder: Address,
    registry: Address,
}

impl Devnet {
    /// Devnet with default configuration and in-memory nonces.
    pub fn new() -> Self {
        Self::with_config(ForwarderConfig::default())
    }

    pub fn with_config(config: ForwarderConfig) -> Self {
        Self::build(config, None)
    }

    /// Devnet whose forwarder keeps its nonces in `store`.
    pub fn with_nonce_store(config: ForwarderConfig, store: Arc<dyn NonceStore>) -> Self {
        Self::build(config, Some(store))
    }

    fn build(config: ForwarderConfig, store: Option<Arc<dyn NonceStore>>) -> Self {
        let mut ledger = Ledger::new(config.chain_id);

        let forwarder_config = config.clone();
        let forwarder = ledger.deploy(DEPLOYER, move |addr| {
            let forwarder = MinimalForwarder::new(addr, forwarder_config);
            match store {
                Some(store) => forwarder.with_nonce_store(store),
                None => forwarder,
            }
        });
        let registry = ledger.deploy(DEPLOYER, |_| Registry::new(forwarder));

        tracing::info!(
            chain_id = config.chain_id,
            %forwarder,
            %registry,
            "devnet ready"
        );

        Self {
            ledger: Mutex::new(ledger),
            config,
            forwarder,
            registry,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Ledger> {
        match self.ledger.lock() {
            Ok(l) => l,
            Err(poisoned) => {
                tracing::error!("devnet ledger mutex poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    pub fn forwarder(&self) -> Address {
        self.forwarder
    }

    pub fn registry(&self) -> Address {
        self.registry
    }

    pub fn config(&self) -> &ForwarderConfig {
        &self.config
    }

    pub fn chain_id(&self) -> u64 {
        self.config.chain_id
    }

    /// Deploy another forwarder with the same domain name and version but its
    /// own address and nonces.
    pub fn deploy_forwarder(&self) -> Address {
        let config = self.config.clone();
        self.lock()
            .deploy(DEPLOYER, move |addr| MinimalForwarder::new(addr, config))
    }

    /// Deploy another registry trusting `trusted_forwarder`.
    pub fn deploy_registry(&self, trusted_forwarder: Address) -> Address {
        self.lock()
            .deploy(DEPLOYER, |_| Registry::new(trusted_forwarder))
    }

    /// Current nonce of `from` on the default forwarder.
    pub fn get_nonce(&self, from: Address) -> U256 {
        self.forwarder_nonce(self.forwarder, from).unwrap_or(U256::ZERO)
    }

    fn forwarder_nonce(&self, forwarder: Address, from: Address) -> Result<U256, MetaTxError> {
        let ledger = self.lock();
        ledger
            .contract::<MinimalForwarder>(forwarder)
            .map(|f| f.get_nonce(from))
            .ok_or_else(|| {
                MetaTxError::ConfigError(format!("no forwarder deployed at {forwarder}"))
            })
    }

    /// Off-chain check against the default forwarder. Typed version of `verify`.
    pub fn check(&self, signed: &SignedRequest) -> Result<Address, MetaTxError> {
        self.check_at(self.forwarder, signed)
    }

    pub fn check_at(
        &self,
        forwarder: Address,
        signed: &SignedRequest,
    ) -> Result<Address, MetaTxError> {
        let signature = signed.signature_bytes()?;
        Self::check_locked(&self.lock(), forwarder, signed, &signature)
    }

    fn check_locked(
        ledger: &Ledger,
        forwarder: Address,
        signed: &SignedRequest,
        signature: &[u8],
    ) -> Result<Address, MetaTxError> {
        ledger
            .contract::<MinimalForwarder>(forwarder)
            .ok_or_else(|| {
                MetaTxError::ConfigError(format!("no forwarder deployed at {forwarder}"))
            })?
            .check(&signed.request, signature)
    }

    /// `verify(req, signature)` on the default forwarder, evaluated as a call.
    pub fn verify(&self, signed: &SignedRequest) -> bool {
        let Ok(signature) = signed.signature_bytes() else {
            return false;
        };
        let data = IMinimalForwarder::verifyCall {
            req: signed.request.clone(),
            signature,
        }
        .abi_encode();
        self.lock()
            .view(Address::ZERO, self.forwarder, &data)
            .ok()
            .and_then(|out| bool::abi_decode(&out).ok())
            .unwrap_or(false)
    }

    /// Submit `signed` to the default forwarder as `relayer`.
    pub fn execute(
        &self,
        relayer: Address,
        signed: &SignedRequest,
    ) -> Result<Receipt, MetaTxError> {
        self.execute_at(self.forwarder, relayer, signed)
    }

    /// Submit `signed` to the forwarder at `forwarder` as `relayer`.
    ///
    /// The request is checked first, under the same lock as the submission, so
    /// a replay or a bad signature fails with a typed error and no transaction.
    /// The transaction carries `request.value` and a gas limit of
    /// `request.gas` plus the relay padding. A reverted forwarder transaction
    /// is an error; a reverted inner call is not, and shows up in
    /// [`execute_result`](Self::execute_result).
    pub fn execute_at(
        &self,
        forwarder: Address,
        relayer: Address,
        signed: &SignedRequest,
    ) -> Result<Receipt, MetaTxError> {
        let signature = signed.signature_bytes()?;
        let gas_limit = u64::try_from(signed.request.gas)
            .unwrap_or(u64::MAX)
            .saturating_add(RELAY_GAS_PADDING);

        let mut ledger = self.lock();
        Self::check_locked(&ledger, forwarder, signed, &signature)?;

        let data = IMinimalForwarder::executeCall {
            req: signed.request.clone(),
            signature,
        }
        .abi_encode();
        let receipt = ledger.transact(Transaction {
            from: relayer,
            to: forwarder,
            value: signed.request.value,
            gas_limit,
            data: data.into(),
        });
        drop(ledger);

        if !receipt.status {
            let reason = decode_revert_reason(&receipt.output);
            tracing::warn!(
                tx = %receipt.tx_hash,
                from = %signed.request.from,
                reason = %reason,
                "forwarder transaction reverted"
            );
            if reason == INSUFFICIENT_GAS_REASON {
                return Err(MetaTxError::InsufficientGas {
                    required: u64::try_from(signed.request.gas).unwrap_or(u64::MAX),
                    available: gas_limit,
                });
            }
            return Err(MetaTxError::Revert(reason));
        }

        tracing::info!(
            tx = %receipt.tx_hash,
            %relayer,
            from = %signed.request.from,
            to = %signed.request.to,
            gas_used = receipt.gas_used,
            "meta-transaction relayed"
        );
        Ok(receipt)
    }

    /// Decode the `(success, returnData)` of a relayed receipt.
    pub fn execute_result(receipt: &Receipt) -> Result<ExecuteResult, MetaTxError> {
        ExecuteResult::abi_decode(&receipt.output)
    }

    /// A plain transaction from `from`, e.g. calling the registry directly.
    pub fn transact(&self, from: Address, to: Address, data: Bytes) -> Receipt {
        self.lock().transact(Transaction {
            from,
            to,
            value: U256::ZERO,
            gas_limit: crate::DEFAULT_REQUEST_GAS,
            data,
        })
    }

    /// Read-only call with all effects discarded.
    pub fn call(&self, to: Address, data: &[u8]) -> Result<Bytes, MetaTxError> {
        self.lock()
            .view(Address::ZERO, to, data)
            .map_err(MetaTxError::Revert)
    }

    /// Owner of `name` in the default registry.
    pub fn owner_of(&self, name: &str) -> Address {
        self.owner_of_at(self.registry, name)
    }

    pub fn owner_of_at(&self, registry: Address, name: &str) -> Address {
        self.lock()
            .contract::<Registry>(registry)
            .map(|r| r.owner_of(name))
            .unwrap_or(Address::ZERO)
    }

    /// Name registered by `owner` in the default registry.
    pub fn name_of(&self, owner: Address) -> String {
        self.lock()
            .contract::<Registry>(self.registry)
            .map(|r| r.name_of(owner))
            .unwrap_or_default()
    }

    pub fn fund(&self, account: Address, amount: U256) {
        self.lock().fund(account, amount);
    }

    pub fn balance(&self, account: Address) -> U256 {
        self.lock().balance(account)
    }
}

impl Default for Devnet {
    fn default() -> Self {
        Self::new()
    }
}

impl NonceSource for Devnet {
    async fn nonce_of(&self, forwarder: Address, from: Address) -> Result<U256, MetaTxError> {
        self.forwarder_nonce(forwarder, from)
    }

    async fn chain_id(&self) -> Result<u64, MetaTxError> {
        Ok(self.config.chain_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::sign_meta_tx_request;
    use crate::{IRegistry, RequestInput};
    use alloy::signers::local::PrivateKeySigner;

    #[test]
    fn test_well_known_deployment_addresses() {
        let devnet = Devnet::new();
        assert_eq!(
            devnet.forwarder(),
            address!("5fbdb2315678afecb367f032d93f642f64180aa3")
        );
        assert_eq!(
            devnet.registry(),
            address!("e7f1725e7734ce288f8367e1bb143e90bb3f0512")
        );
    }

    #[tokio::test]
    async fn test_relay_registers_signer() {
        let devnet = Devnet::new();
        let signer = PrivateKeySigner::random();
        let relayer = Address::repeat_byte(0x77);

        let data = IRegistry::registerCall { name: "meta-txs".into() }.abi_encode();
        let input = RequestInput::new(signer.address(), devnet.registry(), data.into());
        let signed =
            sign_meta_tx_request(&signer, &devnet, devnet.forwarder(), devnet.config(), input)
                .await
                .unwrap();

        assert!(devnet.verify(&signed));
        let receipt = devnet.execute(relayer, &signed).unwrap();
        assert!(Devnet::execute_result(&receipt).unwrap().success);
        assert_eq!(devnet.owner_of("meta-txs"), signer.address());
        assert_eq!(devnet.name_of(signer.address()), "meta-txs");
        assert_eq!(devnet.get_nonce(signer.address()), U256::from(1u64));
        assert!(!devnet.verify(&signed));
    }

    #[tokio::test]
    async fn test_simulated_execute_does_not_spend_nonce() {
        let devnet = Devnet::new();
        let signer = PrivateKeySigner::random();
        let relayer = Address::repeat_byte(0x77);

        let data = IRegistry::registerCall { name: "sim".into() }.abi_encode();
        let input = RequestInput::new(signer.address(), devnet.registry(), data.into());
        let signed =
            sign_meta_tx_request(&signer, &devnet, devnet.forwarder(), devnet.config(), input)
                .await
                .unwrap();

        let call = IMinimalForwarder::executeCall {
            req: signed.request.clone(),
            signature: signed.signature_bytes().unwrap(),
        }
        .abi_encode();
        let out = devnet.call(devnet.forwarder(), &call).unwrap();
        assert!(ExecuteResult::abi_decode(&out).unwrap().success);
        assert_eq!(devnet.get_nonce(signer.address()), U256::ZERO);
        assert_eq!(devnet.owner_of("sim"), Address::ZERO);

        devnet.execute(relayer, &signed).unwrap();
        assert_eq!(devnet.owner_of("sim"), signer.address());
        assert_eq!(devnet.get_nonce(signer.address()), U256::from(1u64));
    }

    #[test]
    fn test_unknown_forwarder_is_config_error() {
        let devnet = Devnet::new();
        let err = devnet
            .forwarder_nonce(Address::repeat_byte(0x01), Address::ZERO)
            .unwrap_err();
        assert!(matches!(err, MetaTxError::ConfigError(_)));
    }
}
