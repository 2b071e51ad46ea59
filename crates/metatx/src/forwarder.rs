use std::any::Any;
use std::sync::Arc;

use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::sol_types::{SolInterface, SolValue};

use crate::constants::{NONCE_WRITE_GAS, VERIFY_GAS};
use crate::eip712::{domain_separator, recover_signer};
use crate::ledger::{CallContext, CallError, Contract};
use crate::nonce_store::{InMemoryNonceStore, NonceStore};
use crate::IMinimalForwarder::IMinimalForwarderCalls;
use crate::{ExecuteResult, ForwardRequest, ForwarderConfig, MetaTxError};

/// Revert reason for a request whose signature or nonce does not check out.
pub const INVALID_REQUEST_REASON: &str = "MinimalForwarder: signature does not match request";

/// Revert reason when the transaction cannot give the forwarded call its full `gas`.
pub const INSUFFICIENT_GAS_REASON: &str = "MinimalForwarder: insufficient gas for forwarded call";

/// Where a request is in the forwarder's pipeline. Logged with every decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwarderPhase {
    Idle,
    Verifying,
    Executing,
    Rejected,
}

/// Trusted forwarder: verifies signed requests and relays them with the
/// signer's address appended to the calldata.
#[derive(Clone)]
pub struct MinimalForwarder {
    address: Address,
    config: ForwarderConfig,
    /// Pluggable per-sender nonce counters.
    nonces: Arc<dyn NonceStore>,
    /// Nonces consumed by the running transaction, in order. Part of the
    /// journaled contract state; written to `nonces` on commit.
    pending: Vec<(Address, U256)>,
}

impl MinimalForwarder {
    /// Create a forwarder living at `address` with an in-memory nonce store.
    pub fn new(address: Address, config: ForwarderConfig) -> Self {
        Self {
            address,
            config,
            nonces: Arc::new(InMemoryNonceStore::new()),
            pending: Vec::new(),
        }
    }

    /// Set a custom nonce store (e.g. SqliteNonceStore for persistence).
    pub fn with_nonce_store(mut self, store: Arc<dyn NonceStore>) -> Self {
        self.nonces = store;
        self
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn config(&self) -> &ForwarderConfig {
        &self.config
    }

    pub fn domain_separator(&self) -> B256 {
        domain_separator(&self.config, self.address)
    }

    /// The nonce the next request from `from` must carry.
    pub fn get_nonce(&self, from: Address) -> U256 {
        self.pending
            .iter()
            .rev()
            .find(|(sender, _)| *sender == from)
            .map(|(_, consumed)| *consumed + U256::from(1u64))
            .unwrap_or_else(|| self.nonces.current(&from))
    }

    /// Number of senders that have executed at least one request.
    pub fn tracked_senders(&self) -> usize {
        self.nonces.tracked_senders()
    }

    /// Check a request without touching any state.
    ///
    /// Returns the recovered signer when the signature was produced by
    /// `request.from` for this forwarder and `request.nonce` is the sender's
    /// current nonce.
    pub fn check(
        &self,
        request: &ForwardRequest,
        signature: &[u8],
    ) -> Result<Address, MetaTxError> {
        let recovered = recover_signer(request, signature, &self.config, self.address)?;
        if recovered != request.from {
            return Err(MetaTxError::SignatureMismatch {
                recovered,
                claimed: request.from,
            });
        }

        let expected = self.get_nonce(request.from);
        if request.nonce != expected {
            return Err(MetaTxError::NonceMismatch {
                expected,
                got: request.nonce,
            });
        }

        Ok(recovered)
    }

    /// Boolean form of [`check`](Self::check), as exposed on-chain.
    pub fn verify(&self, request: &ForwardRequest, signature: &[u8]) -> bool {
        self.check(request, signature).is_ok()
    }

    /// Verify, consume the nonce, and forward the call.
    ///
    /// An invalid request reverts with no state change. Once the nonce is
    /// consumed the result is always `Ok`: an inner revert is reported through
    /// `success == false` and the nonce stays used.
    fn execute(
        &mut self,
        ctx: &mut CallContext<'_>,
        request: ForwardRequest,
        signature: &[u8],
    ) -> Result<ExecuteResult, CallError> {
        tracing::debug!(
            phase = ?ForwarderPhase::Verifying,
            from = %request.from,
            to = %request.to,
            nonce = %request.nonce,
            "checking forward request"
        );
        ctx.charge(VERIFY_GAS)?;

        if let Err(e) = self.check(&request, signature) {
            tracing::warn!(
                phase = ?ForwarderPhase::Rejected,
                from = %request.from,
                nonce = %request.nonce,
                error = %e,
                "forward request rejected"
            );
            return Err(CallError::revert(INVALID_REQUEST_REASON));
        }

        let gas = u64::try_from(request.gas).unwrap_or(u64::MAX);
        ctx.charge(NONCE_WRITE_GAS)?;
        // Checked before the nonce moves, so a relayer that under-funds gas
        // cannot burn a valid request.
        if ctx.gas_left() < gas {
            tracing::warn!(
                phase = ?ForwarderPhase::Rejected,
                from = %request.from,
                required = gas,
                available = ctx.gas_left(),
                "not enough gas left for forwarded call"
            );
            return Err(CallError::revert(INSUFFICIENT_GAS_REASON));
        }

        if request.nonce == U256::MAX {
            tracing::warn!(
                phase = ?ForwarderPhase::Rejected,
                from = %request.from,
                "nonce space exhausted"
            );
            return Err(CallError::revert(INVALID_REQUEST_REASON));
        }
        self.pending.push((request.from, request.nonce));

        let mut calldata = Vec::with_capacity(request.data.len() + 20);
        calldata.extend_from_slice(&request.data);
        calldata.extend_from_slice(request.from.as_slice());

        let outcome = ctx.call(request.to, request.value, gas, &calldata);

        tracing::info!(
            phase = ?ForwarderPhase::Executing,
            from = %request.from,
            to = %request.to,
            nonce = %request.nonce,
            success = outcome.success,
            gas_used = outcome.gas_used,
            "forwarded call executed"
        );

        Ok(ExecuteResult {
            success: outcome.success,
            return_data: outcome.output,
        })
    }
}

impl Contract for MinimalForwarder {
    fn call(&mut self, ctx: &mut CallContext<'_>, input: &[u8]) -> Result<Bytes, CallError> {
        let call = IMinimalForwarderCalls::abi_decode(input)
            .map_err(|_| CallError::revert("MinimalForwarder: unrecognized call"))?;

        match call {
            IMinimalForwarderCalls::getNonce(c) => Ok(self.get_nonce(c.from).abi_encode().into()),
            IMinimalForwarderCalls::verify(c) => {
                ctx.charge(VERIFY_GAS)?;
                Ok(self.verify(&c.req, &c.signature).abi_encode().into())
            }
            IMinimalForwarderCalls::execute(c) => {
                let result = self.execute(ctx, c.req, &c.signature)?;
                Ok((result.success, result.return_data)
                    .abi_encode_params()
                    .into())
            }
        }
    }

    fn clone_box(&self) -> Box<dyn Contract> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn commit(&mut self) {
        for (sender, nonce) in self.pending.drain(..) {
            if !self.nonces.try_consume(sender, nonce) {
                // Only possible when another writer shares the store
                tracing::error!(
                    %sender,
                    %nonce,
                    "nonce store refused a committed nonce"
                );
            }
        }
    }
}
