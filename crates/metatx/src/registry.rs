//! Name registry that accepts calls both directly and through a trusted forwarder.
//!
//! `register(name)` records the *logical* sender as the owner. For direct calls
//! that is the caller; for calls relayed by the trusted forwarder it is the
//! signer whose address the forwarder appended. `multicall(bytes[])` resolves
//! the sender once for the outer call and applies every sub-call with it.

use std::any::Any;
use std::collections::HashMap;

use alloy::primitives::{Address, Bytes, Log};
use alloy::sol_types::{SolEvent, SolInterface, SolValue};

use crate::constants::{LOG_GAS, STORAGE_WRITE_GAS};
use crate::context::TrustedForwarderContext;
use crate::ledger::{CallContext, CallError, Contract};
use crate::IRegistry::{self, IRegistryCalls};

#[derive(Debug, Clone)]
pub struct Registry {
    context: TrustedForwarderContext,
    owners: HashMap<String, Address>,
    names: HashMap<Address, String>,
}

impl Registry {
    pub fn new(trusted_forwarder: Address) -> Self {
        Self {
            context: TrustedForwarderContext::new(trusted_forwarder),
            owners: HashMap::new(),
            names: HashMap::new(),
        }
    }

    pub fn trusted_forwarder(&self) -> Address {
        self.context.trusted_forwarder()
    }

    /// Owner of `name`, or the zero address if unregistered.
    pub fn owner_of(&self, name: &str) -> Address {
        self.owners.get(name).copied().unwrap_or(Address::ZERO)
    }

    /// Name registered by `owner`, or the empty string.
    pub fn name_of(&self, owner: Address) -> String {
        self.names.get(&owner).cloned().unwrap_or_default()
    }

    fn dispatch(
        &mut self,
        ctx: &mut CallContext<'_>,
        sender: Address,
        payload: &[u8],
    ) -> Result<Bytes, CallError> {
        let call = IRegistryCalls::abi_decode(payload)
            .map_err(|_| CallError::revert("Registry: unrecognized call"))?;

        match call {
            IRegistryCalls::register(c) => {
                self.register(ctx, sender, c.name)?;
                Ok(Bytes::new())
            }
            IRegistryCalls::multicall(c) => {
                let results = self.multicall(ctx, sender, &c.data)?;
                Ok(results.abi_encode().into())
            }
            IRegistryCalls::owners(c) => Ok(self.owner_of(&c.name).abi_encode().into()),
            IRegistryCalls::names(c) => Ok(self.name_of(c.owner).abi_encode().into()),
        }
    }

    fn register(
        &mut self,
        ctx: &mut CallContext<'_>,
        owner: Address,
        name: String,
    ) -> Result<(), CallError> {
        if self.owners.contains_key(&name) {
            return Err(CallError::revert("Name taken"));
        }
        ctx.charge(2 * STORAGE_WRITE_GAS + LOG_GAS)?;

        self.owners.insert(name.clone(), owner);
        self.names.insert(owner, name.clone());
        tracing::debug!(%owner, name = %name, "name registered");

        ctx.emit(IRegistry::Registered { who: owner, name }.encode_log_data());
        Ok(())
    }

    /// Sub-calls run in order with the outer call's sender. Any failure
    /// reverts the whole batch, including events already emitted.
    fn multicall(
        &mut self,
        ctx: &mut CallContext<'_>,
        sender: Address,
        calls: &[Bytes],
    ) -> Result<Vec<Bytes>, CallError> {
        calls
            .iter()
            .map(|payload| self.dispatch(ctx, sender, payload))
            .collect()
    }
}

/// Decode every `Registered` event in `logs`, in emission order.
pub fn registrations(logs: &[Log]) -> Vec<IRegistry::Registered> {
    logs.iter()
        .filter_map(|log| IRegistry::Registered::decode_log_data(&log.data).ok())
        .collect()
}

impl Contract for Registry {
    fn call(&mut self, ctx: &mut CallContext<'_>, input: &[u8]) -> Result<Bytes, CallError> {
        if !ctx.value.is_zero() {
            return Err(CallError::revert("Registry: not payable"));
        }
        let (sender, payload) = self.context.resolve(ctx.caller, input);
        self.dispatch(ctx, sender, payload)
    }

    fn clone_box(&self) -> Box<dyn Contract> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
