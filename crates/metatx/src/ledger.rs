//! A strictly serialized, in-process execution host for forwarder and target contracts.
//!
//! Every top-level [`Transaction`] runs to completion under `&mut Ledger`, so
//! no two calls ever interleave. Each message call is a journaled frame: when a
//! frame reverts, contract state, balances, and the logs it emitted are rolled
//! back to where they were when the frame started, while the caller keeps
//! running and sees `success == false`.
//!
//! Contracts are plain Rust types implementing [`Contract`]. They receive raw
//! ABI calldata and return raw ABI output, exactly as they would on-chain.

use std::any::Any;
use std::collections::{HashMap, HashSet};

use alloy::primitives::{keccak256, Address, Bytes, Log, LogData, B256, U256};
use alloy::sol_types::{Revert, SolError, SolValue};

use crate::constants::CALL_BASE_GAS;

/// Maximum nesting of message calls.
pub const MAX_CALL_DEPTH: usize = 1024;

/// Why a call frame stopped without completing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    /// `revert("reason")`; surfaced to the caller as ABI `Error(string)`.
    Revert(String),
    /// The frame ran out of gas. Consumes the whole allowance and returns no data.
    OutOfGas,
}

impl CallError {
    pub fn revert(reason: impl Into<String>) -> Self {
        CallError::Revert(reason.into())
    }

    fn output(&self) -> Bytes {
        match self {
            CallError::Revert(reason) => Revert {
                reason: reason.clone(),
            }
            .abi_encode()
            .into(),
            CallError::OutOfGas => Bytes::new(),
        }
    }
}

impl std::fmt::Display for CallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallError::Revert(reason) => write!(f, "reverted: {reason}"),
            CallError::OutOfGas => write!(f, "out of gas"),
        }
    }
}

/// Decode an `Error(string)` revert payload. Falls back to hex for anything else.
pub fn decode_revert_reason(output: &[u8]) -> String {
    if output.is_empty() {
        return "reverted without reason".to_string();
    }
    match Revert::abi_decode(output) {
        Ok(revert) => revert.reason,
        Err(_) => format!("0x{}", alloy::hex::encode(output)),
    }
}

/// A contract hosted by the ledger.
pub trait Contract: Any + Send {
    /// Handle one message call. `input` is the full calldata.
    fn call(&mut self, ctx: &mut CallContext<'_>, input: &[u8]) -> Result<Bytes, CallError>;

    /// Deep copy used to journal state before each frame.
    fn clone_box(&self) -> Box<dyn Contract>;

    fn as_any(&self) -> &dyn Any;

    /// Called on every contract once a top-level transaction has run. State
    /// kept outside the ledger (such as a nonce store) is written here, so a
    /// reverted frame or a `view` never reaches it.
    fn commit(&mut self) {}
}

/// Gas allowance of a single frame.
#[derive(Debug, Clone, Copy)]
pub struct GasMeter {
    limit: u64,
    used: u64,
}

impl GasMeter {
    pub fn new(limit: u64) -> Self {
        Self { limit, used: 0 }
    }

    pub fn charge(&mut self, amount: u64) -> Result<(), CallError> {
        let used = self.used.saturating_add(amount);
        if used > self.limit {
            self.used = self.limit;
            return Err(CallError::OutOfGas);
        }
        self.used = used;
        Ok(())
    }

    pub fn remaining(&self) -> u64 {
        self.limit - self.used
    }

    pub fn used(&self) -> u64 {
        self.used
    }
}

/// Result of a message call as seen by its caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallOutcome {
    pub success: bool,
    pub output: Bytes,
    pub gas_used: u64,
}

/// Execution environment handed to a contract for the duration of one call.
pub struct CallContext<'a> {
    ledger: &'a mut Ledger,
    /// Immediate caller (`msg.sender`).
    pub caller: Address,
    /// Address of the executing contract (`address(this)`).
    pub address: Address,
    /// Native currency sent with the call (`msg.value`).
    pub value: U256,
    gas: GasMeter,
    depth: usize,
}

impl CallContext<'_> {
    pub fn chain_id(&self) -> u64 {
        self.ledger.chain_id
    }

    pub fn charge(&mut self, amount: u64) -> Result<(), CallError> {
        self.gas.charge(amount)
    }

    pub fn gas_left(&self) -> u64 {
        self.gas.remaining()
    }

    /// Append a log attributed to the executing contract.
    pub fn emit(&mut self, data: LogData) {
        self.ledger.logs.push(Log {
            address: self.address,
            data,
        });
    }

    /// Message call from the executing contract. Gas is capped at what is left.
    pub fn call(&mut self, to: Address, value: U256, gas: u64, data: &[u8]) -> CallOutcome {
        let allowance = gas.min(self.gas.remaining());
        let outcome = self
            .ledger
            .frame(self.address, to, value, allowance, data, self.depth + 1);
        // Cannot fail: the child never uses more than it was given
        let _ = self.gas.charge(outcome.gas_used);
        outcome
    }
}

/// A top-level transaction submitted by an externally owned account.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub gas_limit: u64,
    pub data: Bytes,
}

/// What a finalized transaction left behind.
#[derive(Debug, Clone)]
pub struct Receipt {
    pub tx_hash: B256,
    /// Transaction-level success. A forwarder transaction can succeed while
    /// the call it forwarded reverted.
    pub status: bool,
    pub output: Bytes,
    pub gas_used: u64,
    pub logs: Vec<Log>,
}

/// The serialized state machine holding every contract and balance.
pub struct Ledger {
    chain_id: u64,
    contracts: HashMap<Address, Box<dyn Contract>>,
    executing: HashSet<Address>,
    balances: HashMap<Address, U256>,
    tx_counts: HashMap<Address, u64>,
    logs: Vec<Log>,
}

impl Ledger {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            contracts: HashMap::new(),
            executing: HashSet::new(),
            balances: HashMap::new(),
            tx_counts: HashMap::new(),
            logs: Vec::new(),
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Deploy a contract at the CREATE address of `deployer`'s next nonce.
    /// `build` receives the address so the contract can know `address(this)`.
    pub fn deploy<C, F>(&mut self, deployer: Address, build: F) -> Address
    where
        C: Contract,
        F: FnOnce(Address) -> C,
    {
        let nonce = self.bump_tx_count(deployer);
        let address = deployer.create(nonce);
        self.contracts.insert(address, Box::new(build(address)));
        tracing::debug!(%deployer, %address, "contract deployed");
        address
    }

    /// Typed read access to a deployed contract.
    pub fn contract<C: Contract>(&self, address: Address) -> Option<&C> {
        self.contracts
            .get(&address)
            .and_then(|c| c.as_any().downcast_ref::<C>())
    }

    pub fn has_code(&self, address: Address) -> bool {
        self.contracts.contains_key(&address)
    }

    pub fn balance(&self, account: Address) -> U256 {
        self.balances.get(&account).copied().unwrap_or(U256::ZERO)
    }

    /// Credit native currency out of thin air (development funding).
    pub fn fund(&mut self, account: Address, amount: U256) {
        let balance = self.balances.entry(account).or_insert(U256::ZERO);
        *balance = balance.saturating_add(amount);
    }

    /// Number of transactions (and deployments) `account` has sent.
    pub fn tx_count(&self, account: Address) -> u64 {
        self.tx_counts.get(&account).copied().unwrap_or(0)
    }

    /// Apply a transaction atomically and return its receipt.
    pub fn transact(&mut self, tx: Transaction) -> Receipt {
        let nonce = self.bump_tx_count(tx.from);
        let tx_hash = keccak256(
            (tx.from, nonce, tx.to, tx.value, tx.gas_limit, tx.data.clone()).abi_encode_params(),
        );

        self.logs.clear();
        let outcome = self.frame(tx.from, tx.to, tx.value, tx.gas_limit, &tx.data, 0);
        for contract in self.contracts.values_mut() {
            contract.commit();
        }
        let logs = std::mem::take(&mut self.logs);

        tracing::debug!(
            tx = %tx_hash,
            from = %tx.from,
            to = %tx.to,
            status = outcome.success,
            gas_used = outcome.gas_used,
            logs = logs.len(),
            "transaction applied"
        );

        Receipt {
            tx_hash,
            status: outcome.success,
            output: outcome.output,
            gas_used: outcome.gas_used,
            logs,
        }
    }

    /// Run a call and discard every effect it had (`eth_call`).
    pub fn view(&mut self, from: Address, to: Address, data: &[u8]) -> Result<Bytes, String> {
        let contracts = self.snapshot_contracts();
        let balances = self.balances.clone();
        let mark = self.logs.len();

        let outcome = self.frame(from, to, U256::ZERO, u64::MAX, data, 0);

        self.contracts = contracts;
        self.balances = balances;
        self.logs.truncate(mark);

        if outcome.success {
            Ok(outcome.output)
        } else {
            Err(decode_revert_reason(&outcome.output))
        }
    }

    fn bump_tx_count(&mut self, account: Address) -> u64 {
        let count = self.tx_counts.entry(account).or_insert(0);
        let current = *count;
        *count += 1;
        current
    }

    fn snapshot_contracts(&self) -> HashMap<Address, Box<dyn Contract>> {
        self.contracts
            .iter()
            .map(|(address, contract)| (*address, contract.clone_box()))
            .collect()
    }

    fn frame(
        &mut self,
        caller: Address,
        to: Address,
        value: U256,
        gas_limit: u64,
        data: &[u8],
        depth: usize,
    ) -> CallOutcome {
        let contracts = self.snapshot_contracts();
        let balances = self.balances.clone();
        let mark = self.logs.len();
        let mut gas = GasMeter::new(gas_limit);

        match self.run_frame(caller, to, value, &mut gas, data, depth) {
            Ok(output) => CallOutcome {
                success: true,
                output,
                gas_used: gas.used(),
            },
            Err(err) => {
                tracing::debug!(%caller, %to, depth, error = %err, "call frame reverted");
                // Whatever the callee did to other contracts is discarded with it
                self.contracts = contracts;
                self.balances = balances;
                self.logs.truncate(mark);
                CallOutcome {
                    success: false,
                    output: err.output(),
                    gas_used: gas.used(),
                }
            }
        }
    }

    fn run_frame(
        &mut self,
        caller: Address,
        to: Address,
        value: U256,
        gas: &mut GasMeter,
        data: &[u8],
        depth: usize,
    ) -> Result<Bytes, CallError> {
        if depth > MAX_CALL_DEPTH {
            return Err(CallError::revert("call depth exceeded"));
        }
        gas.charge(CALL_BASE_GAS)?;
        self.transfer(caller, to, value)?;

        if self.executing.contains(&to) {
            return Err(CallError::revert("reentrant call"));
        }
        // Calls to accounts without code succeed with empty output
        let Some(mut contract) = self.contracts.remove(&to) else {
            return Ok(Bytes::new());
        };

        self.executing.insert(to);
        let mut ctx = CallContext {
            ledger: self,
            caller,
            address: to,
            value,
            gas: *gas,
            depth,
        };
        let result = contract.call(&mut ctx, data);
        *gas = ctx.gas;
        self.executing.remove(&to);

        // Put the (possibly mutated) contract back; frame() restores the
        // snapshot over it if the call failed.
        self.contracts.insert(to, contract);
        result
    }

    fn transfer(&mut self, from: Address, to: Address, value: U256) -> Result<(), CallError> {
        if value.is_zero() {
            return Ok(());
        }
        let available = self.balance(from);
        if available < value {
            return Err(CallError::revert("insufficient balance for transfer"));
        }
        self.balances.insert(from, available - value);
        let credited = self.balance(to).saturating_add(value);
        self.balances.insert(to, credited);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Counts calls; reverts on input 0xff, burns all gas on 0xee, and
    /// forwards anything longer than 20 bytes to the address in its first 20 bytes.
    #[derive(Clone, Default)]
    struct Counter {
        hits: u64,
        commits: u64,
    }

    impl Contract for Counter {
        fn call(&mut self, ctx: &mut CallContext<'_>, input: &[u8]) -> Result<Bytes, CallError> {
            self.hits += 1;
            ctx.emit(LogData::new_unchecked(vec![], Bytes::from(vec![self.hits as u8])));
            match input {
                [0xff] => Err(CallError::revert("nope")),
                [0xee] => ctx.charge(u64::MAX).map(|_| Bytes::new()),
                _ if input.len() > 20 => {
                    let target = Address::from_slice(&input[..20]);
                    let outcome = ctx.call(target, U256::ZERO, 100_000, &input[20..]);
                    Ok(Bytes::from(vec![outcome.success as u8]))
                }
                _ => Ok(Bytes::from(self.hits.to_be_bytes().to_vec())),
            }
        }

        fn clone_box(&self) -> Box<dyn Contract> {
            Box::new(self.clone())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn commit(&mut self) {
            self.commits += 1;
        }
    }

    fn tx(from: Address, to: Address, data: Vec<u8>) -> Transaction {
        Transaction {
            from,
            to,
            value: U256::ZERO,
            gas_limit: 1_000_000,
            data: data.into(),
        }
    }

    #[test]
    fn test_deploy_uses_create_addresses() {
        let mut ledger = Ledger::new(31337);
        let deployer = Address::repeat_byte(1);
        let a = ledger.deploy(deployer, |_| Counter::default());
        let b = ledger.deploy(deployer, |_| Counter::default());
        assert_eq!(a, deployer.create(0));
        assert_eq!(b, deployer.create(1));
        assert!(ledger.has_code(a));
        assert_eq!(ledger.tx_count(deployer), 2);
    }

    #[test]
    fn test_successful_call_commits_state_and_logs() {
        let mut ledger = Ledger::new(31337);
        let user = Address::repeat_byte(1);
        let counter = ledger.deploy(user, |_| Counter::default());

        let receipt = ledger.transact(tx(user, counter, vec![0x01]));
        assert!(receipt.status);
        assert_eq!(receipt.logs.len(), 1);
        assert_eq!(ledger.contract::<Counter>(counter).unwrap().hits, 1);
    }

    #[test]
    fn test_revert_rolls_back_state_and_logs() {
        let mut ledger = Ledger::new(31337);
        let user = Address::repeat_byte(1);
        let counter = ledger.deploy(user, |_| Counter::default());

        let receipt = ledger.transact(tx(user, counter, vec![0xff]));
        assert!(!receipt.status);
        assert!(receipt.logs.is_empty());
        assert_eq!(decode_revert_reason(&receipt.output), "nope");
        assert_eq!(ledger.contract::<Counter>(counter).unwrap().hits, 0);
    }

    #[test]
    fn test_out_of_gas_consumes_allowance() {
        let mut ledger = Ledger::new(31337);
        let user = Address::repeat_byte(1);
        let counter = ledger.deploy(user, |_| Counter::default());

        let receipt = ledger.transact(tx(user, counter, vec![0xee]));
        assert!(!receipt.status);
        assert_eq!(receipt.gas_used, 1_000_000);
        assert!(receipt.output.is_empty());
    }

    #[test]
    fn test_inner_revert_keeps_outer_effects() {
        let mut ledger = Ledger::new(31337);
        let user = Address::repeat_byte(1);
        let outer = ledger.deploy(user, |_| Counter::default());
        let inner = ledger.deploy(user, |_| Counter::default());

        let mut data = inner.to_vec();
        data.push(0xff);
        let receipt = ledger.transact(tx(user, outer, data));

        assert!(receipt.status);
        assert_eq!(receipt.output.as_ref(), &[0u8]);
        // Only the outer log survives
        assert_eq!(receipt.logs.len(), 1);
        assert_eq!(receipt.logs[0].address, outer);
        assert_eq!(ledger.contract::<Counter>(outer).unwrap().hits, 1);
        assert_eq!(ledger.contract::<Counter>(inner).unwrap().hits, 0);
    }

    #[test]
    fn test_reentrant_call_reverts() {
        let mut ledger = Ledger::new(31337);
        let user = Address::repeat_byte(1);
        let counter = ledger.deploy(user, |_| Counter::default());

        let mut data = counter.to_vec();
        data.push(0x01);
        let receipt = ledger.transact(tx(user, counter, data));
        assert!(receipt.status);
        assert_eq!(receipt.output.as_ref(), &[0u8]);
    }

    #[test]
    fn test_value_transfer_requires_balance() {
        let mut ledger = Ledger::new(31337);
        let alice = Address::repeat_byte(1);
        let bob = Address::repeat_byte(2);

        let mut transfer = tx(alice, bob, vec![]);
        transfer.value = U256::from(10u64);
        assert!(!ledger.transact(transfer.clone()).status);

        ledger.fund(alice, U256::from(15u64));
        assert!(ledger.transact(transfer).status);
        assert_eq!(ledger.balance(alice), U256::from(5u64));
        assert_eq!(ledger.balance(bob), U256::from(10u64));
    }

    #[test]
    fn test_view_discards_effects() {
        let mut ledger = Ledger::new(31337);
        let user = Address::repeat_byte(1);
        let counter = ledger.deploy(user, |_| Counter::default());

        let out = ledger.view(user, counter, &[0x01]).unwrap();
        assert_eq!(out.as_ref(), &1u64.to_be_bytes());
        assert_eq!(ledger.contract::<Counter>(counter).unwrap().hits, 0);
        assert_eq!(ledger.view(user, counter, &[0xff]).unwrap_err(), "nope");
    }

    #[test]
    fn test_commit_runs_per_transaction_not_per_view() {
        let mut ledger = Ledger::new(31337);
        let user = Address::repeat_byte(1);
        let counter = ledger.deploy(user, |_| Counter::default());

        ledger.view(user, counter, &[0x01]).unwrap();
        assert_eq!(ledger.contract::<Counter>(counter).unwrap().commits, 0);

        ledger.transact(tx(user, counter, vec![0x01]));
        assert_eq!(ledger.contract::<Counter>(counter).unwrap().commits, 1);
    }

    #[test]
    fn test_tx_hashes_are_unique_per_sender_nonce() {
        let mut ledger = Ledger::new(31337);
        let user = Address::repeat_byte(1);
        let a = ledger.transact(tx(user, Address::ZERO, vec![]));
        let b = ledger.transact(tx(user, Address::ZERO, vec![]));
        assert_ne!(a.tx_hash, b.tx_hash);
    }
}
