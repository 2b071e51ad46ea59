use alloy::primitives::U256;

/// Chain ID of a local Hardhat / Anvil development network.
pub const DEVNET_CHAIN_ID: u64 = 31337;

/// EIP-712 domain name used by the minimal forwarder.
pub const FORWARDER_DOMAIN_NAME: &str = "MinimalForwarder";

/// EIP-712 domain version used by the minimal forwarder.
pub const FORWARDER_DOMAIN_VERSION: &str = "0.0.1";

/// Default RPC endpoint of a local development node.
pub const RPC_URL: &str = "http://127.0.0.1:8545";

/// Gas allotted to a forwarded call when the caller does not choose one.
pub const DEFAULT_REQUEST_GAS: u64 = 1_000_000;

/// Extra gas a relayer adds on top of `request.gas` for the forwarder's own work.
pub const RELAY_GAS_PADDING: u64 = 50_000;

/// Length of the sender suffix a forwarder appends to calldata.
pub const SENDER_SUFFIX_LEN: usize = 20;

// Gas schedule of the in-process ledger. Values approximate mainnet costs
// closely enough for the relayer's padding to be meaningful.

/// Charged for every message call before the callee runs.
pub const CALL_BASE_GAS: u64 = 2_100;

/// Charged by the forwarder for digest computation and `ecrecover`.
pub const VERIFY_GAS: u64 = 6_000;

/// Charged by the forwarder for the nonce write.
pub const NONCE_WRITE_GAS: u64 = 5_000;

/// Charged per storage slot written by a contract.
pub const STORAGE_WRITE_GAS: u64 = 20_000;

/// Charged per emitted log.
pub const LOG_GAS: u64 = 1_500;

/// Zero value shorthand for requests that forward no native currency.
pub const NO_VALUE: U256 = U256::ZERO;

/// Runtime forwarder configuration. Decouples signing and verification from
/// compile-time constants so one binary can target several networks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwarderConfig {
    pub chain_id: u64,
    pub rpc_url: String,
    pub eip712_domain_name: String,
    pub eip712_domain_version: String,
}

impl ForwarderConfig {
    /// Same domain parameters on a different chain.
    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = chain_id;
        self
    }
}

impl Default for ForwarderConfig {
    /// Defaults to a local development network.
    fn default() -> Self {
        Self {
            chain_id: DEVNET_CHAIN_ID,
            rpc_url: RPC_URL.to_string(),
            eip712_domain_name: FORWARDER_DOMAIN_NAME.to_string(),
            eip712_domain_version: FORWARDER_DOMAIN_VERSION.to_string(),
        }
    }
}
