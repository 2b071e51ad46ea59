use alloy::primitives::Address;
use metatx::devnet::Devnet;

use crate::config::RelayerConfig;

/// Shared application state for the relayer.
pub struct AppState {
    /// Network hosting the forwarder and the registry.
    pub devnet: Devnet,
    /// Account that submits and pays for forwarder transactions.
    pub relayer_address: Address,
    /// Targets the relayer agrees to pay for.
    pub whitelist: Vec<Address>,
    /// HMAC secret for `POST /relay` bodies.
    pub shared_secret: Option<Vec<u8>>,
    /// Bearer token for /metrics.
    pub metrics_token: Option<Vec<u8>>,
    pub public_metrics: bool,
}

impl AppState {
    /// State for `devnet` with the settings from `config`. An empty whitelist
    /// admits the devnet's registry only.
    pub fn new(devnet: Devnet, config: &RelayerConfig) -> Self {
        let whitelist = if config.whitelist.is_empty() {
            vec![devnet.registry()]
        } else {
            config.whitelist.clone()
        };
        Self {
            devnet,
            relayer_address: config.relayer_address,
            whitelist,
            shared_secret: config.shared_secret.clone(),
            metrics_token: config.metrics_token.clone(),
            public_metrics: config.public_metrics,
        }
    }

    pub fn is_whitelisted(&self, target: Address) -> bool {
        self.whitelist.contains(&target)
    }
}
