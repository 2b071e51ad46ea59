use alloy::primitives::Address;

const DEFAULT_PORT: u16 = 4100;
const DEFAULT_RATE_LIMIT_RPM: u64 = 120;

#[derive(Clone)]
pub struct RelayerConfig {
    pub port: u16,
    /// Chain id of the hosted network (and of the EIP-712 domain).
    pub chain_id: u64,
    /// Account that submits and pays for forwarder transactions.
    pub relayer_address: Address,
    /// Targets the relayer will pay for. Empty means the registry only.
    pub whitelist: Vec<Address>,
    /// SQLite file for forwarder nonces (None = in-memory)
    pub nonce_db_path: Option<String>,
    /// HMAC secret for `POST /relay` bodies (None = unauthenticated)
    pub shared_secret: Option<Vec<u8>>,
    /// Bearer token required for /metrics
    pub metrics_token: Option<Vec<u8>>,
    /// Serve /metrics without a token when none is configured
    pub public_metrics: bool,
    pub allowed_origins: Vec<String>,
    pub rate_limit_rpm: u64,
}

impl std::fmt::Debug for RelayerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayerConfig")
            .field("port", &self.port)
            .field("chain_id", &self.chain_id)
            .field("relayer_address", &self.relayer_address)
            .field("whitelist", &self.whitelist)
            .field("nonce_db_path", &self.nonce_db_path)
            .field(
                "shared_secret",
                &self.shared_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field(
                "metrics_token",
                &self.metrics_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("public_metrics", &self.public_metrics)
            .field("allowed_origins", &self.allowed_origins)
            .field("rate_limit_rpm", &self.rate_limit_rpm)
            .finish()
    }
}

impl RelayerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key/value source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match get("RELAYER_PORT").or_else(|| get("PORT")) {
            Some(p) => p.parse().map_err(|_| ConfigError::InvalidNumber("RELAYER_PORT", p))?,
            None => DEFAULT_PORT,
        };

        let chain_id = match get("CHAIN_ID") {
            Some(c) => c.parse().map_err(|_| ConfigError::InvalidNumber("CHAIN_ID", c))?,
            None => metatx::DEVNET_CHAIN_ID,
        };

        let relayer_address = match get("RELAYER_ADDRESS") {
            Some(a) => a.parse().map_err(|_| ConfigError::InvalidAddress(a))?,
            None => metatx::devnet::DEPLOYER,
        };

        let whitelist = match get("RELAY_WHITELIST") {
            Some(list) => parse_address_list(&list)?,
            None => vec![],
        };

        let rate_limit_rpm = match get("RATE_LIMIT_RPM") {
            Some(r) => r.parse().map_err(|_| ConfigError::InvalidNumber("RATE_LIMIT_RPM", r))?,
            None => DEFAULT_RATE_LIMIT_RPM,
        };

        let shared_secret = get("RELAY_SHARED_SECRET").map(String::into_bytes);
        match &shared_secret {
            Some(secret) if secret.len() < 32 => tracing::warn!(
                "RELAY_SHARED_SECRET is only {} bytes (minimum 32 recommended)",
                secret.len()
            ),
            Some(_) => {}
            None => tracing::warn!("RELAY_SHARED_SECRET not set: POST /relay is unauthenticated"),
        }

        let allowed_origins = get("ALLOWED_ORIGINS")
            .map(|origins| {
                origins
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            port,
            chain_id,
            relayer_address,
            whitelist,
            nonce_db_path: get("NONCE_DB_PATH"),
            shared_secret,
            metrics_token: get("METRICS_TOKEN").map(String::into_bytes),
            public_metrics: get("METRICS_PUBLIC")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            allowed_origins,
            rate_limit_rpm,
        })
    }
}

fn parse_address_list(list: &str) -> Result<Vec<Address>, ConfigError> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().map_err(|_| ConfigError::InvalidAddress(s.to_string())))
        .collect()
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid number for {0}: {1}")]
    InvalidNumber(&'static str, String),
}
