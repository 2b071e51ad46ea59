//! EIP-2771 meta-transactions.
//!
//! A signer authorizes a contract call off-chain by signing an EIP-712
//! [`ForwardRequest`]. A relayer submits that request to a trusted forwarder,
//! paying for gas. The forwarder checks the signature and the signer's nonce,
//! then calls the target with the signer's address appended to the calldata,
//! so the target can recover who the call is really from.
//!
//! # Parties
//!
//! - **Signer** ([`signer::sign_meta_tx_request`]): builds and signs a request
//! - **Forwarder** ([`forwarder::MinimalForwarder`]): verifies, consumes the nonce, forwards
//! - **Target** ([`registry::Registry`] via [`context::TrustedForwarderContext`]):
//!   extracts the sender
//!
//! # Quick example
//!
//! ```no_run
//! use alloy::signers::local::PrivateKeySigner;
//! use alloy::sol_types::SolCall;
//! use metatx::{devnet::Devnet, signer::sign_meta_tx_request, IRegistry, RequestInput};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let devnet = Devnet::new();
//! let signer = PrivateKeySigner::random();
//! let relayer = PrivateKeySigner::random().address();
//!
//! let data = IRegistry::registerCall { name: "meta-txs".into() }.abi_encode();
//! let input = RequestInput::new(signer.address(), devnet.registry(), data.into());
//! let signed = sign_meta_tx_request(&signer, &devnet, devnet.forwarder(), devnet.config(), input)
//!     .await
//!     .unwrap();
//!
//! let receipt = devnet.execute(relayer, &signed).unwrap();
//! assert!(receipt.status);
//! # }
//! ```

// Core types
pub mod constants;
pub mod error;
pub mod request;
pub mod response;

// Protocol
pub mod context;
pub mod eip712;
pub mod forwarder;
pub mod nonce_store;
pub mod signer;

// Execution host and contracts
pub mod devnet;
pub mod ledger;
pub mod registry;

// Shared-secret request authentication
pub mod hmac;

// Network access
#[cfg(feature = "full")]
pub mod http_client;
#[cfg(feature = "full")]
pub mod rpc;

use alloy::sol;

// EIP-712 struct for forward requests, plus the forwarder's ABI.
// The sol! macro derives SolStruct which provides eip712_signing_hash().
sol! {
    #[derive(Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
    struct ForwardRequest {
        address from;
        address to;
        uint256 value;
        uint256 gas;
        uint256 nonce;
        bytes data;
    }

    #[sol(rpc)]
    interface IMinimalForwarder {
        function getNonce(address from) external view returns (uint256);
        function verify(ForwardRequest calldata req, bytes calldata signature) external view returns (bool);
        function execute(ForwardRequest calldata req, bytes calldata signature) external payable returns (bool, bytes memory);
    }
}

// Name registry used as the downstream consumer of forwarded calls.
sol! {
    #[sol(rpc)]
    interface IRegistry {
        event Registered(address indexed who, string name);

        function register(string memory name) external;
        function multicall(bytes[] calldata data) external returns (bytes[] memory results);
        function owners(string memory name) external view returns (address);
        function names(address owner) external view returns (string memory);
    }
}

// Re-exports
pub use constants::ForwarderConfig;
pub use constants::*;
pub use error::MetaTxError;
pub use request::*;
pub use response::*;

pub use forwarder::MinimalForwarder;
pub use registry::Registry;
