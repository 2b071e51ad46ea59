//! Relayer service for EIP-2771 meta-transactions.
//!
//! Accepts signed forward requests over HTTP, refuses targets outside its
//! whitelist, checks the request against the forwarder, and submits it with
//! `gas + 50_000`, paying for execution itself. The forwarder and registry run
//! in-process on a [`metatx::devnet::Devnet`].
//!
//! # Modules
//!
//! - [`routes`]: HTTP endpoints (relay, nonce, forwarder info, registry lookups, health, metrics)
//! - [`relay`]: whitelist, verify, execute
//! - [`state`]: Shared [`AppState`](state::AppState)
//! - [`config`]: Environment configuration
//! - [`metrics`]: Prometheus metrics for relay operations

pub mod config;
pub mod error;
pub mod metrics;
pub mod relay;
pub mod routes;
pub mod security;
pub mod state;
