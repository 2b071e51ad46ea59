use alloy::primitives::Bytes;
use alloy::signers::local::PrivateKeySigner;
use alloy::sol_types::SolCall;

use metatx::http_client::RelayClient;
use metatx::signer::sign_meta_tx_request;
use metatx::{ForwarderConfig, IRegistry, RequestInput};

/// Sign `register(name)` (or a `multicall` of several names) and hand it to a relayer.
///
/// Usage: `metatx-register [NAME]...` (defaults to `meta-txs`).
#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let key = std::env::var("PRIVATE_KEY").expect("PRIVATE_KEY environment variable is required");
    let signer: PrivateKeySigner = key.parse().expect("invalid PRIVATE_KEY");

    let relayer_url =
        std::env::var("RELAYER_URL").unwrap_or_else(|_| "http://127.0.0.1:4100/".to_string());
    let mut client = RelayClient::new(&relayer_url).expect("invalid RELAYER_URL");
    if let Ok(secret) = std::env::var("RELAY_SHARED_SECRET") {
        client = client.with_shared_secret(secret.into_bytes());
    }

    let mut names: Vec<String> = std::env::args().skip(1).collect();
    if names.is_empty() {
        names.push("meta-txs".to_string());
    }

    let info = client
        .forwarder_info()
        .await
        .expect("failed to read forwarder info from relayer");
    let config = ForwarderConfig {
        chain_id: info.chain_id,
        eip712_domain_name: info.name.clone(),
        eip712_domain_version: info.version.clone(),
        ..ForwarderConfig::default()
    };

    let data: Bytes = if names.len() == 1 {
        IRegistry::registerCall {
            name: names[0].clone(),
        }
        .abi_encode()
        .into()
    } else {
        let calls = names
            .iter()
            .map(|name| Bytes::from(IRegistry::registerCall { name: name.clone() }.abi_encode()))
            .collect();
        IRegistry::multicallCall { data: calls }.abi_encode().into()
    };

    println!("Registering via meta-transaction...");
    println!("  Signer:    {}", signer.address());
    println!("  Forwarder: {}", info.forwarder);
    println!("  Registry:  {}", info.registry);
    println!("  Names:     {}", names.join(", "));

    let input = RequestInput::new(signer.address(), info.registry, data);
    let signed = sign_meta_tx_request(&signer, &client, info.forwarder, &config, input)
        .await
        .expect("failed to sign request");
    println!("  Nonce:     {}", signed.request.nonce);

    let resp = client.relay(&signed).await.expect("relay failed");
    println!("\n  tx: {}", resp.tx_hash);

    if !resp.success {
        eprintln!(
            "Forwarded call reverted: {}",
            resp.error_reason.as_deref().unwrap_or("unknown reason")
        );
        std::process::exit(1);
    }

    for event in &resp.events {
        println!("  Registered {} -> {}", event.name, event.who);
    }
    println!("Registration confirmed.");
}
