use actix_web::{test, web, App};
use alloy::primitives::{Address, Bytes, U256};
use alloy::signers::local::PrivateKeySigner;
use alloy::sol_types::SolCall;

use metatx::devnet::Devnet;
use metatx::signer::sign_request;
use metatx::{IRegistry, RequestInput, SignedRequest};
use metatx_relayer::config::RelayerConfig;
use metatx_relayer::routes;
use metatx_relayer::state::AppState;

fn make_config(vars: &[(&str, &str)]) -> RelayerConfig {
    let vars: Vec<(String, String)> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    RelayerConfig::from_lookup(|key| {
        vars.iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    })
    .unwrap()
}

fn make_state(vars: &[(&str, &str)]) -> web::Data<AppState> {
    web::Data::new(AppState::new(Devnet::new(), &make_config(vars)))
}

fn register_data(name: &str) -> Bytes {
    IRegistry::registerCall { name: name.into() }.abi_encode().into()
}

fn signed_for(
    state: &AppState,
    signer: &PrivateKeySigner,
    to: Address,
    data: Bytes,
) -> SignedRequest {
    let devnet = &state.devnet;
    let request = RequestInput::new(signer.address(), to, data)
        .into_request(devnet.get_nonce(signer.address()));
    sign_request(signer, request, devnet.config(), devnet.forwarder()).unwrap()
}

macro_rules! app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data($state.clone())
                .configure(routes::configure),
        )
        .await
    };
}

fn relay_request(signed: &SignedRequest) -> test::TestRequest {
    test::TestRequest::post()
        .uri("/relay")
        .insert_header(("Content-Type", "application/json"))
        .set_payload(serde_json::to_vec(signed).unwrap())
}

#[actix_rt::test]
async fn test_forwarder_info_describes_domain() {
    let state = make_state(&[]);
    let app = app!(state);

    let req = test::TestRequest::get().uri("/forwarder").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["name"], "MinimalForwarder");
    assert_eq!(body["version"], "0.0.1");
    assert_eq!(body["chainId"], 31337);
    assert_eq!(
        body["forwarder"].as_str().unwrap().parse::<Address>().unwrap(),
        state.devnet.forwarder()
    );
}

#[actix_rt::test]
async fn test_relay_registers_signer_and_bumps_nonce() {
    let state = make_state(&[]);
    let app = app!(state);
    let signer = PrivateKeySigner::random();

    let signed = signed_for(&state, &signer, state.devnet.registry(), register_data("meta-txs"));
    let resp = test::call_service(&app, relay_request(&signed).to_request()).await;
    assert_eq!(resp.status(), 200);

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["events"][0]["name"], "meta-txs");
    assert_eq!(state.devnet.owner_of("meta-txs"), signer.address());

    let uri = format!("/nonce/{}", signer.address());
    let resp = test::call_service(&app, test::TestRequest::get().uri(&uri).to_request()).await;
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["nonce"], "0x1");

    let uri = "/registry/owner/meta-txs";
    let resp = test::call_service(&app, test::TestRequest::get().uri(uri).to_request()).await;
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["registered"], true);
}

#[actix_rt::test]
async fn test_replayed_request_is_bad_request() {
    let state = make_state(&[]);
    let app = app!(state);
    let signer = PrivateKeySigner::random();
    let signed = signed_for(&state, &signer, state.devnet.registry(), register_data("once"));

    let resp = test::call_service(&app, relay_request(&signed).to_request()).await;
    assert_eq!(resp.status(), 200);

    let resp = test::call_service(&app, relay_request(&signed).to_request()).await;
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "nonce_mismatch");
}

#[actix_rt::test]
async fn test_target_outside_whitelist_is_forbidden() {
    let state = make_state(&[]);
    let app = app!(state);
    let signer = PrivateKeySigner::random();
    let signed = signed_for(&state, &signer, Address::repeat_byte(0x42), Bytes::new());

    let resp = test::call_service(&app, relay_request(&signed).to_request()).await;
    assert_eq!(resp.status(), 403);
    // Nothing was submitted
    assert_eq!(state.devnet.get_nonce(signer.address()), U256::ZERO);
}

#[actix_rt::test]
async fn test_inner_revert_is_reported_not_failed() {
    let state = make_state(&[]);
    let app = app!(state);
    let squatter = Address::repeat_byte(0x01);
    state
        .devnet
        .transact(squatter, state.devnet.registry(), register_data("taken"));

    let signer = PrivateKeySigner::random();
    let signed = signed_for(&state, &signer, state.devnet.registry(), register_data("taken"));
    let resp = test::call_service(&app, relay_request(&signed).to_request()).await;
    assert_eq!(resp.status(), 200);

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["errorReason"], "Name taken");
    assert_eq!(state.devnet.get_nonce(signer.address()), U256::from(1u64));
}

#[actix_rt::test]
async fn test_malformed_body_is_bad_request() {
    let state = make_state(&[]);
    let app = app!(state);

    let req = test::TestRequest::post()
        .uri("/relay")
        .insert_header(("Content-Type", "application/json"))
        .set_payload("{}")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "invalid_body");
}

#[actix_rt::test]
async fn test_oversized_body_is_refused() {
    let state = make_state(&[]);
    let app = app!(state);

    let req = test::TestRequest::post()
        .uri("/relay")
        .insert_header(("Content-Type", "application/json"))
        .set_payload(vec![b' '; routes::MAX_BODY_BYTES + 1])
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 413);
}

#[actix_rt::test]
async fn test_relay_requires_hmac_when_configured() {
    let secret = "relay-secret-relay-secret-relay-secret";
    let state = make_state(&[("RELAY_SHARED_SECRET", secret)]);
    let app = app!(state);
    let signer = PrivateKeySigner::random();
    let signed = signed_for(&state, &signer, state.devnet.registry(), register_data("authed"));

    let resp = test::call_service(&app, relay_request(&signed).to_request()).await;
    assert_eq!(resp.status(), 401);

    let resp = test::call_service(
        &app,
        relay_request(&signed)
            .insert_header(("X-Relay-Auth", "deadbeef"))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 401);

    let body = serde_json::to_vec(&signed).unwrap();
    let mac = metatx::hmac::sign_body(secret.as_bytes(), &body);
    let req = test::TestRequest::post()
        .uri("/relay")
        .insert_header(("Content-Type", "application/json"))
        .insert_header(("X-Relay-Auth", mac))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(state.devnet.owner_of("authed"), signer.address());
}

#[actix_rt::test]
async fn test_invalid_address_path_is_bad_request() {
    let state = make_state(&[]);
    let app = app!(state);

    let req = test::TestRequest::get().uri("/nonce/not-an-address").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
}

#[actix_rt::test]
async fn test_metrics_require_token() {
    let state = make_state(&[("METRICS_TOKEN", "scrape-me")]);
    let app = app!(state);

    let req = test::TestRequest::get().uri("/metrics").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);

    let req = test::TestRequest::get()
        .uri("/metrics")
        .insert_header(("Authorization", "Bearer scrape-me"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
}

#[actix_rt::test]
async fn test_metrics_forbidden_without_token_or_opt_in() {
    let state = make_state(&[]);
    let app = app!(state);

    let req = test::TestRequest::get().uri("/metrics").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);
}
