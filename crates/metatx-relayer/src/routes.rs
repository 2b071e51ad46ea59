use actix_web::{get, post, web, HttpRequest, HttpResponse};
use alloy::primitives::Address;
use metatx::hmac::{verify_body, RELAY_AUTH_HEADER};
use metatx::{ForwarderInfo, NonceResponse, SignedRequest};

use crate::error::RelayError;
use crate::metrics;
use crate::security::{bearer_token, constant_time_eq};
use crate::state::AppState;

/// Check `X-Relay-Auth` when a shared secret is configured.
fn validate_hmac(req: &HttpRequest, body: &[u8], state: &AppState) -> Result<(), RelayError> {
    let Some(secret) = &state.shared_secret else {
        return Ok(());
    };

    let header = req
        .headers()
        .get(RELAY_AUTH_HEADER)
        .and_then(|v| v.to_str().ok());

    match header {
        Some(mac) if verify_body(secret, body, mac) => Ok(()),
        Some(_) => {
            tracing::warn!("relay HMAC verification failed");
            metrics::AUTH_FAILURES.with_label_values(&["invalid"]).inc();
            Err(RelayError::AuthFailed)
        }
        None => {
            tracing::warn!("relay HMAC header missing");
            metrics::AUTH_FAILURES.with_label_values(&["missing"]).inc();
            Err(RelayError::AuthRequired)
        }
    }
}

fn parse_address(raw: &str) -> Result<Address, RelayError> {
    raw.parse()
        .map_err(|_| RelayError::InvalidAddress(raw.to_string()))
}

#[get("/health")]
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "service": "metatx-relayer",
        "chainId": state.devnet.chain_id(),
        "forwarder": state.devnet.forwarder(),
    }))
}

#[get("/metrics")]
pub async fn metrics_endpoint(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    match &state.metrics_token {
        Some(token) => {
            let authorized = req
                .headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(bearer_token)
                .map(|t| constant_time_eq(t.as_bytes(), token))
                .unwrap_or(false);

            if !authorized {
                return HttpResponse::Unauthorized().json(serde_json::json!({
                    "error": "unauthorized",
                    "message": "Valid Bearer token required for /metrics"
                }));
            }
        }
        None if !state.public_metrics => {
            return HttpResponse::Forbidden().json(serde_json::json!({
                "error": "forbidden",
                "message": "Set METRICS_TOKEN or METRICS_PUBLIC=true to access /metrics"
            }));
        }
        None => {}
    }
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(metrics::metrics_output())
}

#[get("/forwarder")]
pub async fn forwarder_info(state: web::Data<AppState>) -> HttpResponse {
    let config = state.devnet.config();
    HttpResponse::Ok().json(ForwarderInfo {
        forwarder: state.devnet.forwarder(),
        registry: state.devnet.registry(),
        chain_id: config.chain_id,
        name: config.eip712_domain_name.clone(),
        version: config.eip712_domain_version.clone(),
    })
}

#[get("/nonce/{address}")]
pub async fn nonce(
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, RelayError> {
    let address = parse_address(&path)?;
    Ok(HttpResponse::Ok().json(NonceResponse {
        address,
        nonce: state.devnet.get_nonce(address),
    }))
}

#[get("/registry/owner/{name}")]
pub async fn registry_owner(path: web::Path<String>, state: web::Data<AppState>) -> HttpResponse {
    let name = path.into_inner();
    let owner = state.devnet.owner_of(&name);
    HttpResponse::Ok().json(serde_json::json!({
        "name": name,
        "owner": owner,
        "registered": !owner.is_zero(),
    }))
}

#[get("/registry/name/{address}")]
pub async fn registry_name(
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, RelayError> {
    let owner = parse_address(&path)?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "owner": owner,
        "name": state.devnet.name_of(owner),
    })))
}

#[post("/relay")]
pub async fn relay(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Bytes,
) -> Result<HttpResponse, RelayError> {
    validate_hmac(&req, &body, &state)?;

    let signed: SignedRequest =
        serde_json::from_slice(&body).map_err(|e| RelayError::InvalidBody(e.to_string()))?;

    let start = std::time::Instant::now();
    let outcome = crate::relay::relay(&state, &signed);
    let elapsed = start.elapsed().as_secs_f64();

    let label = match &outcome {
        Ok(_) => "submitted",
        Err(RelayError::NotWhitelisted(_)) => "refused",
        Err(RelayError::Rejected(_)) => "rejected",
        Err(_) => "error",
    };
    metrics::RELAY_REQUESTS.with_label_values(&[label]).inc();
    metrics::RELAY_LATENCY
        .with_label_values(&[label])
        .observe(elapsed);

    let response = outcome?;
    let inner = if response.success { "success" } else { "reverted" };
    metrics::FORWARDED_CALLS.with_label_values(&[inner]).inc();

    tracing::info!(
        tx = %response.tx_hash,
        from = %signed.request.from,
        to = %signed.request.to,
        success = response.success,
        events = response.events.len(),
        "relay completed"
    );
    Ok(HttpResponse::Ok().json(response))
}

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 64 * 1024;

/// Register every relayer route and the body size limit.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::PayloadConfig::new(MAX_BODY_BYTES))
        .service(health)
        .service(metrics_endpoint)
        .service(forwarder_info)
        .service(nonce)
        .service(registry_owner)
        .service(registry_name)
        .service(relay);
}
