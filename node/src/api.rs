//! # Registration API
//!
//! The axum router exposing the challenge-response surface. All handlers
//! share application state through axum's `State` extractor; there is no
//! ambient global anywhere in the request path.
//!
//! ## Endpoints
//!
//! | Method | Path      | Description                                  |
//! |--------|-----------|----------------------------------------------|
//! | GET    | `/api`    | Issue a challenge bound to the caller's address |
//! | POST   | `/api`    | Submit a signed challenge, bind the address  |
//! | DELETE | `/api`    | Submit a signed challenge, revoke the name   |
//! | GET    | `/health` | Liveness probe                               |
//!
//! ## Wire contract
//!
//! The response shapes below are compatibility-frozen, including the odd
//! corner: a POST for a revoked identity returns HTTP 200 with an error
//! body, because existing clients treat non-200 as "retry later" and a
//! revoked name must not be retried.

use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

use sigil_protocol::auth::{AuthError, ChallengeIssuer, ResponseValidator};
use sigil_protocol::store::{BindingStatus, BindingStore, StoreError};

use crate::metrics::SharedMetrics;

/// Body of the generic server-error response. Exact text is part of the
/// wire contract.
const STORE_ERROR_MESSAGE: &str = "An error has occurred";

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Constructed once at startup from config and keys; cheap to clone since
/// everything is behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The domain claimed names live under.
    pub domain: String,
    /// Issues sealed challenges for the caller's observed address.
    pub issuer: Arc<ChallengeIssuer>,
    /// Validates signed challenge responses.
    pub validator: Arc<ResponseValidator>,
    /// The configured binding backend.
    pub store: Arc<dyn BindingStore>,
    /// Prometheus counters.
    pub metrics: SharedMetrics,
}

/// Request body shared by `POST /api` and `DELETE /api`.
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthRequest {
    /// Client public key, SPKI PEM.
    #[serde(rename = "pub")]
    pub public_key: String,
    /// The challenge exactly as issued (base64).
    pub challenge: String,
    /// Base64 signature over the challenge bytes.
    pub response: String,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the API [`Router`] with CORS and request tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route(
            "/api",
            get(challenge_handler)
                .post(update_handler)
                .delete(revoke_handler),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health` — liveness probe for orchestrators.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /api` — issue a fresh challenge bound to the caller's address.
async fn challenge_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Response {
    let remote = addr.ip().to_string();
    match state.issuer.issue(&remote) {
        Ok(issued) => {
            state.metrics.challenges_issued_total.inc();
            debug!(remote, "challenge issued");
            (
                StatusCode::OK,
                Json(serde_json::json!({ "challenge": issued.challenge })),
            )
                .into_response()
        }
        Err(e) => {
            // Only reachable if the cipher or the system RNG fails.
            error!(remote, error = %e, "challenge issuance failed");
            server_error()
        }
    }
}

/// `POST /api` — validate a signed challenge and bind the caller's address
/// to the derived name.
async fn update_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    payload: Result<Json<AuthRequest>, JsonRejection>,
) -> Response {
    let remote = addr.ip().to_string();
    let identity = match authenticate(&state, &remote, payload) {
        Ok(identity) => identity,
        Err(response) => return response,
    };
    let name = identity.fqdn(&state.domain);

    // Revocation is enforced here, not in the store: check first, and only
    // touch the write path for identities that are still allowed to exist.
    match state.store.check(&identity).await {
        Ok(BindingStatus::Revoked) => {
            debug!(%identity, "update refused: revoked");
            return (
                StatusCode::OK,
                Json(serde_json::json!({ "error": "revoked public key", "name": name })),
            )
                .into_response();
        }
        Ok(_) => {}
        Err(e) => return store_failure(&state, "check", e),
    }

    match state.store.update(&identity, &remote).await {
        Ok(()) => {
            state.metrics.updates_total.inc();
            debug!(%identity, remote, "binding updated");
            (
                StatusCode::OK,
                Json(serde_json::json!({ "ip": remote, "name": name })),
            )
                .into_response()
        }
        Err(e) => store_failure(&state, "update", e),
    }
}

/// `DELETE /api` — validate a signed challenge and permanently revoke the
/// derived name.
async fn revoke_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    payload: Result<Json<AuthRequest>, JsonRejection>,
) -> Response {
    let remote = addr.ip().to_string();
    let identity = match authenticate(&state, &remote, payload) {
        Ok(identity) => identity,
        Err(response) => return response,
    };
    let name = identity.fqdn(&state.domain);

    match state.store.revoke(&identity).await {
        Ok(()) => {
            state.metrics.revocations_total.inc();
            debug!(%identity, "identity revoked");
            (
                StatusCode::OK,
                Json(serde_json::json!({ "message": format!("{name} has been revoked") })),
            )
                .into_response()
        }
        Err(e) => store_failure(&state, "revoke", e),
    }
}

// ---------------------------------------------------------------------------
// Shared handler plumbing
// ---------------------------------------------------------------------------

/// Run the full validation pipeline for a mutating request, turning every
/// failure into the 400 response the caller should see.
fn authenticate(
    state: &AppState,
    remote: &str,
    payload: Result<Json<AuthRequest>, JsonRejection>,
) -> Result<sigil_protocol::identity::Identity, Response> {
    let Json(request) = payload.map_err(|rejection| {
        debug!(remote, error = %rejection, "unparsable request body");
        auth_failure(state, &AuthError::MalformedRequest)
    })?;

    state
        .validator
        .validate(remote, &request.challenge, &request.response, &request.public_key)
        .map_err(|e| {
            debug!(remote, error = %e, "validation failed");
            auth_failure(state, &e)
        })
}

fn auth_failure(state: &AppState, error: &AuthError) -> Response {
    state.metrics.auth_failures_total.inc();
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": error.client_message() })),
    )
        .into_response()
}

fn store_failure(state: &AppState, op: &str, error: StoreError) -> Response {
    state.metrics.store_errors_total.inc();
    error!(op, error = %error, "store operation failed");
    server_error()
}

fn server_error() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(serde_json::json!({ "error": STORE_ERROR_MESSAGE })),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;
    use http_body_util::BodyExt;
    use std::time::Duration;
    use tower::ServiceExt;

    use async_trait::async_trait;
    use sigil_protocol::crypto::keys::SigilKeypair;
    use sigil_protocol::crypto::sealed::SealKeypair;
    use sigil_protocol::identity::Identity;
    use sigil_protocol::resolver::NameResolver;
    use sigil_protocol::store::FileStore;

    const CLIENT_ADDR: &str = "203.0.113.9";

    fn test_state_with(store: Arc<dyn BindingStore>) -> AppState {
        let server = SealKeypair::generate();
        AppState {
            domain: "sigil.test".into(),
            issuer: Arc::new(ChallengeIssuer::new(server.public())),
            validator: Arc::new(ResponseValidator::new(server)),
            store,
            metrics: Arc::new(crate::metrics::NodeMetrics::new()),
        }
    }

    fn test_state() -> (tempfile::TempDir, Arc<FileStore>, AppState) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileStore::open(dir.path(), Duration::from_secs(3600)).unwrap());
        let state = test_state_with(store.clone());
        (dir, store, state)
    }

    /// A store whose every operation fails, for the 503 path.
    struct BrokenStore;

    #[async_trait]
    impl BindingStore for BrokenStore {
        async fn check(&self, _: &Identity) -> Result<BindingStatus, StoreError> {
            Err(StoreError::Zone("backend down".into()))
        }
        async fn update(&self, _: &Identity, _: &str) -> Result<(), StoreError> {
            Err(StoreError::Zone("backend down".into()))
        }
        async fn revoke(&self, _: &Identity) -> Result<(), StoreError> {
            Err(StoreError::Zone("backend down".into()))
        }
    }

    /// Build a request carrying the remote address the way the real server
    /// does via `into_make_service_with_connect_info`.
    fn request_from(
        remote: &str,
        method: &str,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Request<Body> {
        let builder = Request::builder().method(method).uri(path);
        let mut req = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&json).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let addr: SocketAddr = format!("{remote}:54321").parse().unwrap();
        req.extensions_mut().insert(ConnectInfo(addr));
        req
    }

    async fn send(
        router: &Router,
        req: Request<Body>,
    ) -> (StatusCode, serde_json::Value) {
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    /// Fetch a challenge for `remote` and produce a fully signed request
    /// body for the given keypair.
    async fn signed_body(router: &Router, client: &SigilKeypair, remote: &str) -> serde_json::Value {
        let (status, json) = send(router, request_from(remote, "GET", "/api", None)).await;
        assert_eq!(status, StatusCode::OK);
        let challenge = json["challenge"].as_str().unwrap().to_owned();

        let challenge_bytes = BASE64.decode(&challenge).unwrap();
        let response = BASE64.encode(client.sign(&challenge_bytes).as_bytes());
        serde_json::json!({
            "pub": client.public_key().to_pem().unwrap(),
            "challenge": challenge,
            "response": response,
        })
    }

    // -- Challenge issuance ---------------------------------------------------

    #[tokio::test]
    async fn get_api_issues_a_challenge() {
        let (_dir, _store, state) = test_state();
        let router = create_router(state);
        let (status, json) = send(&router, request_from(CLIENT_ADDR, "GET", "/api", None)).await;

        assert_eq!(status, StatusCode::OK);
        let challenge = json["challenge"].as_str().unwrap();
        assert!(BASE64.decode(challenge).is_ok());
    }

    // -- Registration ---------------------------------------------------------

    #[tokio::test]
    async fn post_with_valid_response_binds_the_name() {
        let (_dir, store, state) = test_state();
        let router = create_router(state);
        let client = SigilKeypair::generate();
        let identity = Identity::derive(&client.public_key()).unwrap();

        let body = signed_body(&router, &client, CLIENT_ADDR).await;
        let (status, json) =
            send(&router, request_from(CLIENT_ADDR, "POST", "/api", Some(body))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["ip"], CLIENT_ADDR);
        assert_eq!(json["name"], format!("{identity}.sigil.test"));

        assert_eq!(
            store.check(&identity).await.unwrap(),
            BindingStatus::Registered {
                address: CLIENT_ADDR.into()
            }
        );
    }

    #[tokio::test]
    async fn post_from_a_different_address_is_rejected() {
        let (_dir, _store, state) = test_state();
        let router = create_router(state);
        let client = SigilKeypair::generate();

        // Challenge fetched from one address, response posted from another.
        let body = signed_body(&router, &client, CLIENT_ADDR).await;
        let (status, json) =
            send(&router, request_from("203.0.113.10", "POST", "/api", Some(body))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Invalid response");
    }

    #[tokio::test]
    async fn post_with_wrong_key_signature_is_rejected() {
        let (_dir, _store, state) = test_state();
        let router = create_router(state);
        let client = SigilKeypair::generate();
        let impostor = SigilKeypair::generate();

        let mut body = signed_body(&router, &impostor, CLIENT_ADDR).await;
        // Keep the impostor's signature, present the victim's key.
        body["pub"] = client.public_key().to_pem().unwrap().into();
        let (status, json) =
            send(&router, request_from(CLIENT_ADDR, "POST", "/api", Some(body))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Invalid signature");
    }

    #[tokio::test]
    async fn post_with_garbage_body_is_invalid_request() {
        let (_dir, _store, state) = test_state();
        let router = create_router(state);

        let mut req = Request::builder()
            .method("POST")
            .uri("/api")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let addr: SocketAddr = format!("{CLIENT_ADDR}:1").parse().unwrap();
        req.extensions_mut().insert(ConnectInfo(addr));

        let (status, json) = send(&router, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Invalid request");
    }

    #[tokio::test]
    async fn post_with_undecodable_fields_is_invalid_request() {
        let (_dir, _store, state) = test_state();
        let router = create_router(state);
        let client = SigilKeypair::generate();

        let body = serde_json::json!({
            "pub": client.public_key().to_pem().unwrap(),
            "challenge": "!!!",
            "response": "!!!",
        });
        let (status, json) =
            send(&router, request_from(CLIENT_ADDR, "POST", "/api", Some(body))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Invalid request");
    }

    // -- Revocation -----------------------------------------------------------

    #[tokio::test]
    async fn delete_revokes_and_post_reports_revoked_with_200() {
        let (_dir, store, state) = test_state();
        let router = create_router(state);
        let client = SigilKeypair::generate();
        let identity = Identity::derive(&client.public_key()).unwrap();

        // Register first.
        let body = signed_body(&router, &client, CLIENT_ADDR).await;
        let (status, _) =
            send(&router, request_from(CLIENT_ADDR, "POST", "/api", Some(body))).await;
        assert_eq!(status, StatusCode::OK);

        // Revoke.
        let body = signed_body(&router, &client, CLIENT_ADDR).await;
        let (status, json) =
            send(&router, request_from(CLIENT_ADDR, "DELETE", "/api", Some(body))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            json["message"],
            format!("{identity}.sigil.test has been revoked")
        );
        assert_eq!(store.check(&identity).await.unwrap(), BindingStatus::Revoked);

        // Re-registration attempt: HTTP 200, semantic refusal, no write.
        let body = signed_body(&router, &client, CLIENT_ADDR).await;
        let (status, json) =
            send(&router, request_from(CLIENT_ADDR, "POST", "/api", Some(body))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["error"], "revoked public key");
        assert_eq!(json["name"], format!("{identity}.sigil.test"));
        assert_eq!(store.check(&identity).await.unwrap(), BindingStatus::Revoked);
    }

    #[tokio::test]
    async fn revoked_name_stops_resolving_via_the_dns_path() {
        let (_dir, store, state) = test_state();
        let router = create_router(state);
        let client = SigilKeypair::generate();
        let identity = Identity::derive(&client.public_key()).unwrap();
        let resolver = NameResolver::new(store.clone() as Arc<dyn BindingStore>);
        let qname = format!("{identity}.sigil.test.");

        let body = signed_body(&router, &client, CLIENT_ADDR).await;
        send(&router, request_from(CLIENT_ADDR, "POST", "/api", Some(body))).await;
        assert!(resolver.resolve_a(&qname).await.is_some());

        let body = signed_body(&router, &client, CLIENT_ADDR).await;
        let (status, _) =
            send(&router, request_from(CLIENT_ADDR, "DELETE", "/api", Some(body))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(resolver.resolve_a(&qname).await, None);
    }

    // -- Store failure --------------------------------------------------------

    #[tokio::test]
    async fn broken_store_yields_503_with_generic_message() {
        let state = test_state_with(Arc::new(BrokenStore));
        let router = create_router(state);
        let client = SigilKeypair::generate();

        let body = signed_body(&router, &client, CLIENT_ADDR).await;
        let (status, json) =
            send(&router, request_from(CLIENT_ADDR, "POST", "/api", Some(body))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["error"], STORE_ERROR_MESSAGE);

        let body = signed_body(&router, &client, CLIENT_ADDR).await;
        let (status, json) =
            send(&router, request_from(CLIENT_ADDR, "DELETE", "/api", Some(body))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["error"], STORE_ERROR_MESSAGE);
    }

    // -- Health ---------------------------------------------------------------

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let (_dir, _store, state) = test_state();
        let router = create_router(state);
        let (status, json) = send(&router, request_from("127.0.0.1", "GET", "/health", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
    }
}
