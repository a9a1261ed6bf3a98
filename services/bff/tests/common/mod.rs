//! Shared fixtures for the edge-gateway integration tests: an in-process
//! IdP (JWKS + RS256 token minting), a recording mock user service, and a
//! fully wired gateway router.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde_json::{Value, json};

use bff::app::{AppState, build_router};
use bff::auth::{Authorizer, KeySetCache, KeySetConfig, TokenValidator, ValidatorConfig};
use bff::client::ConnectClient;
use bff::middleware::{
    AuthState, FailureRateLimiter, HeaderSanitizer, PublicEndpointMatcher, RateLimitConfig,
};

pub const ISSUER: &str = "https://idp.test/";
pub const AUDIENCE: &str = "test-audience";
pub const KID: &str = "test-kid-auth";

/// In-process identity provider: one RS256 keypair plus token minting.
#[derive(Clone)]
pub struct TestIdp {
    private_pem: Arc<String>,
    jwks: Arc<Value>,
}

impl TestIdp {
    pub fn new() -> Self {
        let private = RsaPrivateKey::new(&mut rand::thread_rng(), 2048).expect("rsa key");
        let public = RsaPublicKey::from(&private);
        let jwks = json!({
            "keys": [{
                "kty": "RSA",
                "kid": KID,
                "alg": "RS256",
                "use": "sig",
                "n": URL_SAFE_NO_PAD.encode(public.n().to_bytes_be()),
                "e": URL_SAFE_NO_PAD.encode(public.e().to_bytes_be()),
            }]
        });
        Self {
            private_pem: Arc::new(
                private
                    .to_pkcs1_pem(Default::default())
                    .expect("pem")
                    .to_string(),
            ),
            jwks: Arc::new(jwks),
        }
    }

    pub fn mint(&self, sub: &str, scope: &str, exp_offset_secs: i64) -> String {
        let now = chrono::Utc::now().timestamp();
        let claims = json!({
            "iss": ISSUER,
            "aud": [AUDIENCE],
            "sub": sub,
            "scope": scope,
            "iat": now,
            "exp": now + exp_offset_secs,
        });
        let mut header = jsonwebtoken::Header::new(jsonwebtoken::Algorithm::RS256);
        header.kid = Some(KID.to_string());
        jsonwebtoken::encode(
            &header,
            &claims,
            &jsonwebtoken::EncodingKey::from_rsa_pem(self.private_pem.as_bytes())
                .expect("encoding key"),
        )
        .expect("token")
    }

    /// Serve this IdP's JWKS document on an ephemeral port.
    pub async fn serve_jwks(&self) -> String {
        let jwks = Arc::clone(&self.jwks);
        let app = Router::new().route(
            "/jwks",
            axum::routing::get(move || {
                let jwks = Arc::clone(&jwks);
                async move { Json((*jwks).clone()) }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app.into_make_service()).await;
        });
        format!("http://{addr}/jwks")
    }
}

/// Mock user service that records what it receives.
#[derive(Clone)]
pub struct MockUserService {
    pub calls: Arc<AtomicUsize>,
    pub last_headers: Arc<Mutex<Option<HeaderMap>>>,
    /// When set, every call answers with this (status, body) pair.
    pub forced_response: Arc<Mutex<Option<(StatusCode, Value)>>>,
    /// Artificial per-call latency, for deadline tests.
    pub delay: Arc<Mutex<Duration>>,
}

impl MockUserService {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            last_headers: Arc::new(Mutex::new(None)),
            forced_response: Arc::new(Mutex::new(None)),
            delay: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn force_response(&self, status: StatusCode, body: Value) {
        *self.forced_response.lock().unwrap() = Some((status, body));
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.last_headers
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|headers| headers.get(name))
            .and_then(|value| value.to_str().ok().map(str::to_string))
    }

    pub async fn serve(&self) -> String {
        async fn handle(
            State(mock): State<MockUserService>,
            headers: HeaderMap,
            Json(_body): Json<Value>,
        ) -> (StatusCode, Json<Value>) {
            mock.calls.fetch_add(1, Ordering::SeqCst);
            *mock.last_headers.lock().unwrap() = Some(headers);
            let delay = *mock.delay.lock().unwrap();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if let Some((status, body)) = mock.forced_response.lock().unwrap().clone() {
                return (status, Json(body));
            }
            let user = json!({
                "user": { "id": "user-123", "email": "u@example.test", "displayName": "U" }
            });
            (StatusCode::OK, Json(user))
        }

        let app = Router::new()
            .route("/api.v1.UserService/:method", post(handle))
            .with_state(self.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app.into_make_service()).await;
        });
        format!("http://{addr}")
    }
}

pub struct TestGateway {
    pub router: Router,
    pub rate_limiter: Arc<FailureRateLimiter>,
    pub key_set: Arc<KeySetCache>,
}

pub struct GatewayOptions {
    pub public_endpoints: Vec<String>,
    pub rate_limit: RateLimitConfig,
    pub backend_timeout: Duration,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            public_endpoints: Vec::new(),
            rate_limit: RateLimitConfig::default(),
            backend_timeout: Duration::from_secs(5),
        }
    }
}

pub async fn build_gateway(
    jwks_url: String,
    user_service_url: String,
    options: GatewayOptions,
) -> TestGateway {
    let key_set = KeySetCache::connect(KeySetConfig {
        url: jwks_url,
        refresh_interval: Duration::from_secs(3600),
        min_refresh_interval: Duration::from_secs(10),
    })
    .await
    .expect("key set");

    let validator = Arc::new(TokenValidator::new(
        ValidatorConfig {
            issuer: ISSUER.to_string(),
            audience: AUDIENCE.to_string(),
            clock_skew: Duration::from_secs(30),
        },
        Arc::clone(&key_set),
    ));
    let rate_limiter = FailureRateLimiter::new(options.rate_limit);
    let auth = AuthState {
        validator,
        rate_limiter: Arc::clone(&rate_limiter),
        public_endpoints: Arc::new(PublicEndpointMatcher::new(options.public_endpoints)),
        trusted_proxy_header: "X-Real-IP".to_string(),
    };
    let state = AppState {
        user_client: ConnectClient::new(user_service_url, options.backend_timeout),
        authorizer: Authorizer::new(),
        key_set: Arc::clone(&key_set),
    };

    TestGateway {
        router: build_router(state, auth, HeaderSanitizer::default()),
        rate_limiter,
        key_set,
    }
}

/// Build a unary RPC request with optional bearer token and client IP.
pub fn rpc_request(
    procedure: &str,
    body: Value,
    token: Option<&str>,
    client_ip: &str,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(procedure)
        .header("content-type", "application/json")
        .header("x-real-ip", client_ip);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).expect("request")
}

pub async fn read_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}
