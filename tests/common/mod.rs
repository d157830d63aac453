//! Shared mock sproxyd connector for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::extract::State;
use axum::http::{Method, StatusCode};
use axum::response::Response;
use axum::routing::{any, get};
use axum::Router;

const BASE: &str = "/proxy/chord/";

/// Install the test log subscriber once; later calls are no-ops. Run the
/// suite with `RUST_LOG=sproxyd_client=debug` to watch the alive set move.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Shared, programmable state behind one mock connector.
#[derive(Clone, Default)]
pub struct MockState {
    /// Object content, keyed by (still percent-encoded) object name.
    pub objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    /// Raw base64 usermd envelopes, keyed like `objects`.
    pub metadata: Arc<Mutex<HashMap<String, String>>>,
    /// Whether the `.conf` body advertises `by_path_enabled`.
    pub conf_enabled: Arc<AtomicBool>,
    /// Number of object-route requests served (probes not counted).
    pub object_hits: Arc<AtomicUsize>,
}

impl MockState {
    pub fn seed_object(&self, name: &str, content: &[u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert(name.to_string(), content.to_vec());
    }

    pub fn set_conf_enabled(&self, enabled: bool) {
        self.conf_enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn object_hits(&self) -> usize {
        self.object_hits.load(Ordering::SeqCst)
    }
}

/// A running mock connector.
pub struct MockSproxyd {
    pub addr: SocketAddr,
    pub state: MockState,
}

impl MockSproxyd {
    pub fn endpoint_url(&self) -> String {
        format!("http://{}/proxy/chord", self.addr)
    }
}

/// Start a mock connector on an ephemeral port.
pub async fn start_mock_sproxyd(conf_enabled: bool) -> MockSproxyd {
    init_tracing();
    let state = MockState {
        conf_enabled: Arc::new(AtomicBool::new(conf_enabled)),
        ..Default::default()
    };

    let app = Router::new()
        .route("/proxy/chord/.conf", get(conf_handler))
        .route("/proxy/chord/{*name}", any(object_handler))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockSproxyd { addr, state }
}

async fn conf_handler(State(state): State<MockState>) -> String {
    if state.conf_enabled.load(Ordering::SeqCst) {
        "{\n  \"by_path_enabled\": true,\n  \"by_path_cos\": 2\n}".to_string()
    } else {
        "{\n  \"by_path_enabled\": false\n}".to_string()
    }
}

async fn object_handler(
    State(state): State<MockState>,
    request: axum::extract::Request,
) -> Response {
    state.object_hits.fetch_add(1, Ordering::SeqCst);

    let name = request
        .uri()
        .path()
        .strip_prefix(BASE)
        .unwrap_or_default()
        .to_string();

    // Canned failure for error-path tests.
    if name == "boom" {
        return respond(StatusCode::INTERNAL_SERVER_ERROR, "kaboom");
    }

    match *request.method() {
        Method::HEAD => match state.metadata.lock().unwrap().get(&name) {
            Some(usermd) => Response::builder()
                .status(StatusCode::OK)
                .header("x-scal-usermd", usermd)
                .body(Body::empty())
                .unwrap(),
            None => respond(StatusCode::NOT_FOUND, ""),
        },
        Method::PUT => {
            if let Some(usermd) = request.headers().get("x-scal-usermd").cloned() {
                if request.headers().get("x-scal-cmd").is_some() {
                    state
                        .metadata
                        .lock()
                        .unwrap()
                        .insert(name, usermd.to_str().unwrap().to_string());
                    return respond(StatusCode::OK, "");
                }
            }
            let content = axum::body::to_bytes(request.into_body(), 64 * 1024 * 1024)
                .await
                .unwrap();
            state.objects.lock().unwrap().insert(name, content.to_vec());
            respond(StatusCode::OK, "")
        }
        Method::GET => {
            let range = request
                .headers()
                .get("range")
                .and_then(|v| v.to_str().ok())
                .and_then(parse_range);
            let objects = state.objects.lock().unwrap();
            match objects.get(&name) {
                Some(content) => match range {
                    Some((start, end)) => {
                        let end = (end + 1).min(content.len() as u64) as usize;
                        let slice = content[start as usize..end].to_vec();
                        Response::builder()
                            .status(StatusCode::PARTIAL_CONTENT)
                            .body(Body::from(slice))
                            .unwrap()
                    }
                    None => Response::builder()
                        .status(StatusCode::OK)
                        .body(Body::from(content.clone()))
                        .unwrap(),
                },
                None => respond(StatusCode::NOT_FOUND, ""),
            }
        }
        Method::DELETE => {
            let existed = state.objects.lock().unwrap().remove(&name).is_some();
            state.metadata.lock().unwrap().remove(&name);
            if existed {
                respond(StatusCode::OK, "")
            } else {
                respond(StatusCode::NOT_FOUND, "")
            }
        }
        _ => respond(StatusCode::METHOD_NOT_ALLOWED, ""),
    }
}

fn respond(status: StatusCode, body: &'static str) -> Response {
    Response::builder()
        .status(status)
        .body(Body::from(body))
        .unwrap()
}

fn parse_range(header: &str) -> Option<(u64, u64)> {
    let spec = header.strip_prefix("bytes=")?;
    let (start, end) = spec.split_once('-')?;
    Some((start.parse().ok()?, end.parse().ok()?))
}
