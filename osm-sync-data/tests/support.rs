//! Stub OSM API served by an axum router on a loopback port.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{Method, StatusCode, Uri, header};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::runtime::Runtime;

const MAP_PATH: &str = "/api/0.6/map";

#[derive(Clone)]
struct CannedMap {
    status: StatusCode,
    body: String,
    requests: Arc<Mutex<Vec<String>>>,
}

/// Answers every map call with one canned response and records each request.
///
/// The server runs on its own runtime so blocking clients can call it from
/// the test thread. Dropping the stub shuts the runtime down.
pub struct StubOsmApi {
    base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
    _runtime: Runtime,
}

impl StubOsmApi {
    /// Serve `status` and `body` for `GET /api/0.6/map`.
    pub fn respond(status: StatusCode, body: &str) -> Self {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .expect("build stub runtime");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route(MAP_PATH, get(answer_map_call))
            .with_state(CannedMap {
                status,
                body: body.to_owned(),
                requests: Arc::clone(&requests),
            });
        let listener = runtime
            .block_on(TcpListener::bind("127.0.0.1:0"))
            .expect("bind loopback listener");
        let addr = listener.local_addr().expect("listener address");
        runtime.spawn(async move {
            axum::serve(listener, app).await.expect("stub server failed");
        });
        Self {
            base_url: format!("http://{addr}"),
            requests,
            _runtime: runtime,
        }
    }

    /// Root URL clients should use.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Requests seen so far, as `METHOD path?query`.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }
}

async fn answer_map_call(
    State(canned): State<CannedMap>,
    method: Method,
    uri: Uri,
) -> impl IntoResponse {
    canned.requests.lock().push(format!("{method} {uri}"));
    (
        canned.status,
        [(header::CONTENT_TYPE, "text/xml; charset=utf-8")],
        canned.body,
    )
}
