//! An in-process stand-in for the hive simulation API.
use bytes::Bytes;
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use tokio::sync::oneshot;
use warp::http::{Method, StatusCode};
use warp::path::FullPath;
use warp::Filter;

pub const CONTAINER_ID: &str = "c0ffee";
pub const CONTAINER_IP: &str = "10.0.0.5";
pub const BRIDGE_IP: &str = "172.17.0.3";

pub fn enode_pubkey() -> String {
    "0a".repeat(64)
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub body: Bytes,
}

impl RecordedRequest {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or(Value::Null)
    }
}

#[derive(Default)]
struct State {
    requests: RwLock<Vec<RecordedRequest>>,
    next_test_id: RwLock<u32>,
}

pub struct MockHive {
    _shutdown_tx: oneshot::Sender<()>,
    addr: SocketAddr,
    state: Arc<State>,
}

impl MockHive {
    /// Must be called from within a tokio runtime.
    pub fn new() -> Self {
        let state = Arc::new(State::default());
        let inner = state.clone();
        let routes = warp::method()
            .and(warp::path::full())
            .and(warp::body::bytes())
            .map(move |method: Method, path: FullPath, body: Bytes| {
                let (status, value) = respond(&inner, &method, path.as_str(), &body);
                inner.requests.write().push(RecordedRequest {
                    method,
                    path: path.as_str().to_string(),
                    body,
                });
                warp::reply::with_status(warp::reply::json(&value), status)
            });

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (addr, server) = warp::serve(routes).bind_with_graceful_shutdown(
            SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0),
            async {
                let _ = shutdown_rx.await;
            },
        );
        tokio::spawn(server);

        Self {
            _shutdown_tx: shutdown_tx,
            addr,
            state,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.read().clone()
    }

    pub fn request_to(&self, method: Method, path: &str) -> Option<RecordedRequest> {
        self.requests()
            .into_iter()
            .find(|r| r.method == method && r.path == path)
    }
}

fn respond(state: &State, method: &Method, path: &str, body: &Bytes) -> (StatusCode, Value) {
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    match (method.as_str(), segments.as_slice()) {
        ("POST", ["testsuite"]) => (StatusCode::OK, json!(1)),
        ("DELETE", ["testsuite", _]) => (StatusCode::OK, Value::Null),
        ("POST", ["testsuite", _, "test"]) => {
            let mut id = state.next_test_id.write();
            *id += 1;
            (StatusCode::OK, json!(*id))
        }
        ("POST", ["testsuite", _, "test", _]) => (StatusCode::OK, Value::Null),
        ("GET", ["clients"]) => (
            StatusCode::OK,
            json!([
                {"name": "go-ethereum", "version": "1.14", "meta": {"roles": ["eth1"]}},
                {"name": "lighthouse-bn", "version": "5.0", "meta": {"roles": ["beacon"]}},
            ]),
        ),
        ("POST", ["testsuite", _, "test", _, "node"]) => (
            StatusCode::OK,
            json!({"id": CONTAINER_ID, "ip": CONTAINER_IP}),
        ),
        ("DELETE", ["testsuite", _, "test", _, "node", _]) => (StatusCode::OK, Value::Null),
        ("POST", ["testsuite", _, "test", _, "node", _, "pause"])
        | ("DELETE", ["testsuite", _, "test", _, "node", _, "pause"]) => {
            (StatusCode::OK, Value::Null)
        }
        ("POST", ["testsuite", _, "test", _, "node", _, "exec"]) => {
            let command: Value = serde_json::from_slice(body).unwrap_or(Value::Null);
            if command["command"] == json!(["enode.sh"]) {
                (
                    StatusCode::OK,
                    json!({
                        "stdout": format!("enode://{}@127.0.0.1:30303\n", enode_pubkey()),
                        "stderr": "",
                        "exitCode": 0,
                    }),
                )
            } else {
                (
                    StatusCode::OK,
                    json!({"stdout": "", "stderr": "no such command", "exitCode": 127}),
                )
            }
        }
        ("POST", ["testsuite", _, "network", "taken"]) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({"error": "network already exists"}),
        ),
        ("POST", ["testsuite", _, "network", _])
        | ("DELETE", ["testsuite", _, "network", _])
        | ("POST", ["testsuite", _, "network", _, _])
        | ("DELETE", ["testsuite", _, "network", _, _]) => (StatusCode::OK, Value::Null),
        ("GET", ["testsuite", _, "network", _, _]) => (StatusCode::OK, json!(BRIDGE_IP)),
        _ => (StatusCode::NOT_FOUND, json!({"error": "unknown endpoint"})),
    }
}
