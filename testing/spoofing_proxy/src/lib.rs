//! A JSON-RPC middlebox that sits in front of an execution client's engine port.
//!
//! Traffic is forwarded untouched unless a spoof is registered for the request's method, in
//! which case the named fields of the request parameters or of the response result are
//! overwritten. Tests use this to inject faults without modifying the client. A spoof that
//! cannot be applied fails the request with a JSON-RPC error instead of forwarding clean
//! traffic.
mod rpc;
mod spoof;

pub use rpc::{decode_request_param, decode_request_params, decode_response, request_method};
pub use spoof::{combine, set_field, spoof_request, spoof_response, Spoof};

use bytes::Bytes;
use engine_api::auth::{self, Auth};
use parking_lot::{Mutex, RwLock};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use slog::{debug, info, warn, Logger};
use std::collections::HashMap;
use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use url::Url;
use warp::{http::StatusCode, Filter, Rejection};

/// Forwarded requests are abandoned after this long.
pub const DEFAULT_FORWARD_TIMEOUT: Duration = Duration::from_secs(12);
const JSON_RPC_INTERNAL_ERROR: i64 = -32603;

/// Called with the raw request body. The returned spoof is merged over the static ones.
pub type RequestCallback = Arc<dyn Fn(&[u8]) -> Option<Spoof> + Send + Sync>;
/// Called with the raw response and request bodies.
pub type ResponseCallback = Arc<dyn Fn(&[u8], &[u8]) -> Option<Spoof> + Send + Sync>;

#[derive(Debug)]
pub enum Error {
    Warp(warp::Error),
    HttpClient(reqwest::Error),
    Json(serde_json::Error),
    Auth(auth::Error),
    ServerMessage { code: i64, message: String },
    MethodMismatch { first: String, second: String },
    NotAnObject(String),
    MissingParam(usize),
}

impl From<warp::Error> for Error {
    fn from(e: warp::Error) -> Self {
        Error::Warp(e)
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::HttpClient(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e)
    }
}

impl From<auth::Error> for Error {
    fn from(e: auth::Error) -> Self {
        Error::Auth(e)
    }
}

/// Configuration of the proxy's own HTTP listener.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub listen_addr: Ipv4Addr,
    pub listen_port: u16,
    #[serde(with = "duration_secs")]
    pub forward_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: Ipv4Addr::new(127, 0, 0, 1),
            listen_port: 0,
            forward_timeout: DEFAULT_FORWARD_TIMEOUT,
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

#[derive(Default)]
struct SpoofingConfig {
    requests: Vec<Spoof>,
    responses: Vec<Spoof>,
    request_callbacks: HashMap<String, RequestCallback>,
    response_callbacks: HashMap<String, ResponseCallback>,
}

impl SpoofingConfig {
    /// Every static spoof for `method` merged in registration order.
    fn merged(spoofs: &[Spoof], method: &str) -> Result<Option<Spoof>, Error> {
        spoofs
            .iter()
            .filter(|spoof| spoof.method == method)
            .try_fold(None, |acc, spoof| combine(acc, Some(spoof.clone())))
    }
}

/// State shared between the `Proxy` handle and its server task.
pub struct Context {
    pub config: Config,
    pub destination: Url,
    pub log: Logger,
    client: reqwest::Client,
    auth: Option<Auth>,
    spoofing: RwLock<SpoofingConfig>,
}

impl Context {
    fn request_spoof(&self, method: &str, body: &[u8]) -> Result<Option<Spoof>, Error> {
        let (merged, callback) = {
            let spoofing = self.spoofing.read();
            (
                SpoofingConfig::merged(&spoofing.requests, method)?,
                spoofing.request_callbacks.get(method).cloned(),
            )
        };
        combine(merged, callback.and_then(|callback| callback(body)))
    }

    fn response_spoof(
        &self,
        method: &str,
        response: &[u8],
        request: &[u8],
    ) -> Result<Option<Spoof>, Error> {
        let (merged, callback) = {
            let spoofing = self.spoofing.read();
            (
                SpoofingConfig::merged(&spoofing.responses, method)?,
                spoofing.response_callbacks.get(method).cloned(),
            )
        };
        combine(merged, callback.and_then(|callback| callback(response, request)))
    }

    fn rewrite_request(&self, method: &str, body: Bytes) -> Result<Bytes, Error> {
        match self.request_spoof(method, &body)? {
            Some(spoof) if !spoof.is_empty() => {
                debug!(
                    self.log,
                    "Spoofing request";
                    "method" => method,
                    "fields" => ?spoof.fields.keys().collect::<Vec<_>>(),
                );
                Ok(Bytes::from(spoof_request(&body, &spoof)?))
            }
            _ => Ok(body),
        }
    }

    fn rewrite_response(
        &self,
        method: &str,
        response: Bytes,
        request: &[u8],
    ) -> Result<Bytes, Error> {
        match self.response_spoof(method, &response, request)? {
            Some(spoof) if !spoof.is_empty() => {
                debug!(
                    self.log,
                    "Spoofing response";
                    "method" => method,
                    "fields" => ?spoof.fields.keys().collect::<Vec<_>>(),
                );
                Ok(Bytes::from(spoof_response(&response, &spoof)?))
            }
            _ => Ok(response),
        }
    }

    /// A JSON-RPC internal error answered in place of the destination's response.
    fn failure(&self, body: &[u8], what: &str, error: &Error) -> (StatusCode, Bytes) {
        warn!(self.log, "Failing proxied request"; "reason" => what, "error" => ?error);
        let id = serde_json::from_slice::<serde_json::Value>(body)
            .ok()
            .and_then(|message| message.get("id").cloned())
            .unwrap_or(serde_json::Value::Null);
        let message = serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {
                "code": JSON_RPC_INTERNAL_ERROR,
                "message": format!("proxy: {}: {:?}", what, error),
            },
        });
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Bytes::from(message.to_string()),
        )
    }

    /// Forwards one request to the destination, applying any spoofs on the way in and out.
    async fn forward(&self, authorization: Option<String>, body: Bytes) -> (StatusCode, Bytes) {
        let method = request_method(&body);
        let request = match &method {
            Some(method) => match self.rewrite_request(method, body.clone()) {
                Ok(request) => request,
                Err(e) => return self.failure(&body, "unable to spoof request", &e),
            },
            None => body,
        };

        let mut builder = self
            .client
            .post(self.destination.clone())
            .timeout(self.config.forward_timeout)
            .header(CONTENT_TYPE, "application/json")
            .body(request.clone());
        match (&self.auth, authorization) {
            (Some(auth), _) => match auth.generate_token() {
                Ok(token) => builder = builder.bearer_auth(token),
                Err(e) => {
                    return self.failure(&request, "unable to sign request", &Error::Auth(e))
                }
            },
            (None, Some(authorization)) => builder = builder.header(AUTHORIZATION, authorization),
            (None, None) => {}
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(
                    self.log,
                    "Destination unreachable";
                    "destination" => %self.destination,
                    "method" => ?method,
                    "error" => %e,
                );
                let message = serde_json::json!({ "message": e.to_string() }).to_string();
                return (StatusCode::BAD_GATEWAY, Bytes::from(message));
            }
        };
        let status = StatusCode::from_u16(response.status().as_u16())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let response = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(self.log, "Unable to read response"; "method" => ?method, "error" => %e);
                return (StatusCode::BAD_GATEWAY, Bytes::new());
            }
        };

        let response = match &method {
            Some(method) if status.is_success() => {
                match self.rewrite_response(method, response, &request) {
                    Ok(response) => response,
                    Err(e) => return self.failure(&request, "unable to spoof response", &e),
                }
            }
            _ => response,
        };
        (status, response)
    }
}

/// Handle to a running proxy. Dropping it, or calling `cancel`, stops the server.
pub struct Proxy {
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
    listen_socket_addr: SocketAddr,
    pub ctx: Arc<Context>,
}

impl Proxy {
    /// Starts a proxy forwarding to `destination`. When `jwt_secret` is set, every forwarded
    /// request carries a fresh token signed with it; otherwise the caller's `Authorization`
    /// header is passed through. Must be called from within a tokio runtime.
    pub fn start(
        config: Config,
        destination: Url,
        jwt_secret: Option<&[u8]>,
        log: Logger,
    ) -> Result<Self, Error> {
        let ctx = Arc::new(Context {
            config,
            destination,
            log,
            client: reqwest::Client::builder().build()?,
            auth: jwt_secret.map(|secret| Auth::new(secret, None, None)),
            spoofing: RwLock::new(SpoofingConfig::default()),
        });

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let shutdown_future = async {
            // Ignore the result from the channel, shut down regardless.
            let _ = shutdown_rx.await;
        };
        let (listen_socket_addr, server_future) = serve(ctx.clone(), shutdown_future)?;
        tokio::spawn(server_future);

        Ok(Self {
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            listen_socket_addr,
            ctx,
        })
    }

    pub fn url(&self) -> String {
        format!(
            "http://{}:{}",
            self.listen_socket_addr.ip(),
            self.listen_socket_addr.port()
        )
    }

    pub fn listen_socket_addr(&self) -> SocketAddr {
        self.listen_socket_addr
    }

    pub fn add_request(&self, spoof: Spoof) {
        info!(self.ctx.log, "Adding spoof request"; "method" => &spoof.method);
        self.ctx.spoofing.write().requests.push(spoof);
    }

    pub fn add_response(&self, spoof: Spoof) {
        info!(self.ctx.log, "Adding spoof response"; "method" => &spoof.method);
        self.ctx.spoofing.write().responses.push(spoof);
    }

    /// Drops every static request spoof for `method`.
    pub fn remove_request(&self, method: &str) {
        self.ctx
            .spoofing
            .write()
            .requests
            .retain(|spoof| spoof.method != method);
    }

    /// Drops every static response spoof for `method`.
    pub fn remove_response(&self, method: &str) {
        self.ctx
            .spoofing
            .write()
            .responses
            .retain(|spoof| spoof.method != method);
    }

    /// Replaces the request callback of `method`.
    pub fn add_request_callback<F>(&self, method: &str, callback: F)
    where
        F: Fn(&[u8]) -> Option<Spoof> + Send + Sync + 'static,
    {
        info!(self.ctx.log, "Adding request spoof callback"; "method" => method);
        self.ctx
            .spoofing
            .write()
            .request_callbacks
            .insert(method.to_string(), Arc::new(callback));
    }

    /// Replaces the response callback of `method`.
    pub fn add_response_callback<F>(&self, method: &str, callback: F)
    where
        F: Fn(&[u8], &[u8]) -> Option<Spoof> + Send + Sync + 'static,
    {
        info!(self.ctx.log, "Adding response spoof callback"; "method" => method);
        self.ctx
            .spoofing
            .write()
            .response_callbacks
            .insert(method.to_string(), Arc::new(callback));
    }

    pub fn remove_callbacks(&self, method: &str) {
        let mut spoofing = self.ctx.spoofing.write();
        spoofing.request_callbacks.remove(method);
        spoofing.response_callbacks.remove(method);
    }

    /// Stops the server. Requests already being forwarded are abandoned.
    pub fn cancel(&self) {
        if let Some(tx) = self.shutdown_tx.lock().take() {
            let _ = tx.send(());
        }
    }
}

/// Creates a server that forwards every POST body to `ctx.destination`.
///
/// Returns the bound address and the server future, which resolves once `shutdown` does.
pub fn serve(
    ctx: Arc<Context>,
    shutdown: impl Future<Output = ()> + Send + Sync + 'static,
) -> Result<(SocketAddr, impl Future<Output = ()>), Error> {
    let config = &ctx.config;
    let log = ctx.log.clone();
    let inner_ctx = ctx.clone();
    let ctx_filter = warp::any().map(move || inner_ctx.clone());

    let routes = warp::post()
        .and(warp::path::end())
        .and(warp::header::optional::<String>("authorization"))
        .and(warp::body::bytes())
        .and(ctx_filter)
        .and_then(
            |authorization: Option<String>, body: Bytes, ctx: Arc<Context>| async move {
                let (status, body) = ctx.forward(authorization, body).await;
                Ok::<_, Rejection>(warp::reply::with_status(
                    warp::reply::with_header(body.to_vec(), "Content-Type", "application/json"),
                    status,
                ))
            },
        );

    let (listening_socket, server) = warp::serve(routes).try_bind_with_graceful_shutdown(
        SocketAddrV4::new(config.listen_addr, config.listen_port),
        async {
            shutdown.await;
        },
    )?;

    info!(
        log,
        "Proxy started";
        "listen_address" => listening_socket.to_string(),
        "destination" => %ctx.destination,
    );

    Ok((listening_socket, server))
}

#[cfg(test)]
mod test {
    use super::*;
    use engine_api::auth::HIVE_JWT_SECRET;
    use engine_api::http::HttpJsonRpc;
    use engine_api::test_utils::{MockExecutionConfig, MockServer, DEFAULT_CHAIN_ID};
    use engine_api::{
        Address, ForkName, ForkchoiceState, Hash256, PayloadAttributes, PayloadStatusV1Status,
    };
    use logging::test_logger;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn terminal_server(config: MockExecutionConfig) -> MockServer {
        let server = MockServer::new(&tokio::runtime::Handle::current(), config, test_logger());
        server
            .execution_block_generator()
            .move_to_terminal_block()
            .unwrap();
        server
    }

    fn proxy_to(server: &MockServer, jwt_secret: Option<&[u8]>) -> Proxy {
        Proxy::start(
            Config::default(),
            Url::parse(&server.url()).unwrap(),
            jwt_secret,
            test_logger(),
        )
        .unwrap()
    }

    fn client(proxy: &Proxy) -> HttpJsonRpc {
        HttpJsonRpc::new(Url::parse(&proxy.url()).unwrap()).unwrap()
    }

    fn head_state(server: &MockServer) -> ForkchoiceState {
        let head = server
            .execution_block_generator()
            .latest_block()
            .unwrap()
            .block_hash();
        ForkchoiceState {
            head_block_hash: head,
            safe_block_hash: head,
            finalized_block_hash: Hash256::zero(),
        }
    }

    #[tokio::test]
    async fn passes_traffic_through() {
        let server = terminal_server(MockExecutionConfig::default());
        let proxy = proxy_to(&server, None);
        assert_eq!(client(&proxy).chain_id().await.unwrap(), DEFAULT_CHAIN_ID);
        assert_eq!(server.received_methods(), vec!["eth_chainId".to_string()]);
    }

    #[tokio::test]
    async fn spoofs_response_fields() {
        let server = terminal_server(MockExecutionConfig::default());
        let proxy = proxy_to(&server, None);
        let client = client(&proxy);
        let state = head_state(&server);

        proxy.add_response(
            Spoof::new(ForkName::Paris.forkchoice_updated_method())
                .with_field("payloadStatus.status", json!("INVALID"))
                .with_field("payloadStatus.latestValidHash", json!(Hash256::zero())),
        );
        let response = client
            .forkchoice_updated(ForkName::Paris, state, None)
            .await
            .unwrap();
        assert_eq!(response.payload_status.status, PayloadStatusV1Status::Invalid);
        assert_eq!(response.payload_status.latest_valid_hash, Some(Hash256::zero()));

        proxy.remove_response(ForkName::Paris.forkchoice_updated_method());
        let response = client
            .forkchoice_updated(ForkName::Paris, state, None)
            .await
            .unwrap();
        assert_eq!(response.payload_status.status, PayloadStatusV1Status::Valid);
    }

    #[tokio::test]
    async fn spoofs_request_fields() {
        let server = terminal_server(MockExecutionConfig::default());
        let proxy = proxy_to(&server, None);
        let state = head_state(&server);

        proxy.add_request(
            Spoof::new(ForkName::Paris.forkchoice_updated_method())
                .with_field("headBlockHash", json!(Hash256::repeat_byte(0xee))),
        );
        let response = client(&proxy)
            .forkchoice_updated(ForkName::Paris, state, None)
            .await
            .unwrap();
        // The mock does not know the spoofed head.
        assert_eq!(response.payload_status.status, PayloadStatusV1Status::Syncing);
    }

    #[tokio::test]
    async fn callbacks_see_bodies() {
        let server = terminal_server(MockExecutionConfig::default());
        let proxy = proxy_to(&server, None);
        let client = client(&proxy);
        let state = head_state(&server);
        let method = ForkName::Paris.forkchoice_updated_method();

        let calls = Arc::new(AtomicUsize::new(0));
        let request_calls = calls.clone();
        proxy.add_request_callback(method, move |body| {
            let state: engine_api::json_structures::JsonForkchoiceStateV1 =
                decode_request_param(body, 0).ok()?;
            request_calls.fetch_add(1, Ordering::SeqCst);
            assert_ne!(state.head_block_hash, Hash256::zero());
            None
        });
        proxy.add_response_callback(method, move |response, request| {
            assert_eq!(request_method(request).as_deref(), Some(method));
            let result: serde_json::Value = decode_response(response).ok()?;
            // Only spoof responses that built a payload.
            result["payloadId"].is_string().then(|| {
                Spoof::new(method).with_field("payloadStatus.validationError", json!("spoofed"))
            })
        });

        let plain = client
            .forkchoice_updated(ForkName::Paris, state, None)
            .await
            .unwrap();
        assert_eq!(plain.payload_status.validation_error, None);

        let attributes = PayloadAttributes::new(
            server
                .execution_block_generator()
                .latest_block()
                .unwrap()
                .timestamp()
                + 1,
            Hash256::zero(),
            Address::zero(),
            None,
            None,
        );
        let building = client
            .forkchoice_updated(ForkName::Paris, state, Some(attributes))
            .await
            .unwrap();
        assert!(building.payload_id.is_some());
        assert_eq!(
            building.payload_status.validation_error.as_deref(),
            Some("spoofed")
        );
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unappliable_spoofs_fail_the_request() {
        let server = terminal_server(MockExecutionConfig::default());
        let proxy = proxy_to(&server, None);
        let client = client(&proxy);
        let state = head_state(&server);
        let method = ForkName::Paris.forkchoice_updated_method();

        // `payloadStatus.status` is a string, so nothing can be set below it.
        proxy.add_response(Spoof::new(method).with_field("payloadStatus.status.inner", json!(1)));
        assert!(client
            .forkchoice_updated(ForkName::Paris, state, None)
            .await
            .is_err());
        assert_eq!(server.received_methods(), vec![method.to_string()]);
        proxy.remove_response(method);

        proxy.add_request(Spoof::new(method).with_field("headBlockHash.inner", json!(1)));
        assert!(client
            .forkchoice_updated(ForkName::Paris, state, None)
            .await
            .is_err());
        // The request never reached the destination.
        assert_eq!(server.received_methods().len(), 1);
    }

    #[tokio::test]
    async fn re_signs_forwarded_requests() {
        let server = terminal_server(MockExecutionConfig {
            jwt_secret: Some(HIVE_JWT_SECRET.to_vec()),
            ..MockExecutionConfig::default()
        });

        let unsigned = proxy_to(&server, None);
        assert!(client(&unsigned).chain_id().await.is_err());

        let signing = proxy_to(&server, Some(HIVE_JWT_SECRET));
        assert_eq!(client(&signing).chain_id().await.unwrap(), DEFAULT_CHAIN_ID);
    }

    #[tokio::test]
    async fn cancel_stops_the_server() {
        let server = terminal_server(MockExecutionConfig::default());
        let proxy = proxy_to(&server, None);
        assert!(client(&proxy).chain_id().await.is_ok());

        proxy.cancel();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(client(&proxy).chain_id().await.is_err());
    }
}
