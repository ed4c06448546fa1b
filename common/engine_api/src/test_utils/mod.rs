//! Provides a mock execution engine HTTP JSON-RPC API for use in testing.

use crate::auth::Auth;
use crate::http::JSONRPC_VERSION;
use crate::{ForkConfig, ForkchoiceUpdatedResponse, PayloadStatusV1, Uint256};
use bytes::Bytes;
use handle_rpc::handle_rpc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;
use slog::{info, o, Logger};
use std::convert::Infallible;
use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use tokio::{runtime, sync::oneshot};
use warp::{http::StatusCode, Filter, Rejection};

pub use execution_block_generator::{
    generate_pow_block, Block, ExecutionBlockGenerator, PoSBlock, PoWBlock,
};
pub use handle_rpc::{
    BAD_PARAMS_ERROR_CODE, GENERIC_ERROR_CODE, METHOD_NOT_FOUND_ERROR_CODE,
    UNKNOWN_PAYLOAD_ERROR_CODE, UNSUPPORTED_FORK_ERROR_CODE,
};

pub const DEFAULT_TERMINAL_DIFFICULTY: u64 = 6400;
pub const DEFAULT_TERMINAL_BLOCK: u64 = 64;
pub const DEFAULT_CHAIN_ID: u64 = 1;

mod execution_block_generator;
mod handle_rpc;

#[derive(Clone, Debug)]
pub struct MockExecutionConfig {
    pub server_config: Config,
    /// When set, every request must carry a valid JWT signed with this secret.
    pub jwt_secret: Option<Vec<u8>>,
    pub terminal_difficulty: Uint256,
    pub terminal_block: u64,
    pub fork_config: ForkConfig,
    pub chain_id: u64,
}

impl Default for MockExecutionConfig {
    fn default() -> Self {
        Self {
            server_config: Config::default(),
            jwt_secret: None,
            terminal_difficulty: DEFAULT_TERMINAL_DIFFICULTY.into(),
            terminal_block: DEFAULT_TERMINAL_BLOCK,
            fork_config: ForkConfig::default(),
            chain_id: DEFAULT_CHAIN_ID,
        }
    }
}

pub struct MockServer {
    _shutdown_tx: oneshot::Sender<()>,
    listen_socket_addr: SocketAddr,
    last_echo_request: Arc<RwLock<Option<Bytes>>>,
    pub ctx: Arc<Context>,
}

impl MockServer {
    /// A server on an ephemeral port with the default terminal difficulty, no forks after Paris
    /// and no authentication. Must be called from within a tokio runtime.
    pub fn unit_testing() -> Self {
        Self::new(
            &runtime::Handle::current(),
            MockExecutionConfig::default(),
            Logger::root(slog::Discard, o!()),
        )
    }

    pub fn new(handle: &runtime::Handle, config: MockExecutionConfig, log: Logger) -> Self {
        // The genesis block is always valid.
        let execution_block_generator = match ExecutionBlockGenerator::new(
            config.terminal_difficulty,
            config.terminal_block,
            config.fork_config,
        ) {
            Ok(generator) => generator,
            Err(e) => panic!("invalid mock execution config: {}", e),
        };

        let last_echo_request = Arc::new(RwLock::new(None));
        let ctx: Arc<Context> = Arc::new(Context {
            config: config.clone(),
            log,
            last_echo_request: last_echo_request.clone(),
            execution_block_generator: RwLock::new(execution_block_generator),
            received_requests: <_>::default(),
            static_new_payload_response: <_>::default(),
            static_forkchoice_updated_response: <_>::default(),
        });

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let shutdown_future = async {
            // Ignore the result from the channel, shut down regardless.
            let _ = shutdown_rx.await;
        };

        // The `serve` function will panic unless it's run inside a tokio runtime, so use `block_on`
        // if we're not in a runtime. However, we can't *always* use `block_on` since tokio will
        // panic if we try to block inside an async context.
        let serve = || serve(ctx.clone(), shutdown_future);
        let (listen_socket_addr, server_future) = if runtime::Handle::try_current().is_err() {
            handle.block_on(async { serve() })
        } else {
            serve()
        }
        .unwrap_or_else(|e| panic!("unable to start mock execution engine: {:?}", e));

        handle.spawn(server_future);

        Self {
            _shutdown_tx: shutdown_tx,
            listen_socket_addr,
            last_echo_request,
            ctx,
        }
    }

    pub fn execution_block_generator(
        &self,
    ) -> parking_lot::RwLockWriteGuard<'_, ExecutionBlockGenerator> {
        self.ctx.execution_block_generator.write()
    }

    pub fn url(&self) -> String {
        format!(
            "http://{}:{}",
            self.listen_socket_addr.ip(),
            self.listen_socket_addr.port()
        )
    }

    pub fn last_echo_request(&self) -> Bytes {
        self.last_echo_request
            .write()
            .take()
            .expect("last echo request is none")
    }

    /// Methods of every JSON-RPC request received so far, in arrival order.
    pub fn received_methods(&self) -> Vec<String> {
        self.ctx
            .received_requests
            .read()
            .iter()
            .filter_map(|body| body.get("method").and_then(|m| m.as_str()).map(String::from))
            .collect()
    }

    pub fn set_new_payload_response(&self, response: Option<PayloadStatusV1>) {
        *self.ctx.static_new_payload_response.write() = response;
    }

    pub fn set_forkchoice_updated_response(&self, response: Option<ForkchoiceUpdatedResponse>) {
        *self.ctx.static_forkchoice_updated_response.write() = response;
    }
}

#[derive(Debug)]
pub enum Error {
    Warp(warp::Error),
}

impl From<warp::Error> for Error {
    fn from(e: warp::Error) -> Self {
        Error::Warp(e)
    }
}

#[derive(Debug)]
struct MissingIdField;

impl warp::reject::Reject for MissingIdField {}

#[derive(Debug)]
struct AuthError(String);

impl warp::reject::Reject for AuthError {}

/// A wrapper around all the items required to spawn the HTTP server.
///
/// The server will gracefully handle the case where any fields are `None`.
pub struct Context {
    pub config: MockExecutionConfig,
    pub log: Logger,
    pub last_echo_request: Arc<RwLock<Option<Bytes>>>,
    pub execution_block_generator: RwLock<ExecutionBlockGenerator>,
    pub received_requests: RwLock<Vec<serde_json::Value>>,
    pub static_new_payload_response: RwLock<Option<PayloadStatusV1>>,
    pub static_forkchoice_updated_response: RwLock<Option<ForkchoiceUpdatedResponse>>,
}

/// Configuration for the HTTP server.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub listen_addr: Ipv4Addr,
    pub listen_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: Ipv4Addr::new(127, 0, 0, 1),
            listen_port: 0,
        }
    }
}

/// Checks the `Authorization: Bearer <jwt>` header when the server has a secret configured.
fn auth_header_filter(
    jwt_secret: Option<Vec<u8>>,
) -> warp::filters::BoxedFilter<()> {
    warp::any()
        .and(warp::filters::header::optional::<String>("Authorization"))
        .and_then(move |authorization: Option<String>| {
            let jwt_secret = jwt_secret.clone();
            async move {
                let Some(secret) = jwt_secret else {
                    return Ok(());
                };
                let token = authorization
                    .as_deref()
                    .and_then(|header| header.strip_prefix("Bearer "))
                    .ok_or_else(|| {
                        warp::reject::custom(AuthError("missing bearer token".to_string()))
                    })?;
                Auth::new(&secret, None, None)
                    .validate_token(token)
                    .map_err(|e| warp::reject::custom(AuthError(format!("{:?}", e))))?;
                Ok::<_, Rejection>(())
            }
        })
        .untuple_one()
        .boxed()
}

async fn handle_rejection(err: Rejection) -> Result<impl warp::Reply, Infallible> {
    let (code, message) = if let Some(AuthError(message)) = err.find::<AuthError>() {
        (StatusCode::UNAUTHORIZED, message.clone())
    } else if err.find::<MissingIdField>().is_some() {
        (StatusCode::BAD_REQUEST, "missing id field".to_string())
    } else {
        (StatusCode::BAD_REQUEST, format!("{:?}", err))
    };

    Ok(warp::reply::with_status(
        warp::reply::json(&json!({ "message": message })),
        code,
    ))
}

/// Creates a server that will serve requests using information from `ctx`.
///
/// The server will shut down gracefully when the `shutdown` future resolves.
///
/// ## Returns
///
/// This function will bind the server to the provided address and then return a tuple of:
///
/// - `SocketAddr`: the address that the HTTP server will listen on.
/// - `Future`: the actual server future that will need to be awaited.
///
/// ## Errors
///
/// Returns an error if the server is unable to bind or there is another error during
/// configuration.
pub fn serve(
    ctx: Arc<Context>,
    shutdown: impl Future<Output = ()> + Send + Sync + 'static,
) -> Result<(SocketAddr, impl Future<Output = ()>), Error> {
    let config = &ctx.config.server_config;
    let log = ctx.log.clone();
    let inner_ctx = ctx.clone();
    let ctx_filter = warp::any().map(move || inner_ctx.clone());

    // `/`
    //
    // Handles actual JSON-RPC requests.
    let root = warp::path::end()
        .and(auth_header_filter(ctx.config.jwt_secret.clone()))
        .and(warp::body::json())
        .and(ctx_filter.clone())
        .and_then(|body: serde_json::Value, ctx: Arc<Context>| async move {
            let id = body
                .get("id")
                .cloned()
                .ok_or_else(|| warp::reject::custom(MissingIdField))?;

            let response = match handle_rpc(body, ctx).await {
                Ok(result) => json!({
                    "id": id,
                    "jsonrpc": JSONRPC_VERSION,
                    "result": result
                }),
                Err((message, code)) => json!({
                    "id": id,
                    "jsonrpc": JSONRPC_VERSION,
                    "error": {
                        "code": code,
                        "message": message
                    }
                }),
            };

            Ok::<_, Rejection>(warp::reply::json(&response))
        });

    // `/echo`
    //
    // Sends the body of the request to `ctx.last_echo_request` so we can inspect requests.
    let echo = warp::path("echo")
        .and(warp::body::bytes())
        .and(ctx_filter)
        .and_then(|bytes: Bytes, ctx: Arc<Context>| async move {
            *ctx.last_echo_request.write() = Some(bytes.clone());
            Ok::<_, Rejection>(bytes.to_vec())
        });

    let routes = warp::post()
        .and(root.or(echo))
        .recover(handle_rejection)
        // Add a `Server` header.
        .map(|reply| warp::reply::with_header(reply, "Server", "mock-execution-engine"));

    let (listening_socket, server) = warp::serve(routes).try_bind_with_graceful_shutdown(
        SocketAddrV4::new(config.listen_addr, config.listen_port),
        async {
            shutdown.await;
        },
    )?;

    info!(
        log,
        "Mock execution engine started";
        "listen_address" => listening_socket.to_string(),
    );

    Ok((listening_socket, server))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::auth::HIVE_JWT_SECRET;
    use crate::http::{HttpJsonRpc, ETH_DEFAULT_TIMEOUT};
    use crate::{BlockByNumberQuery, ForkName, ForkchoiceState, PayloadAttributes, LATEST_TAG};
    use types::{Address, Hash256};
    use url::Url;

    fn client(server: &MockServer) -> HttpJsonRpc {
        HttpJsonRpc::new(Url::parse(&server.url()).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn serves_terminal_chain() {
        let server = MockServer::unit_testing();
        server
            .execution_block_generator()
            .move_to_terminal_block()
            .unwrap();
        let client = client(&server);

        let latest = client
            .get_block_by_number(BlockByNumberQuery::Tag(LATEST_TAG))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.block_number, DEFAULT_TERMINAL_BLOCK);
        assert_eq!(
            latest.total_difficulty,
            Some(Uint256::from(DEFAULT_TERMINAL_DIFFICULTY))
        );

        let header = client
            .get_header_by_hash(latest.block_hash)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(header.hash(), latest.block_hash);
        assert_eq!(client.block_number().await.unwrap(), DEFAULT_TERMINAL_BLOCK);
        assert_eq!(client.chain_id().await.unwrap(), DEFAULT_CHAIN_ID);
    }

    #[tokio::test]
    async fn builds_and_imports_payload() {
        let server = MockServer::unit_testing();
        server
            .execution_block_generator()
            .move_to_terminal_block()
            .unwrap();
        let client = client(&server);
        let head = client
            .get_block_by_number(BlockByNumberQuery::Tag(LATEST_TAG))
            .await
            .unwrap()
            .unwrap();

        let state = ForkchoiceState {
            head_block_hash: head.block_hash,
            safe_block_hash: head.block_hash,
            finalized_block_hash: Hash256::zero(),
        };
        let attributes =
            PayloadAttributes::new(head.timestamp + 1, Hash256::zero(), Address::zero(), None, None);
        let response = client
            .forkchoice_updated(ForkName::Paris, state, Some(attributes))
            .await
            .unwrap();
        let payload_id = response.payload_id.unwrap();

        let payload = client
            .get_payload(ForkName::Paris, payload_id)
            .await
            .unwrap()
            .execution_payload;
        let request = crate::NewPayloadRequest::from_payload(payload.clone(), None, None).unwrap();
        let status = client.new_payload(ForkName::Paris, &request).await.unwrap();
        assert_eq!(status.status, crate::PayloadStatusV1Status::Valid);

        let state = ForkchoiceState {
            head_block_hash: payload.block_hash,
            ..state
        };
        client
            .forkchoice_updated(ForkName::Paris, state, None)
            .await
            .unwrap();
        assert_eq!(
            client.block_number().await.unwrap(),
            DEFAULT_TERMINAL_BLOCK + 1
        );
        assert_eq!(
            server.received_methods().iter().filter(|m| *m == "engine_newPayloadV1").count(),
            1
        );
    }

    #[tokio::test]
    async fn wrong_method_version_is_rejected() {
        let server = MockServer::unit_testing();
        server
            .execution_block_generator()
            .move_to_terminal_block()
            .unwrap();
        let client = client(&server);
        let head = server
            .execution_block_generator()
            .latest_block()
            .unwrap()
            .block_hash();
        let state = ForkchoiceState {
            head_block_hash: head,
            safe_block_hash: head,
            finalized_block_hash: Hash256::zero(),
        };
        let attributes = PayloadAttributes::new(
            1000,
            Hash256::zero(),
            Address::zero(),
            Some(vec![]),
            Some(Hash256::zero()),
        );
        let result = client
            .forkchoice_updated(ForkName::Cancun, state, Some(attributes))
            .await;
        assert!(matches!(
            result,
            Err(crate::Error::ServerMessage { code, .. }) if code == UNSUPPORTED_FORK_ERROR_CODE
        ));
    }

    #[tokio::test]
    async fn requires_jwt_when_configured() {
        let server = MockServer::new(
            &runtime::Handle::current(),
            MockExecutionConfig {
                jwt_secret: Some(HIVE_JWT_SECRET.to_vec()),
                ..MockExecutionConfig::default()
            },
            Logger::root(slog::Discard, o!()),
        );
        let url = Url::parse(&server.url()).unwrap();

        let unauthenticated = HttpJsonRpc::new(url.clone()).unwrap();
        let result: Result<serde_json::Value, _> = unauthenticated
            .rpc_request("eth_syncing", json!([]), ETH_DEFAULT_TIMEOUT)
            .await;
        assert!(matches!(result, Err(crate::Error::Auth(_))));

        let authenticated = HttpJsonRpc::new_with_auth(
            url,
            Auth::new(HIVE_JWT_SECRET, None, None),
        )
        .unwrap();
        let syncing: bool = authenticated
            .rpc_request("eth_syncing", json!([]), ETH_DEFAULT_TIMEOUT)
            .await
            .unwrap();
        assert!(!syncing);
    }
}
