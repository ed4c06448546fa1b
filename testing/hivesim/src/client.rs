use crate::enode::Enode;
use crate::params::{ClientFiles, ClientParams};
use crate::types::{ExecInfo, SuiteId, TestId, TestResult};
use crate::{Error, Simulation};
use engine_api::auth::{Auth, HIVE_JWT_SECRET};
use engine_api::http::HttpJsonRpc;
use slog::{info, warn};
use std::fmt::Display;
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use url::Url;

pub const RPC_PORT: u16 = 8545;
pub const ENGINE_PORT: u16 = 8551;

/// A test registered with the simulator. Clients started through it belong to the test and are
/// torn down by the simulator when the test ends.
#[derive(Clone)]
pub struct Test {
    pub sim: Simulation,
    pub suite_id: SuiteId,
    pub test_id: TestId,
}

impl Test {
    pub async fn start_client(
        &self,
        client_type: &str,
        params: ClientParams,
        files: &ClientFiles,
    ) -> Result<Client, Error> {
        let (container, ip) = self
            .sim
            .start_client(self.suite_id, self.test_id, client_type, params, files, &[])
            .await?;
        info!(
            self.sim.log(),
            "Started client";
            "client" => client_type,
            "container" => &container,
            "ip" => %ip,
        );
        Ok(Client {
            kind: client_type.to_string(),
            container,
            ip,
            test: self.clone(),
        })
    }
}

/// A running client container.
#[derive(Clone)]
pub struct Client {
    pub kind: String,
    pub container: String,
    pub ip: IpAddr,
    test: Test,
}

impl Client {
    pub fn rpc_url(&self) -> Result<Url, Error> {
        endpoint(self.ip, RPC_PORT)
    }

    pub fn engine_url(&self) -> Result<Url, Error> {
        endpoint(self.ip, ENGINE_PORT)
    }

    /// A JSON-RPC client for the unauthenticated `eth` endpoint.
    pub fn rpc(&self) -> Result<HttpJsonRpc, Error> {
        Ok(HttpJsonRpc::new(self.rpc_url()?)?)
    }

    /// A JSON-RPC client for the engine API, authenticated with the hive JWT secret.
    pub fn engine(&self) -> Result<HttpJsonRpc, Error> {
        Ok(HttpJsonRpc::new_with_auth(
            self.engine_url()?,
            Auth::new(HIVE_JWT_SECRET, None, None),
        )?)
    }

    pub async fn enode_url(&self) -> Result<Enode, Error> {
        self.test
            .sim
            .client_enode_url(self.test.suite_id, self.test.test_id, &self.container)
            .await
    }

    pub async fn exec(&self, command: &[&str]) -> Result<ExecInfo, Error> {
        self.test
            .sim
            .client_exec(
                self.test.suite_id,
                self.test.test_id,
                &self.container,
                command,
            )
            .await
    }

    pub async fn pause(&self) -> Result<(), Error> {
        self.test
            .sim
            .pause_client(self.test.suite_id, self.test.test_id, &self.container)
            .await
    }

    pub async fn unpause(&self) -> Result<(), Error> {
        self.test
            .sim
            .unpause_client(self.test.suite_id, self.test.test_id, &self.container)
            .await
    }

    pub async fn stop(self) -> Result<(), Error> {
        self.test
            .sim
            .stop_client(self.test.suite_id, self.test.test_id, &self.container)
            .await
    }
}

fn endpoint(ip: IpAddr, port: u16) -> Result<Url, Error> {
    let url = format!("http://{}", SocketAddr::new(ip, port));
    Url::parse(&url).map_err(|e| Error::InvalidUrl(format!("{}: {}", url, e)))
}

impl Simulation {
    /// Runs `run` as test `name` of `suite_name`, reporting its outcome to the simulator.
    ///
    /// Returns `None` without contacting the simulator when the test pattern deselects the test.
    /// A failing test is reported, not returned as an error; only simulator API failures are.
    pub async fn run_test<F, Fut, E>(
        &self,
        suite_id: SuiteId,
        suite_name: &str,
        name: &str,
        description: &str,
        run: F,
    ) -> Result<Option<TestResult>, Error>
    where
        F: FnOnce(Test) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: Display,
    {
        if !self.is_selected(suite_name, name) {
            return Ok(None);
        }

        let test_id = self.start_test(suite_id, name, description).await?;
        let test = Test {
            sim: self.clone(),
            suite_id,
            test_id,
        };

        let result = match run(test).await {
            Ok(()) => {
                info!(self.log(), "Test passed"; "test" => name);
                TestResult::passed("")
            }
            Err(e) => {
                warn!(self.log(), "Test failed"; "test" => name, "error" => %e);
                TestResult::failed(e.to_string())
            }
        };
        self.end_test(suite_id, test_id, &result).await?;
        Ok(Some(result))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_utils::*;
    use logging::test_logger;
    use reqwest::Method;

    #[tokio::test]
    async fn run_test_reports_outcome() {
        let mock = MockHive::new();
        let sim = Simulation::new_at(&mock.url(), test_logger()).unwrap();

        let passed = sim
            .run_test(1, "suite", "passes", "", |_| async { Ok::<_, String>(()) })
            .await
            .unwrap();
        assert_eq!(passed, Some(TestResult::passed("")));

        let failed = sim
            .run_test(1, "suite", "fails", "", |_| async {
                Err::<(), _>("head mismatch".to_string())
            })
            .await
            .unwrap();
        assert_eq!(failed, Some(TestResult::failed("head mismatch")));

        let ended = mock.request_to(Method::POST, "/testsuite/1/test/2").unwrap();
        assert_eq!(
            ended.json(),
            serde_json::json!({"pass": false, "details": "head mismatch"})
        );
    }

    #[tokio::test]
    async fn deselected_tests_are_skipped() {
        let mock = MockHive::new();
        let mut sim = Simulation::new_at(&mock.url(), test_logger()).unwrap();
        sim.set_test_pattern("suite/only-this").unwrap();

        let skipped = sim
            .run_test(1, "suite", "other", "", |_| async { Ok::<_, String>(()) })
            .await
            .unwrap();
        assert_eq!(skipped, None);
        assert!(mock.requests().is_empty());
    }

    #[tokio::test]
    async fn client_handle() {
        let mock = MockHive::new();
        let sim = Simulation::new_at(&mock.url(), test_logger()).unwrap();

        sim.run_test(1, "suite", "client", "", |test| async move {
            let client = test
                .start_client("go-ethereum", ClientParams::new(), &ClientFiles::new())
                .await?;
            assert_eq!(client.kind, "go-ethereum");
            assert_eq!(client.rpc_url()?.as_str(), "http://10.0.0.5:8545/");
            assert_eq!(client.engine_url()?.as_str(), "http://10.0.0.5:8551/");
            client.rpc()?;
            client.engine()?;

            let enode = client.enode_url().await?;
            assert_eq!(enode.ip, BRIDGE_IP.parse::<IpAddr>().unwrap());
            client.stop().await
        })
        .await
        .unwrap();

        let node = format!("/testsuite/1/test/1/node/{}", CONTAINER_ID);
        assert!(mock.request_to(Method::DELETE, &node).is_some());
        let ended = mock.request_to(Method::POST, "/testsuite/1/test/1").unwrap();
        assert_eq!(ended.json()["pass"], serde_json::json!(true));
    }
}
