use crate::enode::Enode;
use crate::params::{ClientFiles, ClientParams};
use crate::testmatch::TestMatcher;
use crate::types::*;
use crate::Error;
use reqwest::multipart::{Form, Part};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use slog::{debug, warn, Logger};
use std::net::IpAddr;
use std::path::Path;
use url::Url;

pub const HIVE_SIMULATOR_ENV: &str = "HIVE_SIMULATOR";
pub const HIVE_TEST_PATTERN_ENV: &str = "HIVE_TEST_PATTERN";

/// Network containers join unless told otherwise.
pub const DEFAULT_NETWORK: &str = "bridge";

const ENODE_SCRIPT: &str = "enode.sh";

/// A connection to the hive simulation API.
#[derive(Clone)]
pub struct Simulation {
    client: reqwest::Client,
    url: Url,
    matcher: Option<TestMatcher>,
    log: Logger,
}

impl Simulation {
    /// Connects to the API named by `HIVE_SIMULATOR`, filtering tests by `HIVE_TEST_PATTERN`.
    ///
    /// An invalid pattern is logged and ignored.
    pub fn from_env(log: Logger) -> Result<Self, Error> {
        let url = std::env::var(HIVE_SIMULATOR_ENV)
            .ok()
            .filter(|url| !url.is_empty())
            .ok_or(Error::MissingSimulatorUrl)?;
        let mut sim = Self::new_at(&url, log)?;

        if let Some(pattern) = std::env::var(HIVE_TEST_PATTERN_ENV)
            .ok()
            .filter(|p| !p.is_empty())
        {
            match TestMatcher::parse(&pattern) {
                Ok(matcher) => sim.matcher = Some(matcher),
                Err(e) => warn!(
                    sim.log,
                    "Ignoring invalid test pattern";
                    "pattern" => pattern,
                    "error" => %e,
                ),
            }
        }
        Ok(sim)
    }

    pub fn new_at(url: &str, log: Logger) -> Result<Self, Error> {
        let url = Url::parse(url).map_err(|e| Error::InvalidUrl(format!("{}: {}", url, e)))?;
        Ok(Self {
            client: reqwest::Client::builder().build()?,
            url,
            matcher: None,
            log,
        })
    }

    pub fn set_test_pattern(&mut self, pattern: &str) -> Result<(), Error> {
        self.matcher = Some(TestMatcher::parse(pattern)?);
        Ok(())
    }

    pub fn test_matcher(&self) -> Option<&TestMatcher> {
        self.matcher.as_ref()
    }

    /// Whether a suite (empty `test`) or a test of it is selected by the test pattern.
    pub fn is_selected(&self, suite: &str, test: &str) -> bool {
        self.matcher
            .as_ref()
            .map_or(true, |matcher| matcher.matches(suite, test))
    }

    pub fn log(&self) -> &Logger {
        &self.log
    }

    pub async fn start_suite(&self, name: &str, description: &str) -> Result<SuiteId, Error> {
        let url = self.path(&["testsuite"])?;
        let request = TestRequest {
            name: name.to_string(),
            description: description.to_string(),
        };
        self.post_with_response(url, &request).await
    }

    pub async fn end_suite(&self, suite: SuiteId) -> Result<(), Error> {
        let url = self.path(&["testsuite", &suite.to_string()])?;
        self.delete(url).await
    }

    pub async fn start_test(
        &self,
        suite: SuiteId,
        name: &str,
        description: &str,
    ) -> Result<TestId, Error> {
        let url = self.path(&["testsuite", &suite.to_string(), "test"])?;
        let request = TestRequest {
            name: name.to_string(),
            description: description.to_string(),
        };
        self.post_with_response(url, &request).await
    }

    pub async fn end_test(
        &self,
        suite: SuiteId,
        test: TestId,
        result: &TestResult,
    ) -> Result<(), Error> {
        let url = self.path(&["testsuite", &suite.to_string(), "test", &test.to_string()])?;
        self.post(url, result).await
    }

    /// Client types available to this simulation run.
    pub async fn client_types(&self) -> Result<Vec<ClientDefinition>, Error> {
        let url = self.path(&["clients"])?;
        let response = ok_or_error(self.client.get(url).send().await?).await?;
        Ok(response.json().await?)
    }

    /// Starts a client container, returning its container id and IP.
    pub async fn start_client(
        &self,
        suite: SuiteId,
        test: TestId,
        client_type: &str,
        params: ClientParams,
        files: &ClientFiles,
        networks: &[String],
    ) -> Result<(String, IpAddr), Error> {
        let url = self.node_path(suite, test, &[])?;
        let config = NodeConfig {
            client: client_type.to_string(),
            networks: networks.to_vec(),
            environment: params.into_environment(),
        };

        // Field names are container paths and must reach the simulator unescaped.
        let mut form = Form::new()
            .percent_encode_noop()
            .text("config", serde_json::to_string(&config)?);
        for (destination, contents) in files.iter() {
            let file_name = Path::new(destination)
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| destination.clone());
            form = form.part(
                destination.clone(),
                Part::bytes(contents.clone()).file_name(file_name),
            );
        }

        debug!(
            self.log,
            "Starting client";
            "suite" => suite,
            "test" => test,
            "client" => client_type,
            "files" => files.iter().count(),
        );
        let response = ok_or_error(self.client.post(url).multipart(form).send().await?).await?;
        let started: StartNodeResponse = response.json().await?;
        let ip = started
            .ip
            .parse::<IpAddr>()
            .map_err(|_| Error::InvalidIp(started.ip.clone()))?;
        Ok((started.id, ip))
    }

    pub async fn stop_client(
        &self,
        suite: SuiteId,
        test: TestId,
        container: &str,
    ) -> Result<(), Error> {
        let url = self.node_path(suite, test, &[container])?;
        self.delete(url).await
    }

    pub async fn pause_client(
        &self,
        suite: SuiteId,
        test: TestId,
        container: &str,
    ) -> Result<(), Error> {
        let url = self.node_path(suite, test, &[container, "pause"])?;
        ok_or_error(self.client.post(url).send().await?).await?;
        Ok(())
    }

    pub async fn unpause_client(
        &self,
        suite: SuiteId,
        test: TestId,
        container: &str,
    ) -> Result<(), Error> {
        let url = self.node_path(suite, test, &[container, "pause"])?;
        self.delete(url).await
    }

    /// Runs a command in a client container.
    pub async fn client_exec(
        &self,
        suite: SuiteId,
        test: TestId,
        container: &str,
        command: &[&str],
    ) -> Result<ExecInfo, Error> {
        let url = self.node_path(suite, test, &[container, "exec"])?;
        let request = ExecRequest {
            command: command.iter().map(|s| s.to_string()).collect(),
        };
        self.post_with_response(url, &request).await
    }

    /// The enode URL of a client, with the IP it has on the default network.
    pub async fn client_enode_url(
        &self,
        suite: SuiteId,
        test: TestId,
        container: &str,
    ) -> Result<Enode, Error> {
        self.client_enode_url_on_network(suite, test, container, DEFAULT_NETWORK)
            .await
    }

    /// The enode URL reported by the client's `enode.sh`, with the IP replaced by the one it has
    /// on `network`.
    pub async fn client_enode_url_on_network(
        &self,
        suite: SuiteId,
        test: TestId,
        container: &str,
        network: &str,
    ) -> Result<Enode, Error> {
        let info = self
            .client_exec(suite, test, container, &[ENODE_SCRIPT])
            .await?;
        if info.exit_code != 0 {
            return Err(Error::ExecFailed {
                command: vec![ENODE_SCRIPT.to_string()],
                exit_code: info.exit_code,
                stderr: info.stderr,
            });
        }
        let enode = info.stdout.trim().parse::<Enode>()?;

        let ip = self.container_network_ip(suite, network, container).await?;
        Ok(enode.with_ip(ip))
    }

    pub async fn create_network(&self, suite: SuiteId, network: &str) -> Result<(), Error> {
        let url = self.path(&["testsuite", &suite.to_string(), "network", network])?;
        ok_or_error(self.client.post(url).send().await?).await?;
        Ok(())
    }

    pub async fn remove_network(&self, suite: SuiteId, network: &str) -> Result<(), Error> {
        let url = self.path(&["testsuite", &suite.to_string(), "network", network])?;
        self.delete(url).await
    }

    pub async fn connect_container(
        &self,
        suite: SuiteId,
        network: &str,
        container: &str,
    ) -> Result<(), Error> {
        let url = self.network_path(suite, network, container)?;
        ok_or_error(self.client.post(url).send().await?).await?;
        Ok(())
    }

    pub async fn disconnect_container(
        &self,
        suite: SuiteId,
        network: &str,
        container: &str,
    ) -> Result<(), Error> {
        let url = self.network_path(suite, network, container)?;
        self.delete(url).await
    }

    /// IP of a container on the given network. Use `"bridge"` for the default network.
    pub async fn container_network_ip(
        &self,
        suite: SuiteId,
        network: &str,
        container: &str,
    ) -> Result<IpAddr, Error> {
        let url = self.network_path(suite, network, container)?;
        let response = ok_or_error(self.client.get(url).send().await?).await?;
        let ip: String = response.json().await?;
        ip.parse::<IpAddr>().map_err(|_| Error::InvalidIp(ip))
    }

    fn path(&self, segments: &[&str]) -> Result<Url, Error> {
        let mut url = self.url.clone();
        url.path_segments_mut()
            .map_err(|()| Error::InvalidUrl(self.url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn node_path(&self, suite: SuiteId, test: TestId, rest: &[&str]) -> Result<Url, Error> {
        let suite = suite.to_string();
        let test = test.to_string();
        let mut segments = vec!["testsuite", suite.as_str(), "test", test.as_str(), "node"];
        segments.extend_from_slice(rest);
        self.path(&segments)
    }

    fn network_path(&self, suite: SuiteId, network: &str, container: &str) -> Result<Url, Error> {
        self.path(&[
            "testsuite",
            &suite.to_string(),
            "network",
            network,
            container,
        ])
    }

    async fn post<T: Serialize>(&self, url: Url, body: &T) -> Result<(), Error> {
        ok_or_error(self.client.post(url).json(body).send().await?).await?;
        Ok(())
    }

    async fn post_with_response<T: Serialize, R: DeserializeOwned>(
        &self,
        url: Url,
        body: &T,
    ) -> Result<R, Error> {
        let response = ok_or_error(self.client.post(url).json(body).send().await?).await?;
        Ok(response.json().await?)
    }

    async fn delete(&self, url: Url) -> Result<(), Error> {
        ok_or_error(self.client.delete(url).send().await?).await?;
        Ok(())
    }
}

/// Passes successful responses through and turns error statuses into `Error::ServerMessage`,
/// preferring the `error` field of a JSON body over the raw text.
async fn ok_or_error(response: Response) -> Result<Response, Error> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => body.error,
        Err(_) if text.is_empty() => status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string(),
        Err(_) => text.trim().to_string(),
    };
    Err(Error::ServerMessage { status, message })
}

impl Error {
    /// If the error has a HTTP status code, return it.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::HttpClient(e) => e.status(),
            Error::ServerMessage { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_utils::*;
    use logging::test_logger;
    use reqwest::Method;

    fn sim(mock: &MockHive) -> Simulation {
        Simulation::new_at(&mock.url(), test_logger()).unwrap()
    }

    #[tokio::test]
    async fn suite_and_test_lifecycle() {
        let mock = MockHive::new();
        let sim = sim(&mock);

        let suite = sim.start_suite("engine", "engine API tests").await.unwrap();
        assert_eq!(suite, 1);
        let first = sim.start_test(suite, "a", "").await.unwrap();
        let second = sim.start_test(suite, "b", "").await.unwrap();
        assert_eq!((first, second), (1, 2));

        sim.end_test(suite, first, &TestResult::failed("boom"))
            .await
            .unwrap();
        sim.end_suite(suite).await.unwrap();

        let registered = mock.request_to(Method::POST, "/testsuite").unwrap();
        assert_eq!(
            registered.json(),
            serde_json::json!({"name": "engine", "description": "engine API tests"})
        );
        let ended = mock.request_to(Method::POST, "/testsuite/1/test/1").unwrap();
        assert_eq!(
            ended.json(),
            serde_json::json!({"pass": false, "details": "boom"})
        );
        assert!(mock.request_to(Method::DELETE, "/testsuite/1").is_some());
    }

    #[tokio::test]
    async fn client_definitions() {
        let mock = MockHive::new();
        let clients = sim(&mock).client_types().await.unwrap();
        assert_eq!(clients.len(), 2);
        assert_eq!(clients[0].name, "go-ethereum");
        assert!(clients[0].has_role("eth1"));
        assert!(!clients[1].has_role("eth1"));
    }

    #[tokio::test]
    async fn start_client_sends_config_and_files() {
        let mock = MockHive::new();
        let sim = sim(&mock);
        let params = ClientParams::new().chain_id(7);
        let files = ClientFiles::new().add("/chain.rlp", vec![0xc0]);

        let (container, ip) = sim
            .start_client(1, 2, "go-ethereum", params, &files, &[])
            .await
            .unwrap();
        assert_eq!(container, CONTAINER_ID);
        assert_eq!(ip, CONTAINER_IP.parse::<IpAddr>().unwrap());

        let request = mock
            .request_to(Method::POST, "/testsuite/1/test/2/node")
            .unwrap();
        let body = String::from_utf8_lossy(&request.body);
        assert!(body.contains("name=\"config\""));
        assert!(body.contains(r#"{"client":"go-ethereum","environment":{"HIVE_CHAIN_ID":"7"}}"#));
        assert!(body.contains("name=\"/chain.rlp\"; filename=\"chain.rlp\""));
    }

    #[tokio::test]
    async fn container_control() {
        let mock = MockHive::new();
        let sim = sim(&mock);

        sim.pause_client(1, 1, CONTAINER_ID).await.unwrap();
        sim.unpause_client(1, 1, CONTAINER_ID).await.unwrap();
        sim.stop_client(1, 1, CONTAINER_ID).await.unwrap();

        let path = format!("/testsuite/1/test/1/node/{}/pause", CONTAINER_ID);
        assert!(mock.request_to(Method::POST, &path).is_some());
        assert!(mock.request_to(Method::DELETE, &path).is_some());
        let node = format!("/testsuite/1/test/1/node/{}", CONTAINER_ID);
        assert!(mock.request_to(Method::DELETE, &node).is_some());
    }

    #[tokio::test]
    async fn enode_uses_network_ip() {
        let mock = MockHive::new();
        let enode = sim(&mock)
            .client_enode_url(1, 1, CONTAINER_ID)
            .await
            .unwrap();
        assert_eq!(
            enode.to_string(),
            format!("enode://{}@{}:30303", enode_pubkey(), BRIDGE_IP)
        );
    }

    #[tokio::test]
    async fn failing_exec() {
        let mock = MockHive::new();
        let info = sim(&mock)
            .client_exec(1, 1, CONTAINER_ID, &["missing"])
            .await
            .unwrap();
        assert_eq!(info.exit_code, 127);
        assert_eq!(info.stderr, "no such command");
    }

    #[tokio::test]
    async fn networks() {
        let mock = MockHive::new();
        let sim = sim(&mock);
        sim.create_network(1, "net").await.unwrap();
        sim.connect_container(1, "net", CONTAINER_ID).await.unwrap();
        assert_eq!(
            sim.container_network_ip(1, "net", CONTAINER_ID)
                .await
                .unwrap(),
            BRIDGE_IP.parse::<IpAddr>().unwrap()
        );
        sim.disconnect_container(1, "net", CONTAINER_ID)
            .await
            .unwrap();
        sim.remove_network(1, "net").await.unwrap();
    }

    #[tokio::test]
    async fn server_errors_carry_the_message() {
        let mock = MockHive::new();
        let sim = sim(&mock);

        match sim.create_network(1, "taken").await {
            Err(Error::ServerMessage { status, message }) => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(message, "network already exists");
            }
            other => panic!("unexpected result {:?}", other),
        }

        let err = sim
            .container_network_ip(1, "net", "")
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
    }

    #[test]
    fn test_pattern() {
        let mut sim = Simulation::new_at("http://127.0.0.1:1", test_logger()).unwrap();
        assert!(sim.is_selected("any", "thing"));
        sim.set_test_pattern("transition/re-org").unwrap();
        assert!(sim.is_selected("Transition", "Re-Org to higher TD"));
        assert!(!sim.is_selected("Transition", "invalid terminal block"));
        assert!(sim.set_test_pattern("(").is_err());
    }
}
