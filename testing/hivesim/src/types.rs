//! Wire types of the hive simulator API.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type SuiteId = u32;
pub type TestId = u32;

/// Registration of a suite or a test.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestRequest {
    pub name: String,
    pub description: String,
}

/// Outcome of a test.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TestResult {
    pub pass: bool,
    pub details: String,
}

impl TestResult {
    pub fn passed(details: impl Into<String>) -> Self {
        Self {
            pass: true,
            details: details.into(),
        }
    }

    pub fn failed(details: impl Into<String>) -> Self {
        Self {
            pass: false,
            details: details.into(),
        }
    }
}

/// The `config` part of a start-node request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NodeConfig {
    pub client: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub networks: Vec<String>,
    pub environment: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StartNodeResponse {
    pub id: String,
    pub ip: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecRequest {
    pub command: Vec<String>,
}

/// Result of running a command in a client container.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExecInfo {
    pub stdout: String,
    pub stderr: String,
    #[serde(rename = "exitCode")]
    pub exit_code: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClientMetadata {
    #[serde(default)]
    pub roles: Vec<String>,
}

/// A client type known to the simulator.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClientDefinition {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub meta: ClientMetadata,
}

impl ClientDefinition {
    pub fn has_role(&self, role: &str) -> bool {
        self.meta.roles.iter().any(|r| r == role)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorBody {
    pub error: String,
}
