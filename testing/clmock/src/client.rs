use crate::Error;
use engine_api::auth::Auth;
use engine_api::http::{HttpJsonRpc, ETH_GET_BLOCK_BY_NUMBER};
use engine_api::{BlockByNumberQuery, PayloadStatusV1, LATEST_TAG};
use slog::{debug, Logger};
use std::time::Duration;
use types::{Header, Uint256};
use url::Url;

/// An execution client as seen by the CL mock: its engine endpoint and the terminal total
/// difficulty it was configured with.
pub struct EngineClient {
    pub id: String,
    pub api: HttpJsonRpc,
    pub terminal_total_difficulty: Uint256,
    pub(crate) latest_payload_status: Option<PayloadStatusV1>,
}

impl EngineClient {
    pub fn new(
        id: impl Into<String>,
        url: Url,
        jwt_secret: Option<&[u8]>,
        terminal_total_difficulty: Uint256,
    ) -> Result<Self, Error> {
        let id = id.into();
        let api = match jwt_secret {
            Some(secret) => HttpJsonRpc::new_with_auth(url, Auth::new(secret, None, None)),
            None => HttpJsonRpc::new(url),
        }
        .map_err(|e| Error::engine_api(&id, "connect", e))?;

        Ok(Self {
            id,
            api,
            terminal_total_difficulty,
            latest_payload_status: None,
        })
    }

    /// The last `newPayload` answer this client gave, if any.
    pub fn latest_payload_status(&self) -> Option<&PayloadStatusV1> {
        self.latest_payload_status.as_ref()
    }

    pub async fn latest_header(&self) -> Result<Header, Error> {
        self.api
            .get_header_by_number(BlockByNumberQuery::Tag(LATEST_TAG))
            .await
            .map_err(|e| Error::engine_api(&self.id, ETH_GET_BLOCK_BY_NUMBER, e))?
            .ok_or_else(|| Error::UnknownHeader {
                client: self.id.clone(),
                block: LATEST_TAG.to_string(),
            })
    }

    pub async fn header_by_number(&self, number: u64) -> Result<Option<Header>, Error> {
        self.api
            .get_header_by_number(BlockByNumberQuery::Number(number))
            .await
            .map_err(|e| Error::engine_api(&self.id, ETH_GET_BLOCK_BY_NUMBER, e))
    }

    /// Total difficulty of the client's latest block.
    pub async fn total_difficulty(&self) -> Result<Uint256, Error> {
        self.api
            .get_block_by_number(BlockByNumberQuery::Tag(LATEST_TAG))
            .await
            .map_err(|e| Error::engine_api(&self.id, ETH_GET_BLOCK_BY_NUMBER, e))?
            .and_then(|block| block.total_difficulty)
            .ok_or_else(|| Error::MissingTotalDifficulty {
                client: self.id.clone(),
            })
    }

    pub async fn ttd_reached(&self) -> Result<bool, Error> {
        Ok(self.total_difficulty().await? >= self.terminal_total_difficulty)
    }

    /// Polls the client until its latest block reaches the terminal total difficulty.
    pub async fn wait_for_ttd(
        &self,
        period: Duration,
        deadline: Duration,
        log: &Logger,
    ) -> Result<(), Error> {
        let poll = async {
            loop {
                if self.ttd_reached().await? {
                    return Ok(());
                }
                debug!(
                    log,
                    "Waiting for terminal total difficulty";
                    "client" => &self.id,
                    "ttd" => %self.terminal_total_difficulty,
                );
                tokio::time::sleep(period).await;
            }
        };
        tokio::time::timeout(deadline, poll)
            .await
            .map_err(|_| Error::TtdTimeout {
                client: self.id.clone(),
                deadline,
            })?
    }
}
