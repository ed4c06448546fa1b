//! Pre-built engine API requests for the post-merge part of the chain.
use super::write_json;
use crate::generator::Chain;
use crate::Error;
use engine_api::http::JSONRPC_VERSION;
use engine_api::json_structures::JsonForkchoiceStateV1;
use engine_api::{ExecutionPayload, ForkName, NewPayloadRequest};
use serde::Serialize;
use serde_json::{json, Value};
use std::path::Path;
use types::Block;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcRequest {
    pub jsonrpc: &'static str,
    pub id: String,
    pub method: &'static str,
    pub params: Value,
}

fn fork_of(chain: &Chain, block: &Block) -> ForkName {
    chain
        .schedule
        .engine_fork_config()
        .fork_at_timestamp(block.header.timestamp)
}

/// First block covered by the engine outputs.
fn first_pos_block(chain: &Chain) -> Option<u64> {
    chain.merge_block().map(|merge| merge.max(1))
}

pub fn new_payload_request(chain: &Chain, block: &Block) -> Result<RpcRequest, Error> {
    let number = block.number();
    let fork = fork_of(chain, block);
    let requests = if fork.has_requests() {
        let requests = chain.execution_requests(number).ok_or_else(|| {
            Error::InvalidBlock {
                block: number,
                reason: "missing execution requests".into(),
            }
        })?;
        Some(requests)
    } else {
        None
    };
    let request = NewPayloadRequest::from_payload(
        ExecutionPayload::from_block(block),
        block.header.parent_beacon_block_root,
        requests,
    )?;
    Ok(RpcRequest {
        jsonrpc: JSONRPC_VERSION,
        id: format!("np{}", number),
        method: fork.new_payload_method(),
        params: request.params(fork)?,
    })
}

/// A forkchoice update making `block` the head. Finalized trails the head by two blocks but
/// never goes below the merge block.
pub fn fcu_request(chain: &Chain, block: &Block) -> Result<RpcRequest, Error> {
    let number = block.number();
    let merge = chain.merge_block().unwrap_or(0);
    let finalized_number = merge.max(number.saturating_sub(2)).min(number);
    let finalized = chain
        .block(finalized_number)
        .ok_or_else(|| Error::InvalidBlock {
            block: number,
            reason: format!("finalized block {} not in chain", finalized_number),
        })?;
    let state = JsonForkchoiceStateV1 {
        head_block_hash: block.hash(),
        safe_block_hash: block.hash(),
        finalized_block_hash: finalized.hash(),
    };
    Ok(RpcRequest {
        jsonrpc: JSONRPC_VERSION,
        id: format!("fcu{}", number),
        method: fork_of(chain, block).forkchoice_updated_method(),
        params: json!([state, Value::Null]),
    })
}

fn post_merge_requests(
    chain: &Chain,
    build: fn(&Chain, &Block) -> Result<RpcRequest, Error>,
) -> Result<Vec<RpcRequest>, Error> {
    match first_pos_block(chain) {
        Some(start) => chain
            .blocks
            .iter()
            .skip(start as usize)
            .map(|block| build(chain, block))
            .collect(),
        None => Ok(vec![]),
    }
}

pub(super) fn write_new_payload(chain: &Chain, dir: &Path) -> Result<(), Error> {
    write_json(
        dir,
        "newpayload.json",
        &post_merge_requests(chain, new_payload_request)?,
    )
}

pub(super) fn write_fcu(chain: &Chain, dir: &Path) -> Result<(), Error> {
    write_json(dir, "fcu.json", &post_merge_requests(chain, fcu_request)?)
}

pub(super) fn write_head_new_payload(chain: &Chain, dir: &Path) -> Result<(), Error> {
    write_json(
        dir,
        "headnewpayload.json",
        &new_payload_request(chain, chain.head())?,
    )
}

pub(super) fn write_head_fcu(chain: &Chain, dir: &Path) -> Result<(), Error> {
    write_json(dir, "headfcu.json", &fcu_request(chain, chain.head())?)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::GeneratorConfig;
    use crate::generator::generate;

    fn chain(last_fork: &str) -> Chain {
        generate(GeneratorConfig {
            chain_length: 5,
            last_fork: last_fork.into(),
            ..GeneratorConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn versions_follow_the_fork() {
        let prague = chain("prague");
        let np = new_payload_request(&prague, prague.head()).unwrap();
        assert_eq!(np.method, "engine_newPayloadV4");
        assert_eq!(np.id, "np5");
        assert_eq!(np.params.as_array().unwrap().len(), 4);

        let shanghai = chain("shanghai");
        let np = new_payload_request(&shanghai, shanghai.head()).unwrap();
        assert_eq!(np.method, "engine_newPayloadV2");
        assert_eq!(np.params.as_array().unwrap().len(), 1);
        let fcu = fcu_request(&shanghai, shanghai.head()).unwrap();
        assert_eq!(fcu.method, "engine_forkchoiceUpdatedV2");
    }

    #[test]
    fn fcu_finalized_trails_head() {
        let chain = chain("cancun");
        let fcu = fcu_request(&chain, chain.head()).unwrap();
        assert_eq!(fcu.id, "fcu5");
        assert_eq!(fcu.method, "engine_forkchoiceUpdatedV3");
        let state = &fcu.params[0];
        assert_eq!(
            state["finalizedBlockHash"],
            json!(chain.blocks[3].hash())
        );
        assert_eq!(state["headBlockHash"], state["safeBlockHash"]);
        assert_eq!(fcu.params[1], Value::Null);
    }

    #[test]
    fn pre_merge_chain_has_no_requests() {
        let chain = chain("london");
        assert!(post_merge_requests(&chain, fcu_request).unwrap().is_empty());
    }
}
