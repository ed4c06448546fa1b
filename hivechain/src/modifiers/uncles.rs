use super::{to_json, BlockModifier};
use crate::context::BlockContext;
use crate::difficulty::calc_difficulty;
use crate::forks::Fork;
use crate::genesis::GENESIS_BASE_FEE;
use crate::oracle::calc_base_fee;
use crate::Error;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use types::{Hash256, Header, Uint256};

const MAX_UNCLES: usize = 2;

/// Adds fabricated uncles, siblings of the parent block, to proof-of-work blocks.
#[derive(Default)]
pub struct Uncles {
    info: BTreeMap<u64, UnclesInfo>,
    counter: u64,
}

#[derive(Default, Serialize)]
struct UnclesInfo {
    hashes: Vec<Hash256>,
}

impl BlockModifier for Uncles {
    fn apply(&mut self, ctx: &mut BlockContext) -> Result<bool, Error> {
        if ctx.is_post_merge() || ctx.is_clique() || ctx.number() < 3 {
            return Ok(false);
        }
        if ctx.uncle_count() >= MAX_UNCLES {
            return Ok(false);
        }
        let (parent, grandparent) = match (ctx.ancestor(1), ctx.ancestor(2)) {
            (Some(p), Some(g)) => (p, g),
            _ => return Ok(false),
        };

        let base_fee_per_gas = ctx
            .schedule()
            .is_active(Fork::London, parent.number, parent.timestamp)
            .then(|| calc_base_fee(grandparent, Uint256::from(GENESIS_BASE_FEE)));
        let timestamp = parent.timestamp + 1;
        let uncle = Header {
            parent_hash: parent.parent_hash,
            number: parent.number,
            timestamp,
            gas_limit: parent.gas_limit,
            difficulty: calc_difficulty(ctx.schedule(), timestamp, grandparent),
            extra_data: format!("hivechain uncle {}", self.counter).into_bytes(),
            base_fee_per_gas,
            ..Header::default()
        };

        let hash = uncle.hash();
        ctx.add_uncle(uncle);
        self.info.entry(ctx.number()).or_default().hashes.push(hash);
        self.counter += 1;
        Ok(true)
    }

    fn tx_info(&self) -> Value {
        to_json(&self.info)
    }
}
