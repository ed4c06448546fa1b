use super::{to_json, BlockModifier};
use crate::context::BlockContext;
use crate::contracts::deploy_constructor;
use crate::oracle::CREATE_DATA_GAS;
use crate::Error;
use serde::Serialize;
use serde_json::Value;
use types::{create_address, Address, LegacyTx, Transaction, Uint256};

/// Headroom on top of intrinsic and code deposit gas.
const DEPLOY_EXTRA_GAS: u64 = 15_000;

/// Deploys a fixed contract, once.
pub struct Deploy {
    code: &'static [u8],
    info: Option<DeployInfo>,
}

#[derive(Serialize)]
struct DeployInfo {
    contract: Address,
    #[serde(with = "serde_utils::u64_hex_be")]
    block: u64,
}

impl Deploy {
    pub fn new(code: &'static [u8]) -> Self {
        Self { code, info: None }
    }
}

impl BlockModifier for Deploy {
    fn apply(&mut self, ctx: &mut BlockContext) -> Result<bool, Error> {
        if self.info.is_some() {
            return Ok(false);
        }

        let (constructor, gas) = code_to_deploy(ctx, self.code);
        if !ctx.has_gas(gas) {
            return Ok(false);
        }

        let sender = ctx.tx_sender_account();
        let nonce = ctx.account_nonce(sender.address);
        ctx.add_new_tx(
            sender,
            Transaction::Legacy(LegacyTx {
                nonce,
                gas_price: ctx.tx_gas_fee_cap(),
                gas,
                to: None,
                value: Uint256::zero(),
                data: constructor,
            }),
        )?;
        self.info = Some(DeployInfo {
            contract: create_address(sender.address, nonce),
            block: ctx.number(),
        });
        Ok(true)
    }

    fn tx_info(&self) -> Value {
        to_json(&self.info)
    }
}

/// Constructor that installs `code`, and the gas needed to run it.
pub fn code_to_deploy(ctx: &BlockContext, code: &[u8]) -> (Vec<u8>, u64) {
    let gas = ctx.tx_create_intrinsic_gas(code)
        + code.len() as u64 * CREATE_DATA_GAS
        + DEPLOY_EXTRA_GAS;
    (deploy_constructor(code), gas)
}
