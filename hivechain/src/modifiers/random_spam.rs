use super::BlockModifier;
use crate::context::BlockContext;
use crate::Error;
use serde_json::Value;
use types::{LegacyTx, Transaction, Uint256};

/// Runs a fixed initcode that fills logs, code or storage with block-dependent data. Fires
/// whenever the block has room.
pub struct RandomSpam {
    code: &'static [u8],
    gas: u64,
}

impl RandomSpam {
    /// `gas` is added on top of the creation's intrinsic gas.
    pub fn new(code: &'static [u8], gas: u64) -> Self {
        Self { code, gas }
    }
}

impl BlockModifier for RandomSpam {
    fn apply(&mut self, ctx: &mut BlockContext) -> Result<bool, Error> {
        let gas = ctx.tx_create_intrinsic_gas(self.code) + self.gas;
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
                data: self.code.to_vec(),
            }),
        )?;
        Ok(true)
    }

    fn tx_info(&self) -> Value {
        Value::Null
    }
}
