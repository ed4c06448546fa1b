use super::BlockModifier;
use crate::context::BlockContext;
use crate::contracts::large_logs_address;
use crate::oracle::TX_GAS;
use crate::Error;
use serde_json::Value;
use types::{LegacyTx, Transaction, Uint256};

/// Gas of one LOG0 with `LARGE_LOG_SIZE` bytes of data.
const LOG_COST: u64 = 1_607_055;
const PUSH_COST: u64 = 10;
/// Enough transactions to push the block's receipts above 10 MB.
const TX_COUNT: u64 = 56;

/// Fills one block with calls to the large-logs contract.
#[derive(Default)]
pub struct LargeReceipt {
    block: Option<u64>,
}

impl BlockModifier for LargeReceipt {
    fn apply(&mut self, ctx: &mut BlockContext) -> Result<bool, Error> {
        let gas = LOG_COST + PUSH_COST + TX_GAS;
        if self.block.is_some() || !ctx.has_gas(gas * TX_COUNT) {
            return Ok(false);
        }

        let sender = ctx.tx_sender_account();
        for _ in 0..TX_COUNT {
            ctx.add_new_tx(
                sender,
                Transaction::Legacy(LegacyTx {
                    nonce: ctx.account_nonce(sender.address),
                    gas_price: ctx.tx_gas_fee_cap(),
                    gas,
                    to: Some(large_logs_address()),
                    value: Uint256::zero(),
                    data: vec![],
                }),
            )?;
        }
        self.block = Some(ctx.number());
        Ok(true)
    }

    fn tx_info(&self) -> Value {
        self.block.map(Value::from).unwrap_or(Value::Null)
    }
}
