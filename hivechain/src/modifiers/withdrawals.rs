use super::transfer::pick_recipient;
use super::{to_json, BlockModifier};
use crate::context::BlockContext;
use crate::forks::Fork;
use crate::Error;
use serde::Serialize;
use serde_json::Value;
use types::Withdrawal;

const MAX_WITHDRAWALS: usize = 2;
const VALIDATOR_INDEX: u64 = 5;
/// Gwei.
const AMOUNT: u64 = 100;

/// Adds beacon-chain withdrawals to post-Shanghai blocks.
#[derive(Default)]
pub struct Withdrawals {
    next_index: u64,
    withdrawals: Vec<WithdrawalInfo>,
}

#[derive(Serialize)]
struct WithdrawalInfo {
    #[serde(with = "serde_utils::u64_hex_be")]
    block: u64,
    #[serde(with = "serde_utils::u64_hex_be")]
    index: u64,
    address: types::Address,
}

impl BlockModifier for Withdrawals {
    fn apply(&mut self, ctx: &mut BlockContext) -> Result<bool, Error> {
        if !ctx.is_active(Fork::Shanghai) || ctx.withdrawal_count() >= MAX_WITHDRAWALS {
            return Ok(false);
        }

        let address = pick_recipient(ctx);
        ctx.add_withdrawal(Withdrawal {
            index: self.next_index,
            validator_index: VALIDATOR_INDEX,
            address,
            amount: AMOUNT,
        });
        self.withdrawals.push(WithdrawalInfo {
            block: ctx.number(),
            index: self.next_index,
            address,
        });
        self.next_index += 1;
        Ok(true)
    }

    fn tx_info(&self) -> Value {
        to_json(&self.withdrawals)
    }
}
