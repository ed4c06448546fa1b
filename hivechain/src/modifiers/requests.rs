use super::{to_json, BlockModifier};
use crate::context::BlockContext;
use crate::contracts::withdrawal_queue_address;
use crate::forks::Fork;
use crate::Error;
use serde::Serialize;
use serde_json::Value;
use types::{DynamicFeeTx, Hash256, Transaction, Uint256};

const REQUEST_GAS: u64 = 150_000;

/// Validator pubkey (48 bytes) followed by the big-endian amount (8 bytes).
const REQUEST_INPUT: [u8; 56] = [
    0xb9, 0x17, 0xcf, 0xdc, 0x0d, 0x25, 0xb7, 0x2d, 0x55, 0xcf, 0x94, 0xdb, 0x32, 0x8e, 0x16, 0x29,
    0xb7, 0xf4, 0xfd, 0xe2, 0xc3, 0x0c, 0xda, 0xcf, 0x87, 0x3b, 0x66, 0x44, 0x16, 0xf7, 0x6a, 0x0c,
    0x7f, 0x7c, 0xc5, 0x0c, 0x9f, 0x72, 0xa3, 0xcb, 0x84, 0xbe, 0x88, 0x14, 0x4c, 0xde, 0x91, 0x25,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x0d, 0x80,
];

/// Sends one EIP-7002 withdrawal request to the system queue contract.
#[derive(Default)]
pub struct WithdrawalRequest {
    info: Option<RequestInfo>,
}

#[derive(Serialize)]
struct RequestInfo {
    #[serde(rename = "txhash")]
    tx_hash: Hash256,
    #[serde(with = "serde_utils::u64_hex_be")]
    block: u64,
}

impl BlockModifier for WithdrawalRequest {
    fn apply(&mut self, ctx: &mut BlockContext) -> Result<bool, Error> {
        if self.info.is_some() || !ctx.is_active(Fork::Prague) || !ctx.has_gas(REQUEST_GAS) {
            return Ok(false);
        }

        let sender = ctx.tx_sender_account();
        let signed = ctx.add_new_tx(
            sender,
            Transaction::DynamicFee(DynamicFeeTx {
                chain_id: ctx.chain_id(),
                nonce: ctx.account_nonce(sender.address),
                max_priority_fee_per_gas: Uint256::from(2u64),
                max_fee_per_gas: ctx.tx_gas_fee_cap(),
                gas: REQUEST_GAS,
                to: Some(withdrawal_queue_address()),
                value: Uint256::exp10(9),
                data: REQUEST_INPUT.to_vec(),
                access_list: vec![],
            }),
        )?;
        self.info = Some(RequestInfo {
            tx_hash: signed.hash(),
            block: ctx.number(),
        });
        Ok(true)
    }

    fn tx_info(&self) -> Value {
        to_json(&self.info)
    }
}
