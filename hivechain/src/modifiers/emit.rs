use super::{to_json, BlockModifier, TxInfo, TxKind};
use crate::context::BlockContext;
use crate::contracts::{emit_address, emit_topic};
use crate::forks::Fork;
use crate::Error;
use serde::Serialize;
use serde_json::Value;
use types::{
    keccak256, AccessListItem, AccessListTx, DynamicFeeTx, Hash256, LegacyTx, Transaction,
    Uint256,
};

const EMIT_GAS: u64 = 100_000;
const EMIT_VALUE: u64 = 2;

/// Calls the emit contract, which logs its calldata under two topics.
pub struct InvokeEmit {
    kind: TxKind,
    txs: Vec<EmitInfo>,
}

#[derive(Serialize)]
struct EmitInfo {
    #[serde(flatten)]
    tx: TxInfo,
    #[serde(rename = "logtopic0")]
    topic0: Hash256,
    #[serde(rename = "logtopic1")]
    topic1: Hash256,
}

impl InvokeEmit {
    pub fn new(kind: TxKind) -> Self {
        Self { kind, txs: vec![] }
    }
}

impl BlockModifier for InvokeEmit {
    fn apply(&mut self, ctx: &mut BlockContext) -> Result<bool, Error> {
        if !ctx.has_gas(EMIT_GAS) {
            return Ok(false);
        }

        let sender = ctx.tx_sender_account();
        let mut data = ctx.tx_random_value().to_be_bytes().to_vec();
        data.extend_from_slice(b"emit");
        let data_hash = keccak256(&data);
        let access_list = vec![AccessListItem {
            address: emit_address(),
            storage_keys: vec![Hash256::zero(), data_hash],
        }];

        let nonce = ctx.account_nonce(sender.address);
        let tx = match self.kind {
            TxKind::Legacy => Transaction::Legacy(LegacyTx {
                nonce,
                gas_price: ctx.tx_gas_fee_cap(),
                gas: EMIT_GAS,
                to: Some(emit_address()),
                value: Uint256::from(EMIT_VALUE),
                data,
            }),
            TxKind::AccessList => {
                if !ctx.is_active(Fork::Berlin) {
                    return Ok(false);
                }
                Transaction::AccessList(AccessListTx {
                    chain_id: ctx.chain_id(),
                    nonce,
                    gas_price: ctx.tx_gas_fee_cap(),
                    gas: EMIT_GAS,
                    to: Some(emit_address()),
                    value: Uint256::from(EMIT_VALUE),
                    data,
                    access_list,
                })
            }
            TxKind::DynamicFee => {
                if !ctx.is_active(Fork::London) {
                    return Ok(false);
                }
                Transaction::DynamicFee(DynamicFeeTx {
                    chain_id: ctx.chain_id(),
                    nonce,
                    max_priority_fee_per_gas: Uint256::one(),
                    max_fee_per_gas: ctx.tx_gas_fee_cap(),
                    gas: EMIT_GAS,
                    to: Some(emit_address()),
                    value: Uint256::from(EMIT_VALUE),
                    data,
                    access_list,
                })
            }
        };

        let index = ctx.tx_count();
        let signed = ctx.add_new_tx(sender, tx)?;
        self.txs.push(EmitInfo {
            tx: TxInfo {
                tx_hash: signed.hash(),
                sender: sender.address,
                block: ctx.number(),
                index,
            },
            topic0: emit_topic(),
            topic1: data_hash,
        });
        Ok(true)
    }

    fn tx_info(&self) -> Value {
        to_json(&self.txs)
    }
}
