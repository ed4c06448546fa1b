use super::{to_json, BlockModifier, TxInfo, TxKind};
use crate::context::BlockContext;
use crate::forks::Fork;
use crate::oracle::TX_GAS;
use crate::Error;
use serde_json::Value;
use types::{AccessListTx, Address, DynamicFeeTx, LegacyTx, Transaction, Uint256};

/// Sends one wei to a pseudo-randomly chosen roster account.
pub struct ValueTransfer {
    kind: TxKind,
    gas_limit: u64,
    txs: Vec<TxInfo>,
}

impl ValueTransfer {
    pub fn new(kind: TxKind) -> Self {
        Self {
            kind,
            gas_limit: TX_GAS,
            txs: vec![],
        }
    }
}

/// `accounts[random % len]`.
pub fn pick_recipient(ctx: &BlockContext) -> Address {
    let accounts = ctx.accounts();
    let index = ctx.tx_random_value() % accounts.len() as u64;
    accounts[index as usize].address
}

impl BlockModifier for ValueTransfer {
    fn apply(&mut self, ctx: &mut BlockContext) -> Result<bool, Error> {
        if !ctx.has_gas(self.gas_limit) {
            return Ok(false);
        }

        let sender = ctx.tx_sender_account();
        let recipient = pick_recipient(ctx);
        let nonce = ctx.account_nonce(sender.address);
        let tx = match self.kind {
            TxKind::Legacy => Transaction::Legacy(LegacyTx {
                nonce,
                gas_price: ctx.tx_gas_fee_cap(),
                gas: self.gas_limit,
                to: Some(recipient),
                value: Uint256::one(),
                data: vec![],
            }),
            TxKind::AccessList => {
                if !ctx.is_active(Fork::Berlin) {
                    return Ok(false);
                }
                Transaction::AccessList(AccessListTx {
                    chain_id: ctx.chain_id(),
                    nonce,
                    gas_price: ctx.tx_gas_fee_cap(),
                    gas: self.gas_limit,
                    to: Some(recipient),
                    value: Uint256::one(),
                    data: vec![],
                    access_list: vec![],
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
                    gas: self.gas_limit,
                    to: Some(recipient),
                    value: Uint256::one(),
                    data: vec![],
                    access_list: vec![],
                })
            }
        };

        let index = ctx.tx_count();
        let signed = ctx.add_new_tx(sender, tx)?;
        self.txs.push(TxInfo {
            tx_hash: signed.hash(),
            sender: sender.address,
            block: ctx.number(),
            index,
        });
        Ok(true)
    }

    fn tx_info(&self) -> Value {
        to_json(&self.txs)
    }
}
