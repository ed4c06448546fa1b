//! Named strategies that fill generated blocks.
//!
//! A modifier is asked once or more per block whether it wants to add something. It returns
//! `true` when it did, and keeps whatever state it needs across blocks. After generation each
//! modifier reports what it produced through `tx_info`, which ends up in `txinfo.json`.
mod deploy;
mod eip7702;
mod emit;
mod large_receipt;
mod random_spam;
mod requests;
mod transfer;
mod uncles;
mod withdrawals;

use crate::context::BlockContext;
use crate::Error;
use serde::Serialize;
use serde_json::Value;
use types::{Address, Hash256};

pub use deploy::Deploy;
pub use eip7702::Eip7702;
pub use emit::InvokeEmit;
pub use large_receipt::LargeReceipt;
pub use random_spam::RandomSpam;
pub use requests::WithdrawalRequest;
pub use transfer::ValueTransfer;
pub use uncles::Uncles;
pub use withdrawals::Withdrawals;

pub trait BlockModifier {
    /// Adds transactions, uncles or withdrawals to the block. Returns `false` when the modifier
    /// is not eligible for this block or the block has no room left.
    fn apply(&mut self, ctx: &mut BlockContext) -> Result<bool, Error>;

    /// Summary of what was produced, or `null`.
    fn tx_info(&self) -> Value;
}

/// Every registered modifier name, in the order used when none are selected explicitly.
pub const MODIFIER_NAMES: &[&str] = &[
    "deploy-callenv",
    "deploy-callme",
    "deploy-callrevert",
    "randomcode",
    "randomlogs",
    "randomstorage",
    "tx-eip7702",
    "tx-emit-eip1559",
    "tx-emit-eip2930",
    "tx-emit-legacy",
    "tx-largereceipt",
    "tx-request-eip7002",
    "tx-transfer-eip1559",
    "tx-transfer-eip2930",
    "tx-transfer-legacy",
    "uncles",
    "withdrawals",
];

/// Kinds of transaction a modifier can be configured to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxKind {
    Legacy,
    AccessList,
    DynamicFee,
}

pub fn new_modifier(name: &str) -> Result<Box<dyn BlockModifier>, Error> {
    use crate::contracts::*;

    let modifier: Box<dyn BlockModifier> = match name {
        "deploy-callenv" => Box::new(Deploy::new(CALLENV_CODE)),
        "deploy-callme" => Box::new(Deploy::new(CALLME_CODE)),
        "deploy-callrevert" => Box::new(Deploy::new(CALLREVERT_CODE)),
        "randomcode" => Box::new(RandomSpam::new(GENCODE_CODE, 60_000)),
        "randomlogs" => Box::new(RandomSpam::new(GENLOGS_CODE, 20_000)),
        "randomstorage" => Box::new(RandomSpam::new(GENSTORAGE_CODE, 80_000)),
        "tx-eip7702" => Box::new(Eip7702::new()?),
        "tx-emit-eip1559" => Box::new(InvokeEmit::new(TxKind::DynamicFee)),
        "tx-emit-eip2930" => Box::new(InvokeEmit::new(TxKind::AccessList)),
        "tx-emit-legacy" => Box::new(InvokeEmit::new(TxKind::Legacy)),
        "tx-largereceipt" => Box::new(LargeReceipt::default()),
        "tx-request-eip7002" => Box::new(WithdrawalRequest::default()),
        "tx-transfer-eip1559" => Box::new(ValueTransfer::new(TxKind::DynamicFee)),
        "tx-transfer-eip2930" => Box::new(ValueTransfer::new(TxKind::AccessList)),
        "tx-transfer-legacy" => Box::new(ValueTransfer::new(TxKind::Legacy)),
        "uncles" => Box::new(Uncles::default()),
        "withdrawals" => Box::new(Withdrawals::default()),
        other => return Err(Error::UnknownModifier(other.to_string())),
    };
    Ok(modifier)
}

/// A transaction sent by a modifier that fires repeatedly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TxInfo {
    #[serde(rename = "txhash")]
    pub tx_hash: Hash256,
    pub sender: Address,
    #[serde(with = "serde_utils::u64_hex_be")]
    pub block: u64,
    #[serde(rename = "indexInBlock")]
    pub index: usize,
}

pub(crate) fn to_json<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_default()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn every_name_is_registered() {
        for name in MODIFIER_NAMES {
            assert!(new_modifier(name).is_ok(), "{}", name);
        }
        assert!(matches!(
            new_modifier("valuetransfer"),
            Err(Error::UnknownModifier(_))
        ));
        let mut sorted = MODIFIER_NAMES.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, MODIFIER_NAMES);
    }
}
