//! Payload and transaction tampering for fault-injection tests.
use crate::Error;
use engine_api::block_hash::calculate_execution_block_hash;
use engine_api::json_structures::JsonWithdrawal;
use engine_api::NewPayloadRequest;
use serde_json::Value;
use spoofing_proxy::Spoof;
use std::fmt;
use types::{
    Address, Bloom, Hash256, PrivateKey, SignedTransaction, Signer, Transaction, Uint256,
    Withdrawal,
};

/// Overrides for the fields of a payload. Unset fields keep the base value; the block hash is
/// always recomputed over the result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CustomPayloadData {
    pub parent_hash: Option<Hash256>,
    pub fee_recipient: Option<Address>,
    pub state_root: Option<Hash256>,
    pub receipts_root: Option<Hash256>,
    pub logs_bloom: Option<Bloom>,
    pub prev_randao: Option<Hash256>,
    pub block_number: Option<u64>,
    pub gas_limit: Option<u64>,
    pub gas_used: Option<u64>,
    pub timestamp: Option<u64>,
    pub extra_data: Option<Vec<u8>>,
    pub base_fee_per_gas: Option<Uint256>,
    pub transactions: Option<Vec<Vec<u8>>>,
    pub withdrawals: Option<Vec<Withdrawal>>,
    pub remove_withdrawals: bool,
    pub blob_gas_used: Option<u64>,
    pub remove_blob_gas_used: bool,
    pub excess_blob_gas: Option<u64>,
    pub remove_excess_blob_gas: bool,
    pub parent_beacon_block_root: Option<Hash256>,
    pub remove_parent_beacon_block_root: bool,
    pub versioned_hashes: Option<Vec<Hash256>>,
}

fn override_or_remove<T: Clone>(target: &mut Option<T>, value: &Option<T>, remove: bool) {
    if remove {
        *target = None;
    } else if let Some(value) = value {
        *target = Some(value.clone());
    }
}

impl CustomPayloadData {
    pub fn customize_payload(&self, base: &NewPayloadRequest) -> NewPayloadRequest {
        let mut request = base.clone();
        override_or_remove(
            &mut request.parent_beacon_block_root,
            &self.parent_beacon_block_root,
            self.remove_parent_beacon_block_root,
        );
        if let Some(hashes) = &self.versioned_hashes {
            request.versioned_hashes = hashes.clone();
        }

        let payload = &mut request.execution_payload;
        if let Some(v) = self.parent_hash {
            payload.parent_hash = v;
        }
        if let Some(v) = self.fee_recipient {
            payload.fee_recipient = v;
        }
        if let Some(v) = self.state_root {
            payload.state_root = v;
        }
        if let Some(v) = self.receipts_root {
            payload.receipts_root = v;
        }
        if let Some(v) = self.logs_bloom {
            payload.logs_bloom = v;
        }
        if let Some(v) = self.prev_randao {
            payload.prev_randao = v;
        }
        if let Some(v) = self.block_number {
            payload.block_number = v;
        }
        if let Some(v) = self.gas_limit {
            payload.gas_limit = v;
        }
        if let Some(v) = self.gas_used {
            payload.gas_used = v;
        }
        if let Some(v) = self.timestamp {
            payload.timestamp = v;
        }
        if let Some(v) = &self.extra_data {
            payload.extra_data = v.clone();
        }
        if let Some(v) = self.base_fee_per_gas {
            payload.base_fee_per_gas = v;
        }
        if let Some(v) = &self.transactions {
            payload.transactions = v.clone();
        }
        let withdrawals = self
            .withdrawals
            .as_ref()
            .map(|ws| ws.iter().copied().map(JsonWithdrawal::from).collect());
        override_or_remove(&mut payload.withdrawals, &withdrawals, self.remove_withdrawals);
        override_or_remove(
            &mut payload.blob_gas_used,
            &self.blob_gas_used,
            self.remove_blob_gas_used,
        );
        override_or_remove(
            &mut payload.excess_blob_gas,
            &self.excess_blob_gas,
            self.remove_excess_blob_gas,
        );

        request.execution_payload.block_hash = calculate_execution_block_hash(
            &request.execution_payload,
            request.parent_beacon_block_root,
            request.execution_requests.as_deref(),
        );
        request
    }

    /// A proxy spoof that rewrites the payload parameter of a `newPayload` request into the
    /// customized payload. Only the fields that differ from `base` are spoofed; removed fields
    /// become `null`. The extra `newPayload` parameters are not reachable through a spoof.
    pub fn customize_payload_spoof(
        &self,
        method: &str,
        base: &NewPayloadRequest,
    ) -> Result<Spoof, Error> {
        let customized = self.customize_payload(base);
        let before = serde_json::to_value(&base.execution_payload)?;
        let after = serde_json::to_value(&customized.execution_payload)?;
        let (before, after) = match (before, after) {
            (Value::Object(before), Value::Object(after)) => (before, after),
            _ => {
                return Err(Error::Customization(
                    "payload does not serialize to an object".into(),
                ))
            }
        };

        let mut spoof = Spoof::new(method);
        for (key, value) in &after {
            if before.get(key) != Some(value) {
                spoof.fields.insert(key.clone(), value.clone());
            }
        }
        for key in before.keys().filter(|k| !after.contains_key(*k)) {
            spoof.fields.insert(key.clone(), Value::Null);
        }
        Ok(spoof)
    }
}

impl fmt::Display for CustomPayloadData {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut fields = vec![];
        let mut push = |name: &str, value: Option<String>| {
            if let Some(value) = value {
                fields.push(format!("{}={}", name, value));
            }
        };
        push("parent_hash", self.parent_hash.map(|v| format!("{:?}", v)));
        push("fee_recipient", self.fee_recipient.map(|v| format!("{:?}", v)));
        push("state_root", self.state_root.map(|v| format!("{:?}", v)));
        push("receipts_root", self.receipts_root.map(|v| format!("{:?}", v)));
        push("logs_bloom", self.logs_bloom.map(|v| format!("{:?}", v)));
        push("prev_randao", self.prev_randao.map(|v| format!("{:?}", v)));
        push("block_number", self.block_number.map(|v| v.to_string()));
        push("gas_limit", self.gas_limit.map(|v| v.to_string()));
        push("gas_used", self.gas_used.map(|v| v.to_string()));
        push("timestamp", self.timestamp.map(|v| v.to_string()));
        push("extra_data", self.extra_data.as_ref().map(|v| format!("0x{}", hex(v))));
        push("base_fee_per_gas", self.base_fee_per_gas.map(|v| v.to_string()));
        push(
            "transactions",
            self.transactions.as_ref().map(|v| v.len().to_string()),
        );
        push(
            "withdrawals",
            self.withdrawals.as_ref().map(|v| v.len().to_string()),
        );
        push("blob_gas_used", self.blob_gas_used.map(|v| v.to_string()));
        push("excess_blob_gas", self.excess_blob_gas.map(|v| v.to_string()));
        push(
            "parent_beacon_block_root",
            self.parent_beacon_block_root.map(|v| format!("{:?}", v)),
        );
        for (name, removed) in [
            ("withdrawals", self.remove_withdrawals),
            ("blob_gas_used", self.remove_blob_gas_used),
            ("excess_blob_gas", self.remove_excess_blob_gas),
            ("parent_beacon_block_root", self.remove_parent_beacon_block_root),
        ] {
            if removed {
                fields.push(format!("{}=removed", name));
            }
        }
        write!(f, "custom payload fields: {}", fields.join(", "))
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Ways to break an otherwise valid payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidPayloadField {
    ParentHash,
    StateRoot,
    ReceiptsRoot,
    Number,
    GasLimit,
    GasUsed,
    Timestamp,
    PrevRandao,
    RemoveTransaction,
    TransactionSignature,
    TransactionNonce,
    TransactionGas,
    TransactionGasPrice,
    TransactionGasTipPrice,
    TransactionValue,
    TransactionChainId,
}

impl InvalidPayloadField {
    pub fn is_transaction_field(self) -> bool {
        matches!(
            self,
            InvalidPayloadField::TransactionSignature
                | InvalidPayloadField::TransactionNonce
                | InvalidPayloadField::TransactionGas
                | InvalidPayloadField::TransactionGasPrice
                | InvalidPayloadField::TransactionGasTipPrice
                | InvalidPayloadField::TransactionValue
                | InvalidPayloadField::TransactionChainId
        )
    }
}

fn flip_last_byte(hash: Hash256) -> Hash256 {
    let mut hash = hash;
    let last = hash.0.len() - 1;
    hash.0[last] = 255 - hash.0[last];
    hash
}

/// A copy of `base` made invalid in `field`, with a correct block hash. Transaction fields
/// tamper with the first transaction, re-signing it with `key` unless the signature itself is
/// the target.
pub fn generate_invalid_payload(
    base: &NewPayloadRequest,
    field: InvalidPayloadField,
    key: &PrivateKey,
) -> Result<NewPayloadRequest, Error> {
    let payload = &base.execution_payload;
    let mut custom = CustomPayloadData::default();
    match field {
        InvalidPayloadField::ParentHash => {
            custom.parent_hash = Some(flip_last_byte(payload.parent_hash))
        }
        InvalidPayloadField::StateRoot => {
            custom.state_root = Some(flip_last_byte(payload.state_root))
        }
        InvalidPayloadField::ReceiptsRoot => {
            custom.receipts_root = Some(flip_last_byte(payload.receipts_root))
        }
        InvalidPayloadField::Number => {
            custom.block_number = Some(payload.block_number.saturating_sub(1))
        }
        InvalidPayloadField::GasLimit => custom.gas_limit = Some(payload.gas_limit * 2),
        InvalidPayloadField::GasUsed => {
            custom.gas_used = Some(payload.gas_used.wrapping_sub(1))
        }
        InvalidPayloadField::Timestamp => {
            custom.timestamp = Some(payload.timestamp.saturating_sub(1))
        }
        InvalidPayloadField::PrevRandao => {
            custom.prev_randao = Some(Hash256::from(rand::random::<[u8; 32]>()))
        }
        InvalidPayloadField::RemoveTransaction => custom.transactions = Some(vec![]),
        field => {
            let first = payload.transactions.first().ok_or_else(|| {
                Error::Customization(format!("{:?} needs a payload with transactions", field))
            })?;
            let tx = SignedTransaction::decode_2718(first)?;
            let custom_tx = invalid_transaction_data(&tx, field);
            let tampered = customize_transaction(&tx, key, &custom_tx)?;
            let mut transactions = payload.transactions.clone();
            transactions[0] = tampered.encoded_2718();
            custom.transactions = Some(transactions);
        }
    }
    Ok(custom.customize_payload(base))
}

fn invalid_transaction_data(tx: &SignedTransaction, field: InvalidPayloadField) -> CustomTransactionData {
    let mut custom = CustomTransactionData::default();
    let inner = &tx.transaction;
    match field {
        InvalidPayloadField::TransactionSignature => {
            custom.signature = Some(SignatureValues {
                v: tx.v,
                r: tx.r.saturating_sub(Uint256::one()),
                s: tx.s,
            })
        }
        InvalidPayloadField::TransactionNonce => {
            custom.nonce = Some(inner.nonce().wrapping_sub(1))
        }
        InvalidPayloadField::TransactionGas => custom.gas = Some(0),
        InvalidPayloadField::TransactionGasPrice => {
            custom.gas_price_or_fee_cap = Some(Uint256::zero())
        }
        InvalidPayloadField::TransactionGasTipPrice => {
            custom.gas_tip_cap = Some(inner.max_fee_per_gas().saturating_mul(2.into()))
        }
        InvalidPayloadField::TransactionValue => custom.value = Some(Uint256::MAX),
        InvalidPayloadField::TransactionChainId => {
            let chain_id = inner.chain_id().or_else(|| tx.legacy_chain_id()).unwrap_or(0);
            custom.chain_id = Some(chain_id + 1)
        }
        _ => {}
    }
    custom
}

/// Raw signature values placed on a transaction verbatim instead of signing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureValues {
    pub v: u64,
    pub r: Uint256,
    pub s: Uint256,
}

/// Overrides for the fields of a transaction. `gas_price_or_fee_cap` sets the gas price of
/// legacy and access-list transactions and the fee cap of the others.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CustomTransactionData {
    pub nonce: Option<u64>,
    pub gas_price_or_fee_cap: Option<Uint256>,
    pub gas_tip_cap: Option<Uint256>,
    pub gas: Option<u64>,
    pub to: Option<Address>,
    pub value: Option<Uint256>,
    pub data: Option<Vec<u8>>,
    pub chain_id: Option<u64>,
    pub signature: Option<SignatureValues>,
}

impl CustomTransactionData {
    fn apply_common(&self, nonce: &mut u64, gas: &mut u64, value: &mut Uint256, data: &mut Vec<u8>) {
        if let Some(v) = self.nonce {
            *nonce = v;
        }
        if let Some(v) = self.gas {
            *gas = v;
        }
        if let Some(v) = self.value {
            *value = v;
        }
        if let Some(v) = &self.data {
            *data = v.clone();
        }
    }

    fn reject_tip_cap(&self, tx: &Transaction) -> Result<(), Error> {
        match self.gas_tip_cap {
            Some(_) => Err(Error::Customization(format!(
                "{:?} transactions have no gas tip cap",
                tx.tx_type()
            ))),
            None => Ok(()),
        }
    }
}

/// Rebuilds `base` with the overrides in `custom`. The result is signed with `key` for the
/// custom or original chain id, unless `custom` carries explicit signature values.
pub fn customize_transaction(
    base: &SignedTransaction,
    key: &PrivateKey,
    custom: &CustomTransactionData,
) -> Result<SignedTransaction, Error> {
    let mut tx = base.transaction.clone();
    match &mut tx {
        Transaction::Legacy(inner) => {
            custom.reject_tip_cap(&base.transaction)?;
            custom.apply_common(&mut inner.nonce, &mut inner.gas, &mut inner.value, &mut inner.data);
            if let Some(v) = custom.gas_price_or_fee_cap {
                inner.gas_price = v;
            }
            if let Some(to) = custom.to {
                inner.to = Some(to);
            }
        }
        Transaction::AccessList(inner) => {
            custom.reject_tip_cap(&base.transaction)?;
            custom.apply_common(&mut inner.nonce, &mut inner.gas, &mut inner.value, &mut inner.data);
            if let Some(v) = custom.gas_price_or_fee_cap {
                inner.gas_price = v;
            }
            if let Some(to) = custom.to {
                inner.to = Some(to);
            }
        }
        Transaction::DynamicFee(inner) => {
            custom.apply_common(&mut inner.nonce, &mut inner.gas, &mut inner.value, &mut inner.data);
            if let Some(v) = custom.gas_price_or_fee_cap {
                inner.max_fee_per_gas = v;
            }
            if let Some(v) = custom.gas_tip_cap {
                inner.max_priority_fee_per_gas = v;
            }
            if let Some(to) = custom.to {
                inner.to = Some(to);
            }
        }
        Transaction::Blob(inner) => {
            custom.apply_common(&mut inner.nonce, &mut inner.gas, &mut inner.value, &mut inner.data);
            if let Some(v) = custom.gas_price_or_fee_cap {
                inner.max_fee_per_gas = v;
            }
            if let Some(v) = custom.gas_tip_cap {
                inner.max_priority_fee_per_gas = v;
            }
            if let Some(to) = custom.to {
                inner.to = to;
            }
        }
        Transaction::SetCode(inner) => {
            custom.apply_common(&mut inner.nonce, &mut inner.gas, &mut inner.value, &mut inner.data);
            if let Some(v) = custom.gas_price_or_fee_cap {
                inner.max_fee_per_gas = v;
            }
            if let Some(v) = custom.gas_tip_cap {
                inner.max_priority_fee_per_gas = v;
            }
            if let Some(to) = custom.to {
                inner.to = to;
            }
        }
    }

    let chain_id = custom
        .chain_id
        .or_else(|| base.transaction.chain_id())
        .or_else(|| base.legacy_chain_id());
    match custom.signature {
        Some(signature) => {
            if let Some(chain_id) = chain_id {
                tx.set_chain_id(chain_id);
            }
            Ok(SignedTransaction::new(
                tx,
                signature.v,
                signature.r,
                signature.s,
            ))
        }
        None => {
            let signer = Signer::new(chain_id.unwrap_or_default(), chain_id.is_some());
            Ok(signer.sign(tx, key)?)
        }
    }
}
