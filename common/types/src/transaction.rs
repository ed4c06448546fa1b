use crate::{keccak256, recover_address, Address, Error, Hash256, PrivateKey, RawSignature, Uint256};
use ethers_core::utils::rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};
use strum::IntoStaticStr;

/// EIP-2718 transaction type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum TxType {
    Legacy,
    AccessList,
    DynamicFee,
    Blob,
    SetCode,
}

impl TxType {
    pub fn as_u8(self) -> u8 {
        match self {
            TxType::Legacy => 0,
            TxType::AccessList => 1,
            TxType::DynamicFee => 2,
            TxType::Blob => 3,
            TxType::SetCode => 4,
        }
    }

    pub fn from_u8(byte: u8) -> Result<Self, Error> {
        match byte {
            0 => Ok(TxType::Legacy),
            1 => Ok(TxType::AccessList),
            2 => Ok(TxType::DynamicFee),
            3 => Ok(TxType::Blob),
            4 => Ok(TxType::SetCode),
            other => Err(Error::UnknownTransactionType(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessListItem {
    pub address: Address,
    pub storage_keys: Vec<Hash256>,
}

pub type AccessList = Vec<AccessListItem>;

impl Encodable for AccessListItem {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(2);
        s.append(&self.address);
        s.append_list(&self.storage_keys);
    }
}

impl Decodable for AccessListItem {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        Ok(AccessListItem {
            address: rlp.val_at(0)?,
            storage_keys: rlp.list_at(1)?,
        })
    }
}

/// An EIP-7702 delegation: `address`'s code becomes the code of the signing account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Authorization {
    pub chain_id: u64,
    pub address: Address,
    pub nonce: u64,
}

const AUTHORIZATION_MAGIC: u8 = 0x05;

impl Authorization {
    pub fn signing_hash(&self) -> Hash256 {
        let mut stream = RlpStream::new_list(3);
        stream.append(&self.chain_id);
        stream.append(&self.address);
        stream.append(&self.nonce);
        let mut preimage = vec![AUTHORIZATION_MAGIC];
        preimage.extend_from_slice(&stream.out());
        keccak256(&preimage)
    }

    pub fn sign(self, key: &PrivateKey) -> Result<SignedAuthorization, Error> {
        let signature = key.sign_hash(self.signing_hash())?;
        Ok(SignedAuthorization {
            authorization: self,
            y_parity: signature.recovery_id,
            r: signature.r,
            s: signature.s,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignedAuthorization {
    pub authorization: Authorization,
    pub y_parity: u8,
    pub r: Uint256,
    pub s: Uint256,
}

impl SignedAuthorization {
    /// The account that signed this authorization.
    pub fn authority(&self) -> Result<Address, Error> {
        recover_address(
            self.authorization.signing_hash(),
            &RawSignature {
                recovery_id: self.y_parity,
                r: self.r,
                s: self.s,
            },
        )
    }
}

impl Encodable for SignedAuthorization {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(6);
        s.append(&self.authorization.chain_id);
        s.append(&self.authorization.address);
        s.append(&self.authorization.nonce);
        s.append(&self.y_parity);
        s.append(&self.r);
        s.append(&self.s);
    }
}

impl Decodable for SignedAuthorization {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        if rlp.item_count()? != 6 {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        Ok(SignedAuthorization {
            authorization: Authorization {
                chain_id: rlp.val_at(0)?,
                address: rlp.val_at(1)?,
                nonce: rlp.val_at(2)?,
            },
            y_parity: rlp.val_at(3)?,
            r: rlp.val_at(4)?,
            s: rlp.val_at(5)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LegacyTx {
    pub nonce: u64,
    pub gas_price: Uint256,
    pub gas: u64,
    pub to: Option<Address>,
    pub value: Uint256,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AccessListTx {
    pub chain_id: u64,
    pub nonce: u64,
    pub gas_price: Uint256,
    pub gas: u64,
    pub to: Option<Address>,
    pub value: Uint256,
    pub data: Vec<u8>,
    pub access_list: AccessList,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DynamicFeeTx {
    pub chain_id: u64,
    pub nonce: u64,
    pub max_priority_fee_per_gas: Uint256,
    pub max_fee_per_gas: Uint256,
    pub gas: u64,
    pub to: Option<Address>,
    pub value: Uint256,
    pub data: Vec<u8>,
    pub access_list: AccessList,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BlobTx {
    pub chain_id: u64,
    pub nonce: u64,
    pub max_priority_fee_per_gas: Uint256,
    pub max_fee_per_gas: Uint256,
    pub gas: u64,
    pub to: Address,
    pub value: Uint256,
    pub data: Vec<u8>,
    pub access_list: AccessList,
    pub max_fee_per_blob_gas: Uint256,
    pub blob_versioned_hashes: Vec<Hash256>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SetCodeTx {
    pub chain_id: u64,
    pub nonce: u64,
    pub max_priority_fee_per_gas: Uint256,
    pub max_fee_per_gas: Uint256,
    pub gas: u64,
    pub to: Address,
    pub value: Uint256,
    pub data: Vec<u8>,
    pub access_list: AccessList,
    pub authorization_list: Vec<SignedAuthorization>,
}

/// An unsigned transaction of any supported type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transaction {
    Legacy(LegacyTx),
    AccessList(AccessListTx),
    DynamicFee(DynamicFeeTx),
    Blob(BlobTx),
    SetCode(SetCodeTx),
}

fn append_to(s: &mut RlpStream, to: &Option<Address>) {
    match to {
        Some(address) => s.append(address),
        None => s.append_empty_data(),
    };
}

fn decode_to(rlp: &Rlp, index: usize) -> Result<Option<Address>, DecoderError> {
    let item = rlp.at(index)?;
    if item.is_empty() {
        Ok(None)
    } else {
        item.as_val().map(Some)
    }
}

impl Transaction {
    pub fn tx_type(&self) -> TxType {
        match self {
            Transaction::Legacy(_) => TxType::Legacy,
            Transaction::AccessList(_) => TxType::AccessList,
            Transaction::DynamicFee(_) => TxType::DynamicFee,
            Transaction::Blob(_) => TxType::Blob,
            Transaction::SetCode(_) => TxType::SetCode,
        }
    }

    pub fn chain_id(&self) -> Option<u64> {
        match self {
            Transaction::Legacy(_) => None,
            Transaction::AccessList(tx) => Some(tx.chain_id),
            Transaction::DynamicFee(tx) => Some(tx.chain_id),
            Transaction::Blob(tx) => Some(tx.chain_id),
            Transaction::SetCode(tx) => Some(tx.chain_id),
        }
    }

    pub fn set_chain_id(&mut self, chain_id: u64) {
        match self {
            Transaction::Legacy(_) => {}
            Transaction::AccessList(tx) => tx.chain_id = chain_id,
            Transaction::DynamicFee(tx) => tx.chain_id = chain_id,
            Transaction::Blob(tx) => tx.chain_id = chain_id,
            Transaction::SetCode(tx) => tx.chain_id = chain_id,
        }
    }

    pub fn nonce(&self) -> u64 {
        match self {
            Transaction::Legacy(tx) => tx.nonce,
            Transaction::AccessList(tx) => tx.nonce,
            Transaction::DynamicFee(tx) => tx.nonce,
            Transaction::Blob(tx) => tx.nonce,
            Transaction::SetCode(tx) => tx.nonce,
        }
    }

    pub fn gas(&self) -> u64 {
        match self {
            Transaction::Legacy(tx) => tx.gas,
            Transaction::AccessList(tx) => tx.gas,
            Transaction::DynamicFee(tx) => tx.gas,
            Transaction::Blob(tx) => tx.gas,
            Transaction::SetCode(tx) => tx.gas,
        }
    }

    /// The call target, or `None` for contract creation.
    pub fn to(&self) -> Option<Address> {
        match self {
            Transaction::Legacy(tx) => tx.to,
            Transaction::AccessList(tx) => tx.to,
            Transaction::DynamicFee(tx) => tx.to,
            Transaction::Blob(tx) => Some(tx.to),
            Transaction::SetCode(tx) => Some(tx.to),
        }
    }

    pub fn value(&self) -> Uint256 {
        match self {
            Transaction::Legacy(tx) => tx.value,
            Transaction::AccessList(tx) => tx.value,
            Transaction::DynamicFee(tx) => tx.value,
            Transaction::Blob(tx) => tx.value,
            Transaction::SetCode(tx) => tx.value,
        }
    }

    pub fn data(&self) -> &[u8] {
        match self {
            Transaction::Legacy(tx) => &tx.data,
            Transaction::AccessList(tx) => &tx.data,
            Transaction::DynamicFee(tx) => &tx.data,
            Transaction::Blob(tx) => &tx.data,
            Transaction::SetCode(tx) => &tx.data,
        }
    }

    pub fn access_list(&self) -> &[AccessListItem] {
        match self {
            Transaction::Legacy(_) => &[],
            Transaction::AccessList(tx) => &tx.access_list,
            Transaction::DynamicFee(tx) => &tx.access_list,
            Transaction::Blob(tx) => &tx.access_list,
            Transaction::SetCode(tx) => &tx.access_list,
        }
    }

    pub fn authorization_list(&self) -> &[SignedAuthorization] {
        match self {
            Transaction::SetCode(tx) => &tx.authorization_list,
            _ => &[],
        }
    }

    pub fn blob_versioned_hashes(&self) -> &[Hash256] {
        match self {
            Transaction::Blob(tx) => &tx.blob_versioned_hashes,
            _ => &[],
        }
    }

    pub fn max_fee_per_blob_gas(&self) -> Option<Uint256> {
        match self {
            Transaction::Blob(tx) => Some(tx.max_fee_per_blob_gas),
            _ => None,
        }
    }

    /// Gas price for legacy-priced transactions, fee cap otherwise.
    pub fn max_fee_per_gas(&self) -> Uint256 {
        match self {
            Transaction::Legacy(tx) => tx.gas_price,
            Transaction::AccessList(tx) => tx.gas_price,
            Transaction::DynamicFee(tx) => tx.max_fee_per_gas,
            Transaction::Blob(tx) => tx.max_fee_per_gas,
            Transaction::SetCode(tx) => tx.max_fee_per_gas,
        }
    }

    pub fn max_priority_fee_per_gas(&self) -> Uint256 {
        match self {
            Transaction::Legacy(tx) => tx.gas_price,
            Transaction::AccessList(tx) => tx.gas_price,
            Transaction::DynamicFee(tx) => tx.max_priority_fee_per_gas,
            Transaction::Blob(tx) => tx.max_priority_fee_per_gas,
            Transaction::SetCode(tx) => tx.max_priority_fee_per_gas,
        }
    }

    /// The price per gas actually paid by the sender given the block's base fee.
    pub fn effective_gas_price(&self, base_fee: Option<Uint256>) -> Uint256 {
        match (self, base_fee) {
            (Transaction::Legacy(_), _) | (Transaction::AccessList(_), _) | (_, None) => {
                self.max_fee_per_gas()
            }
            (_, Some(base_fee)) => std::cmp::min(
                self.max_fee_per_gas(),
                base_fee.saturating_add(self.max_priority_fee_per_gas()),
            ),
        }
    }

    fn field_count(&self) -> usize {
        match self {
            Transaction::Legacy(_) => 6,
            Transaction::AccessList(_) => 8,
            Transaction::DynamicFee(_) => 9,
            Transaction::Blob(_) => 11,
            Transaction::SetCode(_) => 10,
        }
    }

    /// Appends the unsigned fields, without a list header.
    fn append_fields(&self, s: &mut RlpStream) {
        match self {
            Transaction::Legacy(tx) => {
                s.append(&tx.nonce);
                s.append(&tx.gas_price);
                s.append(&tx.gas);
                append_to(s, &tx.to);
                s.append(&tx.value);
                s.append(&tx.data);
            }
            Transaction::AccessList(tx) => {
                s.append(&tx.chain_id);
                s.append(&tx.nonce);
                s.append(&tx.gas_price);
                s.append(&tx.gas);
                append_to(s, &tx.to);
                s.append(&tx.value);
                s.append(&tx.data);
                s.append_list(&tx.access_list);
            }
            Transaction::DynamicFee(tx) => {
                s.append(&tx.chain_id);
                s.append(&tx.nonce);
                s.append(&tx.max_priority_fee_per_gas);
                s.append(&tx.max_fee_per_gas);
                s.append(&tx.gas);
                append_to(s, &tx.to);
                s.append(&tx.value);
                s.append(&tx.data);
                s.append_list(&tx.access_list);
            }
            Transaction::Blob(tx) => {
                s.append(&tx.chain_id);
                s.append(&tx.nonce);
                s.append(&tx.max_priority_fee_per_gas);
                s.append(&tx.max_fee_per_gas);
                s.append(&tx.gas);
                s.append(&tx.to);
                s.append(&tx.value);
                s.append(&tx.data);
                s.append_list(&tx.access_list);
                s.append(&tx.max_fee_per_blob_gas);
                s.append_list(&tx.blob_versioned_hashes);
            }
            Transaction::SetCode(tx) => {
                s.append(&tx.chain_id);
                s.append(&tx.nonce);
                s.append(&tx.max_priority_fee_per_gas);
                s.append(&tx.max_fee_per_gas);
                s.append(&tx.gas);
                s.append(&tx.to);
                s.append(&tx.value);
                s.append(&tx.data);
                s.append_list(&tx.access_list);
                s.append_list(&tx.authorization_list);
            }
        }
    }

    fn decode_fields(tx_type: TxType, rlp: &Rlp) -> Result<Self, DecoderError> {
        let tx = match tx_type {
            TxType::Legacy => Transaction::Legacy(LegacyTx {
                nonce: rlp.val_at(0)?,
                gas_price: rlp.val_at(1)?,
                gas: rlp.val_at(2)?,
                to: decode_to(rlp, 3)?,
                value: rlp.val_at(4)?,
                data: rlp.val_at(5)?,
            }),
            TxType::AccessList => Transaction::AccessList(AccessListTx {
                chain_id: rlp.val_at(0)?,
                nonce: rlp.val_at(1)?,
                gas_price: rlp.val_at(2)?,
                gas: rlp.val_at(3)?,
                to: decode_to(rlp, 4)?,
                value: rlp.val_at(5)?,
                data: rlp.val_at(6)?,
                access_list: rlp.list_at(7)?,
            }),
            TxType::DynamicFee => Transaction::DynamicFee(DynamicFeeTx {
                chain_id: rlp.val_at(0)?,
                nonce: rlp.val_at(1)?,
                max_priority_fee_per_gas: rlp.val_at(2)?,
                max_fee_per_gas: rlp.val_at(3)?,
                gas: rlp.val_at(4)?,
                to: decode_to(rlp, 5)?,
                value: rlp.val_at(6)?,
                data: rlp.val_at(7)?,
                access_list: rlp.list_at(8)?,
            }),
            TxType::Blob => Transaction::Blob(BlobTx {
                chain_id: rlp.val_at(0)?,
                nonce: rlp.val_at(1)?,
                max_priority_fee_per_gas: rlp.val_at(2)?,
                max_fee_per_gas: rlp.val_at(3)?,
                gas: rlp.val_at(4)?,
                to: rlp.val_at(5)?,
                value: rlp.val_at(6)?,
                data: rlp.val_at(7)?,
                access_list: rlp.list_at(8)?,
                max_fee_per_blob_gas: rlp.val_at(9)?,
                blob_versioned_hashes: rlp.list_at(10)?,
            }),
            TxType::SetCode => Transaction::SetCode(SetCodeTx {
                chain_id: rlp.val_at(0)?,
                nonce: rlp.val_at(1)?,
                max_priority_fee_per_gas: rlp.val_at(2)?,
                max_fee_per_gas: rlp.val_at(3)?,
                gas: rlp.val_at(4)?,
                to: rlp.val_at(5)?,
                value: rlp.val_at(6)?,
                data: rlp.val_at(7)?,
                access_list: rlp.list_at(8)?,
                authorization_list: rlp.list_at(9)?,
            }),
        };
        Ok(tx)
    }

    /// The digest signed by the sender. `legacy_chain_id` selects EIP-155 replay protection
    /// for legacy transactions and is ignored for typed ones.
    pub fn signing_hash(&self, legacy_chain_id: Option<u64>) -> Hash256 {
        match (self, legacy_chain_id) {
            (Transaction::Legacy(_), Some(chain_id)) => {
                let mut s = RlpStream::new_list(self.field_count() + 3);
                self.append_fields(&mut s);
                s.append(&chain_id);
                s.append(&0u8);
                s.append(&0u8);
                keccak256(&s.out())
            }
            (Transaction::Legacy(_), None) => {
                let mut s = RlpStream::new_list(self.field_count());
                self.append_fields(&mut s);
                keccak256(&s.out())
            }
            _ => {
                let mut s = RlpStream::new_list(self.field_count());
                self.append_fields(&mut s);
                let mut preimage = vec![self.tx_type().as_u8()];
                preimage.extend_from_slice(&s.out());
                keccak256(&preimage)
            }
        }
    }
}

/// Signs transactions the way a chain at a particular fork expects them.
///
/// Before Spurious Dragon legacy transactions carry no chain id (`v` is 27 or 28); afterwards
/// EIP-155 folds the chain id into `v`. Typed transactions always take their chain id from the
/// signer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signer {
    pub chain_id: u64,
    pub eip155: bool,
}

impl Signer {
    pub fn new(chain_id: u64, eip155: bool) -> Self {
        Self { chain_id, eip155 }
    }

    pub fn sign(
        &self,
        mut transaction: Transaction,
        key: &PrivateKey,
    ) -> Result<SignedTransaction, Error> {
        transaction.set_chain_id(self.chain_id);
        let legacy_chain_id = self.eip155.then_some(self.chain_id);
        let raw = key.sign_hash(transaction.signing_hash(legacy_chain_id))?;

        let v = match (&transaction, legacy_chain_id) {
            (Transaction::Legacy(_), Some(chain_id)) => {
                chain_id * 2 + 35 + u64::from(raw.recovery_id)
            }
            (Transaction::Legacy(_), None) => 27 + u64::from(raw.recovery_id),
            _ => u64::from(raw.recovery_id),
        };
        Ok(SignedTransaction::new(transaction, v, raw.r, raw.s))
    }
}

/// A signed transaction together with its hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub transaction: Transaction,
    pub v: u64,
    pub r: Uint256,
    pub s: Uint256,
    hash: Hash256,
}

impl SignedTransaction {
    pub fn new(transaction: Transaction, v: u64, r: Uint256, s: Uint256) -> Self {
        let mut signed = SignedTransaction {
            transaction,
            v,
            r,
            s,
            hash: Hash256::zero(),
        };
        signed.hash = keccak256(&signed.encoded_2718());
        signed
    }

    pub fn hash(&self) -> Hash256 {
        self.hash
    }

    pub fn tx_type(&self) -> TxType {
        self.transaction.tx_type()
    }

    /// Chain id folded into `v` of an EIP-155 legacy transaction.
    pub fn legacy_chain_id(&self) -> Option<u64> {
        match self.transaction {
            Transaction::Legacy(_) if self.v >= 35 => Some((self.v - 35) / 2),
            _ => None,
        }
    }

    fn recovery_id(&self) -> Result<u8, Error> {
        let id = match self.transaction {
            Transaction::Legacy(_) if self.v >= 35 => (self.v - 35) % 2,
            Transaction::Legacy(_) if self.v == 27 || self.v == 28 => self.v - 27,
            Transaction::Legacy(_) => {
                return Err(Error::InvalidSignature(format!("legacy v {}", self.v)))
            }
            _ if self.v <= 1 => self.v,
            _ => return Err(Error::InvalidSignature(format!("y parity {}", self.v))),
        };
        Ok(id as u8)
    }

    /// Recovers the sender address from the signature.
    pub fn sender(&self) -> Result<Address, Error> {
        let hash = self.transaction.signing_hash(self.legacy_chain_id());
        recover_address(
            hash,
            &RawSignature {
                recovery_id: self.recovery_id()?,
                r: self.r,
                s: self.s,
            },
        )
    }

    /// Consensus encoding: an RLP list for legacy transactions, `type || rlp(fields)` for
    /// typed ones. This is the form that goes into the transactions trie and engine payloads.
    pub fn encoded_2718(&self) -> Vec<u8> {
        let mut s = RlpStream::new_list(self.transaction.field_count() + 3);
        self.transaction.append_fields(&mut s);
        s.append(&self.v);
        s.append(&self.r);
        s.append(&self.s);
        match self.transaction {
            Transaction::Legacy(_) => s.out().to_vec(),
            _ => {
                let mut out = vec![self.tx_type().as_u8()];
                out.extend_from_slice(&s.out());
                out
            }
        }
    }

    pub fn decode_2718(bytes: &[u8]) -> Result<Self, Error> {
        let first = *bytes.first().ok_or(Error::EmptyTransaction)?;
        let (tx_type, payload) = if first >= 0xc0 {
            (TxType::Legacy, bytes)
        } else {
            (TxType::from_u8(first)?, &bytes[1..])
        };

        let rlp = Rlp::new(payload);
        let info = rlp.payload_info()?;
        if info.header_len + info.value_len != payload.len() {
            return Err(Error::TrailingBytes {
                offset: info.header_len + info.value_len,
            });
        }
        Self::decode_signed(tx_type, &rlp).map_err(Into::into)
    }

    fn decode_signed(tx_type: TxType, rlp: &Rlp) -> Result<Self, DecoderError> {
        let transaction = Transaction::decode_fields(tx_type, rlp)?;
        let n = transaction.field_count();
        if rlp.item_count()? != n + 3 {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        Ok(SignedTransaction::new(
            transaction,
            rlp.val_at(n)?,
            rlp.val_at(n + 1)?,
            rlp.val_at(n + 2)?,
        ))
    }
}

/// Block-body encoding: legacy transactions are embedded as lists, typed transactions as byte
/// strings holding their EIP-2718 envelope.
impl Encodable for SignedTransaction {
    fn rlp_append(&self, s: &mut RlpStream) {
        let encoded = self.encoded_2718();
        match self.transaction {
            Transaction::Legacy(_) => s.append_raw(&encoded, 1),
            _ => s.append(&encoded),
        };
    }
}

impl Decodable for SignedTransaction {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        if rlp.is_list() {
            return Self::decode_signed(TxType::Legacy, rlp);
        }
        let envelope = rlp.data()?;
        if envelope.first().map_or(true, |b| *b >= 0xc0) {
            return Err(DecoderError::Custom("invalid typed transaction envelope"));
        }
        SignedTransaction::decode_2718(envelope)
            .map_err(|_| DecoderError::Custom("invalid typed transaction"))
    }
}
