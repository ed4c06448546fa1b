use crate::{Error, Hash256, Header, SignedTransaction, Withdrawal};
use ethers_core::utils::rlp::{self, Decodable, DecoderError, Encodable, Rlp, RlpStream};

/// A full block as exported to `chain.rlp`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Block {
    pub header: Header,
    pub transactions: Vec<SignedTransaction>,
    pub uncles: Vec<Header>,
    /// Present from Shanghai onwards, possibly empty.
    pub withdrawals: Option<Vec<Withdrawal>>,
}

impl Block {
    pub fn hash(&self) -> Hash256 {
        self.header.hash()
    }

    pub fn number(&self) -> u64 {
        self.header.number
    }

    pub fn rlp_bytes(&self) -> Vec<u8> {
        rlp::encode(self).to_vec()
    }
}

impl Encodable for Block {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(if self.withdrawals.is_some() { 4 } else { 3 });
        s.append(&self.header);
        s.append_list(&self.transactions);
        s.append_list(&self.uncles);
        if let Some(withdrawals) = &self.withdrawals {
            s.append_list(withdrawals);
        }
    }
}

impl Decodable for Block {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        let count = rlp.item_count()?;
        if !(3..=4).contains(&count) {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        Ok(Block {
            header: rlp.val_at(0)?,
            transactions: rlp.list_at(1)?,
            uncles: rlp.list_at(2)?,
            withdrawals: (count == 4).then(|| rlp.list_at(3)).transpose()?,
        })
    }
}

/// Concatenates the RLP encodings of `blocks`, the format `geth import` reads.
pub fn encode_chain<'a>(blocks: impl IntoIterator<Item = &'a Block>) -> Vec<u8> {
    blocks
        .into_iter()
        .flat_map(|block| block.rlp_bytes())
        .collect()
}

/// Splits a concatenation of RLP-encoded blocks.
pub fn decode_chain(mut bytes: &[u8]) -> Result<Vec<Block>, Error> {
    let mut blocks = vec![];
    let mut offset = 0;
    while !bytes.is_empty() {
        let info = Rlp::new(bytes).payload_info()?;
        let len = info.header_len + info.value_len;
        if len > bytes.len() {
            return Err(Error::TrailingBytes { offset });
        }
        blocks.push(rlp::decode(&bytes[..len])?);
        bytes = &bytes[len..];
        offset += len;
    }
    Ok(blocks)
}
