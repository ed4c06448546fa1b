use crate::{ordered_trie_root, Address, Hash256};
use ethers_core::utils::rlp::{self, Decodable, DecoderError, Encodable, Rlp, RlpStream};

/// A beacon-chain withdrawal credited to an execution address. `amount` is in gwei.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Withdrawal {
    pub index: u64,
    pub validator_index: u64,
    pub address: Address,
    pub amount: u64,
}

impl Withdrawal {
    pub fn root(withdrawals: &[Withdrawal]) -> Hash256 {
        ordered_trie_root(withdrawals.iter().map(|w| rlp::encode(w).to_vec()))
    }
}

impl Encodable for Withdrawal {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(4);
        s.append(&self.index);
        s.append(&self.validator_index);
        s.append(&self.address);
        s.append(&self.amount);
    }
}

impl Decodable for Withdrawal {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        if rlp.item_count()? != 4 {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        Ok(Withdrawal {
            index: rlp.val_at(0)?,
            validator_index: rlp.val_at(1)?,
            address: rlp.val_at(2)?,
            amount: rlp.val_at(3)?,
        })
    }
}
