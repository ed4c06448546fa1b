use crate::{keccak256, Address, Bloom, Hash256, TxType};
use ethers_core::utils::rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Log {
    pub address: Address,
    pub topics: Vec<Hash256>,
    pub data: Vec<u8>,
}

impl Encodable for Log {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(3);
        s.append(&self.address);
        s.append_list(&self.topics);
        s.append(&self.data);
    }
}

impl Decodable for Log {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        Ok(Log {
            address: rlp.val_at(0)?,
            topics: rlp.list_at(1)?,
            data: rlp.val_at(2)?,
        })
    }
}

/// Pre-Byzantium receipts commit to the intermediate state root, later ones to a status flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptOutcome {
    StateRoot(Hash256),
    Status(bool),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub tx_type: TxType,
    pub outcome: ReceiptOutcome,
    pub cumulative_gas_used: u64,
    pub logs_bloom: Bloom,
    pub logs: Vec<Log>,
}

impl Receipt {
    pub fn new(tx_type: TxType, outcome: ReceiptOutcome, cumulative_gas_used: u64, logs: Vec<Log>) -> Self {
        Self {
            tx_type,
            outcome,
            cumulative_gas_used,
            logs_bloom: logs_bloom(&logs),
            logs,
        }
    }

    /// Consensus encoding as committed to by the receipts trie.
    pub fn encoded_2718(&self) -> Vec<u8> {
        let mut s = RlpStream::new_list(4);
        match self.outcome {
            ReceiptOutcome::StateRoot(root) => s.append(&root),
            ReceiptOutcome::Status(success) => s.append(&u8::from(success)),
        };
        s.append(&self.cumulative_gas_used);
        s.append(&self.logs_bloom);
        s.append_list(&self.logs);

        match self.tx_type {
            TxType::Legacy => s.out().to_vec(),
            tx_type => {
                let mut out = vec![tx_type.as_u8()];
                out.extend_from_slice(&s.out());
                out
            }
        }
    }
}

pub fn logs_bloom(logs: &[Log]) -> Bloom {
    let mut bloom = Bloom::zero();
    for log in logs {
        accrue(&mut bloom, log.address.as_bytes());
        for topic in &log.topics {
            accrue(&mut bloom, topic.as_bytes());
        }
    }
    bloom
}

/// Sets the three bits selected by the low 11 bits of the first three byte pairs of
/// `keccak(input)`.
fn accrue(bloom: &mut Bloom, input: &[u8]) {
    let hash = keccak256(input);
    for pair in hash.as_bytes()[..6].chunks(2) {
        let bit = (usize::from(pair[0]) << 8 | usize::from(pair[1])) & 2047;
        bloom.0[255 - bit / 8] |= 1 << (bit % 8);
    }
}

/// True when every bit `input` would set is present in `bloom`.
pub fn bloom_contains(bloom: &Bloom, input: &[u8]) -> bool {
    let mut single = Bloom::zero();
    accrue(&mut single, input);
    single.0.iter().zip(bloom.0.iter()).all(|(a, b)| a & b == *a)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_bloom_for_no_logs() {
        assert_eq!(logs_bloom(&[]), Bloom::zero());
    }

    #[test]
    fn bloom_contains_address_and_topics() {
        let log = Log {
            address: Address::repeat_byte(0x11),
            topics: vec![Hash256::repeat_byte(0x22)],
            data: vec![1, 2, 3],
        };
        let bloom = logs_bloom(&[log.clone()]);
        assert!(bloom_contains(&bloom, log.address.as_bytes()));
        assert!(bloom_contains(&bloom, log.topics[0].as_bytes()));
        assert!(!bloom_contains(&bloom, &[0x33; 20]));
        assert!(bloom.0.iter().map(|b| b.count_ones()).sum::<u32>() <= 6);
    }

    #[test]
    fn typed_receipts_are_prefixed() {
        let legacy = Receipt::new(TxType::Legacy, ReceiptOutcome::Status(true), 21000, vec![]);
        let dynamic = Receipt::new(TxType::DynamicFee, ReceiptOutcome::Status(true), 21000, vec![]);
        assert!(legacy.encoded_2718()[0] >= 0xc0);
        assert_eq!(dynamic.encoded_2718()[0], 2);
        assert_eq!(&dynamic.encoded_2718()[1..], &legacy.encoded_2718()[..]);
    }

    #[test]
    fn failed_status_encodes_empty() {
        let receipt = Receipt::new(TxType::Legacy, ReceiptOutcome::Status(false), 0, vec![]);
        let encoded = receipt.encoded_2718();
        let rlp = Rlp::new(&encoded);
        assert!(rlp.at(0).unwrap().is_empty());
    }
}
