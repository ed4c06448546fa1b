use crate::serde_helpers::opt_u64_hex;
use crate::{empty_ommers_hash, keccak256, Address, Bloom, Hash256, Hash64, Uint256};
use ethers_core::utils::rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};
use serde::{Deserialize, Serialize};

/// Number of header fields before the first fork-gated (optional) field.
const BASE_FIELD_COUNT: usize = 15;

/// Execution block header as used for RLP encoding and Keccak hashing.
///
/// Trailing optional fields are fork-gated and must be contiguous: a field may only be present
/// when every optional field before it is present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Header {
    pub parent_hash: Hash256,
    #[serde(rename = "sha3Uncles")]
    pub ommers_hash: Hash256,
    #[serde(rename = "miner")]
    pub beneficiary: Address,
    pub state_root: Hash256,
    pub transactions_root: Hash256,
    pub receipts_root: Hash256,
    pub logs_bloom: Bloom,
    pub difficulty: Uint256,
    #[serde(with = "serde_utils::u64_hex_be")]
    pub number: u64,
    #[serde(with = "serde_utils::u64_hex_be")]
    pub gas_limit: u64,
    #[serde(with = "serde_utils::u64_hex_be")]
    pub gas_used: u64,
    #[serde(with = "serde_utils::u64_hex_be")]
    pub timestamp: u64,
    #[serde(with = "serde_utils::hex_vec")]
    pub extra_data: Vec<u8>,
    pub mix_hash: Hash256,
    pub nonce: Hash64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_fee_per_gas: Option<Uint256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub withdrawals_root: Option<Hash256>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "opt_u64_hex")]
    pub blob_gas_used: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "opt_u64_hex")]
    pub excess_blob_gas: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_beacon_block_root: Option<Hash256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests_hash: Option<Hash256>,
}

impl Default for Header {
    fn default() -> Self {
        Header {
            parent_hash: Hash256::zero(),
            ommers_hash: empty_ommers_hash(),
            beneficiary: Address::zero(),
            state_root: Hash256::zero(),
            transactions_root: crate::empty_trie_root(),
            receipts_root: crate::empty_trie_root(),
            logs_bloom: Bloom::zero(),
            difficulty: Uint256::zero(),
            number: 0,
            gas_limit: 0,
            gas_used: 0,
            timestamp: 0,
            extra_data: vec![],
            mix_hash: Hash256::zero(),
            nonce: Hash64::zero(),
            base_fee_per_gas: None,
            withdrawals_root: None,
            blob_gas_used: None,
            excess_blob_gas: None,
            parent_beacon_block_root: None,
            requests_hash: None,
        }
    }
}

impl Header {
    pub fn rlp_bytes(&self) -> Vec<u8> {
        let mut stream = RlpStream::new();
        stream.append(self);
        stream.out().to_vec()
    }

    pub fn hash(&self) -> Hash256 {
        keccak256(&self.rlp_bytes())
    }

    /// The hash used for clique sealing: the header with the trailing 65-byte seal removed
    /// from `extra_data`.
    pub fn seal_hash(&self, seal_len: usize) -> Hash256 {
        let mut unsealed = self.clone();
        let keep = unsealed.extra_data.len().saturating_sub(seal_len);
        unsealed.extra_data.truncate(keep);
        unsealed.hash()
    }

    fn optional_field_count(&self) -> usize {
        let present = [
            self.base_fee_per_gas.is_some(),
            self.withdrawals_root.is_some(),
            self.blob_gas_used.is_some(),
            self.excess_blob_gas.is_some(),
            self.parent_beacon_block_root.is_some(),
            self.requests_hash.is_some(),
        ];
        present.iter().take_while(|p| **p).count()
    }
}

impl Encodable for Header {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(BASE_FIELD_COUNT + self.optional_field_count());
        s.append(&self.parent_hash);
        s.append(&self.ommers_hash);
        s.append(&self.beneficiary);
        s.append(&self.state_root);
        s.append(&self.transactions_root);
        s.append(&self.receipts_root);
        s.append(&self.logs_bloom);
        s.append(&self.difficulty);
        s.append(&self.number);
        s.append(&self.gas_limit);
        s.append(&self.gas_used);
        s.append(&self.timestamp);
        s.append(&self.extra_data);
        s.append(&self.mix_hash);
        s.append(&self.nonce);

        let optional = self.optional_field_count();
        if let (Some(base_fee), true) = (&self.base_fee_per_gas, optional > 0) {
            s.append(base_fee);
        }
        if let (Some(root), true) = (&self.withdrawals_root, optional > 1) {
            s.append(root);
        }
        if let (Some(used), true) = (&self.blob_gas_used, optional > 2) {
            s.append(used);
        }
        if let (Some(excess), true) = (&self.excess_blob_gas, optional > 3) {
            s.append(excess);
        }
        if let (Some(root), true) = (&self.parent_beacon_block_root, optional > 4) {
            s.append(root);
        }
        if let (Some(hash), true) = (&self.requests_hash, optional > 5) {
            s.append(hash);
        }
    }
}

impl Decodable for Header {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        let count = rlp.item_count()?;
        if !(BASE_FIELD_COUNT..=BASE_FIELD_COUNT + 6).contains(&count) {
            return Err(DecoderError::RlpIncorrectListLen);
        }
        let optional = |i: usize| -> bool { count > BASE_FIELD_COUNT + i };

        Ok(Header {
            parent_hash: rlp.val_at(0)?,
            ommers_hash: rlp.val_at(1)?,
            beneficiary: rlp.val_at(2)?,
            state_root: rlp.val_at(3)?,
            transactions_root: rlp.val_at(4)?,
            receipts_root: rlp.val_at(5)?,
            logs_bloom: rlp.val_at(6)?,
            difficulty: rlp.val_at(7)?,
            number: rlp.val_at(8)?,
            gas_limit: rlp.val_at(9)?,
            gas_used: rlp.val_at(10)?,
            timestamp: rlp.val_at(11)?,
            extra_data: rlp.val_at(12)?,
            mix_hash: rlp.val_at(13)?,
            nonce: rlp.val_at(14)?,
            base_fee_per_gas: optional(0).then(|| rlp.val_at(15)).transpose()?,
            withdrawals_root: optional(1).then(|| rlp.val_at(16)).transpose()?,
            blob_gas_used: optional(2).then(|| rlp.val_at(17)).transpose()?,
            excess_blob_gas: optional(3).then(|| rlp.val_at(18)).transpose()?,
            parent_beacon_block_root: optional(4).then(|| rlp.val_at(19)).transpose()?,
            requests_hash: optional(5).then(|| rlp.val_at(20)).transpose()?,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use ethers_core::utils::rlp;
    use std::str::FromStr;

    fn test_rlp_encoding(header: &Header, expected_rlp: &str, expected_hash: Hash256) {
        let rlp_encoding = header.rlp_bytes();

        let computed_rlp = hex::encode(&rlp_encoding);
        assert_eq!(expected_rlp, computed_rlp);

        assert_eq!(expected_hash, header.hash());

        let decoded: Header = rlp::decode(&rlp_encoding).unwrap();
        assert_eq!(&decoded, header);
    }

    #[test]
    fn test_rlp_encode_eip1559_block() {
        let header = Header {
            parent_hash: Hash256::from_str("e0a94a7a3c9617401586b1a27025d2d9671332d22d540e0af72b069170380f2a").unwrap(),
            ommers_hash: Hash256::from_str("1dcc4de8dec75d7aab85b567b6ccd41ad312451b948a7413f0a142fd40d49347").unwrap(),
            beneficiary: Address::from_str("ba5e000000000000000000000000000000000000").unwrap(),
            state_root: Hash256::from_str("ec3c94b18b8a1cff7d60f8d258ec723312932928626b4c9355eb4ab3568ec7f7").unwrap(),
            transactions_root: Hash256::from_str("50f738580ed699f0469702c7ccc63ed2e51bc034be9479b7bff4e68dee84accf").unwrap(),
            receipts_root: Hash256::from_str("29b0562f7140574dd0d50dee8a271b22e1a0a7b78fca58f7c60370d8317ba2a9").unwrap(),
            logs_bloom: Bloom::zero(),
            difficulty: 0x020000.into(),
            number: 0x01,
            gas_limit: 0x016345785d8a0000,
            gas_used: 0x015534,
            timestamp: 0x079e,
            extra_data: vec![0x42],
            mix_hash: Hash256::zero(),
            nonce: Hash64::zero(),
            base_fee_per_gas: Some(0x036b.into()),
            ..Header::default()
        };
        let expected_rlp = "f90200a0e0a94a7a3c9617401586b1a27025d2d9671332d22d540e0af72b069170380f2aa01dcc4de8dec75d7aab85b567b6ccd41ad312451b948a7413f0a142fd40d4934794ba5e000000000000000000000000000000000000a0ec3c94b18b8a1cff7d60f8d258ec723312932928626b4c9355eb4ab3568ec7f7a050f738580ed699f0469702c7ccc63ed2e51bc034be9479b7bff4e68dee84accfa029b0562f7140574dd0d50dee8a271b22e1a0a7b78fca58f7c60370d8317ba2a9b9010000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000830200000188016345785d8a00008301553482079e42a0000000000000000000000000000000000000000000000000000000000000000088000000000000000082036b";
        let expected_hash =
            Hash256::from_str("6a251c7c3c5dca7b42407a3752ff48f3bbca1fab7f9868371d9918daf1988d1f")
                .unwrap();
        test_rlp_encoding(&header, expected_rlp, expected_hash);
    }

    #[test]
    fn test_rlp_encode_merge_block() {
        let header = Header {
            parent_hash: Hash256::from_str("927ca537f06c783a3a2635b8805eef1c8c2124f7444ad4a3389898dd832f2dbe").unwrap(),
            ommers_hash: Hash256::from_str("1dcc4de8dec75d7aab85b567b6ccd41ad312451b948a7413f0a142fd40d49347").unwrap(),
            beneficiary: Address::from_str("ba5e000000000000000000000000000000000000").unwrap(),
            state_root: Hash256::from_str("0xe97859b065bd8dbbb4519c7cb935024de2484c2b7f881181b4360492f0b06b82").unwrap(),
            transactions_root: Hash256::from_str("50f738580ed699f0469702c7ccc63ed2e51bc034be9479b7bff4e68dee84accf").unwrap(),
            receipts_root: Hash256::from_str("29b0562f7140574dd0d50dee8a271b22e1a0a7b78fca58f7c60370d8317ba2a9").unwrap(),
            logs_bloom: Bloom::zero(),
            difficulty: 0x00.into(),
            number: 0x01,
            gas_limit: 0x016345785d8a0000,
            gas_used: 0x015534,
            timestamp: 0x079e,
            extra_data: vec![0x42],
            mix_hash: Hash256::from_str("0000000000000000000000000000000000000000000000000000000000020000").unwrap(),
            nonce: Hash64::zero(),
            base_fee_per_gas: Some(0x036b.into()),
            ..Header::default()
        };
        let expected_rlp = "f901fda0927ca537f06c783a3a2635b8805eef1c8c2124f7444ad4a3389898dd832f2dbea01dcc4de8dec75d7aab85b567b6ccd41ad312451b948a7413f0a142fd40d4934794ba5e000000000000000000000000000000000000a0e97859b065bd8dbbb4519c7cb935024de2484c2b7f881181b4360492f0b06b82a050f738580ed699f0469702c7ccc63ed2e51bc034be9479b7bff4e68dee84accfa029b0562f7140574dd0d50dee8a271b22e1a0a7b78fca58f7c60370d8317ba2a9b9010000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000800188016345785d8a00008301553482079e42a0000000000000000000000000000000000000000000000000000000000002000088000000000000000082036b";
        let expected_hash =
            Hash256::from_str("0x5b1f0f2efdaa19e996b4aea59eeb67620259f09732732a339a10dac311333684")
                .unwrap();
        test_rlp_encoding(&header, expected_rlp, expected_hash);
    }

    #[test]
    fn gapped_optional_fields_are_truncated() {
        let header = Header {
            base_fee_per_gas: None,
            withdrawals_root: Some(Hash256::repeat_byte(1)),
            ..Header::default()
        };
        let decoded: Header = rlp::decode(&header.rlp_bytes()).unwrap();
        assert_eq!(decoded.withdrawals_root, None);
    }

    #[test]
    fn prague_header_round_trip() {
        let header = Header {
            number: 42,
            base_fee_per_gas: Some(7.into()),
            withdrawals_root: Some(Hash256::repeat_byte(1)),
            blob_gas_used: Some(0),
            excess_blob_gas: Some(0),
            parent_beacon_block_root: Some(Hash256::repeat_byte(2)),
            requests_hash: Some(Hash256::repeat_byte(3)),
            ..Header::default()
        };
        let decoded: Header = rlp::decode(&header.rlp_bytes()).unwrap();
        assert_eq!(decoded, header);

        let json = serde_json::to_value(&header).unwrap();
        assert_eq!(json["number"], "0x2a");
        assert_eq!(json["blobGasUsed"], "0x0");
        let from_json: Header = serde_json::from_value(json).unwrap();
        assert_eq!(from_json, header);
    }
}
