use crate::{Error, ExecutionPayload, Hash256, Header, NewPayloadRequest};
use sha2::{Digest, Sha256};
use types::{empty_ommers_hash, ordered_trie_root, Hash64, Uint256, Withdrawal};

/// EIP-7685 commitment over execution requests. Each entry is `type || data`; entries with no
/// data are skipped.
pub fn requests_hash(requests: &[Vec<u8>]) -> Hash256 {
    let mut outer = Sha256::new();
    for request in requests.iter().filter(|r| r.len() > 1) {
        outer.update(Sha256::digest(request));
    }
    Hash256::from_slice(&outer.finalize())
}

impl ExecutionPayload {
    /// Reconstructs the block header committed to by this payload.
    pub fn to_header(
        &self,
        parent_beacon_block_root: Option<Hash256>,
        requests_hash: Option<Hash256>,
    ) -> Header {
        Header {
            parent_hash: self.parent_hash,
            ommers_hash: empty_ommers_hash(),
            beneficiary: self.fee_recipient,
            state_root: self.state_root,
            transactions_root: ordered_trie_root(&self.transactions),
            receipts_root: self.receipts_root,
            logs_bloom: self.logs_bloom,
            difficulty: Uint256::zero(),
            number: self.block_number,
            gas_limit: self.gas_limit,
            gas_used: self.gas_used,
            timestamp: self.timestamp,
            extra_data: self.extra_data.clone(),
            mix_hash: self.prev_randao,
            nonce: Hash64::zero(),
            base_fee_per_gas: Some(self.base_fee_per_gas),
            withdrawals_root: self
                .withdrawals_list()
                .map(|ws: Vec<Withdrawal>| Withdrawal::root(&ws)),
            blob_gas_used: self.blob_gas_used,
            excess_blob_gas: self.excess_blob_gas,
            parent_beacon_block_root,
            requests_hash,
        }
    }
}

/// Computes the block hash of `payload` from its contents, ignoring `payload.block_hash`.
pub fn calculate_execution_block_hash(
    payload: &ExecutionPayload,
    parent_beacon_block_root: Option<Hash256>,
    execution_requests: Option<&[Vec<u8>]>,
) -> Hash256 {
    payload
        .to_header(
            parent_beacon_block_root,
            execution_requests.map(requests_hash),
        )
        .hash()
}

pub fn verify_payload_block_hash(request: &NewPayloadRequest) -> Result<(), Error> {
    let computed = calculate_execution_block_hash(
        &request.execution_payload,
        request.parent_beacon_block_root,
        request.execution_requests.as_deref(),
    );
    if computed != request.execution_payload.block_hash {
        return Err(Error::BlockHashMismatch {
            computed,
            payload: request.execution_payload.block_hash,
        });
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use std::str::FromStr;
    use types::{Address, Block};

    #[test]
    fn empty_requests_hash() {
        // sha256 of the empty string.
        assert_eq!(
            requests_hash(&[]),
            Hash256::from_str("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")
                .unwrap()
        );
        // Requests without data do not contribute.
        assert_eq!(requests_hash(&[vec![0x00], vec![0x01]]), requests_hash(&[]));
        assert_ne!(requests_hash(&[vec![0x01, 0x02]]), requests_hash(&[]));
    }

    #[test]
    fn payload_hash_matches_block() {
        let block = Block {
            header: Header {
                number: 7,
                gas_limit: 30_000_000,
                timestamp: 70,
                beneficiary: Address::repeat_byte(3),
                mix_hash: Hash256::repeat_byte(9),
                base_fee_per_gas: Some(875_000_000u64.into()),
                withdrawals_root: Some(Withdrawal::root(&[])),
                blob_gas_used: Some(0),
                excess_blob_gas: Some(0),
                parent_beacon_block_root: Some(Hash256::repeat_byte(1)),
                requests_hash: Some(requests_hash(&[])),
                ..Header::default()
            },
            withdrawals: Some(vec![]),
            ..Block::default()
        };

        let payload = ExecutionPayload::from_block(&block);
        let request = NewPayloadRequest {
            execution_payload: payload.clone(),
            versioned_hashes: vec![],
            parent_beacon_block_root: Some(Hash256::repeat_byte(1)),
            execution_requests: Some(vec![]),
        };
        verify_payload_block_hash(&request).unwrap();

        let mut tampered = request;
        tampered.execution_payload.gas_used += 1;
        assert!(matches!(
            verify_payload_block_hash(&tampered),
            Err(Error::BlockHashMismatch { .. })
        ));
    }
}
