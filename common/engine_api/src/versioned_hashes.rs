use std::collections::HashSet;
use types::{Hash256, SignedTransaction};

#[derive(Debug)]
pub enum Error {
    DecodingTransaction(types::Error),
    LengthMismatch { expected: usize, found: usize },
    MissingHash(Hash256),
}

/// Checks that `expected_versioned_hashes` lists exactly the blob hashes of the payload's
/// transactions.
pub fn verify_versioned_hashes(
    transactions: &[Vec<u8>],
    expected_versioned_hashes: &[Hash256],
) -> Result<(), Error> {
    let versioned_hashes: HashSet<Hash256> =
        get_versioned_hashes(transactions)?.into_iter().collect();
    // ensure that all expected hashes are present
    for expected_hash in expected_versioned_hashes {
        if !versioned_hashes.contains(expected_hash) {
            return Err(Error::MissingHash(*expected_hash));
        }
    }
    // ensure that there are no extra hashes
    if versioned_hashes.len() != expected_versioned_hashes.len() {
        return Err(Error::LengthMismatch {
            expected: expected_versioned_hashes.len(),
            found: versioned_hashes.len(),
        });
    }
    Ok(())
}

/// Blob versioned hashes of all transactions, in transaction order.
pub fn get_versioned_hashes(transactions: &[Vec<u8>]) -> Result<Vec<Hash256>, Error> {
    Ok(transactions
        .iter()
        .map(|bytes| SignedTransaction::decode_2718(bytes).map_err(Error::DecodingTransaction))
        .collect::<Result<Vec<_>, _>>()?
        .iter()
        .flat_map(|tx| tx.transaction.blob_versioned_hashes().to_vec())
        .collect())
}

#[cfg(test)]
mod test {
    use super::*;
    use types::{Address, BlobTx, LegacyTx, PrivateKey, Signer, Transaction};

    fn encoded(tx: Transaction) -> Vec<u8> {
        let key = PrivateKey::from_hex(
            "4552dbe6ca4699322b5d923d0c9bcdd24644f5db8bf89a085b67c6c49b8a1b91",
        )
        .unwrap();
        Signer::new(1, true).sign(tx, &key).unwrap().encoded_2718()
    }

    #[test]
    fn collects_blob_hashes() {
        let transactions = vec![
            encoded(Transaction::Legacy(LegacyTx {
                gas: 21000,
                to: Some(Address::repeat_byte(1)),
                ..Default::default()
            })),
            encoded(Transaction::Blob(BlobTx {
                gas: 21000,
                blob_versioned_hashes: vec![Hash256::repeat_byte(1), Hash256::repeat_byte(2)],
                ..Default::default()
            })),
        ];
        let hashes = get_versioned_hashes(&transactions).unwrap();
        assert_eq!(hashes, vec![Hash256::repeat_byte(1), Hash256::repeat_byte(2)]);

        verify_versioned_hashes(&transactions, &hashes).unwrap();
        assert!(matches!(
            verify_versioned_hashes(&transactions, &[Hash256::repeat_byte(1)]),
            Err(Error::LengthMismatch { .. })
        ));
        assert!(matches!(
            verify_versioned_hashes(&transactions, &[Hash256::repeat_byte(1), Hash256::zero()]),
            Err(Error::MissingHash(_))
        ));
    }

    #[test]
    fn garbage_transaction() {
        assert!(get_versioned_hashes(&[vec![0x09, 0x01]]).is_err());
    }
}
