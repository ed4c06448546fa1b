use crate::{Address, Hash256};
use ethers_core::utils::rlp::RlpStream;
use hash256_std_hasher::Hash256StdHasher;
use hash_db::Hasher;
use tiny_keccak::{Hasher as _, Keccak};

/// Hash of empty code, `keccak256("")`.
pub fn keccak_empty() -> Hash256 {
    Hash256::from(keccak_hash::KECCAK_EMPTY.to_fixed_bytes())
}

/// Root of an empty Merkle-Patricia trie, `keccak256(rlp(""))`.
pub fn empty_trie_root() -> Hash256 {
    Hash256::from(keccak_hash::KECCAK_NULL_RLP.to_fixed_bytes())
}

/// Ommers hash of a block without uncles, `keccak256(rlp([]))`.
pub fn empty_ommers_hash() -> Hash256 {
    Hash256::from(keccak_hash::KECCAK_EMPTY_LIST_RLP.to_fixed_bytes())
}

pub fn keccak256(bytes: &[u8]) -> Hash256 {
    let mut keccak = Keccak::v256();
    keccak.update(bytes);
    let mut out = [0u8; 32];
    keccak.finalize(&mut out);
    Hash256::from(out)
}

// Keccak hasher
//
// Based on:
// https://github.com/paritytech/trie/blob/b76c9db35c2bb1b00e60c74a25f386c32ea1933d/test-support/keccak-hasher/src/lib.rs#L24-L41
#[derive(Default, Debug, Clone, PartialEq)]
pub struct KeccakHasher;

impl Hasher for KeccakHasher {
    type Out = Hash256;
    type StdHasher = Hash256StdHasher;

    const LENGTH: usize = 32;

    fn hash(x: &[u8]) -> Self::Out {
        keccak256(x)
    }
}

/// Root of a trie keyed by the RLP-encoded index of each item (transactions, receipts,
/// withdrawals).
pub fn ordered_trie_root<I, A>(items: I) -> Hash256
where
    I: IntoIterator<Item = A>,
    A: AsRef<[u8]>,
{
    triehash::ordered_trie_root::<KeccakHasher, _>(items)
}

/// Root of a trie whose keys are hashed before insertion (account and storage tries).
pub fn sec_trie_root<I, A, B>(items: I) -> Hash256
where
    I: IntoIterator<Item = (A, B)>,
    A: AsRef<[u8]>,
    B: AsRef<[u8]>,
{
    triehash::sec_trie_root::<KeccakHasher, _, _, _>(items)
}

/// Address of a contract created by `sender` with the given account nonce.
pub fn create_address(sender: Address, nonce: u64) -> Address {
    let mut stream = RlpStream::new_list(2);
    stream.append(&sender);
    stream.append(&nonce);
    let hash = keccak256(&stream.out());
    Address::from_slice(&hash.as_bytes()[12..])
}

#[cfg(test)]
mod test {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn empty_roots() {
        let empty: Vec<Vec<u8>> = vec![];
        assert_eq!(ordered_trie_root(empty), empty_trie_root());
        assert_eq!(keccak256(&[0xc0]), empty_ommers_hash());
        assert_eq!(keccak256(&[]), keccak_empty());
        assert_eq!(keccak256(&[0x80]), empty_trie_root());
    }

    #[test]
    fn contract_address() {
        let sender = Address::from_str("6ac7ea33f8831ea9dcc53393aaa88b25a785dbf0").unwrap();
        assert_eq!(
            create_address(sender, 0),
            Address::from_str("cd234a471b72ba2f1ccf0a70fcaba648a5eecd8d").unwrap()
        );
        assert_eq!(
            create_address(sender, 1),
            Address::from_str("343c43a37d37dff08ae8c4a11544c718abb4fcf8").unwrap()
        );
    }
}
