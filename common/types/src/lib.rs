//! Execution-layer primitives shared by the chain generator and the test orchestrator.
//!
//! Everything in here is consensus-encoded: headers, blocks, typed transactions and receipts
//! all round-trip through canonical RLP so that the produced bytes are interchangeable with
//! mainline Ethereum clients.
mod account;
mod block;
mod hashing;
mod header;
mod receipt;
pub mod serde_helpers;
mod signing;
mod transaction;
mod withdrawal;

pub use account::Account;
pub use block::{decode_chain, encode_chain, Block};
pub use hashing::{
    create_address, empty_ommers_hash, empty_trie_root, keccak256, keccak_empty,
    ordered_trie_root, sec_trie_root, KeccakHasher,
};
pub use header::Header;
pub use receipt::{bloom_contains, logs_bloom, Log, Receipt, ReceiptOutcome};
pub use signing::{recover_address, PrivateKey, RawSignature};
pub use transaction::{
    AccessList, AccessListItem, AccessListTx, Authorization, BlobTx, DynamicFeeTx, LegacyTx,
    SetCodeTx, SignedAuthorization, SignedTransaction, Signer, Transaction, TxType,
};
pub use withdrawal::Withdrawal;

pub use ethers_core::types::{Address, Bloom, H64 as Hash64, H256 as Hash256, U64};
pub use ethers_core::types::U256 as Uint256;
pub use ethers_core::utils::rlp;

/// Errors raised while decoding or signing execution-layer objects.
#[derive(Debug)]
pub enum Error {
    Rlp(rlp::DecoderError),
    Secp256k1(secp256k1::Error),
    InvalidPrivateKey(String),
    InvalidSignature(String),
    UnknownTransactionType(u8),
    EmptyTransaction,
    TrailingBytes { offset: usize },
}

impl From<rlp::DecoderError> for Error {
    fn from(e: rlp::DecoderError) -> Self {
        Error::Rlp(e)
    }
}

impl From<secp256k1::Error> for Error {
    fn from(e: secp256k1::Error) -> Self {
        Error::Secp256k1(e)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Rlp(e) => write!(f, "rlp: {}", e),
            Error::Secp256k1(e) => write!(f, "secp256k1: {}", e),
            Error::InvalidPrivateKey(e) => write!(f, "invalid private key: {}", e),
            Error::InvalidSignature(e) => write!(f, "invalid signature: {}", e),
            Error::UnknownTransactionType(t) => write!(f, "unknown transaction type {:#04x}", t),
            Error::EmptyTransaction => write!(f, "empty transaction encoding"),
            Error::TrailingBytes { offset } => write!(f, "trailing bytes at offset {}", offset),
        }
    }
}

impl std::error::Error for Error {}
