use crate::{keccak256, Address, Error, Hash256, Uint256};
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use std::fmt;

/// A secp256k1 private key used to sign transactions, authorizations and clique seals.
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKey(SecretKey);

/// An ECDSA signature split into its recovery id and scalar components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSignature {
    pub recovery_id: u8,
    pub r: Uint256,
    pub s: Uint256,
}

impl PrivateKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        SecretKey::from_slice(bytes)
            .map(Self)
            .map_err(|e| Error::InvalidPrivateKey(e.to_string()))
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, Error> {
        let bytes = hex::decode(hex_str.trim_start_matches("0x"))
            .map_err(|e| Error::InvalidPrivateKey(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.secret_bytes()
    }

    pub fn address(&self) -> Address {
        let secp = Secp256k1::signing_only();
        public_key_address(&PublicKey::from_secret_key(&secp, &self.0))
    }

    pub fn sign_hash(&self, hash: Hash256) -> Result<RawSignature, Error> {
        let secp = Secp256k1::signing_only();
        let message = Message::from_slice(hash.as_bytes())?;
        let signature = secp.sign_ecdsa_recoverable(&message, &self.0);
        let (recovery_id, compact) = signature.serialize_compact();
        Ok(RawSignature {
            recovery_id: recovery_id.to_i32() as u8,
            r: Uint256::from_big_endian(&compact[..32]),
            s: Uint256::from_big_endian(&compact[32..]),
        })
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey({:?})", self.address())
    }
}

/// Recovers the address that produced `signature` over `hash`.
pub fn recover_address(hash: Hash256, signature: &RawSignature) -> Result<Address, Error> {
    if signature.recovery_id > 1 {
        return Err(Error::InvalidSignature(format!(
            "recovery id {} out of range",
            signature.recovery_id
        )));
    }
    let mut compact = [0u8; 64];
    signature.r.to_big_endian(&mut compact[..32]);
    signature.s.to_big_endian(&mut compact[32..]);

    let secp = Secp256k1::verification_only();
    let recovery_id = RecoveryId::from_i32(i32::from(signature.recovery_id))?;
    let recoverable = RecoverableSignature::from_compact(&compact, recovery_id)?;
    let message = Message::from_slice(hash.as_bytes())?;
    let public_key = secp.recover_ecdsa(&message, &recoverable)?;
    Ok(public_key_address(&public_key))
}

fn public_key_address(public_key: &PublicKey) -> Address {
    let uncompressed = public_key.serialize_uncompressed();
    let hash = keccak256(&uncompressed[1..]);
    Address::from_slice(&hash.as_bytes()[12..])
}
