use crate::{Address, Error, PrivateKey};

/// A funded account whose key is known to the generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub key: PrivateKey,
    pub address: Address,
}

impl Account {
    /// Builds an account from a hex key, checking it against the expected address.
    pub fn from_hex_key(key: &str, expected: Address) -> Result<Self, Error> {
        let key = PrivateKey::from_hex(key)?;
        let address = key.address();
        if address != expected {
            return Err(Error::InvalidPrivateKey(format!(
                "key derives {:?}, expected {:?}",
                address, expected
            )));
        }
        Ok(Self { key, address })
    }
}
