//! Serde adapters for JSON quantities that are absent before a fork activates.

/// `Option<u64>` as an optional `0x`-prefixed quantity.
pub mod opt_u64_hex {
    use crate::U64;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(value: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.map(U64::from).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<U64>::deserialize(deserializer)?.map(|v| v.as_u64()))
    }
}
