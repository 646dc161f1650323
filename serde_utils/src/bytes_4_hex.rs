//! Serializes `[u8; 4]` as a `0x`-prefixed hex string. Used for fork
//! versions.

use serde::de::Error;
use serde::{Deserialize, Deserializer, Serializer};

const BYTES_LEN: usize = 4;

pub fn serialize<S>(bytes: &[u8; BYTES_LEN], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; BYTES_LEN], D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    let decoded = hex::decode(s.trim_start_matches("0x"))
        .map_err(|e| D::Error::custom(format!("invalid hex: {}", e)))?;

    if decoded.len() != BYTES_LEN {
        return Err(D::Error::custom(format!(
            "expected {} bytes for fork version, got {}",
            BYTES_LEN,
            decoded.len()
        )));
    }

    let mut array = [0; BYTES_LEN];
    array.copy_from_slice(&decoded);
    Ok(array)
}
