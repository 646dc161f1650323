//! Fixed-length byte wrappers for validator pubkeys and signatures.
//!
//! These are data carriers only: no BLS math happens anywhere in this
//! workspace, so the wrappers just hold bytes and speak `0x`-prefixed hex.

use serde::de::Error as SerdeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

pub const PUBLIC_KEY_BYTES_LEN: usize = 48;
pub const SIGNATURE_BYTES_LEN: usize = 96;

macro_rules! bytes_struct {
    ($name:ident, $len:expr, $label:expr) => {
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name([u8; $len]);

        impl $name {
            pub fn new(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            pub fn zero() -> Self {
                Self([0; $len])
            }

            /// Builds a key whose every byte is `byte`. Handy for tests.
            pub fn repeat_byte(byte: u8) -> Self {
                Self([byte; $len])
            }

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            pub fn as_hex_string(&self) -> String {
                format!("0x{}", hex::encode(self.0))
            }
        }

        impl FromStr for $name {
            type Err = String;

            /// Accepts both `0x`-prefixed and bare hex, since callers of the
            /// HTTP surface use either form.
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let stripped = s.strip_prefix("0x").unwrap_or(s);
                let bytes = hex::decode(stripped)
                    .map_err(|e| format!("invalid {} hex [{}]: {}", $label, s, e))?;
                if bytes.len() != $len {
                    return Err(format!(
                        "invalid {} [{}]: expected {} bytes, got {}",
                        $label,
                        s,
                        $len,
                        bytes.len()
                    ));
                }
                let mut array = [0; $len];
                array.copy_from_slice(&bytes);
                Ok(Self(array))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.as_hex_string())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.as_hex_string())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.as_hex_string())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Self::from_str(&s).map_err(D::Error::custom)
            }
        }
    };
}

bytes_struct!(PublicKeyBytes, PUBLIC_KEY_BYTES_LEN, "public key");
bytes_struct!(SignatureBytes, SIGNATURE_BYTES_LEN, "signature");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pubkey_round_trip() {
        let pubkey = PublicKeyBytes::repeat_byte(0xab);
        let hex = pubkey.as_hex_string();
        assert_eq!(hex.len(), 2 + PUBLIC_KEY_BYTES_LEN * 2);
        assert_eq!(PublicKeyBytes::from_str(&hex).unwrap(), pubkey);

        // Bare hex is accepted too.
        assert_eq!(PublicKeyBytes::from_str(&hex[2..]).unwrap(), pubkey);
    }

    #[test]
    fn pubkey_rejects_bad_lengths() {
        assert!(PublicKeyBytes::from_str("0x1234").is_err());
        assert!(PublicKeyBytes::from_str("not hex").is_err());
    }

    #[test]
    fn serde_uses_prefixed_hex() {
        let pubkey = PublicKeyBytes::repeat_byte(0x01);
        let json = serde_json::to_string(&pubkey).unwrap();
        assert!(json.starts_with("\"0x0101"));
        assert_eq!(
            serde_json::from_str::<PublicKeyBytes>(&json).unwrap(),
            pubkey
        );
    }
}
