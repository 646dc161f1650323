//! Serializes a `u64` as a quoted decimal string, the integer convention of
//! the standard Beacon API (e.g. `"32000000000"`).

use serde::de::Error;
use serde::{Deserialize, Deserializer, Serializer};

pub fn serialize<S>(value: &u64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&value.to_string())
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum QuotedU64 {
        String(String),
        Number(u64),
    }

    match QuotedU64::deserialize(deserializer)? {
        QuotedU64::String(s) => s
            .parse()
            .map_err(|e| D::Error::custom(format!("unable to parse quoted u64: {}", e))),
        QuotedU64::Number(n) => Ok(n),
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    #[serde(transparent)]
    struct Wrapped(#[serde(with = "super")] u64);

    #[test]
    fn quoted_round_trip() {
        let w = Wrapped(32_000_000_000);
        let json = serde_json::to_string(&w).unwrap();
        assert_eq!(json, "\"32000000000\"");
        assert_eq!(serde_json::from_str::<Wrapped>(&json).unwrap(), w);
    }

    #[test]
    fn accepts_unquoted() {
        assert_eq!(serde_json::from_str::<Wrapped>("42").unwrap(), Wrapped(42));
    }

    #[test]
    fn far_future_epoch() {
        let w = Wrapped(u64::MAX);
        let json = serde_json::to_string(&w).unwrap();
        assert_eq!(json, "\"18446744073709551615\"");
        assert_eq!(serde_json::from_str::<Wrapped>(&json).unwrap(), w);
    }
}
