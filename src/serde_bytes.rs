//! Serde helpers for byte arrays
//!
//! Provides `0x`-prefixed hex serialization for the fixed-size and dynamic
//! byte fields that appear in signed operations and authorization blobs.

use serde::{Deserialize, Deserializer, Serializer};

fn strip(s: &str) -> &str {
    s.strip_prefix("0x").unwrap_or(s)
}

fn decode_fixed<'de, D, const N: usize>(deserializer: D) -> Result<[u8; N], D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    let bytes = hex::decode(strip(&s)).map_err(serde::de::Error::custom)?;
    bytes
        .try_into()
        .map_err(|_| serde::de::Error::custom(format!("expected {} bytes", N)))
}

/// Serialize/deserialize [u8; 20] (addresses) as hex string
pub mod hex20 {
    use super::*;

    pub fn serialize<S>(bytes: &[u8; 20], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 20], D::Error>
    where
        D: Deserializer<'de>,
    {
        decode_fixed::<D, 20>(deserializer)
    }
}

/// Serialize/deserialize [u8; 32] as hex string
pub mod hex32 {
    use super::*;

    pub fn serialize<S>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        decode_fixed::<D, 32>(deserializer)
    }
}

/// Serialize/deserialize a list of [u8; 32] (proof paths) as hex strings
pub mod hex32_vec {
    use super::*;
    use serde::ser::SerializeSeq;

    pub fn serialize<S>(items: &[[u8; 32]], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(items.len()))?;
        for item in items {
            seq.serialize_element(&format!("0x{}", hex::encode(item)))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<[u8; 32]>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let strings = Vec::<String>::deserialize(deserializer)?;
        strings
            .iter()
            .map(|s| {
                let bytes = hex::decode(strip(s)).map_err(serde::de::Error::custom)?;
                bytes
                    .try_into()
                    .map_err(|_| serde::de::Error::custom("expected 32 bytes"))
            })
            .collect()
    }
}

/// Serialize/deserialize Vec<u8> as hex string
pub mod hex_vec {
    use super::*;

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        hex::decode(strip(&s)).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        #[serde(with = "super::hex20")]
        address: [u8; 20],
        #[serde(with = "super::hex32")]
        root: [u8; 32],
        #[serde(with = "super::hex32_vec")]
        proof: Vec<[u8; 32]>,
        #[serde(with = "super::hex_vec")]
        signature: Vec<u8>,
    }

    #[test]
    fn test_hex_fields_are_prefixed() {
        let sample = Sample {
            address: [0x11; 20],
            root: [0x22; 32],
            proof: vec![[0x33; 32]],
            signature: vec![0xab, 0xcd],
        };
        let json = serde_json::to_string(&sample).unwrap();
        assert!(json.contains("\"signature\":\"0xabcd\""));
        assert!(json.contains(&format!("\"0x{}\"", "33".repeat(32))));

        let parsed: Sample = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, sample);
    }

    #[test]
    fn test_wrong_length_is_rejected() {
        let json = format!(
            r#"{{"address":"0x1234","root":"0x{}","proof":[],"signature":"0x"}}"#,
            "00".repeat(32)
        );
        assert!(serde_json::from_str::<Sample>(&json).is_err());
    }
}
