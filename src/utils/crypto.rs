//! Crypto and Encoding Helpers
//!
//! Keccak hashing, hex parsing and fixed-width padding shared by the
//! operation hasher, the packager and the verifier.

use crate::error::{ErrorCode, MultiChainError, MultiChainResult};
use sha3::{Digest, Keccak256};

/// Keccak256 hash (used for Ethereum addresses, user op hashes and tree nodes)
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Keccak256 over several slices without an intermediate buffer
pub fn keccak256_concat(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Convert raw address bytes to checksummed Ethereum address
pub fn to_checksum_address(address: &[u8]) -> String {
    let lower = hex::encode(address);
    let hash = keccak256(lower.as_bytes());

    let mut result = String::from("0x");
    for (i, ch) in lower.chars().enumerate() {
        let byte = hash[i / 2];
        let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0f };

        if ch.is_ascii_digit() || nibble < 8 {
            result.push(ch);
        } else {
            result.push(ch.to_ascii_uppercase());
        }
    }

    result
}

/// Decode a hex string with or without the `0x` prefix
pub fn decode_hex(value: &str, field: &str) -> MultiChainResult<Vec<u8>> {
    let trimmed = value.strip_prefix("0x").unwrap_or(value);
    hex::decode(trimmed).map_err(|e| {
        MultiChainError::new(ErrorCode::HexError, format!("Invalid hex in {}", field))
            .with_details(e.to_string())
    })
}

/// Parse a 20-byte EVM address
pub fn parse_address(value: &str, field: &str) -> MultiChainResult<[u8; 20]> {
    let bytes = decode_hex(value, field)?;
    if bytes.len() != 20 {
        return Err(MultiChainError::new(
            ErrorCode::InvalidAddress,
            format!("{} must be 20 bytes, got {}", field, bytes.len()),
        ));
    }
    let mut address = [0u8; 20];
    address.copy_from_slice(&bytes);
    Ok(address)
}

/// Parse a hex quantity into a big-endian integer of `WIDTH` bytes.
///
/// Odd-length quantities such as `0x1` are accepted, leading zeros are
/// stripped before the width check.
pub fn parse_uint<const WIDTH: usize>(value: &str, field: &str) -> MultiChainResult<[u8; WIDTH]> {
    let trimmed = value.strip_prefix("0x").unwrap_or(value);
    if trimmed.is_empty() {
        return Err(MultiChainError::new(
            ErrorCode::InvalidOperation,
            format!("{} is empty", field),
        ));
    }
    let normalized = if trimmed.len() % 2 == 1 {
        format!("0{}", trimmed)
    } else {
        trimmed.to_string()
    };
    let bytes = decode_hex(&normalized, field)?;
    let significant: Vec<u8> = bytes.into_iter().skip_while(|b| *b == 0).collect();
    if significant.len() > WIDTH {
        return Err(MultiChainError::new(
            ErrorCode::InvalidOperation,
            format!("{} exceeds {} bits", field, WIDTH * 8),
        ));
    }
    let mut out = [0u8; WIDTH];
    out[WIDTH - significant.len()..].copy_from_slice(&significant);
    Ok(out)
}

/// Left-pad a 20-byte address into a 32-byte ABI word
pub fn pad_address(address: &[u8; 20]) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(address);
    word
}

/// Encode a u64 as a 32-byte ABI word
pub fn u64_word(value: u64) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&value.to_be_bytes());
    word
}

/// Big-endian uint48 (6 bytes), as used by `encodePacked(uint48)`
pub fn uint48_bytes(value: u64) -> [u8; 6] {
    let be = value.to_be_bytes();
    let mut out = [0u8; 6];
    out.copy_from_slice(&be[2..]);
    out
}
