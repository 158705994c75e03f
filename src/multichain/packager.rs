//! Signature Packager
//!
//! Lays out the authorization blob placed in `userOp.signature`:
//!
//! ```text
//! moduleSignature = abi.encode(uint48 validUntil, uint48 validAfter,
//!                              bytes32 merkleRoot, bytes32[] proof, bytes rootSignature)
//! signature       = abi.encode(bytes moduleSignature, address moduleAddress)
//! ```
//!
//! Pure byte layout: no hashing or signing happens here.

use super::types::{AuthorizationBlob, MerkleRoot, ValidityWindow, MAX_UINT48};
use crate::error::{MultiChainError, MultiChainResult};
use crate::utils::crypto::{pad_address, u64_word};

const WORD: usize = 32;

/// Head size of the inner tuple (five static slots)
const INNER_HEAD: usize = 5 * WORD;

/// Head size of the outer tuple (offset + address)
const OUTER_HEAD: usize = 2 * WORD;

/// ABI packager for multi-chain authorization blobs
pub struct SignaturePackager;

impl SignaturePackager {
    /// Serialize one item's authorization
    pub fn pack(
        proof: &[[u8; 32]],
        root: &MerkleRoot,
        root_signature: &[u8],
        window: &ValidityWindow,
        module_address: &[u8; 20],
    ) -> Vec<u8> {
        let module_signature = Self::encode_module_signature(proof, root, root_signature, window);

        let mut encoded = Vec::with_capacity(OUTER_HEAD + WORD + module_signature.len());
        encoded.extend_from_slice(&u64_word(OUTER_HEAD as u64));
        encoded.extend_from_slice(&pad_address(module_address));
        Self::encode_dynamic_bytes(&mut encoded, &module_signature);
        encoded
    }

    /// Serialize a decoded blob back into its byte layout
    pub fn encode(blob: &AuthorizationBlob) -> Vec<u8> {
        Self::pack(
            &blob.proof,
            &blob.merkle_root,
            &blob.root_signature,
            &blob.window(),
            &blob.module_address,
        )
    }

    /// Inner `(uint48, uint48, bytes32, bytes32[], bytes)` tuple
    pub fn encode_module_signature(
        proof: &[[u8; 32]],
        root: &MerkleRoot,
        root_signature: &[u8],
        window: &ValidityWindow,
    ) -> Vec<u8> {
        let proof_offset = INNER_HEAD;
        let signature_offset = proof_offset + WORD + proof.len() * WORD;

        let mut encoded = Vec::with_capacity(signature_offset + WORD + padded_len(root_signature.len()));

        // Head
        encoded.extend_from_slice(&u64_word(window.valid_until));
        encoded.extend_from_slice(&u64_word(window.valid_after));
        encoded.extend_from_slice(root.as_bytes());
        encoded.extend_from_slice(&u64_word(proof_offset as u64));
        encoded.extend_from_slice(&u64_word(signature_offset as u64));

        // Tail: bytes32[] proof
        encoded.extend_from_slice(&u64_word(proof.len() as u64));
        for sibling in proof {
            encoded.extend_from_slice(sibling);
        }

        // Tail: bytes rootSignature
        Self::encode_dynamic_bytes(&mut encoded, root_signature);
        encoded
    }

    /// Parse a blob produced by [`SignaturePackager::pack`]
    pub fn decode(data: &[u8]) -> MultiChainResult<AuthorizationBlob> {
        let inner_offset = read_offset(data, 0)?;
        let module_address = read_address(data, WORD)?;
        let module_signature = read_dynamic_bytes(data, inner_offset)?;

        let valid_until = read_uint48(module_signature, 0)?;
        let valid_after = read_uint48(module_signature, WORD)?;
        let merkle_root = MerkleRoot(*read_word(module_signature, 2 * WORD)?);
        let proof_offset = read_offset(module_signature, 3 * WORD)?;
        let signature_offset = read_offset(module_signature, 4 * WORD)?;

        let proof_len = read_offset(module_signature, proof_offset)?;
        let mut proof = Vec::with_capacity(proof_len.min(256));
        for i in 0..proof_len {
            let position = i
                .checked_mul(WORD)
                .and_then(|o| o.checked_add(proof_offset + WORD))
                .ok_or_else(|| MultiChainError::decoding("proof length overflows"))?;
            proof.push(*read_word(module_signature, position)?);
        }

        let root_signature = read_dynamic_bytes(module_signature, signature_offset)?.to_vec();

        Ok(AuthorizationBlob {
            module_address,
            valid_after,
            valid_until,
            merkle_root,
            root_signature,
            proof,
        })
    }

    /// Length-prefixed bytes, right-padded to a word boundary
    fn encode_dynamic_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
        out.extend_from_slice(&u64_word(bytes.len() as u64));
        out.extend_from_slice(bytes);
        out.resize(out.len() + padded_len(bytes.len()) - bytes.len(), 0);
    }
}

fn padded_len(len: usize) -> usize {
    len.div_ceil(WORD) * WORD
}

fn read_word(data: &[u8], offset: usize) -> MultiChainResult<&[u8; 32]> {
    data.get(offset..offset.saturating_add(WORD))
        .and_then(|slice| slice.try_into().ok())
        .ok_or_else(|| {
            MultiChainError::decoding(format!(
                "blob truncated: need word at {}, have {} bytes",
                offset,
                data.len()
            ))
        })
}

/// Offsets and lengths must fit in 8 bytes and point inside `data`
fn read_offset(data: &[u8], offset: usize) -> MultiChainResult<usize> {
    let word = read_word(data, offset)?;
    if word[..24].iter().any(|b| *b != 0) {
        return Err(MultiChainError::decoding(format!("oversized offset at {}", offset)));
    }
    let mut be = [0u8; 8];
    be.copy_from_slice(&word[24..]);
    let value = u64::from_be_bytes(be);
    usize::try_from(value)
        .ok()
        .filter(|v| *v <= data.len())
        .ok_or_else(|| MultiChainError::decoding(format!("offset {} out of range", value)))
}

fn read_uint48(data: &[u8], offset: usize) -> MultiChainResult<u64> {
    let word = read_word(data, offset)?;
    if word[..26].iter().any(|b| *b != 0) {
        return Err(MultiChainError::decoding(format!("value at {} exceeds uint48", offset)));
    }
    let mut be = [0u8; 8];
    be[2..].copy_from_slice(&word[26..]);
    let value = u64::from_be_bytes(be);
    debug_assert!(value <= MAX_UINT48);
    Ok(value)
}

fn read_address(data: &[u8], offset: usize) -> MultiChainResult<[u8; 20]> {
    let word = read_word(data, offset)?;
    if word[..12].iter().any(|b| *b != 0) {
        return Err(MultiChainError::decoding("address slot has dirty upper bytes"));
    }
    let mut address = [0u8; 20];
    address.copy_from_slice(&word[12..]);
    Ok(address)
}

fn read_dynamic_bytes(data: &[u8], offset: usize) -> MultiChainResult<&[u8]> {
    let len = read_offset(data, offset)?;
    let start = offset + WORD;
    data.get(start..start.saturating_add(len))
        .ok_or_else(|| MultiChainError::decoding(format!("bytes at {} run past the blob", offset)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn sample_blob(proof_len: usize) -> AuthorizationBlob {
        AuthorizationBlob {
            module_address: [0x11; 20],
            valid_after: 1_700_000_000,
            valid_until: 1_700_003_600,
            merkle_root: MerkleRoot([0x22; 32]),
            root_signature: vec![0x33; 65],
            proof: (0..proof_len).map(|i| [i as u8 + 1; 32]).collect(),
        }
    }

    fn word_at(data: &[u8], index: usize) -> &[u8] {
        &data[index * WORD..(index + 1) * WORD]
    }

    #[test]
    fn test_layout_with_one_sibling() {
        let blob = sample_blob(1);
        let encoded = SignaturePackager::encode(&blob);

        // outer: offset, address, length, inner
        assert_eq!(word_at(&encoded, 0), &u64_word(64)[..]);
        assert_eq!(word_at(&encoded, 1), &pad_address(&[0x11; 20])[..]);

        let inner = SignaturePackager::encode_module_signature(
            &blob.proof,
            &blob.merkle_root,
            &blob.root_signature,
            &blob.window(),
        );
        assert_eq!(word_at(&encoded, 2), &u64_word(inner.len() as u64)[..]);
        assert_eq!(&encoded[96..], &inner[..]);

        // inner head
        assert_eq!(word_at(&inner, 0), &u64_word(1_700_003_600)[..]);
        assert_eq!(word_at(&inner, 1), &u64_word(1_700_000_000)[..]);
        assert_eq!(word_at(&inner, 2), &[0x22; 32][..]);
        assert_eq!(word_at(&inner, 3), &u64_word(160)[..]);
        assert_eq!(word_at(&inner, 4), &u64_word(160 + 32 + 32)[..]);
        // proof tail
        assert_eq!(word_at(&inner, 5), &u64_word(1)[..]);
        assert_eq!(word_at(&inner, 6), &[1u8; 32][..]);
        // signature tail: 65 bytes padded to 96
        assert_eq!(word_at(&inner, 7), &u64_word(65)[..]);
        assert_eq!(inner.len(), 8 * WORD + 96);
        assert!(inner[8 * WORD + 65..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_decode_inverts_encode() {
        for proof_len in [0, 1, 4] {
            let blob = sample_blob(proof_len);
            let decoded = SignaturePackager::decode(&SignaturePackager::encode(&blob)).unwrap();
            assert_eq!(decoded, blob);
        }
    }

    #[test]
    fn test_encoded_length_is_word_aligned() {
        let encoded = SignaturePackager::encode(&sample_blob(3));
        assert_eq!(encoded.len() % WORD, 0);
    }

    #[test]
    fn test_truncated_blob_rejected() {
        let encoded = SignaturePackager::encode(&sample_blob(2));
        for cut in [0, 31, 64, 200, encoded.len() - 40] {
            let err = SignaturePackager::decode(&encoded[..cut]).unwrap_err();
            assert_eq!(err.code, ErrorCode::DecodingError, "cut at {}", cut);
        }
    }

    #[test]
    fn test_dirty_address_rejected() {
        let mut encoded = SignaturePackager::encode(&sample_blob(1));
        encoded[WORD] = 0xff;
        assert!(SignaturePackager::decode(&encoded).is_err());
    }

    #[test]
    fn test_oversized_window_rejected() {
        let mut encoded = SignaturePackager::encode(&sample_blob(1));
        // first byte of the inner validUntil word
        encoded[3 * WORD] = 0x01;
        assert!(SignaturePackager::decode(&encoded).is_err());
    }
}
