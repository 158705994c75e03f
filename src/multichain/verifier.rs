//! Offline verification of signed operations
//!
//! Performs the checks the on-chain module makes: decode the blob from
//! `userOp.signature`, recompute the leaf from the operation as it stands now,
//! replay the proof to the embedded root and recover who signed that root.

use super::hasher::OperationHasher;
use super::merkle::compute_root;
use super::packager::SignaturePackager;
use super::signer::recover_signer;
use super::types::{AuthorizationBlob, SignedOperation};
use crate::erc4337::UserOperation;
use crate::error::{ErrorCode, MultiChainError, MultiChainResult};
use crate::utils::crypto::{decode_hex, to_checksum_address};

/// Check that `user_op` on `chain_id` is a member of the root in its blob.
///
/// Decodes the blob, checks the module address and window, recomputes the
/// leaf and replays the proof. The root signature is not looked at.
pub fn verify_membership(
    user_op: &UserOperation,
    chain_id: u64,
    hasher: &OperationHasher,
) -> MultiChainResult<AuthorizationBlob> {
    let blob = SignaturePackager::decode(&decode_hex(&user_op.signature, "signature")?)?;

    if blob.module_address != *hasher.module_address() {
        return Err(MultiChainError::new(
            ErrorCode::VerificationFailed,
            format!(
                "blob names module {}, expected {}",
                to_checksum_address(&blob.module_address),
                hasher.module_address_checksummed()
            ),
        ));
    }
    blob.window().validate()?;

    let user_op_hash = user_op.user_op_hash(hasher.entry_point(), chain_id)?;
    let leaf = hasher.leaf(&user_op_hash, chain_id, &blob.window());
    if compute_root(leaf.as_bytes(), &blob.proof) != *blob.merkle_root.as_bytes() {
        return Err(MultiChainError::new(
            ErrorCode::VerificationFailed,
            format!("operation on chain {} is not a member of root {}", chain_id, blob.merkle_root),
        ));
    }

    Ok(blob)
}

/// Recover the root signer from a blob, optionally requiring a specific one
pub fn verify_root_signer(
    blob: &AuthorizationBlob,
    expected_signer: Option<&[u8; 20]>,
) -> MultiChainResult<[u8; 20]> {
    let signer = recover_signer(blob.merkle_root.as_bytes(), &blob.root_signature)?;
    if let Some(expected) = expected_signer {
        if signer != *expected {
            return Err(MultiChainError::new(
                ErrorCode::VerificationFailed,
                format!(
                    "root signed by {}, expected {}",
                    to_checksum_address(&signer),
                    to_checksum_address(expected)
                ),
            ));
        }
    }
    Ok(signer)
}

/// Verify `user_op` on `chain_id` against the blob in its `signature` field.
///
/// Returns the decoded blob and the recovered root signer. When
/// `expected_signer` is given, any other signer is rejected.
pub fn verify_authorization(
    user_op: &UserOperation,
    chain_id: u64,
    hasher: &OperationHasher,
    expected_signer: Option<&[u8; 20]>,
) -> MultiChainResult<(AuthorizationBlob, [u8; 20])> {
    let blob = verify_membership(user_op, chain_id, hasher)?;
    let signer = verify_root_signer(&blob, expected_signer)?;
    Ok((blob, signer))
}

/// Verify a session output; also checks that the decoded blob matches the
/// one carried alongside it.
pub fn verify_signed_operation(
    op: &SignedOperation,
    hasher: &OperationHasher,
    expected_signer: Option<&[u8; 20]>,
) -> MultiChainResult<[u8; 20]> {
    let (blob, signer) = verify_authorization(&op.user_op, op.chain_id, hasher, expected_signer)?;
    if blob != op.authorization {
        return Err(MultiChainError::new(
            ErrorCode::VerificationFailed,
            "userOp.signature does not match the attached authorization",
        ));
    }
    Ok(signer)
}
