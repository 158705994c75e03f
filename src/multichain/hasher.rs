//! Operation Hasher
//!
//! Turns one chain-scoped operation into the leaf the tree is built from:
//!
//! ```text
//! leaf = keccak256(domainTag || uint48 validUntil || uint48 validAfter
//!                  || userOpHash || uint256 chainId || address module)
//! ```
//!
//! `userOpHash` already binds the EntryPoint and chain id per ERC-4337; the
//! chain id, module address and domain tag are repeated in the leaf so a proof
//! for one chain can never be presented as a leaf of another chain or module.

use super::types::{ChainScopedOperation, OperationDigest, ValidityWindow};
use crate::error::MultiChainResult;
use crate::utils::crypto::{keccak256, keccak256_concat, parse_address, to_checksum_address, u64_word, uint48_bytes};

/// Domain string hashed into every leaf
pub const LEAF_DOMAIN: &[u8] = b"MultichainValidationModule.leaf.v1";

/// Computes chain-bound leaf digests for one module deployment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationHasher {
    module_address: [u8; 20],
    entry_point: [u8; 20],
    domain_tag: [u8; 32],
}

impl OperationHasher {
    pub fn new(module_address: &str, entry_point: &str) -> MultiChainResult<Self> {
        Ok(Self::from_parts(
            parse_address(module_address, "moduleAddress")?,
            parse_address(entry_point, "entryPoint")?,
        ))
    }

    pub fn from_parts(module_address: [u8; 20], entry_point: [u8; 20]) -> Self {
        Self {
            module_address,
            entry_point,
            domain_tag: keccak256(LEAF_DOMAIN),
        }
    }

    pub fn module_address(&self) -> &[u8; 20] {
        &self.module_address
    }

    pub fn module_address_checksummed(&self) -> String {
        to_checksum_address(&self.module_address)
    }

    pub fn entry_point(&self) -> &[u8; 20] {
        &self.entry_point
    }

    /// Leaf for an already computed ERC-4337 userOpHash
    pub fn leaf(&self, user_op_hash: &[u8; 32], chain_id: u64, window: &ValidityWindow) -> OperationDigest {
        OperationDigest(keccak256_concat(&[
            &self.domain_tag,
            &uint48_bytes(window.valid_until),
            &uint48_bytes(window.valid_after),
            user_op_hash,
            &u64_word(chain_id),
            &self.module_address,
        ]))
    }

    /// Hash a chain-scoped operation.
    ///
    /// Only fails on a malformed draft; callers that validated the draft
    /// first never see an error here.
    pub fn hash(&self, op: &ChainScopedOperation, window: &ValidityWindow) -> MultiChainResult<OperationDigest> {
        let user_op_hash = op.user_op.user_op_hash(&self.entry_point, op.chain_id)?;
        Ok(self.leaf(&user_op_hash, op.chain_id, window))
    }
}
