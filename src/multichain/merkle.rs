//! Merkle Tree Builder
//!
//! Binary Keccak tree over a batch of operation digests.
//!
//! - Leaves are sorted before building, so the root does not depend on the
//!   order in which the caller listed its chains.
//! - Each pair is hashed smaller-first (`keccak256(min || max)`), so a verifier
//!   replays a proof without knowing left/right positions.
//! - An unmatched node at the end of a level is promoted unhashed.
//!
//! The same rules are what an OpenZeppelin-style `MerkleProof.verify` expects.

use super::types::{MerkleRoot, OperationDigest};
use crate::error::{ErrorCode, MultiChainError, MultiChainResult};
use crate::utils::crypto::keccak256_concat;
use serde::{Deserialize, Serialize};

/// Hash two sibling nodes in canonical order
pub fn hash_pair(a: &[u8; 32], b: &[u8; 32]) -> [u8; 32] {
    let (first, second) = if a <= b { (a, b) } else { (b, a) };
    keccak256_concat(&[first, second])
}

/// Replay a proof path from `leaf` and return the reconstructed root
pub fn compute_root(leaf: &[u8; 32], siblings: &[[u8; 32]]) -> [u8; 32] {
    siblings
        .iter()
        .fold(*leaf, |node, sibling| hash_pair(&node, sibling))
}

/// Check that `siblings` connects `leaf` to `root`
pub fn verify_proof(leaf: &[u8; 32], siblings: &[[u8; 32]], root: &[u8; 32]) -> bool {
    compute_root(leaf, siblings) == *root
}

/// Inclusion proof for one leaf, ordered from leaf to root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub leaf: OperationDigest,
    #[serde(with = "crate::serde_bytes::hex32_vec")]
    pub siblings: Vec<[u8; 32]>,
}

impl MerkleProof {
    pub fn compute_root(&self) -> MerkleRoot {
        MerkleRoot(compute_root(self.leaf.as_bytes(), &self.siblings))
    }

    pub fn verify(&self, root: &MerkleRoot) -> bool {
        verify_proof(self.leaf.as_bytes(), &self.siblings, root.as_bytes())
    }

    pub fn is_empty(&self) -> bool {
        self.siblings.is_empty()
    }
}

/// Immutable tree built once per signing session
#[derive(Debug, Clone)]
pub struct MerkleTree {
    /// Input-order leaves
    leaves: Vec<OperationDigest>,
    /// `layers[0]` holds the sorted leaves, the last layer holds the root
    layers: Vec<Vec<[u8; 32]>>,
    /// Input index -> position in `layers[0]`
    positions: Vec<usize>,
    root: [u8; 32],
}

impl MerkleTree {
    /// Build a tree over `leaves` (input order is preserved for proof lookup)
    pub fn build(leaves: &[OperationDigest]) -> MultiChainResult<Self> {
        if leaves.is_empty() {
            return Err(MultiChainError::new(
                ErrorCode::EmptyBatch,
                "cannot build a Merkle tree without leaves",
            ));
        }

        let mut order: Vec<usize> = (0..leaves.len()).collect();
        order.sort_by(|&a, &b| leaves[a].cmp(&leaves[b]));

        let mut positions = vec![0usize; leaves.len()];
        for (position, &index) in order.iter().enumerate() {
            positions[index] = position;
        }

        let mut current: Vec<[u8; 32]> = order.iter().map(|&i| leaves[i].0).collect();
        let mut layers = Vec::new();

        while current.len() > 1 {
            let next: Vec<[u8; 32]> = current
                .chunks(2)
                .map(|pair| match pair {
                    [left, right] => hash_pair(left, right),
                    // chunks(2) leaves one node at the end of an odd level; promote it
                    _ => pair[0],
                })
                .collect();
            layers.push(std::mem::replace(&mut current, next));
        }

        let root = current[0];
        layers.push(current);

        Ok(Self {
            leaves: leaves.to_vec(),
            layers,
            positions,
            root,
        })
    }

    pub fn root(&self) -> MerkleRoot {
        MerkleRoot(self.root)
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    /// Number of hashing levels between the leaves and the root
    pub fn depth(&self) -> usize {
        self.layers.len() - 1
    }

    /// Leaf at input index `index`
    pub fn leaf(&self, index: usize) -> Option<OperationDigest> {
        self.leaves.get(index).copied()
    }

    /// Proof for the leaf at input index `index`
    pub fn proof(&self, index: usize) -> Option<MerkleProof> {
        let leaf = *self.leaves.get(index)?;
        let mut position = self.positions[index];
        let mut siblings = Vec::with_capacity(self.depth());

        for layer in &self.layers[..self.depth()] {
            let sibling = position ^ 1;
            if sibling < layer.len() {
                siblings.push(layer[sibling]);
            }
            position /= 2;
        }

        Some(MerkleProof { leaf, siblings })
    }

    /// Proofs for every leaf, in input order
    pub fn proofs(&self) -> Vec<MerkleProof> {
        (0..self.leaves.len()).filter_map(|i| self.proof(i)).collect()
    }

    /// Replay every proof against the root.
    ///
    /// A failure here means the builder is broken, never that the input was bad.
    pub fn self_verify(&self) -> MultiChainResult<()> {
        let root = self.root();
        for (index, proof) in self.proofs().iter().enumerate() {
            if !proof.verify(&root) {
                return Err(MultiChainError::proof_inconsistent(format!(
                    "proof for leaf {} does not reconstruct root {}",
                    index, root
                )));
            }
        }
        Ok(())
    }
}
