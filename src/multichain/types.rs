//! Multi-chain authorization types
//!
//! Inputs (`ChainScopedOperation`, `ValidityWindow`), intermediate values
//! (`OperationDigest`, `MerkleRoot`, `RootSignature`) and outputs
//! (`AuthorizationBlob`, `SignedOperation`).

use crate::erc4337::UserOperation;
use crate::error::{ErrorCode, MultiChainError, MultiChainResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Largest value representable by a Solidity `uint48`
pub const MAX_UINT48: u64 = (1 << 48) - 1;

/// An operation draft paired with the chain it targets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainScopedOperation {
    pub user_op: UserOperation,
    pub chain_id: u64,
}

impl ChainScopedOperation {
    pub fn new(user_op: UserOperation, chain_id: impl Into<u64>) -> Self {
        Self {
            user_op,
            chain_id: chain_id.into(),
        }
    }
}

/// Time bounds during which an authorization is acceptable.
///
/// `valid_until == 0` means the authorization never expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidityWindow {
    pub valid_after: u64,
    pub valid_until: u64,
}

impl ValidityWindow {
    /// Window with no lower bound and no expiry
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Create a validated window
    pub fn new(valid_after: u64, valid_until: u64) -> MultiChainResult<Self> {
        let window = Self {
            valid_after,
            valid_until,
        };
        window.validate()?;
        Ok(window)
    }

    /// Window starting now and lasting `lifetime`
    pub fn from_now(lifetime: Duration) -> MultiChainResult<Self> {
        let now = chrono::Utc::now().timestamp();
        let now = u64::try_from(now)
            .map_err(|_| MultiChainError::internal("system clock is before the unix epoch"))?;
        let until = now.checked_add(lifetime.as_secs()).ok_or_else(|| {
            MultiChainError::new(ErrorCode::InvalidValidityWindow, "lifetime overflows")
        })?;
        Self::new(now, until)
    }

    pub fn validate(&self) -> MultiChainResult<()> {
        if self.valid_after > MAX_UINT48 || self.valid_until > MAX_UINT48 {
            return Err(MultiChainError::new(
                ErrorCode::InvalidValidityWindow,
                "validity bounds must fit in uint48",
            ));
        }
        if self.valid_until != 0 && self.valid_until <= self.valid_after {
            return Err(MultiChainError::new(
                ErrorCode::InvalidValidityWindow,
                format!(
                    "validUntil ({}) must be after validAfter ({})",
                    self.valid_until, self.valid_after
                ),
            ));
        }
        Ok(())
    }

    pub fn expires(&self) -> bool {
        self.valid_until != 0
    }

    /// Whether a unix timestamp falls inside the window
    pub fn contains(&self, timestamp: u64) -> bool {
        timestamp >= self.valid_after && (!self.expires() || timestamp <= self.valid_until)
    }
}

/// Chain-bound leaf digest of one operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OperationDigest(#[serde(with = "crate::serde_bytes::hex32")] pub [u8; 32]);

impl OperationDigest {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for OperationDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Root of the tree built over a batch of digests; the only value signed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MerkleRoot(#[serde(with = "crate::serde_bytes::hex32")] pub [u8; 32]);

impl MerkleRoot {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for MerkleRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Signature over a Merkle root, as returned by a signer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootSignature {
    /// Opaque signature bytes (65-byte r || s || v for ECDSA signers)
    #[serde(with = "crate::serde_bytes::hex_vec")]
    pub bytes: Vec<u8>,
    /// Address of the signing key, when the signer knows it
    pub signer: Option<String>,
}

impl RootSignature {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            signer: None,
        }
    }

    pub fn with_signer(mut self, signer: impl Into<String>) -> Self {
        self.signer = Some(signer.into());
        self
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.bytes))
    }
}

/// Decoded authorization carried in `userOp.signature`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationBlob {
    #[serde(with = "crate::serde_bytes::hex20")]
    pub module_address: [u8; 20],
    pub valid_after: u64,
    pub valid_until: u64,
    pub merkle_root: MerkleRoot,
    #[serde(with = "crate::serde_bytes::hex_vec")]
    pub root_signature: Vec<u8>,
    #[serde(with = "crate::serde_bytes::hex32_vec")]
    pub proof: Vec<[u8; 32]>,
}

impl AuthorizationBlob {
    pub fn window(&self) -> ValidityWindow {
        ValidityWindow {
            valid_after: self.valid_after,
            valid_until: self.valid_until,
        }
    }
}

/// A finalized operation, independently submittable to its chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedOperation {
    pub chain_id: u64,
    /// The draft with `signature` set to the encoded authorization blob
    pub user_op: UserOperation,
    pub authorization: AuthorizationBlob,
    /// Leaf this operation occupies in the signed tree
    pub digest: OperationDigest,
}

impl SignedOperation {
    pub fn merkle_root(&self) -> &MerkleRoot {
        &self.authorization.merkle_root
    }

    pub fn root_signature(&self) -> &[u8] {
        &self.authorization.root_signature
    }

    pub fn proof(&self) -> &[[u8; 32]] {
        &self.authorization.proof
    }
}
