//! Multi-Chain Validation Core Library
//!
//! Authorizes equivalent account-abstraction operations on several chains
//! with a single signature.
//!
//! # Architecture
//!
//! This crate provides:
//! - **erc4337**: UserOperation (v0.7) layout, validation and `userOpHash`
//! - **multichain**: leaf hashing, Merkle tree, root signing session,
//!   authorization blob packaging and offline verification
//! - **utils**: Keccak/address helpers and log redaction
//!
//! # Security
//!
//! The local signer keeps its key in a `secrecy::SecretBox`, zeroed on drop.
//! Signatures and keys are never logged in full.
//!
//! # Example
//!
//! ```rust,ignore
//! use multichain_validation::{ChainScopedOperation, LocalKeySigner, ModuleConfig,
//!     MultiChainValidationModule, ValidityWindow};
//!
//! let module = MultiChainValidationModule::new(ModuleConfig::from_env()?, LocalKeySigner::from_hex(key)?)?;
//! let signed = module.sign_user_ops(batch, ValidityWindow::unbounded()).await?;
//! for op in &signed {
//!     println!("chain {}: {}", op.chain_id, op.user_op.signature);
//! }
//! ```

pub mod erc4337;
pub mod error;
pub mod multichain;
pub mod serde_bytes;
pub mod utils;

// Re-export key types for convenience
pub use error::{ErrorCategory, ErrorCode, MultiChainError, MultiChainResult};

pub use erc4337::{ERC4337Chain, UserOperation, ENTRY_POINT_V07};

pub use multichain::{
    verify_authorization, verify_membership, verify_root_signer, verify_signed_operation, AuthorizationBlob,
    ChainScopedOperation, LocalKeySigner, MerkleProof, MerkleRoot, MerkleTree, ModuleConfig,
    MultiChainValidationModule, OperationDigest, OperationHasher, RootSignature, RootSigner, SignaturePackager,
    SignedOperation, SignerError, SigningSession, ValidityWindow, DEFAULT_MULTICHAIN_MODULE,
};

pub use utils::crypto::{keccak256, to_checksum_address};
pub use utils::logging::init_logging;
