//! Multi-Chain Validation Module
//!
//! One signature authorizes equivalent ERC-4337 operations on several chains.
//! Each operation is hashed into a chain-bound leaf, the leaves form a Merkle
//! tree, the root is signed once, and every operation carries its own proof
//! of membership in the signed root.
//!
//! # Example
//! ```rust,ignore
//! use multichain_validation::multichain::*;
//!
//! let module = MultiChainValidationModule::new(ModuleConfig::default(), LocalKeySigner::random())?;
//! let signed = module
//!     .sign_user_ops(
//!         vec![
//!             ChainScopedOperation::new(op_on_base, 8453u64),
//!             ChainScopedOperation::new(op_on_polygon, 137u64),
//!         ],
//!         ValidityWindow::from_now(Duration::from_secs(3600))?,
//!     )
//!     .await?;
//! ```

pub mod config;
pub mod hasher;
pub mod merkle;
pub mod packager;
pub mod session;
pub mod signer;
pub mod types;
pub mod verifier;

pub use config::*;
pub use hasher::*;
pub use merkle::*;
pub use packager::*;
pub use session::*;
pub use signer::*;
pub use types::*;
pub use verifier::*;
