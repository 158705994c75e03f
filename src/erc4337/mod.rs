//! ERC-4337 Account Abstraction Primitives
//!
//! This module provides the pieces of ERC-4337 the multi-chain module needs:
//! - UserOperation (v0.7) drafts, validation and hashing
//! - Chain ids of the networks the module is deployed on

pub mod user_operation;

pub use user_operation::*;

use serde::{Deserialize, Serialize};

/// ERC-4337 v0.7 EntryPoint (same on all chains)
pub const ENTRY_POINT_V07: &str = "0x0000000071727De22E5E9d8BAf0edAc6f37da032";

/// Networks with a v0.7 EntryPoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ERC4337Chain {
    Ethereum,
    Polygon,
    Arbitrum,
    Optimism,
    Base,
    Avalanche,
    BNB,
    Sepolia,
    BaseSepolia,
    Amoy,
}

impl ERC4337Chain {
    pub fn chain_id(&self) -> u64 {
        match self {
            Self::Ethereum => 1,
            Self::Polygon => 137,
            Self::Arbitrum => 42161,
            Self::Optimism => 10,
            Self::Base => 8453,
            Self::Avalanche => 43114,
            Self::BNB => 56,
            Self::Sepolia => 11155111,
            Self::BaseSepolia => 84532,
            Self::Amoy => 80002,
        }
    }
}

impl From<ERC4337Chain> for u64 {
    fn from(chain: ERC4337Chain) -> Self {
        chain.chain_id()
    }
}
