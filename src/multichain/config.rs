//! Module configuration
//!
//! Which module deployment and EntryPoint leaves are bound to, how long the
//! signer may take, and when hashing and packaging fan out across threads.

use crate::erc4337::ENTRY_POINT_V07;
use crate::error::{ErrorCode, MultiChainError, MultiChainResult};
use crate::utils::crypto::parse_address;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Multi-chain validation module deployment (same address on all chains)
pub const DEFAULT_MULTICHAIN_MODULE: &str = "0x000000824dc138db84FD9109fc154bdad332Aa8E";

/// Default upper bound on one signer call
pub const DEFAULT_SIGNER_TIMEOUT_MS: u64 = 30_000;

/// Batches at least this large are hashed and packaged in parallel
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 16;

/// Configuration for a [`MultiChainValidationModule`](super::MultiChainValidationModule)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModuleConfig {
    /// Validation module address embedded in every blob and leaf
    pub module_address: String,
    /// EntryPoint used for the ERC-4337 userOpHash
    pub entry_point: String,
    /// Signer timeout in milliseconds; `None` or `0` waits indefinitely
    pub signer_timeout_ms: Option<u64>,
    /// Minimum batch size for rayon fan-out
    pub parallel_threshold: usize,
    /// Run the offline verifier over every packaged operation before returning it
    pub verify_proofs: bool,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            module_address: DEFAULT_MULTICHAIN_MODULE.to_string(),
            entry_point: ENTRY_POINT_V07.to_string(),
            signer_timeout_ms: Some(DEFAULT_SIGNER_TIMEOUT_MS),
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
            verify_proofs: true,
        }
    }
}

impl ModuleConfig {
    pub fn with_module_address(mut self, module_address: &str) -> Self {
        self.module_address = module_address.to_string();
        self
    }

    pub fn with_entry_point(mut self, entry_point: &str) -> Self {
        self.entry_point = entry_point.to_string();
        self
    }

    pub fn with_signer_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.signer_timeout_ms = timeout.map(|t| t.as_millis().min(u64::MAX as u128) as u64);
        self
    }

    pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold;
        self
    }

    pub fn signer_timeout(&self) -> Option<Duration> {
        self.signer_timeout_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    /// Parse from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> MultiChainResult<Self> {
        let mut config: Self = serde_json::from_str(json)?;
        config.signer_timeout_ms = config.signer_timeout_ms.filter(|ms| *ms > 0);
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `MULTICHAIN_*` environment variables
    pub fn from_env() -> MultiChainResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> MultiChainResult<Self> {
        let mut config = Self::default();

        if let Some(module) = lookup("MULTICHAIN_MODULE_ADDRESS") {
            config.module_address = module;
        }
        if let Some(entry_point) = lookup("MULTICHAIN_ENTRY_POINT") {
            config.entry_point = entry_point;
        }
        if let Some(timeout) = lookup("MULTICHAIN_SIGNER_TIMEOUT_MS") {
            config.signer_timeout_ms = match timeout.trim() {
                "" | "none" | "0" => None,
                value => Some(value.parse().map_err(|_| {
                    MultiChainError::invalid_input(format!(
                        "MULTICHAIN_SIGNER_TIMEOUT_MS is not a number: {}",
                        value
                    ))
                })?),
            };
        }
        if let Some(threshold) = lookup("MULTICHAIN_PARALLEL_THRESHOLD") {
            config.parallel_threshold = threshold.trim().parse().map_err(|_| {
                MultiChainError::invalid_input(format!(
                    "MULTICHAIN_PARALLEL_THRESHOLD is not a number: {}",
                    threshold
                ))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> MultiChainResult<()> {
        let module = parse_address(&self.module_address, "moduleAddress")?;
        parse_address(&self.entry_point, "entryPoint")?;
        if module == [0u8; 20] {
            return Err(MultiChainError::new(
                ErrorCode::InvalidAddress,
                "moduleAddress must not be the zero address",
            ));
        }
        if self.parallel_threshold == 0 {
            return Err(MultiChainError::invalid_input("parallelThreshold must be at least 1"));
        }
        Ok(())
    }
}
