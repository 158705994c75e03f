//! ERC-4337 UserOperation structure and hashing
//!
//! Implements the UserOperation (v0.7) format for account abstraction.
//! A `UserOperation` is the draft the multi-chain module authorizes: every
//! field except `signature` is covered by the operation hash.

use crate::error::{ErrorCode, MultiChainError, MultiChainResult};
use crate::utils::crypto::{decode_hex, keccak256, keccak256_concat, pad_address, parse_address, parse_uint, u64_word};
use serde::{Deserialize, Serialize};

/// UserOperation for ERC-4337 v0.7
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperation {
    /// The account making the operation
    pub sender: String,
    /// Anti-replay parameter
    pub nonce: String,
    /// Factory address (for account creation)
    pub factory: Option<String>,
    /// Factory init data
    pub factory_data: Option<String>,
    /// The encoded calls to execute
    pub call_data: String,
    /// Gas limit for executing callData
    pub call_gas_limit: String,
    /// Gas for account validation
    pub verification_gas_limit: String,
    /// Gas to compensate bundler for overhead
    pub pre_verification_gas: String,
    /// Maximum total fee per gas
    pub max_fee_per_gas: String,
    /// Maximum priority fee per gas
    pub max_priority_fee_per_gas: String,
    /// Paymaster address (sponsorship)
    pub paymaster: Option<String>,
    /// Gas for paymaster verification
    pub paymaster_verification_gas_limit: Option<String>,
    /// Gas for paymaster post-op
    pub paymaster_post_op_gas_limit: Option<String>,
    /// Additional paymaster data
    pub paymaster_data: Option<String>,
    /// Signature over the userOp
    pub signature: String,
}

impl UserOperation {
    /// Create a new UserOperation with default gas values
    pub fn new(sender: &str, nonce: u64, call_data: &str) -> Self {
        Self {
            sender: sender.to_string(),
            nonce: format!("0x{:x}", nonce),
            factory: None,
            factory_data: None,
            call_data: call_data.to_string(),
            call_gas_limit: "0x30d40".to_string(),        // 200,000
            verification_gas_limit: "0x186a0".to_string(), // 100,000
            pre_verification_gas: "0xc350".to_string(),    // 50,000
            max_fee_per_gas: "0x77359400".to_string(),     // 2 gwei
            max_priority_fee_per_gas: "0x3b9aca00".to_string(), // 1 gwei
            paymaster: None,
            paymaster_verification_gas_limit: None,
            paymaster_post_op_gas_limit: None,
            paymaster_data: None,
            signature: "0x".to_string(),
        }
    }

    /// Set factory for account deployment
    pub fn with_factory(mut self, factory: &str, factory_data: &str) -> Self {
        self.factory = Some(factory.to_string());
        self.factory_data = Some(factory_data.to_string());
        self
    }

    /// Set gas limits
    pub fn with_gas_limits(
        mut self,
        call_gas: u64,
        verification_gas: u64,
        pre_verification_gas: u64,
    ) -> Self {
        self.call_gas_limit = format!("0x{:x}", call_gas);
        self.verification_gas_limit = format!("0x{:x}", verification_gas);
        self.pre_verification_gas = format!("0x{:x}", pre_verification_gas);
        self
    }

    /// Set fee parameters
    pub fn with_fees(mut self, max_fee: u64, priority_fee: u64) -> Self {
        self.max_fee_per_gas = format!("0x{:x}", max_fee);
        self.max_priority_fee_per_gas = format!("0x{:x}", priority_fee);
        self
    }

    /// Attach a sponsorship payload.
    ///
    /// Sponsorship is part of the hashed fields, so it must be in place
    /// before the operation enters a signing session.
    pub fn with_paymaster(
        mut self,
        paymaster: &str,
        verification_gas: u64,
        post_op_gas: u64,
        data: &str,
    ) -> Self {
        self.paymaster = Some(paymaster.to_string());
        self.paymaster_verification_gas_limit = Some(format!("0x{:x}", verification_gas));
        self.paymaster_post_op_gas_limit = Some(format!("0x{:x}", post_op_gas));
        self.paymaster_data = Some(data.to_string());
        self
    }

    /// Set the signature
    pub fn with_signature(mut self, signature: &str) -> Self {
        self.signature = signature.to_string();
        self
    }

    /// Whether a sponsorship payload is attached
    pub fn is_sponsored(&self) -> bool {
        self.paymaster.is_some()
    }

    /// Check every hashed field without producing the hash
    pub fn validate(&self) -> MultiChainResult<()> {
        self.pack_for_hash().map(|_| ())
    }

    /// `initCode` = factory || factoryData, empty when no factory is set
    pub fn init_code(&self) -> MultiChainResult<Vec<u8>> {
        match (&self.factory, &self.factory_data) {
            (Some(factory), Some(data)) => {
                let mut init_code = parse_address(factory, "factory")?.to_vec();
                init_code.extend(decode_hex(data, "factoryData")?);
                Ok(init_code)
            }
            (None, None) => Ok(Vec::new()),
            _ => Err(MultiChainError::invalid_operation(
                "factory and factoryData must be set together",
            )),
        }
    }

    /// `paymasterAndData` = paymaster || uint128 verificationGas || uint128 postOpGas || data
    pub fn paymaster_and_data(&self) -> MultiChainResult<Vec<u8>> {
        let Some(paymaster) = &self.paymaster else {
            if self.paymaster_verification_gas_limit.is_some()
                || self.paymaster_post_op_gas_limit.is_some()
                || self.paymaster_data.is_some()
            {
                return Err(MultiChainError::invalid_operation(
                    "paymaster gas limits or data set without a paymaster",
                ));
            }
            return Ok(Vec::new());
        };

        let verification_gas = self.paymaster_verification_gas_limit.as_deref().ok_or_else(|| {
            MultiChainError::invalid_operation("paymasterVerificationGasLimit is required with a paymaster")
        })?;
        let post_op_gas = self.paymaster_post_op_gas_limit.as_deref().ok_or_else(|| {
            MultiChainError::invalid_operation("paymasterPostOpGasLimit is required with a paymaster")
        })?;

        let mut pm_data = parse_address(paymaster, "paymaster")?.to_vec();
        pm_data.extend(parse_uint::<16>(verification_gas, "paymasterVerificationGasLimit")?);
        pm_data.extend(parse_uint::<16>(post_op_gas, "paymasterPostOpGasLimit")?);
        if let Some(data) = &self.paymaster_data {
            pm_data.extend(decode_hex(data, "paymasterData")?);
        }
        Ok(pm_data)
    }

    /// Pack the UserOperation for hashing (v0.7 format)
    pub fn pack_for_hash(&self) -> MultiChainResult<Vec<u8>> {
        let mut packed = Vec::with_capacity(32 * 8);

        // sender (address)
        packed.extend(pad_address(&parse_address(&self.sender, "sender")?));

        // nonce (uint256)
        packed.extend(parse_uint::<32>(&self.nonce, "nonce")?);

        // hash(initCode)
        packed.extend(keccak256(&self.init_code()?));

        // hash(callData)
        packed.extend(keccak256(&decode_hex(&self.call_data, "callData")?));

        // accountGasLimits: bytes32 = verificationGasLimit || callGasLimit
        packed.extend(parse_uint::<16>(&self.verification_gas_limit, "verificationGasLimit")?);
        packed.extend(parse_uint::<16>(&self.call_gas_limit, "callGasLimit")?);

        // preVerificationGas
        packed.extend(parse_uint::<32>(&self.pre_verification_gas, "preVerificationGas")?);

        // gasFees: bytes32 = maxPriorityFeePerGas || maxFeePerGas
        packed.extend(parse_uint::<16>(&self.max_priority_fee_per_gas, "maxPriorityFeePerGas")?);
        packed.extend(parse_uint::<16>(&self.max_fee_per_gas, "maxFeePerGas")?);

        // hash(paymasterAndData)
        packed.extend(keccak256(&self.paymaster_and_data()?));

        Ok(packed)
    }

    /// keccak256 of the packed fields, before chain binding
    pub fn packed_hash(&self) -> MultiChainResult<[u8; 32]> {
        Ok(keccak256(&self.pack_for_hash()?))
    }

    /// ERC-4337 userOpHash: keccak256(packedHash || entryPoint || chainId)
    pub fn user_op_hash(&self, entry_point: &[u8; 20], chain_id: u64) -> MultiChainResult<[u8; 32]> {
        let packed_hash = self.packed_hash()?;
        Ok(keccak256_concat(&[
            &packed_hash,
            &pad_address(entry_point),
            &u64_word(chain_id),
        ]))
    }

    /// Get the hash of this UserOperation for signing
    pub fn get_hash(&self, entry_point: &str, chain_id: u64) -> MultiChainResult<[u8; 32]> {
        let entry_point = parse_address(entry_point, "entryPoint")?;
        self.user_op_hash(&entry_point, chain_id)
    }
}

impl Default for UserOperation {
    fn default() -> Self {
        Self::new("0x0000000000000000000000000000000000000000", 0, "0x")
    }
}

/// Classify a validation failure on a specific batch item
pub(crate) fn operation_error(index: usize, chain_id: u64, err: MultiChainError) -> MultiChainError {
    let code = match err.code {
        ErrorCode::HexError | ErrorCode::InvalidAddress => err.code,
        _ => ErrorCode::InvalidOperation,
    };
    MultiChainError::new(code, format!("Operation {} (chain {}) is malformed", index, chain_id))
        .with_details(err.to_string())
}
