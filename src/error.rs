//! Unified error types for the multi-chain validation module
//!
//! All errors flow through this module so callers can tell a rejected batch
//! (validation), a failed signer (signing) and an internal tree fault
//! (proof consistency) apart without matching on message strings.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Main error type for all multi-chain operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiChainError {
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<String>,
}

impl MultiChainError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    // Convenience constructors
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, msg)
    }

    pub fn invalid_operation(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidOperation, msg)
    }

    pub fn signing_failed(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::SigningFailed, msg)
    }

    pub fn proof_inconsistent(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ProofInconsistent, msg)
    }

    pub fn decoding(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::DecodingError, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, msg)
    }

    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }

    pub fn is_validation(&self) -> bool {
        self.category() == ErrorCategory::Validation
    }

    pub fn is_signing(&self) -> bool {
        self.category() == ErrorCategory::Signing
    }
}

impl fmt::Display for MultiChainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

impl std::error::Error for MultiChainError {}

/// Error codes for categorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    // Validation errors
    InvalidInput,
    InvalidAddress,
    InvalidOperation,
    InvalidValidityWindow,
    EmptyBatch,
    DuplicateChainId,
    HexError,
    JsonError,

    // Signing errors
    SigningFailed,
    KeyUnavailable,
    UserRejected,
    Timeout,
    VerificationFailed,

    // Tree errors
    ProofInconsistent,

    // Blob errors
    DecodingError,

    // Internal
    Internal,
}

/// Error taxonomy as seen by the caller of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Rejected before hashing; never retried automatically
    Validation,
    /// Signer unavailable, rejected or timed out; the whole session failed
    Signing,
    /// A built proof did not reconstruct its root
    ProofConsistency,
    /// An authorization blob could not be parsed
    Encoding,
    Internal,
}

impl ErrorCode {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidInput
            | Self::InvalidAddress
            | Self::InvalidOperation
            | Self::InvalidValidityWindow
            | Self::EmptyBatch
            | Self::DuplicateChainId
            | Self::HexError
            | Self::JsonError => ErrorCategory::Validation,
            Self::SigningFailed
            | Self::KeyUnavailable
            | Self::UserRejected
            | Self::Timeout
            | Self::VerificationFailed => ErrorCategory::Signing,
            Self::ProofInconsistent => ErrorCategory::ProofConsistency,
            Self::DecodingError => ErrorCategory::Encoding,
            Self::Internal => ErrorCategory::Internal,
        }
    }
}

/// Result type alias for multi-chain operations
pub type MultiChainResult<T> = Result<T, MultiChainError>;

// Conversions from common error types

impl From<serde_json::Error> for MultiChainError {
    fn from(e: serde_json::Error) -> Self {
        MultiChainError::new(ErrorCode::JsonError, e.to_string())
    }
}

impl From<hex::FromHexError> for MultiChainError {
    fn from(e: hex::FromHexError) -> Self {
        MultiChainError::new(ErrorCode::HexError, e.to_string())
    }
}

impl From<secp256k1::Error> for MultiChainError {
    fn from(e: secp256k1::Error) -> Self {
        MultiChainError::new(ErrorCode::VerificationFailed, format!("Secp256k1 error: {}", e))
    }
}
