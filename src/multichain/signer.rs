//! Signer Adapter
//!
//! The signing key is reached through the [`RootSigner`] capability, which is
//! handed to the module explicitly. A session calls it exactly once, on the
//! Merkle root. [`LocalKeySigner`] is the in-process secp256k1 implementation;
//! remote or hardware signers implement the same trait.
//!
//! Roots are signed with EIP-191 `personal_sign` over the 32 raw root bytes:
//! `keccak256("\x19Ethereum Signed Message:\n32" || root)`.

use super::types::RootSignature;
use crate::error::{ErrorCode, MultiChainError, MultiChainResult};
use crate::utils::crypto::{keccak256, keccak256_concat, to_checksum_address};
use async_trait::async_trait;
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use secrecy::{ExposeSecret, SecretBox};
use std::sync::Arc;
use std::time::Duration;
use zeroize::Zeroizing;

/// Ethereum message prefix for personal_sign
const ETH_MESSAGE_PREFIX: &str = "\x19Ethereum Signed Message:\n";

/// Errors reported by a signer
#[derive(Debug, Clone, thiserror::Error)]
pub enum SignerError {
    #[error("Signing key unavailable: {0}")]
    KeyUnavailable(String),

    #[error("Signing request rejected: {0}")]
    UserRejected(String),

    #[error("Signer did not answer within {0:?}")]
    Timeout(Duration),

    #[error("Invalid private key: {0}")]
    InvalidKey(String),

    #[error("Signing failed: {0}")]
    Failed(String),
}

impl From<SignerError> for MultiChainError {
    fn from(e: SignerError) -> Self {
        let code = match &e {
            SignerError::KeyUnavailable(_) | SignerError::InvalidKey(_) => ErrorCode::KeyUnavailable,
            SignerError::UserRejected(_) => ErrorCode::UserRejected,
            SignerError::Timeout(_) => ErrorCode::Timeout,
            SignerError::Failed(_) => ErrorCode::SigningFailed,
        };
        MultiChainError::new(code, e.to_string())
    }
}

/// Capability that signs a 32-byte digest with the configured key
#[async_trait]
pub trait RootSigner: Send + Sync {
    /// Sign `digest`; may suspend on a remote or hardware key
    async fn sign_digest(&self, digest: &[u8; 32]) -> Result<RootSignature, SignerError>;

    /// Checksummed address of the signing key, if known up front
    fn address(&self) -> Option<String> {
        None
    }
}

#[async_trait]
impl<S: RootSigner + ?Sized> RootSigner for Arc<S> {
    async fn sign_digest(&self, digest: &[u8; 32]) -> Result<RootSignature, SignerError> {
        (**self).sign_digest(digest).await
    }

    fn address(&self) -> Option<String> {
        (**self).address()
    }
}

#[async_trait]
impl<S: RootSigner + ?Sized> RootSigner for Box<S> {
    async fn sign_digest(&self, digest: &[u8; 32]) -> Result<RootSignature, SignerError> {
        (**self).sign_digest(digest).await
    }

    fn address(&self) -> Option<String> {
        (**self).address()
    }
}

/// EIP-191 hash of a message as signed by `personal_sign`
pub fn personal_message_hash(message: &[u8]) -> [u8; 32] {
    let prefix = format!("{}{}", ETH_MESSAGE_PREFIX, message.len());
    keccak256_concat(&[prefix.as_bytes(), message])
}

/// Recover the address that `personal_sign`ed `digest`.
///
/// Accepts `v` as 0/1 or 27/28.
pub fn recover_signer(digest: &[u8; 32], signature: &[u8]) -> MultiChainResult<[u8; 20]> {
    if signature.len() != 65 {
        return Err(MultiChainError::new(
            ErrorCode::VerificationFailed,
            format!("expected a 65-byte signature, got {}", signature.len()),
        ));
    }

    let v = match signature[64] {
        v @ 0..=1 => v,
        v @ 27..=28 => v - 27,
        other => {
            return Err(MultiChainError::new(
                ErrorCode::VerificationFailed,
                format!("invalid recovery byte {}", other),
            ))
        }
    };

    let secp = Secp256k1::verification_only();
    let recovery_id = RecoveryId::from_i32(v as i32)?;
    let recoverable = RecoverableSignature::from_compact(&signature[..64], recovery_id)?;
    let message = Message::from_digest(personal_message_hash(digest));
    let public_key = secp.recover_ecdsa(&message, &recoverable)?;

    Ok(public_key_to_address(&public_key))
}

/// Convert a secp256k1 public key to an Ethereum address
fn public_key_to_address(public_key: &PublicKey) -> [u8; 20] {
    let pubkey_bytes = public_key.serialize_uncompressed();
    let hash = keccak256(&pubkey_bytes[1..]);

    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    address
}

/// secp256k1 key held in process memory, zeroed on drop
pub struct LocalKeySigner {
    secret: SecretBox<[u8; 32]>,
    address: [u8; 20],
}

impl LocalKeySigner {
    pub fn from_bytes(private_key: &[u8]) -> Result<Self, SignerError> {
        if private_key.len() != 32 {
            return Err(SignerError::InvalidKey(format!(
                "expected 32 bytes, got {}",
                private_key.len()
            )));
        }

        let secret_key =
            SecretKey::from_slice(private_key).map_err(|e| SignerError::InvalidKey(e.to_string()))?;
        let public_key = PublicKey::from_secret_key(&Secp256k1::signing_only(), &secret_key);

        let mut bytes = Box::new([0u8; 32]);
        bytes.copy_from_slice(private_key);

        Ok(Self {
            secret: SecretBox::new(bytes),
            address: public_key_to_address(&public_key),
        })
    }

    pub fn from_hex(private_key: &str) -> Result<Self, SignerError> {
        let bytes = Zeroizing::new(
            hex::decode(private_key.trim_start_matches("0x"))
                .map_err(|e| SignerError::InvalidKey(format!("Invalid hex: {}", e)))?,
        );
        Self::from_bytes(&bytes)
    }

    /// Fresh key from the operating system RNG
    pub fn random() -> Self {
        let secret_key = SecretKey::new(&mut rand::rngs::OsRng);
        let public_key = PublicKey::from_secret_key(&Secp256k1::signing_only(), &secret_key);
        Self {
            secret: SecretBox::new(Box::new(secret_key.secret_bytes())),
            address: public_key_to_address(&public_key),
        }
    }

    pub fn address_bytes(&self) -> &[u8; 20] {
        &self.address
    }

    pub fn checksum_address(&self) -> String {
        to_checksum_address(&self.address)
    }

    /// personal_sign `digest`; returns 65 bytes r || s || v with v in {27, 28}
    pub fn sign_personal(&self, digest: &[u8; 32]) -> Result<RootSignature, SignerError> {
        let secp = Secp256k1::signing_only();
        let secret_key = SecretKey::from_slice(self.secret.expose_secret())
            .map_err(|e| SignerError::KeyUnavailable(e.to_string()))?;

        let message = Message::from_digest(personal_message_hash(digest));
        let (recovery_id, compact) = secp
            .sign_ecdsa_recoverable(&message, &secret_key)
            .serialize_compact();

        let mut bytes = Vec::with_capacity(65);
        bytes.extend_from_slice(&compact);
        // v = 27 + recovery_id (legacy format)
        bytes.push(27 + recovery_id.to_i32() as u8);

        Ok(RootSignature::new(bytes).with_signer(self.checksum_address()))
    }
}

impl std::fmt::Debug for LocalKeySigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalKeySigner")
            .field("address", &self.checksum_address())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RootSigner for LocalKeySigner {
    async fn sign_digest(&self, digest: &[u8; 32]) -> Result<RootSignature, SignerError> {
        self.sign_personal(digest)
    }

    fn address(&self) -> Option<String> {
        Some(self.checksum_address())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Known test private key (DO NOT USE IN PRODUCTION)
    const TEST_KEY: &str = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    #[test]
    fn test_known_key_address() {
        let signer = LocalKeySigner::from_hex(TEST_KEY).unwrap();
        assert_eq!(
            signer.checksum_address(),
            "0x2c7536E3605D9C16a7a3D7b1898e529396a65c23"
        );
    }

    #[test]
    fn test_sign_and_recover() {
        let signer = LocalKeySigner::random();
        let digest = keccak256(b"root");
        let signature = signer.sign_personal(&digest).unwrap();

        assert_eq!(signature.bytes.len(), 65);
        assert!(signature.bytes[64] == 27 || signature.bytes[64] == 28);
        assert_eq!(signature.signer.as_deref(), Some(signer.checksum_address().as_str()));
        assert_eq!(recover_signer(&digest, &signature.bytes).unwrap(), *signer.address_bytes());
    }

    #[test]
    fn test_recover_accepts_zero_based_v() {
        let signer = LocalKeySigner::random();
        let digest = keccak256(b"root");
        let mut bytes = signer.sign_personal(&digest).unwrap().bytes;
        bytes[64] -= 27;
        assert_eq!(recover_signer(&digest, &bytes).unwrap(), *signer.address_bytes());
    }

    #[test]
    fn test_recover_rejects_malformed_signatures() {
        let digest = [1u8; 32];
        assert!(recover_signer(&digest, &[0u8; 64]).is_err());
        let mut bad_v = [1u8; 65];
        bad_v[64] = 5;
        assert_eq!(
            recover_signer(&digest, &bad_v).unwrap_err().code,
            ErrorCode::VerificationFailed
        );
    }

    #[test]
    fn test_personal_message_hash_prefix() {
        let digest = [7u8; 32];
        let mut expected = b"\x19Ethereum Signed Message:\n32".to_vec();
        expected.extend(digest);
        assert_eq!(personal_message_hash(&digest), keccak256(&expected));
    }

    #[test]
    fn test_invalid_keys_rejected() {
        assert!(matches!(LocalKeySigner::from_bytes(&[1u8; 31]), Err(SignerError::InvalidKey(_))));
        assert!(LocalKeySigner::from_bytes(&[0u8; 32]).is_err());
        assert!(LocalKeySigner::from_hex("0xnothex").is_err());
    }

    #[test]
    fn test_debug_does_not_leak_key() {
        let signer = LocalKeySigner::from_hex(TEST_KEY).unwrap();
        let debug = format!("{:?}", signer);
        assert!(!debug.contains(TEST_KEY));
        assert!(debug.contains("0x2c7536E3605D9C16a7a3D7b1898e529396a65c23"));
    }

    #[test]
    fn test_signer_error_codes() {
        let err: MultiChainError = SignerError::UserRejected("denied".into()).into();
        assert_eq!(err.code, ErrorCode::UserRejected);
        assert!(err.is_signing());

        let err: MultiChainError = SignerError::Timeout(Duration::from_secs(1)).into();
        assert_eq!(err.code, ErrorCode::Timeout);
    }

    #[tokio::test]
    async fn test_trait_object_signing() {
        let signer: Arc<dyn RootSigner> = Arc::new(LocalKeySigner::random());
        let digest = [3u8; 32];
        let signature = signer.sign_digest(&digest).await.unwrap();
        let expected = signer.address().unwrap();
        let recovered = recover_signer(&digest, &signature.bytes).unwrap();
        assert_eq!(to_checksum_address(&recovered), expected);
    }
}
