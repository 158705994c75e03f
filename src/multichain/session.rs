//! Multi-Chain Signing Session
//!
//! Orchestrates one batch: validate every draft, hash them (4.1), build the
//! tree (4.2), sign the root exactly once, then package one authorization
//! per item. Output order always equals input order.
//!
//! Opening a session is synchronous and never touches the signer. Signing
//! borrows the session, so after a rejected or timed-out signer call the same
//! tree can be signed again without rehashing.

use super::config::ModuleConfig;
use super::hasher::OperationHasher;
use super::merkle::{MerkleProof, MerkleTree};
use super::packager::SignaturePackager;
use super::signer::{RootSigner, SignerError};
use super::types::{
    AuthorizationBlob, ChainScopedOperation, MerkleRoot, OperationDigest, RootSignature, SignedOperation,
    ValidityWindow,
};
use super::verifier::{verify_membership, verify_root_signer};
use crate::erc4337::user_operation::operation_error;
use crate::error::{ErrorCode, MultiChainError, MultiChainResult};
use crate::utils::crypto::parse_address;
use crate::utils::logging::redact_hex;
use rayon::prelude::*;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Reject a batch before any hashing happens.
///
/// Checks, in order: non-empty, window bounds, chain ids (non-zero, one
/// operation per chain), then every draft's fields.
pub fn validate_batch(batch: &[ChainScopedOperation], window: &ValidityWindow) -> MultiChainResult<()> {
    if batch.is_empty() {
        return Err(MultiChainError::new(
            ErrorCode::EmptyBatch,
            "a signing session needs at least one operation",
        ));
    }

    window.validate()?;

    let mut seen: HashMap<u64, usize> = HashMap::with_capacity(batch.len());
    for (index, op) in batch.iter().enumerate() {
        if op.chain_id == 0 {
            return Err(MultiChainError::invalid_input(format!(
                "Operation {} has chain id 0",
                index
            )));
        }
        if let Some(first) = seen.insert(op.chain_id, index) {
            return Err(MultiChainError::new(
                ErrorCode::DuplicateChainId,
                format!("chain {} appears more than once in the batch", op.chain_id),
            )
            .with_details(format!("indices {} and {}", first, index)));
        }
    }

    for (index, op) in batch.iter().enumerate() {
        op.user_op
            .validate()
            .map_err(|e| operation_error(index, op.chain_id, e))?;
    }

    Ok(())
}

/// A hashed batch and its tree, ready to be signed
#[derive(Debug, Clone)]
pub struct SigningSession {
    operations: Vec<ChainScopedOperation>,
    digests: Vec<OperationDigest>,
    proofs: Vec<MerkleProof>,
    tree: MerkleTree,
    window: ValidityWindow,
}

impl SigningSession {
    pub fn root(&self) -> MerkleRoot {
        self.tree.root()
    }

    pub fn window(&self) -> &ValidityWindow {
        &self.window
    }

    pub fn operations(&self) -> &[ChainScopedOperation] {
        &self.operations
    }

    /// Leaf digests in input order
    pub fn digests(&self) -> &[OperationDigest] {
        &self.digests
    }

    /// Inclusion proofs in input order
    pub fn proofs(&self) -> &[MerkleProof] {
        &self.proofs
    }

    pub fn tree(&self) -> &MerkleTree {
        &self.tree
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Chain ids in input order
    pub fn chain_ids(&self) -> Vec<u64> {
        self.operations.iter().map(|op| op.chain_id).collect()
    }
}

/// Multi-chain validation module bound to one deployment and one signer
pub struct MultiChainValidationModule<S: RootSigner> {
    config: ModuleConfig,
    hasher: OperationHasher,
    signer: S,
}

impl<S: RootSigner> MultiChainValidationModule<S> {
    pub fn new(config: ModuleConfig, signer: S) -> MultiChainResult<Self> {
        config.validate()?;
        let hasher = OperationHasher::new(&config.module_address, &config.entry_point)?;
        Ok(Self {
            config,
            hasher,
            signer,
        })
    }

    pub fn config(&self) -> &ModuleConfig {
        &self.config
    }

    pub fn hasher(&self) -> &OperationHasher {
        &self.hasher
    }

    pub fn signer(&self) -> &S {
        &self.signer
    }

    /// Validate, hash and build the tree for `batch`.
    ///
    /// Every proof is replayed against the root before the session is
    /// returned; a mismatch is a [`ErrorCode::ProofInconsistent`] error.
    pub fn open_session(
        &self,
        batch: Vec<ChainScopedOperation>,
        window: ValidityWindow,
    ) -> MultiChainResult<SigningSession> {
        validate_batch(&batch, &window)?;

        let parallel = batch.len() >= self.config.parallel_threshold;
        debug!(operations = batch.len(), parallel, "Hashing multi-chain batch");

        let digests: Vec<OperationDigest> = if parallel {
            batch
                .par_iter()
                .map(|op| self.hasher.hash(op, &window))
                .collect::<MultiChainResult<_>>()?
        } else {
            batch
                .iter()
                .map(|op| self.hasher.hash(op, &window))
                .collect::<MultiChainResult<_>>()?
        };

        let tree = MerkleTree::build(&digests)?;
        tree.self_verify()?;
        let proofs = tree.proofs();

        info!(
            root = %tree.root(),
            operations = batch.len(),
            depth = tree.depth(),
            valid_after = window.valid_after,
            valid_until = window.valid_until,
            "Opened multi-chain signing session"
        );

        Ok(SigningSession {
            operations: batch,
            digests,
            proofs,
            tree,
            window,
        })
    }

    /// Sign the session root once and package every operation.
    ///
    /// Any signer failure fails the whole session and nothing is returned;
    /// the session itself stays usable for another attempt.
    pub async fn sign_session(&self, session: &SigningSession) -> MultiChainResult<Vec<SignedOperation>> {
        let root = session.root();
        let signature = self.sign_root(&root).await?;

        info!(
            root = %root,
            signer = signature.signer.as_deref().unwrap_or("unknown"),
            signature = %redact_hex(&signature.bytes),
            "Signed multi-chain root"
        );

        let signed = self.package(session, &signature);

        if self.config.verify_proofs {
            self.check_outputs(&signed)?;
        }

        debug!(operations = signed.len(), "Packaged authorizations");
        Ok(signed)
    }

    /// Open a session and sign it in one call
    pub async fn sign_user_ops(
        &self,
        batch: Vec<ChainScopedOperation>,
        window: ValidityWindow,
    ) -> MultiChainResult<Vec<SignedOperation>> {
        let session = self.open_session(batch, window)?;
        self.sign_session(&session).await
    }

    async fn sign_root(&self, root: &MerkleRoot) -> MultiChainResult<RootSignature> {
        let request = self.signer.sign_digest(root.as_bytes());
        let outcome = match self.config.signer_timeout() {
            Some(limit) => match tokio::time::timeout(limit, request).await {
                Ok(result) => result,
                Err(_) => Err(SignerError::Timeout(limit)),
            },
            None => request.await,
        };

        let signature = outcome.map_err(|e| {
            warn!(root = %root, error = %e, "Root signing failed, no operation authorized");
            MultiChainError::from(e)
        })?;

        if signature.bytes.is_empty() {
            return Err(MultiChainError::signing_failed("signer returned an empty signature"));
        }
        Ok(signature)
    }

    fn package(&self, session: &SigningSession, signature: &RootSignature) -> Vec<SignedOperation> {
        let root = session.root();
        let window = session.window;
        let module_address = *self.hasher.module_address();

        let package_one = |(op, proof): (&ChainScopedOperation, &MerkleProof)| {
            let authorization = AuthorizationBlob {
                module_address,
                valid_after: window.valid_after,
                valid_until: window.valid_until,
                merkle_root: root,
                root_signature: signature.bytes.clone(),
                proof: proof.siblings.clone(),
            };
            let encoded = SignaturePackager::encode(&authorization);
            SignedOperation {
                chain_id: op.chain_id,
                user_op: op
                    .user_op
                    .clone()
                    .with_signature(&format!("0x{}", hex::encode(encoded))),
                authorization,
                digest: proof.leaf,
            }
        };

        if session.len() >= self.config.parallel_threshold {
            session
                .operations
                .par_iter()
                .zip(session.proofs.par_iter())
                .map(package_one)
                .collect()
        } else {
            session
                .operations
                .iter()
                .zip(session.proofs.iter())
                .map(package_one)
                .collect()
        }
    }

    fn check_outputs(&self, signed: &[SignedOperation]) -> MultiChainResult<()> {
        let expected = self
            .signer
            .address()
            .map(|address| parse_address(&address, "signer"))
            .transpose()?;
        check_packaged(&self.hasher, signed, expected.as_ref())
    }
}

/// Re-verify packaged outputs before they leave the session.
///
/// A blob that does not decode, names another module, or whose proof does
/// not reach the root is a [`ErrorCode::ProofInconsistent`] fault of this
/// crate. Only a root signed by someone other than `expected_signer` is
/// reported as a signing error.
pub(crate) fn check_packaged(
    hasher: &OperationHasher,
    signed: &[SignedOperation],
    expected_signer: Option<&[u8; 20]>,
) -> MultiChainResult<()> {
    for op in signed {
        let blob = verify_membership(&op.user_op, op.chain_id, hasher).map_err(|e| {
            warn!(chain_id = op.chain_id, error = %e, "Packaged operation failed membership check");
            MultiChainError::proof_inconsistent(format!(
                "packaged operation for chain {} does not verify against its root",
                op.chain_id
            ))
            .with_details(e.to_string())
        })?;
        if blob != op.authorization {
            return Err(MultiChainError::proof_inconsistent(format!(
                "userOp.signature for chain {} does not match its authorization",
                op.chain_id
            )));
        }
    }

    // every output shares one root and one signature
    if let (Some(expected), Some(first)) = (expected_signer, signed.first()) {
        verify_root_signer(&first.authorization, Some(expected))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::erc4337::UserOperation;
    use crate::error::ErrorCategory;
    use crate::multichain::signer::LocalKeySigner;
    use crate::multichain::verifier::verify_signed_operation;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    const SENDER: &str = "0x1234567890123456789012345678901234567890";

    /// Counts calls and fails the first `failures` of them
    struct FlakySigner {
        inner: LocalKeySigner,
        calls: AtomicUsize,
        failures: usize,
    }

    impl FlakySigner {
        fn new(failures: usize) -> Self {
            Self {
                inner: LocalKeySigner::random(),
                calls: AtomicUsize::new(0),
                failures,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RootSigner for FlakySigner {
        async fn sign_digest(&self, digest: &[u8; 32]) -> Result<RootSignature, SignerError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(SignerError::KeyUnavailable("hsm offline".into()));
            }
            self.inner.sign_digest(digest).await
        }

        fn address(&self) -> Option<String> {
            self.inner.address()
        }
    }

    struct StalledSigner;

    #[async_trait]
    impl RootSigner for StalledSigner {
        async fn sign_digest(&self, _digest: &[u8; 32]) -> Result<RootSignature, SignerError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(RootSignature::new(vec![0u8; 65]))
        }
    }

    /// Suspends briefly before signing, like a remote key
    struct DelayedSigner(LocalKeySigner);

    #[async_trait]
    impl RootSigner for DelayedSigner {
        async fn sign_digest(&self, digest: &[u8; 32]) -> Result<RootSignature, SignerError> {
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.0.sign_digest(digest).await
        }

        fn address(&self) -> Option<String> {
            self.0.address()
        }
    }

    fn batch(chains: &[u64]) -> Vec<ChainScopedOperation> {
        chains
            .iter()
            .map(|&chain| ChainScopedOperation::new(UserOperation::new(SENDER, chain, "0xa0712d68"), chain))
            .collect()
    }

    fn module<S: RootSigner>(signer: S) -> MultiChainValidationModule<S> {
        MultiChainValidationModule::new(ModuleConfig::default(), signer).unwrap()
    }

    #[test]
    fn test_validate_batch_errors() {
        let window = ValidityWindow::unbounded();
        assert_eq!(validate_batch(&[], &window).unwrap_err().code, ErrorCode::EmptyBatch);
        assert_eq!(
            validate_batch(&batch(&[1, 2, 1]), &window).unwrap_err().code,
            ErrorCode::DuplicateChainId
        );
        assert_eq!(
            validate_batch(&batch(&[0]), &window).unwrap_err().code,
            ErrorCode::InvalidInput
        );

        let bad_window = ValidityWindow {
            valid_after: 10,
            valid_until: 5,
        };
        assert_eq!(
            validate_batch(&batch(&[1]), &bad_window).unwrap_err().code,
            ErrorCode::InvalidValidityWindow
        );
    }

    #[test]
    fn test_malformed_draft_names_its_index() {
        let mut ops = batch(&[1, 2]);
        ops[1].user_op.call_data = "0xzz".into();
        let err = validate_batch(&ops, &ValidityWindow::unbounded()).unwrap_err();
        assert!(err.is_validation());
        assert!(err.message.contains("Operation 1 (chain 2)"));
    }

    #[test]
    fn test_open_session_keeps_input_order() {
        let module = module(LocalKeySigner::random());
        let session = module
            .open_session(batch(&[137, 1, 8453]), ValidityWindow::unbounded())
            .unwrap();

        assert_eq!(session.chain_ids(), vec![137, 1, 8453]);
        for (i, op) in session.operations().iter().enumerate() {
            let digest = module.hasher().hash(op, session.window()).unwrap();
            assert_eq!(session.digests()[i], digest);
            assert_eq!(session.proofs()[i].leaf, digest);
        }
    }

    #[test]
    fn test_parallel_hashing_matches_sequential() {
        let chains: Vec<u64> = (1..=40).collect();
        let sequential = MultiChainValidationModule::new(
            ModuleConfig::default().with_parallel_threshold(usize::MAX),
            LocalKeySigner::random(),
        )
        .unwrap();
        let parallel = MultiChainValidationModule::new(
            ModuleConfig::default().with_parallel_threshold(1),
            LocalKeySigner::random(),
        )
        .unwrap();

        let a = sequential.open_session(batch(&chains), ValidityWindow::unbounded()).unwrap();
        let b = parallel.open_session(batch(&chains), ValidityWindow::unbounded()).unwrap();
        assert_eq!(a.digests(), b.digests());
        assert_eq!(a.root(), b.root());
    }

    #[tokio::test]
    async fn test_signer_called_once_per_session() {
        let module = module(FlakySigner::new(0));
        let signed = module
            .sign_user_ops(batch(&[1, 10, 42161]), ValidityWindow::unbounded())
            .await
            .unwrap();

        assert_eq!(signed.len(), 3);
        assert_eq!(module.signer().calls(), 1);
        let first = &signed[0].authorization;
        for op in &signed {
            assert_eq!(op.merkle_root(), &first.merkle_root);
            assert_eq!(op.root_signature(), &first.root_signature[..]);
        }
    }

    #[tokio::test]
    async fn test_validation_error_never_reaches_signer() {
        let module = module(FlakySigner::new(0));
        let err = module
            .sign_user_ops(batch(&[1, 1]), ValidityWindow::unbounded())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::DuplicateChainId);
        assert_eq!(module.signer().calls(), 0);
    }

    #[tokio::test]
    async fn test_retry_after_signer_failure() {
        let module = module(FlakySigner::new(1));
        let session = module.open_session(batch(&[1, 2]), ValidityWindow::unbounded()).unwrap();

        let err = module.sign_session(&session).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::KeyUnavailable);
        assert!(err.is_signing());

        let signed = module.sign_session(&session).await.unwrap();
        assert_eq!(signed.len(), 2);
        assert_eq!(*signed[0].merkle_root(), session.root());
        assert_eq!(module.signer().calls(), 2);
    }

    #[tokio::test]
    async fn test_signer_timeout() {
        let config = ModuleConfig::default().with_signer_timeout(Some(Duration::from_millis(50)));
        let module = MultiChainValidationModule::new(config, StalledSigner).unwrap();
        let err = module
            .sign_user_ops(batch(&[1]), ValidityWindow::unbounded())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Timeout);
    }

    #[tokio::test]
    async fn test_shared_signer_across_modules() {
        let signer = Arc::new(LocalKeySigner::random());
        let a = module(signer.clone());
        let b = module(signer.clone());

        let (x, y) = tokio::join!(
            a.sign_user_ops(batch(&[1, 2]), ValidityWindow::unbounded()),
            b.sign_user_ops(batch(&[3, 4]), ValidityWindow::unbounded()),
        );
        assert_ne!(x.unwrap()[0].merkle_root(), y.unwrap()[0].merkle_root());
    }

    #[tokio::test]
    async fn test_signature_field_carries_blob() {
        let module = module(LocalKeySigner::random());
        let window = ValidityWindow::new(1_700_000_000, 1_700_003_600).unwrap();
        let signed = module.sign_user_ops(batch(&[1, 2, 3]), window).await.unwrap();

        for op in &signed {
            let bytes = hex::decode(op.user_op.signature.trim_start_matches("0x")).unwrap();
            let decoded = SignaturePackager::decode(&bytes).unwrap();
            assert_eq!(decoded, op.authorization);
            assert_eq!(decoded.window(), window);
            assert_eq!(decoded.module_address, *module.hasher().module_address());
        }
    }

    #[tokio::test]
    async fn test_zero_timeout_from_json_waits_for_signer() {
        let config = ModuleConfig::from_json(r#"{"signerTimeoutMs": 0}"#).unwrap();
        let module = MultiChainValidationModule::new(config, DelayedSigner(LocalKeySigner::random())).unwrap();
        let signed = module
            .sign_user_ops(batch(&[1, 2]), ValidityWindow::unbounded())
            .await
            .unwrap();
        assert_eq!(signed.len(), 2);
    }

    #[tokio::test]
    async fn test_parallel_packaging_keeps_input_order() {
        let config = ModuleConfig::default().with_parallel_threshold(1);
        let module = MultiChainValidationModule::new(config, LocalKeySigner::random()).unwrap();
        let chains: Vec<u64> = (1..=40).rev().collect();

        let signed = module
            .sign_user_ops(batch(&chains), ValidityWindow::unbounded())
            .await
            .unwrap();

        assert_eq!(signed.iter().map(|op| op.chain_id).collect::<Vec<_>>(), chains);
        let expected = *module.signer().address_bytes();
        for op in &signed {
            assert_eq!(verify_signed_operation(op, module.hasher(), Some(&expected)).unwrap(), expected);
        }
    }

    #[tokio::test]
    async fn test_broken_output_is_proof_inconsistent() {
        let module = module(LocalKeySigner::random());
        let mut signed = module
            .sign_user_ops(batch(&[1, 2, 3]), ValidityWindow::unbounded())
            .await
            .unwrap();
        assert!(check_packaged(module.hasher(), &signed, None).is_ok());

        // a hashed field that no longer matches the packaged leaf
        signed[1].user_op.call_data = "0xdeadbeef".into();
        let err = check_packaged(module.hasher(), &signed, None).unwrap_err();
        assert_eq!(err.code, ErrorCode::ProofInconsistent);
        assert_eq!(err.category(), ErrorCategory::ProofConsistency);
        assert!(!err.is_signing());
    }

    #[tokio::test]
    async fn test_foreign_root_signer_is_signing_error() {
        let module = module(LocalKeySigner::random());
        let signed = module
            .sign_user_ops(batch(&[1, 2]), ValidityWindow::unbounded())
            .await
            .unwrap();

        let stranger = LocalKeySigner::random();
        let err = check_packaged(module.hasher(), &signed, Some(stranger.address_bytes())).unwrap_err();
        assert_eq!(err.code, ErrorCode::VerificationFailed);
        assert!(err.is_signing());
    }
}
