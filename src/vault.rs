//! Key storage interface and signing keys.
//!
//! The agent proper never touches raw private-key material outside this
//! module: it sees a [`KeyVault`] that lists [`KeyIdentifier`]s and loads
//! [`Signer`]s. The file-backed vault here parses OpenSSH private key
//! files; other backings (an OS keychain, a hardware secure element) slot
//! in behind the same traits.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use log::info;
use signature::Signer as _;
use ssh_key::private::{EcdsaKeypair, KeypairData, PrivateKey};
use thiserror::Error;

use crate::proto::public_key::{self, KeyAlgorithm};
use crate::proto::signature as sig_format;
use crate::proto::ProtoError;

/// Vault error.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Key file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Key file could not be parsed.
    #[error("SSH key error: {0}")]
    Key(#[from] ssh_key::Error),

    /// The key's algorithm is not one this agent signs with.
    #[error("unsupported key algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The signing primitive itself failed.
    #[error("signing failed: {0}")]
    Signature(#[from] signature::Error),

    /// Wire-format error while building blobs.
    #[error("wire format error: {0}")]
    Proto(#[from] ProtoError),
}

/// Stable description of a key held by a vault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyIdentifier {
    /// Opaque stable id; the key's fingerprint for file-backed vaults.
    pub id: String,

    /// Algorithm of the key.
    pub algorithm: KeyAlgorithm,

    /// Human-readable comment.
    pub comment: String,

    /// When the key was created (best effort for file-backed vaults).
    pub created_at: SystemTime,
}

/// A private key capable of producing SSH-format signatures.
pub trait Signer: Send + Sync {
    /// Algorithm of the key.
    fn algorithm(&self) -> KeyAlgorithm;

    /// Public key in SSH wire form. Two signers hold the same key exactly
    /// when these bytes are equal.
    fn public_key_blob(&self) -> &[u8];

    /// Human-readable comment.
    fn comment(&self) -> &str;

    /// `SHA256:` fingerprint of the public key.
    fn fingerprint(&self) -> String {
        public_key::fingerprint(self.public_key_blob())
    }

    /// Sign `data`, returning the signature in SSH wire form.
    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, VaultError>;
}

/// Source of signing keys.
pub trait KeyVault: Send + Sync {
    /// Describe every key the vault holds.
    fn list(&self) -> Vec<KeyIdentifier>;

    /// Load the signer for one key. `None` when the key is gone or
    /// unreadable.
    fn load(&self, id: &KeyIdentifier) -> Option<Arc<dyn Signer>>;

    /// All signers, for lookup by public key blob.
    fn list_all_signers(&self) -> Vec<Arc<dyn Signer>>;
}

/// Ed25519 signing key.
pub struct Ed25519Signer {
    key: ed25519_dalek::SigningKey,
    public_blob: Vec<u8>,
    comment: String,
}

impl Ed25519Signer {
    /// Wrap an Ed25519 private key.
    pub fn new(key: ed25519_dalek::SigningKey, comment: impl Into<String>) -> Result<Self, VaultError> {
        let public_blob = public_key::ed25519_blob(key.verifying_key().as_bytes())?;
        Ok(Self {
            key,
            public_blob,
            comment: comment.into(),
        })
    }
}

impl Signer for Ed25519Signer {
    fn algorithm(&self) -> KeyAlgorithm {
        KeyAlgorithm::Ed25519
    }

    fn public_key_blob(&self) -> &[u8] {
        &self.public_blob
    }

    fn comment(&self) -> &str {
        &self.comment
    }

    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, VaultError> {
        let signature = self.key.try_sign(data)?;
        Ok(sig_format::ed25519_to_ssh(&signature.to_bytes())?)
    }
}

impl fmt::Debug for Ed25519Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ed25519Signer")
            .field("fingerprint", &self.fingerprint())
            .field("comment", &self.comment)
            .finish_non_exhaustive()
    }
}

/// Software ECDSA P-256 signing key.
pub struct EcdsaP256Signer {
    key: p256::ecdsa::SigningKey,
    public_blob: Vec<u8>,
    comment: String,
}

impl EcdsaP256Signer {
    /// Wrap a P-256 private key.
    pub fn new(key: p256::ecdsa::SigningKey, comment: impl Into<String>) -> Result<Self, VaultError> {
        let point = key.verifying_key().to_encoded_point(false);
        let public_blob = public_key::ecdsa_p256_blob(point.as_bytes())?;
        Ok(Self {
            key,
            public_blob,
            comment: comment.into(),
        })
    }
}

impl Signer for EcdsaP256Signer {
    fn algorithm(&self) -> KeyAlgorithm {
        KeyAlgorithm::EcdsaP256
    }

    fn public_key_blob(&self) -> &[u8] {
        &self.public_blob
    }

    fn comment(&self) -> &str {
        &self.comment
    }

    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, VaultError> {
        let signature: p256::ecdsa::Signature = self.key.try_sign(data)?;
        Ok(sig_format::ecdsa_p256_to_ssh(signature.to_bytes().as_slice())?)
    }
}

impl fmt::Debug for EcdsaP256Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EcdsaP256Signer")
            .field("fingerprint", &self.fingerprint())
            .field("comment", &self.comment)
            .finish_non_exhaustive()
    }
}

/// Key description shown to the approval prompt in place of a key this
/// agent cannot sign with itself: the private half lives in the upstream
/// agent, so there is nothing to invoke `sign` on.
#[derive(Debug, Clone)]
pub struct ProxySignerView {
    /// Algorithm, when the blob names one this agent knows.
    pub algorithm: Option<KeyAlgorithm>,

    /// Public key blob from the sign request.
    pub public_key_blob: Vec<u8>,

    /// `SHA256:` fingerprint of the blob.
    pub fingerprint: String,
}

impl ProxySignerView {
    /// Describe a key by its public blob alone.
    pub fn from_blob(public_key_blob: Vec<u8>) -> Self {
        let algorithm = public_key::algorithm_name(&public_key_blob)
            .ok()
            .and_then(|name| KeyAlgorithm::from_name(&name));
        let fingerprint = public_key::fingerprint(&public_key_blob);
        Self {
            algorithm,
            public_key_blob,
            fingerprint,
        }
    }
}

struct VaultEntry {
    id: KeyIdentifier,
    signer: Arc<dyn Signer>,
}

/// Vault over OpenSSH private key files read at startup.
pub struct FileVault {
    entries: Vec<VaultEntry>,
}

impl FileVault {
    /// A vault with no keys.
    pub fn empty() -> Self {
        Self { entries: Vec::new() }
    }

    /// Read every key file and wrap the supported ones as signers.
    pub fn load(paths: &[PathBuf]) -> Result<Self, VaultError> {
        let mut vault = Self::empty();

        for path in paths {
            let key = PrivateKey::read_openssh_file(path)?;
            let signer = signer_from_key(&key)?;
            let created_at = fs_created_at(path);
            info!("loaded {} key {} from {}", signer.algorithm(), signer.fingerprint(), path.display());
            vault.insert_with_timestamp(signer, created_at);
        }

        Ok(vault)
    }

    /// Add a signer to the vault.
    pub fn insert(&mut self, signer: Arc<dyn Signer>) {
        self.insert_with_timestamp(signer, SystemTime::now());
    }

    fn insert_with_timestamp(&mut self, signer: Arc<dyn Signer>, created_at: SystemTime) {
        let id = KeyIdentifier {
            id: signer.fingerprint(),
            algorithm: signer.algorithm(),
            comment: signer.comment().to_string(),
            created_at,
        };
        self.entries.push(VaultEntry { id, signer });
    }
}

impl KeyVault for FileVault {
    fn list(&self) -> Vec<KeyIdentifier> {
        self.entries.iter().map(|entry| entry.id.clone()).collect()
    }

    fn load(&self, id: &KeyIdentifier) -> Option<Arc<dyn Signer>> {
        self.entries
            .iter()
            .find(|entry| entry.id.id == id.id)
            .map(|entry| Arc::clone(&entry.signer))
    }

    fn list_all_signers(&self) -> Vec<Arc<dyn Signer>> {
        self.entries
            .iter()
            .map(|entry| Arc::clone(&entry.signer))
            .collect()
    }
}

impl fmt::Debug for FileVault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileVault")
            .field("keys", &self.entries.iter().map(|e| &e.id.id).collect::<Vec<_>>())
            .finish()
    }
}

fn signer_from_key(key: &PrivateKey) -> Result<Arc<dyn Signer>, VaultError> {
    let comment = key.comment().to_string();

    match key.key_data() {
        KeypairData::Ed25519(pair) => {
            let signing = ed25519_dalek::SigningKey::from_bytes(&pair.private.to_bytes());
            Ok(Arc::new(Ed25519Signer::new(signing, comment)?))
        }
        KeypairData::Ecdsa(EcdsaKeypair::NistP256 { private, .. }) => {
            let signing = p256::ecdsa::SigningKey::from_slice(private.as_slice())?;
            Ok(Arc::new(EcdsaP256Signer::new(signing, comment)?))
        }
        other => Err(VaultError::UnsupportedAlgorithm(
            other
                .algorithm()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| "unknown".into()),
        )),
    }
}

fn fs_created_at(path: &Path) -> SystemTime {
    std::fs::metadata(path)
        .and_then(|meta| meta.created().or_else(|_| meta.modified()))
        .unwrap_or_else(|_| SystemTime::now())
}
