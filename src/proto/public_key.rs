//! Public key blobs in SSH wire form.
//!
//! Throughout the agent a public key is identified by its raw wire blob;
//! two keys are the same key exactly when their blobs are byte-identical.
//! This module builds and picks apart the blobs for the two algorithms the
//! agent signs with.

use std::fmt;

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine as _;
use sha2::{Digest, Sha256};
use ssh_encoding::{Decode, Encode};

use super::error::{ProtoError, ProtoResult};

/// SSH algorithm name for Ed25519 keys.
pub const ALG_ED25519: &str = "ssh-ed25519";

/// SSH algorithm name for ECDSA keys over NIST P-256.
pub const ALG_ECDSA_P256: &str = "ecdsa-sha2-nistp256";

/// Curve identifier embedded in ECDSA P-256 blobs.
pub const CURVE_P256: &str = "nistp256";

/// Key algorithms this agent can hold and sign with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyAlgorithm {
    /// Ed25519 (EdDSA over Curve25519).
    Ed25519,
    /// ECDSA over NIST P-256 with SHA-256.
    EcdsaP256,
}

impl KeyAlgorithm {
    /// Canonical SSH name of the algorithm.
    pub fn name(self) -> &'static str {
        match self {
            Self::Ed25519 => ALG_ED25519,
            Self::EcdsaP256 => ALG_ECDSA_P256,
        }
    }

    /// Look up an algorithm by its SSH name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            ALG_ED25519 => Some(Self::Ed25519),
            ALG_ECDSA_P256 => Some(Self::EcdsaP256),
            _ => None,
        }
    }
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Build the wire blob of an Ed25519 public key.
pub fn ed25519_blob(public: &[u8; 32]) -> ProtoResult<Vec<u8>> {
    let mut blob = Vec::new();
    ALG_ED25519.encode(&mut blob)?;
    public.as_slice().encode(&mut blob)?;
    Ok(blob)
}

/// Build the wire blob of an ECDSA P-256 public key from its uncompressed
/// SEC1 point.
pub fn ecdsa_p256_blob(point: &[u8]) -> ProtoResult<Vec<u8>> {
    check_p256_point(point)?;

    let mut blob = Vec::new();
    ALG_ECDSA_P256.encode(&mut blob)?;
    CURVE_P256.encode(&mut blob)?;
    point.encode(&mut blob)?;
    Ok(blob)
}

/// Read the leading algorithm name out of a key (or signature) blob.
pub fn algorithm_name(blob: &[u8]) -> ProtoResult<String> {
    Ok(String::decode(&mut &blob[..])?)
}

/// Extract the 32-byte public key from an `ssh-ed25519` blob.
pub fn ed25519_public_from_blob(blob: &[u8]) -> ProtoResult<[u8; 32]> {
    let reader = &mut &blob[..];
    if String::decode(reader)? != ALG_ED25519 {
        return Err(ProtoError::InvalidFormat("not an ssh-ed25519 key blob"));
    }
    Vec::decode(reader)?
        .try_into()
        .map_err(|_| ProtoError::InvalidFormat("ed25519 public key must be 32 bytes"))
}

/// Extract the uncompressed SEC1 point from an `ecdsa-sha2-nistp256` blob.
pub fn ecdsa_p256_point_from_blob(blob: &[u8]) -> ProtoResult<Vec<u8>> {
    let reader = &mut &blob[..];
    if String::decode(reader)? != ALG_ECDSA_P256 {
        return Err(ProtoError::InvalidFormat("not an ecdsa-sha2-nistp256 key blob"));
    }
    if String::decode(reader)? != CURVE_P256 {
        return Err(ProtoError::InvalidFormat("unexpected curve identifier"));
    }
    let point = Vec::decode(reader)?;
    check_p256_point(&point)?;
    Ok(point)
}

fn check_p256_point(point: &[u8]) -> ProtoResult<()> {
    if point.len() != 65 || point[0] != 0x04 {
        return Err(ProtoError::InvalidFormat(
            "P-256 point must be 65 bytes, uncompressed",
        ));
    }
    Ok(())
}

/// `SHA256:`-style fingerprint of a public key blob, with the trailing
/// base64 padding stripped.
pub fn fingerprint(blob: &[u8]) -> String {
    format!("SHA256:{}", STANDARD_NO_PAD.encode(Sha256::digest(blob)))
}

/// Render a public key as an `authorized_keys` line.
pub fn authorized_keys_line(blob: &[u8], comment: &str) -> ProtoResult<String> {
    let algorithm = algorithm_name(blob)?;
    Ok(format!("{algorithm} {} {comment}", STANDARD.encode(blob)))
}
