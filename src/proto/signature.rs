//! Signature blobs in SSH wire form.

use ssh_encoding::{Decode, Encode};

use super::error::{ProtoError, ProtoResult};
use super::mpint;
use super::public_key::{ALG_ECDSA_P256, ALG_ED25519};

/// Wrap a raw 64-byte Ed25519 signature into SSH wire form.
pub fn ed25519_to_ssh(raw: &[u8]) -> ProtoResult<Vec<u8>> {
    if raw.len() != 64 {
        return Err(ProtoError::InvalidFormat("ed25519 signature must be 64 bytes"));
    }

    let mut blob = Vec::new();
    ALG_ED25519.encode(&mut blob)?;
    raw.encode(&mut blob)?;
    Ok(blob)
}

/// Wrap a raw ECDSA P-256 signature (64-byte `r ‖ s`) into SSH wire form,
/// where `r` and `s` travel as `mpint`s.
pub fn ecdsa_p256_to_ssh(raw: &[u8]) -> ProtoResult<Vec<u8>> {
    if raw.len() != 64 {
        return Err(ProtoError::InvalidFormat("ecdsa signature must be 64 bytes of r||s"));
    }
    let (r, s) = raw.split_at(32);

    let mut inner = Vec::new();
    mpint::encode(&mut inner, r)?;
    mpint::encode(&mut inner, s)?;

    let mut blob = Vec::new();
    ALG_ECDSA_P256.encode(&mut blob)?;
    inner.encode(&mut blob)?;
    Ok(blob)
}

/// Split a signature blob into its algorithm name and inner signature bytes.
pub fn split_blob(blob: &[u8]) -> ProtoResult<(String, Vec<u8>)> {
    let reader = &mut &blob[..];
    let algorithm = String::decode(reader)?;
    let inner = Vec::decode(reader)?;
    Ok((algorithm, inner))
}
