//! Host-key signature verification for session bindings.
//!
//! A session binding is only as good as its proof: the host key must have
//! signed the session identifier. This module checks that proof. A binding
//! that fails here is simply not a binding: malformed blobs, unknown
//! algorithms, and bad signatures all come back `false`, never an error.

use log::debug;
use signature::Verifier as _;

use crate::proto::error::ProtoResult;
use crate::proto::{mpint, public_key, signature as sig_format};

/// Host-key algorithms accepted without cryptographic verification.
///
/// RSA verification is deliberately not implemented; for RSA hosts the
/// `known_hosts` blob comparison is the only line of defence. Weaker than
/// full OpenSSH behavior, by choice.
const UNVERIFIED_ALGORITHMS: &[&str] = &["ssh-rsa", "rsa-sha2-256", "rsa-sha2-512"];

/// Check that `signature_blob` is a valid signature by `host_key_blob`
/// over `session_id`.
pub fn verify_session_signature(
    host_key_blob: &[u8],
    session_id: &[u8],
    signature_blob: &[u8],
) -> bool {
    match check(host_key_blob, session_id, signature_blob) {
        Ok(valid) => valid,
        Err(error) => {
            debug!("discarding malformed session binding: {error}");
            false
        }
    }
}

fn check(host_key_blob: &[u8], session_id: &[u8], signature_blob: &[u8]) -> ProtoResult<bool> {
    let key_algorithm = public_key::algorithm_name(host_key_blob)?;
    let (sig_algorithm, raw_signature) = sig_format::split_blob(signature_blob)?;

    if key_algorithm != sig_algorithm {
        return Ok(false);
    }

    match key_algorithm.as_str() {
        public_key::ALG_ED25519 => {
            let public = public_key::ed25519_public_from_blob(host_key_blob)?;
            Ok(verify_ed25519(&public, session_id, &raw_signature))
        }
        public_key::ALG_ECDSA_P256 => {
            let point = public_key::ecdsa_p256_point_from_blob(host_key_blob)?;
            let reader = &mut &raw_signature[..];
            let r = mpint::to_fixed(&mpint::decode(reader)?, 32)?;
            let s = mpint::to_fixed(&mpint::decode(reader)?, 32)?;
            Ok(verify_ecdsa_p256(&point, session_id, &r, &s))
        }
        name if UNVERIFIED_ALGORITHMS.contains(&name) => Ok(true),
        _ => Ok(false),
    }
}

fn verify_ed25519(public: &[u8; 32], session_id: &[u8], raw_signature: &[u8]) -> bool {
    let Ok(key) = ed25519_dalek::VerifyingKey::from_bytes(public) else {
        return false;
    };
    let Ok(signature) = ed25519_dalek::Signature::from_slice(raw_signature) else {
        return false;
    };
    key.verify_strict(session_id, &signature).is_ok()
}

/// ECDSA verification runs over `SHA-256(session_id)`; the digest is taken
/// by the P-256 verifier itself.
fn verify_ecdsa_p256(point: &[u8], session_id: &[u8], r: &[u8], s: &[u8]) -> bool {
    let Ok(key) = p256::ecdsa::VerifyingKey::from_sec1_bytes(point) else {
        return false;
    };

    let mut raw = [0u8; 64];
    raw[..32].copy_from_slice(r);
    raw[32..].copy_from_slice(s);
    let Ok(signature) = p256::ecdsa::Signature::from_slice(&raw) else {
        return false;
    };

    key.verify(session_id, &signature).is_ok()
}
