//! Introspection of sign-request payloads.
//!
//! When an ssh client asks for a signature during public-key user
//! authentication, the signed data is an `SSH_MSG_USERAUTH_REQUEST` prefixed
//! with the session identifier. Recovering that structure tells the agent
//! *which session* a sign request belongs to and who is logging in where;
//! the approval prompt shows that context to the user. Payloads that are not
//! userauth requests simply yield no context; signing proceeds regardless.

use ssh_encoding::Decode;

use super::error::{ProtoError, ProtoResult};

/// Message number of an SSH user authentication request.
pub const SSH_MSG_USERAUTH_REQUEST: u8 = 50;

/// Fields recovered from a public-key userauth sign payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserauthRequest {
    /// Session identifier the signature will be bound to.
    pub session_id: Vec<u8>,

    /// Login name on the server.
    pub username: String,

    /// Requested service, normally `ssh-connection`.
    pub service: String,

    /// Signature algorithm the client asked for.
    pub algorithm: String,

    /// Public key blob named in the userauth request.
    pub public_key_blob: Vec<u8>,
}

impl UserauthRequest {
    /// Try to interpret a sign-request payload as a public-key userauth
    /// request.
    pub fn parse(data: &[u8]) -> ProtoResult<Self> {
        let reader = &mut &data[..];

        let session_id = Vec::decode(reader)?;
        if u8::decode(reader)? != SSH_MSG_USERAUTH_REQUEST {
            return Err(ProtoError::InvalidFormat("not a userauth request"));
        }

        let username = String::decode(reader)?;
        let service = String::decode(reader)?;
        if String::decode(reader)? != "publickey" {
            return Err(ProtoError::InvalidFormat("not a publickey userauth payload"));
        }

        let _has_signature = u8::decode(reader)? != 0;
        let algorithm = String::decode(reader)?;
        let public_key_blob = Vec::decode(reader)?;

        Ok(Self {
            session_id,
            username,
            service,
            algorithm,
            public_key_blob,
        })
    }
}
