//! Upstream SSH agent client.
//!
//! When this agent starts it may be replacing another agent whose socket
//! path was in `SSH_AUTH_SOCK`. Keys held by that agent stay usable: their
//! identities are merged into listings and sign requests for them are
//! proxied through this client.
//!
//! Calls are plain blocking I/O on a fresh connection each time; the
//! request handler runs them on a blocking task.

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ByteOrder};
use log::debug;
use ssh_encoding::{Decode, Encode};

use crate::codec::MAX_MESSAGE_SIZE;
use crate::proto::{Identity, ProtoError, Request, Response, SignRequest};

/// Client for the agent whose socket this process captured at startup.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    path: PathBuf,
}

impl UpstreamClient {
    /// Use the agent at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Take the upstream socket from `SSH_AUTH_SOCK`, unless it points at
    /// one of this agent's own sockets (then there is no upstream; an
    /// agent proxying to itself would loop).
    ///
    /// Must run before this agent's own paths are advertised anywhere.
    pub fn from_env(own_sockets: &[&Path]) -> Option<Self> {
        let path = PathBuf::from(std::env::var_os("SSH_AUTH_SOCK")?);
        Self::from_socket_path(path, own_sockets)
    }

    /// Same selection rule with the candidate path given explicitly.
    pub fn from_socket_path(path: PathBuf, own_sockets: &[&Path]) -> Option<Self> {
        if own_sockets.iter().any(|own| *own == path) {
            return None;
        }
        Some(Self::new(path))
    }

    /// Socket path of the upstream agent.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// List the upstream agent's identities. Every failure (connection,
    /// protocol, or an unexpected answer) degrades to an empty list.
    pub fn request_identities(&self) -> Vec<Identity> {
        match self.roundtrip(&Request::RequestIdentities) {
            Ok(Response::IdentitiesAnswer(identities)) => identities,
            Ok(_) => {
                debug!("upstream agent gave an unexpected answer to an identities request");
                Vec::new()
            }
            Err(error) => {
                debug!("upstream identities request failed: {error}");
                Vec::new()
            }
        }
    }

    /// Ask the upstream agent for a signature. `None` on refusal or any
    /// failure.
    pub fn sign(&self, key_blob: &[u8], data: &[u8], flags: u32) -> Option<Vec<u8>> {
        let request = Request::SignRequest(SignRequest {
            key_blob: key_blob.to_vec(),
            data: data.to_vec(),
            flags,
        });

        match self.roundtrip(&request) {
            Ok(Response::SignResponse(signature)) => Some(signature),
            Ok(_) => {
                debug!("upstream agent refused a sign request");
                None
            }
            Err(error) => {
                debug!("upstream sign request failed: {error}");
                None
            }
        }
    }

    fn roundtrip(&self, request: &Request) -> Result<Response, ProtoError> {
        let mut stream = UnixStream::connect(&self.path)?;

        // send the request
        let mut bytes = Vec::new();
        let len = request.encoded_len()? as u32;
        len.encode(&mut bytes)?;
        request.encode(&mut bytes)?;
        stream.write_all(&bytes)?;

        // read the response
        let mut len: [u8; 4] = [0; 4];
        stream.read_exact(&mut len[..])?;
        let len = BigEndian::read_u32(&len) as usize;
        if len > MAX_MESSAGE_SIZE {
            return Err(ProtoError::MessageTooLong { length: len });
        }
        bytes.resize(len, 0);
        stream.read_exact(&mut bytes)?;

        Response::decode(&mut &bytes[..])
    }
}
