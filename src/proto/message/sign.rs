//! Signature request with data to be signed with a key in the agent.

use ssh_encoding::{CheckedSum, Decode, Encode, Reader, Writer};

use crate::proto::error::{ProtoError, ProtoResult};

/// Body of an `SSH_AGENTC_SIGN_REQUEST` message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignRequest {
    /// Public key blob naming the key to sign with. Matched against held
    /// keys by exact byte equality.
    pub key_blob: Vec<u8>,

    /// Binary data to be signed.
    pub data: Vec<u8>,

    /// Signature flags. Only meaningful to RSA-capable agents; relayed
    /// verbatim when the request is proxied upstream.
    pub flags: u32,
}

impl Decode for SignRequest {
    type Error = ProtoError;

    fn decode(reader: &mut impl Reader) -> ProtoResult<Self> {
        let key_blob = Vec::decode(reader)?;
        let data = Vec::decode(reader)?;
        let flags = u32::decode(reader)?;

        Ok(Self { key_blob, data, flags })
    }
}

impl Encode for SignRequest {
    fn encoded_len(&self) -> ssh_encoding::Result<usize> {
        [
            self.key_blob.encoded_len()?,
            self.data.encoded_len()?,
            self.flags.encoded_len()?,
        ]
        .checked_sum()
    }

    fn encode(&self, writer: &mut impl Writer) -> ssh_encoding::Result<()> {
        self.key_blob.encode(writer)?;
        self.data.encode(writer)?;
        self.flags.encode(writer)?;

        Ok(())
    }
}
