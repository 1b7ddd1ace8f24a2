//! Data returned to the client when listing keys.

use ssh_encoding::{CheckedSum, Decode, Encode, Reader, Writer};

use crate::proto::error::{ProtoError, ProtoResult};

/// One key advertised in an `SSH_AGENT_IDENTITIES_ANSWER` body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Public key in SSH wire form.
    pub key_blob: Vec<u8>,

    /// A human-readable comment.
    pub comment: String,
}

impl Identity {
    pub(crate) fn decode_vec(reader: &mut impl Reader) -> ProtoResult<Vec<Self>> {
        let count = u32::decode(reader)?;
        let mut identities = Vec::new();

        for _ in 0..count {
            identities.push(Self::decode(reader)?);
        }

        Ok(identities)
    }
}

impl Decode for Identity {
    type Error = ProtoError;

    fn decode(reader: &mut impl Reader) -> ProtoResult<Self> {
        let key_blob = Vec::decode(reader)?;
        let comment = String::decode(reader)?;

        Ok(Self { key_blob, comment })
    }
}

impl Encode for Identity {
    fn encoded_len(&self) -> ssh_encoding::Result<usize> {
        [self.key_blob.encoded_len()?, self.comment.encoded_len()?].checked_sum()
    }

    fn encode(&self, writer: &mut impl Writer) -> ssh_encoding::Result<()> {
        self.key_blob.encode(writer)?;
        self.comment.encode(writer)?;

        Ok(())
    }
}
