//! `session-bind@pl.loee` extension
//!
//! With this extension an ssh client binds an agent connection to a
//! particular SSH session: it names the host it is talking to, presents the
//! host's public key, and proves the host's involvement with a signature
//! over the session identifier. Patched ssh clients send it before the
//! first sign request of a session.

use ssh_encoding::{CheckedSum, Decode, Encode, Reader, Writer};

use super::error::{ProtoError, ProtoResult};

/// Session binding relayed by a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionBind {
    /// Hostname the client believes it is connected to.
    pub hostname: String,

    /// Host public key in SSH wire form.
    pub host_key_blob: Vec<u8>,

    /// Identifier of the SSH session being bound.
    pub session_id: Vec<u8>,

    /// Host-key signature over the session identifier, in SSH wire form.
    pub host_key_signature: Vec<u8>,

    /// Whether the binding was made for agent forwarding.
    pub is_forwarded: bool,
}

impl SessionBind {
    /// Extension name carried in the `SSH_AGENTC_EXTENSION` message.
    pub const NAME: &'static str = "session-bind@pl.loee";
}

impl Decode for SessionBind {
    type Error = ProtoError;

    fn decode(reader: &mut impl Reader) -> ProtoResult<Self> {
        let hostname = String::decode(reader)?;
        let host_key_blob = Vec::decode(reader)?;
        let session_id = Vec::decode(reader)?;
        let host_key_signature = Vec::decode(reader)?;
        let is_forwarded = u8::decode(reader)? != 0;

        Ok(Self {
            hostname,
            host_key_blob,
            session_id,
            host_key_signature,
            is_forwarded,
        })
    }
}

impl Encode for SessionBind {
    fn encoded_len(&self) -> ssh_encoding::Result<usize> {
        [
            self.hostname.encoded_len()?,
            self.host_key_blob.encoded_len()?,
            self.session_id.encoded_len()?,
            self.host_key_signature.encoded_len()?,
            1,
        ]
        .checked_sum()
    }

    fn encode(&self, writer: &mut impl Writer) -> ssh_encoding::Result<()> {
        self.hostname.encode(writer)?;
        self.host_key_blob.encode(writer)?;
        self.session_id.encode(writer)?;
        self.host_key_signature.encode(writer)?;
        u8::from(self.is_forwarded).encode(writer)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    #[test]
    fn roundtrip() -> TestResult {
        let bind = SessionBind {
            hostname: "myserver.example.com".into(),
            host_key_blob: vec![1, 2, 3],
            session_id: vec![4, 5, 6, 7],
            host_key_signature: vec![8, 9],
            is_forwarded: true,
        };

        let mut bytes = Vec::new();
        bind.encode(&mut bytes)?;
        assert_eq!(bytes.len(), bind.encoded_len()?);
        assert_eq!(SessionBind::decode(&mut &bytes[..])?, bind);
        Ok(())
    }

    #[test]
    fn truncated_input_is_rejected() -> TestResult {
        let bind = SessionBind {
            hostname: "host".into(),
            host_key_blob: vec![1],
            session_id: vec![2],
            host_key_signature: vec![3],
            is_forwarded: false,
        };

        let mut bytes = Vec::new();
        bind.encode(&mut bytes)?;
        bytes.pop();
        assert!(SessionBind::decode(&mut &bytes[..]).is_err());
        Ok(())
    }
}
