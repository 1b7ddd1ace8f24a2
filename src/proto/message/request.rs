//! Messages sent from a client *to* the agent.

use ssh_encoding::{CheckedSum, Decode, Encode, Reader, Writer};

use crate::proto::error::ProtoResult;
use crate::proto::extension::SessionBind;

use super::SignRequest;

/// SSH agent protocol request messages.
///
/// Message numbers follow
/// [draft-miller-ssh-agent-14 § 6.1](https://www.ietf.org/archive/id/draft-miller-ssh-agent-14.html#section-6.1).
/// This agent answers identity listing, signing, and its session-bind
/// extension; every other recognized number decodes to [`Request::Unknown`]
/// and is refused at dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Request a list of all identities (public key & comment) from the agent.
    RequestIdentities,

    /// Perform a private key signature operation.
    SignRequest(SignRequest),

    /// Bind the connection to an SSH session with a host-identity proof.
    SessionBind(SessionBind),

    /// Any message this agent does not serve, under its type byte.
    Unknown(u8),
}

impl Request {
    /// The protocol message identifier for this request.
    pub fn message_id(&self) -> u8 {
        match self {
            Self::RequestIdentities => 11,
            Self::SignRequest(_) => 13,
            Self::SessionBind(_) => 27,
            Self::Unknown(command) => *command,
        }
    }
}

impl Decode for Request {
    type Error = crate::proto::error::ProtoError;

    fn decode(reader: &mut impl Reader) -> ProtoResult<Self> {
        let message_type = u8::decode(reader)?;

        match message_type {
            11 => Ok(Self::RequestIdentities),
            13 => SignRequest::decode(reader).map(Self::SignRequest),
            27 => {
                let name = String::decode(reader)?;
                if name == SessionBind::NAME {
                    SessionBind::decode(reader).map(Self::SessionBind)
                } else {
                    Ok(Self::Unknown(message_type))
                }
            }
            command => Ok(Self::Unknown(command)),
        }
    }
}

impl Encode for Request {
    fn encoded_len(&self) -> ssh_encoding::Result<usize> {
        let message_id_len = 1;
        let payload_len = match self {
            Self::RequestIdentities | Self::Unknown(_) => 0,
            Self::SignRequest(request) => request.encoded_len()?,
            Self::SessionBind(bind) => {
                [SessionBind::NAME.encoded_len()?, bind.encoded_len()?].checked_sum()?
            }
        };

        [message_id_len, payload_len].checked_sum()
    }

    fn encode(&self, writer: &mut impl Writer) -> ssh_encoding::Result<()> {
        self.message_id().encode(writer)?;

        match self {
            Self::RequestIdentities | Self::Unknown(_) => {}
            Self::SignRequest(request) => request.encode(writer)?,
            Self::SessionBind(bind) => {
                SessionBind::NAME.encode(writer)?;
                bind.encode(writer)?;
            }
        };

        Ok(())
    }
}
