//! Messages sent to a client *from* the agent.

use ssh_encoding::{CheckedSum, Decode, Encode, Reader, Writer};

use crate::proto::error::{ProtoError, ProtoResult};

use super::Identity;

/// SSH agent protocol response messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Indicates generic agent failure.
    Failure,

    /// Indicates generic agent success.
    Success,

    /// A list of identities, answering [`Request::RequestIdentities`](super::Request::RequestIdentities).
    IdentitiesAnswer(Vec<Identity>),

    /// A signature in SSH wire form, answering [`Request::SignRequest`](super::Request::SignRequest).
    SignResponse(Vec<u8>),
}

impl Response {
    /// The protocol message identifier for this response.
    pub fn message_id(&self) -> u8 {
        match self {
            Self::Failure => 5,
            Self::Success => 6,
            Self::IdentitiesAnswer(_) => 12,
            Self::SignResponse(_) => 14,
        }
    }
}

impl Decode for Response {
    type Error = ProtoError;

    fn decode(reader: &mut impl Reader) -> ProtoResult<Self> {
        let message_type = u8::decode(reader)?;

        match message_type {
            5 => Ok(Self::Failure),
            6 => Ok(Self::Success),
            12 => Identity::decode_vec(reader).map(Self::IdentitiesAnswer),
            14 => Vec::decode(reader)
                .map(Self::SignResponse)
                .map_err(ProtoError::from),
            command => Err(ProtoError::UnsupportedCommand { command }),
        }
    }
}

impl Encode for Response {
    fn encoded_len(&self) -> ssh_encoding::Result<usize> {
        let message_id_len = 1;
        let payload_len = match self {
            Self::Failure | Self::Success => 0,
            Self::IdentitiesAnswer(identities) => {
                let mut lengths = Vec::with_capacity(1 + identities.len());
                // identity count
                lengths.push(4);

                for identity in identities {
                    lengths.push(identity.encoded_len()?);
                }

                lengths.checked_sum()?
            }
            Self::SignResponse(signature) => signature.encoded_len()?,
        };

        [message_id_len, payload_len].checked_sum()
    }

    fn encode(&self, writer: &mut impl Writer) -> ssh_encoding::Result<()> {
        self.message_id().encode(writer)?;

        match self {
            Self::Failure | Self::Success => {}
            Self::IdentitiesAnswer(identities) => {
                (identities.len() as u32).encode(writer)?;
                for identity in identities {
                    identity.encode(writer)?;
                }
            }
            Self::SignResponse(signature) => signature.encode(writer)?,
        };

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    #[test]
    fn one_identity_body() -> TestResult {
        let response = Response::IdentitiesAnswer(vec![Identity {
            key_blob: vec![0xaa, 0xbb],
            comment: "test".into(),
        }]);

        let mut bytes = Vec::new();
        response.encode(&mut bytes)?;
        assert_eq!(
            bytes,
            [
                0x0c, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x02, 0xaa, 0xbb, 0x00, 0x00,
                0x00, 0x04, 0x74, 0x65, 0x73, 0x74,
            ]
        );
        assert_eq!(bytes.len(), response.encoded_len()?);
        assert_eq!(Response::decode(&mut &bytes[..])?, response);
        Ok(())
    }

    #[test]
    fn empty_answer_body() -> TestResult {
        let mut bytes = Vec::new();
        Response::IdentitiesAnswer(Vec::new()).encode(&mut bytes)?;
        assert_eq!(bytes, [0x0c, 0x00, 0x00, 0x00, 0x00]);
        Ok(())
    }

    #[test]
    fn status_responses_are_bare() -> TestResult {
        for (response, expected) in [(Response::Failure, 5u8), (Response::Success, 6)] {
            let mut bytes = Vec::new();
            response.encode(&mut bytes)?;
            assert_eq!(bytes, [expected]);
            assert_eq!(Response::decode(&mut &bytes[..])?, response);
        }
        Ok(())
    }

    #[test]
    fn sign_response_roundtrip() -> TestResult {
        let response = Response::SignResponse(vec![9, 8, 7]);
        let mut bytes = Vec::new();
        response.encode(&mut bytes)?;
        assert_eq!(bytes, [0x0e, 0x00, 0x00, 0x00, 0x03, 9, 8, 7]);
        assert_eq!(Response::decode(&mut &bytes[..])?, response);
        Ok(())
    }

    #[test]
    fn request_numbers_are_not_responses() {
        assert!(matches!(
            Response::decode(&mut &[11u8][..]),
            Err(ProtoError::UnsupportedCommand { command: 11 })
        ));
    }
}
