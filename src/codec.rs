use std::marker::PhantomData;
use std::mem::size_of;

use byteorder::{BigEndian, ReadBytesExt};
use ssh_encoding::{Decode, Encode};
use tokio_util::bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::AgentError;
use crate::proto::ProtoError;

/// Ceiling on a framed message, applied to client requests and upstream
/// responses alike.
pub const MAX_MESSAGE_SIZE: usize = 256 * 1024;

/// SSH framing codec.
///
/// This codec first reads an `u32` which indicates the length of the incoming
/// message. Then decodes the message using specified `Input` type.
///
/// Decoded items are `Result`s: a frame whose body fails to parse is
/// surfaced as an error item with the buffer already advanced past it, so
/// the caller can answer `Failure` and keep the connection alive. Only
/// transport problems (or an oversized frame) fail the stream itself.
///
/// The reverse transformation which appends the length of the encoded data
/// is also implemented for the given `Output` type.
#[derive(Debug)]
pub struct Codec<Input, Output>(PhantomData<Input>, PhantomData<Output>)
where
    Input: Decode<Error = ProtoError>,
    Output: Encode;

impl<Input, Output> Default for Codec<Input, Output>
where
    Input: Decode<Error = ProtoError>,
    Output: Encode,
{
    fn default() -> Self {
        Self(PhantomData, PhantomData)
    }
}

impl<Input, Output> Decoder for Codec<Input, Output>
where
    Input: Decode<Error = ProtoError>,
    Output: Encode,
{
    type Item = Result<Input, ProtoError>;
    type Error = AgentError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let mut bytes = &src[..];

        if bytes.len() < size_of::<u32>() {
            return Ok(None);
        }

        let length = bytes.read_u32::<BigEndian>()? as usize;

        if length > MAX_MESSAGE_SIZE {
            return Err(ProtoError::MessageTooLong { length }.into());
        }

        if bytes.len() < length {
            return Ok(None);
        }

        let mut body = &bytes[..length];
        let message = Input::decode(&mut body);
        src.advance(size_of::<u32>() + length);
        Ok(Some(message))
    }
}

impl<Input, Output> Encoder<Output> for Codec<Input, Output>
where
    Input: Decode<Error = ProtoError>,
    Output: Encode,
{
    type Error = AgentError;

    fn encode(&mut self, item: Output, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let mut bytes = Vec::new();

        let len = item.encoded_len().map_err(ProtoError::from)? as u32;
        len.encode(&mut bytes).map_err(ProtoError::from)?;

        item.encode(&mut bytes).map_err(ProtoError::from)?;
        dst.put(&*bytes);

        Ok(())
    }
}
