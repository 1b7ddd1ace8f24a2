//! SSH agent protocol structures

pub mod error;
pub mod extension;
pub mod message;
pub mod mpint;
pub mod public_key;
pub mod signature;
pub mod userauth;

pub use self::error::{ProtoError as Error, ProtoResult as Result, *};
pub use self::extension::SessionBind;
pub use self::message::*;
pub use self::userauth::UserauthRequest;
