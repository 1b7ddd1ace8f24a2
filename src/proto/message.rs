//! SSH agent protocol messages.

mod identity;
mod request;
mod response;
mod sign;

pub use identity::Identity;
pub use request::Request;
pub use response::Response;
pub use sign::SignRequest;
