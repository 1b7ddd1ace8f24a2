#![doc = include_str!("../README.md")]
#![deny(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod agent;
pub mod approval;
pub mod client;
pub mod codec;
pub mod error;
pub mod handler;
pub mod host_verify;
pub mod known_hosts;
pub mod proto;
pub mod vault;

pub use async_trait::async_trait;
