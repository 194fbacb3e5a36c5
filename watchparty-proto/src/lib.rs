//! Shared protocol definitions for the `WatchParty` wire format.

pub mod client;
pub mod envelope;
pub mod message;
pub mod server;
pub mod user;
pub mod video;
