//! `WatchParty` — synchronized watch-party room client library.
//!
//! Three subsystems, leaf-first:
//!
//! - [`connection`] — one reconnecting WebSocket connection to a room
//!   endpoint, with exponential backoff and typed envelope framing.
//! - [`room`] — the room session controller: dispatches inbound server
//!   events into reconciled roster/chat/playback state and exposes
//!   outbound intents.
//! - [`transfer`] — the swarm transfer coordinator: seeds or downloads
//!   one file through a shared peer-to-peer swarm client and reports a
//!   playback-readiness signal.

pub mod config;
pub mod connection;
pub mod room;
pub mod transfer;
