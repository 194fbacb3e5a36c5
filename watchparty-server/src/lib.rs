//! `WatchParty` room synchronization server library.
//!
//! Exposes the room server for use in tests and embedding. The server
//! accepts WebSocket connections at `/ws/rooms/{room}`, tracks each
//! room's roster, bounded chat history, and authoritative playback
//! state, and fans events out to every connected participant.

pub mod config;
pub mod rooms;
pub mod server;
