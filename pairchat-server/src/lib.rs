//! `PairChat` server library.
//!
//! Real-time one-to-one chat: authenticated users hold a persistent
//! WebSocket connection each, exchange messages and typing indicators, and
//! see each other's online/last-seen status. Exposed as a library so
//! integration tests can run the server in-process.

pub mod config;
pub mod connection;
pub mod gateway;
pub mod presence;
pub mod profile;
pub mod router;
pub mod store;
