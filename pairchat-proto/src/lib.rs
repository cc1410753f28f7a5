//! Shared protocol definitions for the `PairChat` wire format.

pub mod conversation;
pub mod frame;
pub mod message;
pub mod presence;
