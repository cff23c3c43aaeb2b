//! # Message Model
//!
//! Typed representation of a NATS message as seen by the mapping layer and
//! by user scripts. Read-only to scripts.

pub mod header;
pub mod msg;

pub use header::Header;
pub use msg::NatsMessage;
