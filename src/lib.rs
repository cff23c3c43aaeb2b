//! natstable - turns NATS traffic into tabular result frames
//!
//! A query definition (interaction mode, subject, timeout, optional script)
//! is dispatched to one of three mode executors:
//!
//! - **Request/Reply**: one request, one awaited reply
//! - **Subscribe**: long-lived subscription, frames streamed per message
//! - **Script**: a sandboxed script drives the whole interaction through a
//!   connection capability object
//!
//! Messages are converted into [`frame::ResultFrame`]s either by the built-in
//! JSON default mapping or by a user script running inside the rhai sandbox.

pub mod connection;
pub mod errors;
pub mod executor;
pub mod frame;
pub mod message;
pub mod query;
pub mod script;

pub use connection::{connect, ConnectionConfig, ConnectionSecrets, Transport};
pub use errors::{ExecutionError, ExecutionResult};
pub use executor::{QueryEngine, QueryOutput, SubscribeEvent, SubscribeStream};
pub use frame::ResultFrame;
pub use message::{Header, NatsMessage};
pub use query::{QueryDefinition, QueryType};
