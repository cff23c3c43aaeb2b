//! # Script Sandbox
//!
//! Sandboxed rhai evaluation with an explicit, per-invocation capability
//! surface. Scripts never see ambient global state: the connection
//! capability and (in message modes) the message are pushed into a fresh
//! scope for every invocation.
//!
//! ## Capability surface (stable toward script authors)
//!
//! - `msg` (message modes): `.subject`, `.reply`, `.header`, `.data`
//! - `msg.header`: `.get(key)` first value or `()`, `.values(key)` all values
//! - `conn`: `.request(subject, payload, timeout)`, `.publish(subject,
//!   payload)`, `.publish_message(message)`, `.publish_request(subject,
//!   reply, payload)`, `.subscribe_sync(subject)`, `.new_inbox()`
//! - subscriptions: `.next_message(timeout)` returns a message or `()`,
//!   `.unsubscribe()`
//! - `new_message(subject)`, `new_frame(name)` + `frame.push_row(map)`
//! - `parse_json(text)`, `to_json(value)`

pub mod capability;
pub mod convert;
pub mod sandbox;

pub use capability::{ScriptConnection, ScriptMessage, ScriptSubscription};
pub use sandbox::ScriptSandbox;
