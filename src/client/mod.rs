//! The `client` module defines the contract every messaging client fulfils.
//!
//! Structured clients ([`MessagingClient`]) exchange [`crate::message::Message`]
//! envelopes; pattern clients ([`PatternClient`]) exchange raw payloads.
//! Handlers are trait objects, with closure adapters in [`message_handler`]
//! and [`payload_handler`].

mod handler;
mod lifecycle;
mod traits;

pub use handler::{
    HandlerError, HandlerResult, MessageHandler, PayloadHandler, message_handler,
    payload_handler,
};
pub use lifecycle::ClientState;
pub(crate) use lifecycle::Lifecycle;
pub use traits::{MessagingClient, PatternClient, Publisher, Subscriber};
