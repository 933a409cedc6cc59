//! In-process client.
//!
//! [`LocalClient`] delivers every published message to the handlers
//! registered on its topic, in registration order, on the publisher's task.
//! Nothing leaves the process and nothing is retained.

mod client;

pub use client::LocalClient;
