//! The `utils` module provides the pieces shared by every client in the crate:
//! the error taxonomy, logging setup and the shutdown signals that stop
//! background consumption loops.

pub mod error;
pub mod logging;
pub mod shutdown;

pub use error::{MessagingError, Result, TxnStage};
pub use shutdown::{Shutdown, ShutdownTrigger};
