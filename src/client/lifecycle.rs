use std::sync::atomic::{AtomicU8, Ordering};

use crate::utils::{MessagingError, Result};

/// Lifecycle of a client: `Created -> Running -> Closing -> Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ClientState {
    Created = 0,
    Running = 1,
    Closing = 2,
    Closed = 3,
}

impl ClientState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ClientState::Created,
            1 => ClientState::Running,
            2 => ClientState::Closing,
            _ => ClientState::Closed,
        }
    }
}

#[derive(Debug)]
pub(crate) struct Lifecycle {
    state: AtomicU8,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicU8::new(ClientState::Created as u8),
        }
    }

    pub(crate) fn state(&self) -> ClientState {
        ClientState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Moves a fresh client to `Running`. Fails once closing has started.
    pub(crate) fn ensure_running(&self) -> Result<()> {
        match self.state.compare_exchange(
            ClientState::Created as u8,
            ClientState::Running as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => Ok(()),
            Err(current) if current == ClientState::Running as u8 => Ok(()),
            Err(_) => Err(MessagingError::Closed),
        }
    }

    /// Moves to `Closing`. Returns `false` when another caller already did.
    pub(crate) fn begin_close(&self) -> bool {
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < ClientState::Closing as u8).then_some(ClientState::Closing as u8)
            })
            .is_ok()
    }

    pub(crate) fn finish_close(&self) {
        self.state
            .store(ClientState::Closed as u8, Ordering::Release);
    }
}
