//! In-memory channel double for exercising the state machine without a
//! socket.

use std::sync::Arc;

use parking_lot::Mutex;

use memora_protocol::ClientFrame;
use memora_transport::{ChannelError, ChannelStatus};

use crate::client::ChatChannel;

#[derive(Default)]
struct Inner {
    status: ChannelStatus,
    sent: Vec<ClientFrame>,
    fail_sends: bool,
}

/// A [`ChatChannel`] that records every frame instead of writing a socket.
///
/// Clones share state, so a test can hand one copy to the client and keep
/// another for assertions.
#[derive(Clone, Default)]
pub struct FakeChannel {
    inner: Arc<Mutex<Inner>>,
}

impl FakeChannel {
    /// A channel that starts out disconnected.
    pub fn new() -> Self {
        Self::default()
    }

    /// A channel that starts out connected.
    pub fn connected() -> Self {
        let channel = Self::default();
        channel.set_status(ChannelStatus::Connected);
        channel
    }

    pub fn set_status(&self, status: ChannelStatus) {
        self.inner.lock().status = status;
    }

    /// When set, `send` fails with [`ChannelError::Closed`] even while the
    /// reported status is connected.
    pub fn fail_sends(&self, fail: bool) {
        self.inner.lock().fail_sends = fail;
    }

    /// Drains and returns everything sent so far.
    pub fn take_sent(&self) -> Vec<ClientFrame> {
        std::mem::take(&mut self.inner.lock().sent)
    }
}

impl ChatChannel for FakeChannel {
    fn status(&self) -> ChannelStatus {
        self.inner.lock().status
    }

    fn send(&self, frame: ClientFrame) -> Result<(), ChannelError> {
        let mut inner = self.inner.lock();
        if inner.fail_sends {
            return Err(ChannelError::Closed);
        }
        if inner.status != ChannelStatus::Connected {
            return Err(ChannelError::NotConnected);
        }
        inner.sent.push(frame);
        Ok(())
    }
}
