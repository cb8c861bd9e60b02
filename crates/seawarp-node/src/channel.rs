//! Latched output channels.
//!
//! Each of the engine's three outputs keeps the most recent message and
//! hands it to any consumer that attaches later, so a visualization tool
//! started long after the node still gets a usable warp immediately.

use seawarp_core::Homography;
use tokio::sync::watch;

/// A single latched output channel.
#[derive(Debug)]
pub struct LatchedOutput {
    tx: watch::Sender<Option<Homography>>,
}

impl LatchedOutput {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Number of currently attached consumers.
    pub fn consumer_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Replace the latched message and wake attached consumers.
    pub fn publish(&self, msg: Homography) {
        self.tx.send_replace(Some(msg));
    }

    /// Attach a consumer. The latched message, if any, is immediately
    /// visible through the receiver.
    pub fn subscribe(&self) -> watch::Receiver<Option<Homography>> {
        self.tx.subscribe()
    }

    /// The most recently published message, if any.
    pub fn latched(&self) -> Option<Homography> {
        self.tx.borrow().clone()
    }
}

impl Default for LatchedOutput {
    fn default() -> Self {
        Self::new()
    }
}
