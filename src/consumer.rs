//! The delivery capability listeners hand their results to.
//!
//! The surrounding library provides the real implementation (a queue feeding
//! managed-runtime callbacks); this crate only requires the two delivery
//! methods and an optional per-thread attachment step. [`ChannelConsumer`]
//! is a ready-made implementation backed by an `mpsc` channel, used by this
//! crate's own tests and handy for integration testing above it.

use crate::error::AttachError;
use crate::lines::LineMask;
use std::sync::mpsc;

/// Capability used by listener threads to deliver results.
///
/// Both methods are called from a dedicated listener thread and must not
/// block for long: the listener cannot wait for new port activity while a
/// delivery is in flight.
pub trait Consumer: Send + Sync {
    /// Per-thread binding step, run once on the listener thread before its
    /// wait loop starts.
    ///
    /// Models runtimes that require each thread to attach before it may
    /// call back in (and resolve the delivery method while doing so). A
    /// failure here aborts listener startup with a negative status; the
    /// owner may retry. The default implementation has nothing to bind.
    fn attach(&self) -> Result<(), AttachError> {
        Ok(())
    }

    /// Deliver one logical buffer of freshly read bytes.
    ///
    /// Called exactly once per readiness notification observed by the data
    /// listener. The buffer is empty when readiness turned out to be
    /// spurious (nothing to read, end of stream, or a read error).
    fn deliver_bytes(&self, bytes: &[u8]);

    /// Deliver the current control-line mask.
    fn deliver_event(&self, mask: LineMask);
}

/// A single delivery recorded by [`ChannelConsumer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// One buffer from the data listener.
    Bytes(Vec<u8>),
    /// One control-line mask from the event listener.
    Event(LineMask),
}

/// [`Consumer`] implementation that forwards every delivery into an
/// [`mpsc`] channel.
///
/// # Example
/// ```
/// use serial_listener::{ChannelConsumer, Consumer, Delivery};
///
/// let (consumer, rx) = ChannelConsumer::new();
/// consumer.deliver_bytes(b"hello");
/// assert_eq!(rx.recv().unwrap(), Delivery::Bytes(b"hello".to_vec()));
/// ```
#[derive(Debug)]
pub struct ChannelConsumer {
    tx: mpsc::Sender<Delivery>,
}

impl ChannelConsumer {
    /// Create a consumer and the receiving end its deliveries arrive on.
    pub fn new() -> (Self, mpsc::Receiver<Delivery>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx }, rx)
    }
}

impl Consumer for ChannelConsumer {
    fn deliver_bytes(&self, bytes: &[u8]) {
        // A dropped receiver just means nobody is listening anymore.
        let _ = self.tx.send(Delivery::Bytes(bytes.to_vec()));
    }

    fn deliver_event(&self, mask: LineMask) {
        let _ = self.tx.send(Delivery::Event(mask));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_consumer_records_in_order() {
        let (consumer, rx) = ChannelConsumer::new();

        consumer.deliver_bytes(b"first");
        consumer.deliver_event(LineMask::CTS | LineMask::RI);
        consumer.deliver_bytes(b"");

        assert_eq!(rx.recv().unwrap(), Delivery::Bytes(b"first".to_vec()));
        assert_eq!(
            rx.recv().unwrap(),
            Delivery::Event(LineMask::CTS | LineMask::RI)
        );
        assert_eq!(rx.recv().unwrap(), Delivery::Bytes(Vec::new()));
    }

    #[test]
    fn test_delivery_after_receiver_dropped_is_ignored() {
        let (consumer, rx) = ChannelConsumer::new();
        drop(rx);
        // Must not panic.
        consumer.deliver_bytes(b"late");
        consumer.deliver_event(LineMask::EMPTY);
    }

    #[test]
    fn test_default_attach_succeeds() {
        let (consumer, _rx) = ChannelConsumer::new();
        assert!(consumer.attach().is_ok());
    }
}
