//! The boundary to whatever carries bytes between peers.
//!
//! The codec produces and consumes plain byte buffers; a [`Transport`] moves
//! them. [`ChannelTransport`] connects two worlds in the same process.

use std::fmt;

use tokio::sync::mpsc;

use crate::error::NetError;

/// One unit of traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// A state packet from a `DataWriter`.
    Data(Vec<u8>),
    /// An encoded action batch.
    Actions(Vec<u8>),
}

/// Sends and receives [`Message`]s. Receiving never blocks the tick.
pub trait Transport: Send + fmt::Debug {
    /// Queues a message for the peer.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Transport`] if the peer is gone.
    fn send(&mut self, message: Message) -> Result<(), NetError>;

    /// The next message that already arrived, if any.
    fn try_recv(&mut self) -> Option<Message>;
}

/// One end of an in-process link backed by tokio channels.
#[derive(Debug)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<Message>,
    rx: mpsc::UnboundedReceiver<Message>,
}

impl ChannelTransport {
    /// Two connected ends.
    #[must_use]
    pub fn pair() -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        (
            Self { tx: a_tx, rx: a_rx },
            Self { tx: b_tx, rx: b_rx },
        )
    }
}

impl Transport for ChannelTransport {
    fn send(&mut self, message: Message) -> Result<(), NetError> {
        self.tx
            .send(message)
            .map_err(|_| NetError::Transport("peer dropped".to_string()))
    }

    fn try_recv(&mut self) -> Option<Message> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_delivers_in_order() {
        let (mut a, mut b) = ChannelTransport::pair();
        a.send(Message::Data(vec![1])).unwrap();
        a.send(Message::Actions(vec![2])).unwrap();

        assert_eq!(b.try_recv(), Some(Message::Data(vec![1])));
        assert_eq!(b.try_recv(), Some(Message::Actions(vec![2])));
        assert_eq!(b.try_recv(), None);
        assert_eq!(a.try_recv(), None);
    }

    #[test]
    fn test_send_to_dropped_peer_fails() {
        let (mut a, b) = ChannelTransport::pair();
        drop(b);
        assert!(matches!(
            a.send(Message::Data(Vec::new())),
            Err(NetError::Transport(_))
        ));
    }
}
