//! # Shared Message Channel
//!
//! Bounded many-producer channel that every topic session of one consumer
//! pushes its tagged messages into.
//!
//! ```text
//!  TopicConsumer(a) ──┐
//!  TopicConsumer(b) ──┼──► SharedChannel ──► MessageChannel ──► receive() / chan()
//!  TopicConsumer(c) ──┘
//! ```
//!
//! Producers hold clones of the sender. The read side is a [`MessageChannel`]
//! handle; its clones all read from the same queue, each message is taken
//! by exactly one reader.

use futures::Stream;
use mq_types::ConsumerMessage;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Sender and receiver halves of one consumer's shared channel.
#[derive(Clone)]
pub struct SharedChannel {
    sender: mpsc::Sender<ConsumerMessage>,
    receiver: MessageChannel,
}

impl SharedChannel {
    /// Allocate a channel holding at most `capacity` undelivered messages.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero; `ConsumerConfig::validate` rejects that.
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity);
        Self {
            sender,
            receiver: MessageChannel::new(receiver),
        }
    }

    /// Producer side, cloned into each topic session.
    pub fn sender(&self) -> mpsc::Sender<ConsumerMessage> {
        self.sender.clone()
    }

    /// Read side.
    pub fn receiver(&self) -> MessageChannel {
        self.receiver.clone()
    }

    /// Drop the local sender, keeping only the read side.
    pub fn into_receiver(self) -> MessageChannel {
        self.receiver
    }
}

/// Read-only handle on a shared channel.
#[derive(Clone)]
pub struct MessageChannel {
    inner: Arc<Mutex<mpsc::Receiver<ConsumerMessage>>>,
}

impl MessageChannel {
    fn new(receiver: mpsc::Receiver<ConsumerMessage>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(receiver)),
        }
    }

    /// Wait for the next message.
    ///
    /// `None` once every sender is dropped and the queue is drained.
    /// Cancel safe: dropping the future never loses a message.
    pub async fn recv(&self) -> Option<ConsumerMessage> {
        self.inner.lock().await.recv().await
    }

    /// Take a message if one is queued and no other reader is waiting.
    pub fn try_recv(&self) -> Option<ConsumerMessage> {
        self.inner.try_lock().ok()?.try_recv().ok()
    }

    /// Messages as a stream, ending when the channel closes.
    pub fn into_stream(self) -> impl Stream<Item = ConsumerMessage> + Send + 'static {
        futures::stream::unfold(self, |channel| async move {
            channel.recv().await.map(|message| (message, channel))
        })
    }
}
