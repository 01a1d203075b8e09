use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A message received on a subscribed pub/sub channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreMessage {
  pub channel: String,
  pub payload: String,
}

/// A live subscription to one or more channels.
///
/// Messages arrive in publish order per publisher and channel. Dropping the
/// subscription unsubscribes.
pub struct Subscription {
  channels: Vec<String>,
  receiver: mpsc::UnboundedReceiver<StoreMessage>,
  forwarder: Option<JoinHandle<()>>,
}

impl Subscription {
  pub(crate) fn new(
    channels: Vec<String>,
    receiver: mpsc::UnboundedReceiver<StoreMessage>,
    forwarder: Option<JoinHandle<()>>,
  ) -> Self {
    Self {
      channels,
      receiver,
      forwarder,
    }
  }

  /// Channels this subscription listens on.
  pub fn channels(&self) -> &[String] {
    &self.channels
  }

  /// Wait for the next message. Returns `None` once the underlying connection is gone.
  pub async fn recv(&mut self) -> Option<StoreMessage> {
    self.receiver.recv().await
  }
}

impl Drop for Subscription {
  fn drop(&mut self) {
    if let Some(forwarder) = self.forwarder.take() {
      forwarder.abort();
    }
  }
}
