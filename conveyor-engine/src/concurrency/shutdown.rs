//! Broadcast-based graceful shutdown.
//!
//! A single shutdown signal terminates the scheduler loop and every executor
//! worker simultaneously. Workers finish their current batch before stopping,
//! so shutdown respects record boundaries and adapter cleanup.

use tokio::sync::watch;

/// Transmitter side of the shutdown channel.
///
/// Cloning is cheap; every clone signals the same set of receivers. New
/// receivers are obtained through [`ShutdownTx::subscribe`].
#[derive(Debug, Clone)]
pub struct ShutdownTx(watch::Sender<()>);

/// Receiver side of the shutdown channel.
pub type ShutdownRx = watch::Receiver<()>;

impl ShutdownTx {
    /// Signals shutdown to all subscribed receivers.
    ///
    /// Returns `true` when at least one receiver was listening.
    pub fn shutdown(&self) -> bool {
        self.0.send(()).is_ok()
    }

    /// Creates a new receiver subscribed to this channel.
    pub fn subscribe(&self) -> ShutdownRx {
        self.0.subscribe()
    }
}

/// Creates a new shutdown channel.
///
/// The initial watch value does not count as a signal; receivers must await
/// [`watch::Receiver::changed`] to observe a shutdown.
pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(());
    (ShutdownTx(tx), rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn all_subscribers_observe_shutdown() {
        let (tx, mut first) = create_shutdown_channel();
        let mut second = tx.subscribe();

        assert!(tx.shutdown());
        assert!(first.changed().await.is_ok());
        assert!(second.changed().await.is_ok());
    }
}
