//! Cancellable inbound event streams.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Receiving half of a transport subscription.
///
/// Once [`stop`](Subscription::stop) has been called (or the subscription is
/// dropped) [`recv`](Subscription::recv) returns `None`, even for events the
/// transport had already queued.
#[derive(Debug)]
pub struct Subscription<T> {
    rx: mpsc::UnboundedReceiver<T>,
    token: CancellationToken,
}

/// Sending half of a subscription, held by the transport.
#[derive(Debug)]
pub struct SubscriptionSender<T> {
    tx: mpsc::UnboundedSender<T>,
    token: CancellationToken,
}

impl<T> Clone for SubscriptionSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            token: self.token.clone(),
        }
    }
}

impl<T> Subscription<T> {
    /// Create a connected sender/subscription pair.
    pub fn channel() -> (SubscriptionSender<T>, Subscription<T>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        (
            SubscriptionSender {
                tx,
                token: token.clone(),
            },
            Subscription { rx, token },
        )
    }

    /// Next event, or `None` once stopped or once the transport hung up.
    pub async fn recv(&mut self) -> Option<T> {
        if self.token.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.token.cancelled() => None,
            item = self.rx.recv() => item,
        }
    }

    /// Detach from the transport. Takes effect immediately.
    pub fn stop(&mut self) {
        self.token.cancel();
        self.rx.close();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

impl<T> SubscriptionSender<T> {
    /// Queue an event. Returns `false` if the subscription is gone.
    pub fn send(&self, item: T) -> bool {
        if self.is_closed() {
            return false;
        }
        self.tx.send(item).is_ok()
    }

    /// Whether the subscriber stopped or dropped its end.
    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled() || self.tx.is_closed()
    }

    /// End the subscription from the transport side.
    pub fn close(&self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let (tx, mut sub) = Subscription::channel();
        assert!(tx.send(1));
        assert!(tx.send(2));
        assert_eq!(sub.recv().await, Some(1));
        assert_eq!(sub.recv().await, Some(2));
    }

    #[tokio::test]
    async fn test_stop_discards_queued_events() {
        let (tx, mut sub) = Subscription::channel();
        assert!(tx.send("late"));
        sub.stop();

        assert!(sub.is_stopped());
        assert!(tx.is_closed());
        assert!(!tx.send("later"));
        assert_eq!(sub.recv().await, None);
    }

    #[tokio::test]
    async fn test_drop_closes_sender() {
        let (tx, sub) = Subscription::<u8>::channel();
        drop(sub);
        assert!(tx.is_closed());
        assert!(!tx.send(1));
    }

    #[tokio::test]
    async fn test_transport_close_ends_stream() {
        let (tx, mut sub) = Subscription::<u8>::channel();
        tx.close();
        let next = tokio::time::timeout(std::time::Duration::from_secs(1), sub.recv()).await;
        assert_eq!(assert_ok!(next), None);
    }
}
