//! Change notifier - coalesces the raw change feed into a level-triggered
//! signal.
//!
//! A pump task consumes the feed's one live subscription and converts each
//! raw event into a notification permit. The permit does not accumulate:
//! however many events arrive before the consumer gets around to waiting,
//! exactly one pending signal remains. The notifier indicates "something
//! changed", it does not count changes.
//!
//! Feed failure is fatal to the subscription: the error is latched and
//! every subsequent wait returns it, so the owner can decide its own
//! re-subscription policy.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

use crate::ports::{ChangeFeed, FeedError};

/// Level-triggered "data changed" indicator fed by a [`ChangeFeed`].
pub struct ChangeNotifier {
    signal: Arc<Notify>,
    status: watch::Receiver<Option<FeedError>>,
    pump: JoinHandle<()>,
}

impl ChangeNotifier {
    /// Subscribes to the feed and spawns the pump task.
    ///
    /// Call once per process lifetime; the subscription is not restartable.
    pub fn spawn(feed: Arc<dyn ChangeFeed>) -> Self {
        let signal = Arc::new(Notify::new());
        let (status_tx, status_rx) = watch::channel(None);

        let pump_signal = Arc::clone(&signal);
        let pump = tokio::spawn(async move {
            let mut stream = match feed.subscribe().await {
                Ok(stream) => stream,
                Err(err) => {
                    let _ = status_tx.send(Some(err));
                    return;
                }
            };

            loop {
                match stream.next().await {
                    Some(Ok(_)) => {
                        // notify_one stores at most one permit when nobody
                        // is waiting, which is the coalescing rule.
                        pump_signal.notify_one();
                    }
                    Some(Err(err)) => {
                        let _ = status_tx.send(Some(err));
                        return;
                    }
                    None => {
                        let _ = status_tx.send(Some(FeedError::Terminated(
                            "change stream ended".to_string(),
                        )));
                        return;
                    }
                }
            }
        });

        Self {
            signal,
            status: status_rx,
            pump,
        }
    }

    /// Waits for the next coalesced change signal.
    ///
    /// Returns `Err` once the underlying subscription has failed; after
    /// that no further signals will ever arrive from this notifier.
    pub async fn changed(&mut self) -> Result<(), FeedError> {
        if let Some(err) = self.status.borrow().clone() {
            return Err(err);
        }

        tokio::select! {
            _ = self.signal.notified() => Ok(()),
            changed = self.status.changed() => {
                let latched = self.status.borrow().clone();
                match (changed, latched) {
                    (_, Some(err)) => Err(err),
                    // Pump dropped without reporting: treat as termination.
                    (Err(_), None) => {
                        Err(FeedError::Terminated("change pump stopped".to_string()))
                    }
                    (Ok(()), None) => Ok(()),
                }
            }
        }
    }

    /// Stops the pump task. Used at process shutdown.
    pub fn abort(&self) {
        self.pump.abort();
    }
}

impl Drop for ChangeNotifier {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{ChangeEvent, ChangeStream};
    use async_trait::async_trait;
    use futures::stream;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn receiver_stream(
        rx: mpsc::UnboundedReceiver<Result<ChangeEvent, FeedError>>,
    ) -> ChangeStream {
        stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed()
    }

    /// Feed backed by an mpsc channel the test drives directly.
    struct ScriptedFeed {
        stream: Mutex<Option<ChangeStream>>,
    }

    impl ScriptedFeed {
        fn new() -> (Self, mpsc::UnboundedSender<Result<ChangeEvent, FeedError>>) {
            let (tx, rx) = mpsc::unbounded_channel();
            let feed = Self {
                stream: Mutex::new(Some(receiver_stream(rx))),
            };
            (feed, tx)
        }
    }

    #[async_trait]
    impl ChangeFeed for ScriptedFeed {
        async fn subscribe(&self) -> Result<ChangeStream, FeedError> {
            self.stream
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| FeedError::Subscribe("already subscribed".to_string()))
        }
    }

    async fn assert_no_signal(notifier: &mut ChangeNotifier) {
        let outcome = tokio::time::timeout(Duration::from_millis(50), notifier.changed()).await;
        assert!(outcome.is_err(), "expected no pending signal");
    }

    #[tokio::test]
    async fn single_event_produces_single_signal() {
        let (feed, tx) = ScriptedFeed::new();
        let mut notifier = ChangeNotifier::spawn(Arc::new(feed));

        tx.send(Ok(ChangeEvent)).unwrap();
        notifier.changed().await.unwrap();

        assert_no_signal(&mut notifier).await;
    }

    #[tokio::test]
    async fn bursts_collapse_into_one_pending_signal() {
        let (feed, tx) = ScriptedFeed::new();
        let mut notifier = ChangeNotifier::spawn(Arc::new(feed));

        for _ in 0..5 {
            tx.send(Ok(ChangeEvent)).unwrap();
        }
        // Let the pump drain the burst before anyone waits.
        tokio::time::sleep(Duration::from_millis(50)).await;

        notifier.changed().await.unwrap();
        assert_no_signal(&mut notifier).await;
    }

    #[tokio::test]
    async fn feed_error_is_latched() {
        let (feed, tx) = ScriptedFeed::new();
        let mut notifier = ChangeNotifier::spawn(Arc::new(feed));

        tx.send(Err(FeedError::Terminated("connection reset".to_string())))
            .unwrap();

        let err = notifier.changed().await.unwrap_err();
        assert!(matches!(err, FeedError::Terminated(_)));

        // Fatal: every later wait reports the same failure.
        let err = notifier.changed().await.unwrap_err();
        assert!(matches!(err, FeedError::Terminated(_)));
    }

    #[tokio::test]
    async fn stream_end_reports_termination() {
        let (feed, tx) = ScriptedFeed::new();
        let mut notifier = ChangeNotifier::spawn(Arc::new(feed));

        drop(tx);

        let err = notifier.changed().await.unwrap_err();
        assert!(matches!(err, FeedError::Terminated(_)));
    }

    #[tokio::test]
    async fn subscribe_failure_surfaces() {
        let (feed, _tx) = ScriptedFeed::new();
        let feed = Arc::new(feed);

        // First subscription claims the stream.
        let _first = ChangeNotifier::spawn(Arc::clone(&feed) as Arc<dyn ChangeFeed>);
        tokio::time::sleep(Duration::from_millis(20)).await;

        let mut second = ChangeNotifier::spawn(feed);
        let err = second.changed().await.unwrap_err();
        assert!(matches!(err, FeedError::Subscribe(_)));
    }

    #[tokio::test]
    async fn signal_arriving_before_error_is_still_delivered() {
        let (feed, tx) = ScriptedFeed::new();
        let mut notifier = ChangeNotifier::spawn(Arc::new(feed));

        tx.send(Ok(ChangeEvent)).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        notifier.changed().await.unwrap();

        tx.send(Err(FeedError::Terminated("gone".to_string())))
            .unwrap();
        assert!(notifier.changed().await.is_err());
    }
}
