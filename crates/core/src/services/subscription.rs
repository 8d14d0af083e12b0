//! Live vote-record subscriptions.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::vote_record::VoteRecord;

/// Buffered updates per subscription before the forwarder waits.
pub const SUBSCRIPTION_BUFFER: usize = 64;

/// A live feed of vote-record changes.
///
/// The subscription owns the tasks that feed it. Dropping it (or calling
/// [`VoteSubscription::unsubscribe`]) stops them, so a stale pairing can
/// never keep delivering updates.
pub struct VoteSubscription {
    rx: mpsc::Receiver<VoteRecord>,
    tasks: Vec<JoinHandle<()>>,
}

impl VoteSubscription {
    /// Wrap a receiver and the tasks writing into it.
    #[must_use]
    pub const fn new(rx: mpsc::Receiver<VoteRecord>, tasks: Vec<JoinHandle<()>>) -> Self {
        Self { rx, tasks }
    }

    /// Wait for the next update. `None` once the source has gone away.
    pub async fn recv(&mut self) -> Option<VoteRecord> {
        self.rx.recv().await
    }

    /// Stop receiving updates.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for VoteSubscription {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl Stream for VoteSubscription {
    type Item = VoteRecord;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Forward broadcast messages into a subscription channel.
///
/// `select` decides which messages become updates. The task ends when the
/// broadcast closes or the subscription is dropped.
pub fn spawn_forwarder<T, F>(
    mut source: broadcast::Receiver<T>,
    sink: mpsc::Sender<VoteRecord>,
    select: F,
) -> JoinHandle<()>
where
    T: Clone + Send + 'static,
    F: Fn(T) -> Option<VoteRecord> + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            match source.recv().await {
                Ok(message) => {
                    if let Some(record) = select(message)
                        && sink.send(record).await.is_err()
                    {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "Vote subscription lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Vote change source closed");
                    break;
                }
            }
        }
    })
}
