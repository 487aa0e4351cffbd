//! Live query streams driven by collection change notifications.

use std::future::Future;

use async_stream::stream;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::debug;

use crate::document::{CollectionPath, Document};
use crate::error::Result;
use crate::store::Snapshots;

/// Capacity of a store's change notification channel.
pub(crate) const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Yield `produce()` once, then again after each change to `collection`,
/// until the change channel closes or the stream is dropped.
///
/// `receiver` must be subscribed before the first `produce()` runs so no
/// commit between the two is missed.
pub(crate) fn live_query<F, Fut>(
    mut receiver: broadcast::Receiver<CollectionPath>,
    collection: CollectionPath,
    mut produce: F,
) -> Snapshots
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Vec<Document>>> + Send + 'static,
{
    Box::pin(stream! {
        loop {
            yield produce().await;

            if !wait_for(&mut receiver, &collection).await {
                debug!(collection = %collection, "change channel closed, ending live query");
                break;
            }
        }
    })
}

async fn wait_for(
    receiver: &mut broadcast::Receiver<CollectionPath>,
    collection: &CollectionPath,
) -> bool {
    loop {
        match receiver.recv().await {
            Ok(changed) if changed == *collection => break,
            Ok(_) => continue,
            Err(RecvError::Lagged(skipped)) => {
                debug!(collection = %collection, skipped, "live query lagged, re-querying");
                break;
            }
            Err(RecvError::Closed) => return false,
        }
    }

    // Later notifications are covered by the re-query about to run.
    loop {
        match receiver.try_recv() {
            Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Empty) => return true,
            Err(TryRecvError::Closed) => return true,
        }
    }
}
