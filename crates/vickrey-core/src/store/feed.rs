// Change feed: a polling subscription over a store's change log.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, Stream};
use tracing::trace;

use super::{run_blocking, ChangeEvent, DocumentStore, StoreError};

/// Delivers change events for one collection in log order.
///
/// A feed opened with [`ChangeFeed::resume`] belongs to a named consumer whose
/// position is kept in the store. Delivery is at-least-once: events handed
/// out after the last [`ChangeFeed::checkpoint`] are delivered again when the
/// consumer resumes.
pub struct ChangeFeed {
    store: Arc<dyn DocumentStore>,
    collection: String,
    consumer: Option<String>,
    cursor: u64,
    poll_interval: Duration,
    batch_size: usize,
    pending: VecDeque<ChangeEvent>,
}

impl ChangeFeed {
    /// Resume `consumer` from its saved position, or from the start of the
    /// log if it has never checkpointed.
    pub async fn resume(
        store: Arc<dyn DocumentStore>,
        consumer: impl Into<String>,
        collection: impl Into<String>,
        poll_interval: Duration,
    ) -> Result<Self, StoreError> {
        let consumer = consumer.into();
        let saved = run_blocking(&store, {
            let consumer = consumer.clone();
            move |store| store.load_cursor(&consumer)
        })
        .await?;
        let mut feed = Self::from_seq(store, collection, saved.unwrap_or(0), poll_interval);
        feed.consumer = Some(consumer);
        Ok(feed)
    }

    /// Subscribe to changes with a sequence number greater than `after`.
    pub fn from_seq(
        store: Arc<dyn DocumentStore>,
        collection: impl Into<String>,
        after: u64,
        poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            collection: collection.into(),
            consumer: None,
            cursor: after,
            poll_interval,
            batch_size: 100,
            pending: VecDeque::new(),
        }
    }

    /// Maximum number of events fetched per poll.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Sequence number of the last event handed out.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Fetch any events that are ready without waiting.
    pub fn poll_once(&mut self) -> Result<Option<ChangeEvent>, StoreError> {
        if self.pending.is_empty() {
            let batch = self
                .store
                .changes_since(&self.collection, self.cursor, self.batch_size)?;
            trace!(collection = %self.collection, fetched = batch.len(), "polled change log");
            self.pending.extend(batch);
        }
        Ok(self.pending.pop_front().inspect(|event| {
            self.cursor = event.seq;
        }))
    }

    /// Wait for the next event, polling the store every `poll_interval`.
    /// Polls run on the blocking pool.
    pub async fn next(&mut self) -> Result<ChangeEvent, StoreError> {
        loop {
            if self.pending.is_empty() {
                let collection = self.collection.clone();
                let (after, limit) = (self.cursor, self.batch_size);
                let batch = run_blocking(&self.store, move |store| {
                    store.changes_since(&collection, after, limit)
                })
                .await?;
                trace!(collection = %self.collection, fetched = batch.len(), "polled change log");
                self.pending.extend(batch);
            }
            if let Some(event) = self.pending.pop_front() {
                self.cursor = event.seq;
                return Ok(event);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Save the consumer's position and compact the change log behind it.
    /// A feed without a consumer name has nothing to save.
    pub async fn checkpoint(&self) -> Result<(), StoreError> {
        let Some(consumer) = self.consumer.clone() else {
            return Ok(());
        };
        let seq = self.cursor;
        run_blocking(&self.store, move |store| {
            store.save_cursor(&consumer, seq)?;
            store.compact_changes()
        })
        .await?;
        Ok(())
    }

    /// Turn the feed into an endless stream of events. The stream ends after
    /// yielding the first store error.
    pub fn into_stream(self) -> impl Stream<Item = Result<ChangeEvent, StoreError>> {
        stream::unfold(Some(self), |feed| async move {
            let mut feed = feed?;
            match feed.next().await {
                Ok(event) => Some((Ok(event), Some(feed))),
                Err(e) => Some((Err(e), None)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ChangeKind, DocPath, Precondition, SqliteStore};
    use futures_util::StreamExt;

    fn store() -> Arc<dyn DocumentStore> {
        Arc::new(SqliteStore::open_in_memory("test-vickrey").unwrap())
    }

    async fn page_sync(store: &Arc<dyn DocumentStore>) -> ChangeFeed {
        ChangeFeed::resume(store.clone(), "page-sync", "drafts", Duration::from_millis(10))
            .await
            .unwrap()
    }

    fn write(store: &Arc<dyn DocumentStore>, p: &str) {
        store
            .set(
                &DocPath::parse(p).unwrap(),
                serde_json::Map::new(),
                Precondition::None,
            )
            .unwrap();
    }

    #[tokio::test]
    async fn resume_starts_from_the_beginning_without_a_checkpoint() {
        let store = store();
        write(&store, "drafts/old");
        let mut feed = page_sync(&store).await;

        let event = feed.poll_once().unwrap().unwrap();
        assert!(event.resource.ends_with("drafts/old"));
        assert_eq!(feed.cursor(), event.seq);
    }

    #[tokio::test]
    async fn resume_continues_after_the_last_checkpoint() {
        let store = store();
        write(&store, "drafts/a");
        write(&store, "drafts/b");

        let mut feed = page_sync(&store).await;
        feed.next().await.unwrap();
        feed.checkpoint().await.unwrap();
        // Handed out but never checkpointed.
        feed.next().await.unwrap();
        drop(feed);

        let mut resumed = page_sync(&store).await;
        let event = resumed.poll_once().unwrap().unwrap();
        assert!(event.resource.ends_with("drafts/b"));
        assert!(resumed.poll_once().unwrap().is_none());
    }

    #[tokio::test]
    async fn checkpoint_compacts_handled_changes() {
        let store = store();
        write(&store, "drafts/a");
        write(&store, "drafts/a/pages/public");
        write(&store, "drafts/b");

        let mut feed = page_sync(&store).await;
        feed.next().await.unwrap();
        feed.next().await.unwrap();
        feed.checkpoint().await.unwrap();

        assert_eq!(store.load_cursor("page-sync").unwrap(), Some(3));
        assert!(store.changes_since("drafts", 0, 10).unwrap().is_empty());
        assert!(store.changes_since("drafts/a/pages", 0, 10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn checkpoint_without_consumer_saves_nothing() {
        let store = store();
        write(&store, "drafts/a");
        let mut feed = ChangeFeed::from_seq(store.clone(), "drafts", 0, Duration::from_millis(10));
        feed.next().await.unwrap();
        feed.checkpoint().await.unwrap();
        assert_eq!(store.changes_since("drafts", 0, 10).unwrap().len(), 1);
    }

    #[test]
    fn from_seq_replays_history_in_order() {
        let store = store();
        write(&store, "drafts/a");
        write(&store, "drafts/b");
        write(&store, "drafts/a/pages/public");

        let mut feed = ChangeFeed::from_seq(store, "drafts", 0, Duration::from_millis(10))
            .with_batch_size(1);
        let first = feed.poll_once().unwrap().unwrap();
        let second = feed.poll_once().unwrap().unwrap();
        assert!(first.resource.ends_with("drafts/a"));
        assert!(second.resource.ends_with("drafts/b"));
        assert!(feed.poll_once().unwrap().is_none());
    }

    #[tokio::test]
    async fn next_waits_for_new_events() {
        let store = store();
        let mut feed = ChangeFeed::from_seq(store.clone(), "drafts", 0, Duration::from_millis(20));

        let writer = store.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(120)).await;
            write(&writer, "drafts/later");
        });

        let event = feed.next().await.unwrap();
        assert_eq!(event.kind, ChangeKind::Created);
        assert!(event.resource.ends_with("drafts/later"));
    }

    #[tokio::test]
    async fn stream_yields_events() {
        let store = store();
        write(&store, "drafts/x");
        write(&store, "drafts/y");
        let feed = ChangeFeed::from_seq(store, "drafts", 0, Duration::from_millis(10));
        let events: Vec<_> = feed.into_stream().take(2).collect().await;
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.is_ok()));
    }
}
