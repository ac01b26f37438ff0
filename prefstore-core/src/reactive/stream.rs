//! Per-attribute change streams

use super::projection::ProjectedStream;
use crate::attribute::{AttributeError, Setting};
use crate::store::{ChangeEvent, Subscription, Value};
use futures::stream::{FusedStream, Stream};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::trace;

/// Decoded updates of one attribute.
///
/// Backed by exactly one store observation, released when the stream
/// finishes, fails, or is dropped. Yields one item per change event; a
/// decode failure is yielded once and ends the stream.
pub struct AttributeStream<A: Setting> {
    setting: Arc<A>,
    events: mpsc::UnboundedReceiver<Option<Value>>,
    subscription: Arc<Subscription>,
    // Effective raw value sampled right after the observation started.
    opened_with: Option<Value>,
    finished: bool,
}

impl<A: Setting> AttributeStream<A> {
    pub fn open(setting: A) -> Self {
        let (tx, events) = mpsc::unbounded_channel();
        let callback = Arc::new(move |event: &ChangeEvent| {
            // The receiver is gone once the stream is dropped.
            let _ = tx.send(event.new.clone());
        });
        let subscription = setting.store().observe(setting.key(), callback);
        let opened_with = setting.store().object(setting.key());
        trace!(key = %setting.key(), "Stream opened");

        Self {
            setting: Arc::new(setting),
            events,
            subscription: Arc::new(subscription),
            opened_with,
            finished: false,
        }
    }

    pub fn key(&self) -> &str {
        self.setting.key()
    }

    /// Handle to the underlying observation. Cancelling it ends the stream
    /// after any already queued events.
    pub fn subscription(&self) -> Arc<Subscription> {
        self.subscription.clone()
    }

    /// Value the attribute had when the stream was opened.
    pub fn initial_value(&self) -> Result<A::Output, AttributeError> {
        self.setting.resolve(self.opened_with.clone())
    }

    /// Map each value through `projection`, skipping consecutive repeats.
    ///
    /// The projection of the value at open time is the starting point, so
    /// a change that leaves the projected part untouched emits nothing.
    pub fn project<V, F>(self, mut projection: F) -> ProjectedStream<Self, F, V>
    where
        F: FnMut(&A::Output) -> V,
        V: PartialEq + Clone,
    {
        let baseline = self.initial_value().ok().map(|value| projection(&value));
        ProjectedStream::with_baseline(self, projection, baseline)
    }

    fn finish(&mut self) {
        if !self.finished {
            self.finished = true;
            self.subscription.cancel();
            self.events.close();
            trace!(key = %self.setting.key(), "Stream closed");
        }
    }
}

impl<A: Setting> Stream for AttributeStream<A> {
    type Item = Result<A::Output, AttributeError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }
        match self.events.poll_recv(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(None) => {
                self.finish();
                Poll::Ready(None)
            }
            Poll::Ready(Some(raw)) => {
                let item = self.setting.resolve(raw);
                if item.is_err() {
                    self.finish();
                }
                Poll::Ready(Some(item))
            }
        }
    }
}

impl<A: Setting> FusedStream for AttributeStream<A> {
    fn is_terminated(&self) -> bool {
        self.finished
    }
}

impl<A: Setting> Drop for AttributeStream<A> {
    fn drop(&mut self) {
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::{CoderKind, Container};
    use crate::store::{MemoryStore, Store};
    use futures::StreamExt;
    use serde::{Deserialize, Serialize};
    use std::time::Duration;
    use tokio::time::timeout;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Point {
        x: i32,
        y: i32,
    }

    #[tokio::test]
    async fn test_stream_yields_each_change() {
        let store = Arc::new(MemoryStore::new());
        let container = Container::new("Settings", store.clone());
        let volume = container.mandatory("volume", 5i64);

        let mut stream = volume.stream();
        volume.write(&7).unwrap();
        volume.write(&9).unwrap();
        volume.reset();

        assert_eq!(stream.next().await.unwrap().unwrap(), 7);
        assert_eq!(stream.next().await.unwrap().unwrap(), 9);
        // Nothing was registered, so the reset surfaces as a nil raw value.
        assert_eq!(stream.next().await.unwrap().unwrap(), 5);
    }

    #[tokio::test]
    async fn test_optional_stream_yields_none_on_removal() {
        let store = Arc::new(MemoryStore::new());
        let container = Container::new("Settings", store.clone());
        let name = container.optional::<String>("name");

        let mut stream = name.stream();
        name.write(Some(&"kim".to_string())).unwrap();
        name.write(None).unwrap();

        assert_eq!(stream.next().await.unwrap().unwrap().as_deref(), Some("kim"));
        assert_eq!(stream.next().await.unwrap().unwrap(), None);
    }

    #[tokio::test]
    async fn test_decode_failure_ends_stream_and_releases_observation() {
        let store = Arc::new(MemoryStore::new());
        let container = Container::new("Geo", store.clone());
        let origin = container
            .mandatory_coded("origin", Point { x: 0, y: 0 }, CoderKind::Json)
            .unwrap();

        let mut stream = origin.stream();
        store.set_data("Geo::origin", b"not json");

        let first = stream.next().await.unwrap();
        assert!(matches!(first, Err(AttributeError::Decoding { .. })));
        assert!(stream.is_terminated());
        assert!(stream.next().await.is_none());
        assert_eq!(store.observer_count("Geo::origin"), 0);
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Record {
        a: i32,
        b: i32,
    }

    #[tokio::test]
    async fn test_projection_ignores_sibling_change_after_open() {
        let store = Arc::new(MemoryStore::new());
        let container = Container::new("Records", store.clone());
        let record = container
            .mandatory_coded("current", Record { a: 0, b: 0 }, CoderKind::Json)
            .unwrap();
        record.write(&Record { a: 1, b: 1 }).unwrap();

        let mut a_values = record.stream_for(|r: &Record| r.a);
        record.write(&Record { a: 1, b: 2 }).unwrap();
        assert!(timeout(Duration::from_millis(50), a_values.next()).await.is_err());

        record.write(&Record { a: 2, b: 2 }).unwrap();
        let next = timeout(Duration::from_secs(1), a_values.next()).await.unwrap();
        assert_eq!(next.unwrap().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_projection_baseline_uses_default_when_unset() {
        let store = Arc::new(MemoryStore::new());
        let container = Container::new("Records", store.clone());
        let record = container
            .mandatory_coded("current", Record { a: 5, b: 0 }, CoderKind::Binary)
            .unwrap();

        let mut a_values = record.stream_for(|r: &Record| r.a);
        assert_eq!(a_values.get_ref().initial_value().unwrap(), Record { a: 5, b: 0 });

        record.write(&Record { a: 5, b: 9 }).unwrap();
        record.write(&Record { a: 6, b: 9 }).unwrap();
        let next = timeout(Duration::from_secs(1), a_values.next()).await.unwrap();
        assert_eq!(next.unwrap().unwrap(), 6);
    }

    #[tokio::test]
    async fn test_stream_waits_between_events() {
        let store = Arc::new(MemoryStore::new());
        let container = Container::new("Settings", store.clone());
        let volume = container.mandatory("volume", 0i64);
        let mut stream = volume.stream();

        assert!(timeout(Duration::from_millis(20), stream.next()).await.is_err());

        volume.write(&1).unwrap();
        let value = timeout(Duration::from_secs(1), stream.next()).await.unwrap();
        assert_eq!(value.unwrap().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_subscription_drains_then_ends() {
        let store = Arc::new(MemoryStore::new());
        let container = Container::new("Settings", store.clone());
        let volume = container.mandatory("volume", 0i64);
        let mut stream = volume.stream();

        volume.write(&1).unwrap();
        stream.subscription().cancel();
        volume.write(&2).unwrap();

        assert_eq!(stream.next().await.unwrap().unwrap(), 1);
        assert!(stream.next().await.is_none());
        assert_eq!(store.observer_count("Settings::volume"), 0);
    }
}
