//! Callback-style publishers
//!
//! A [`Publisher`] is cold: nothing is observed until `subscribe`, and every
//! subscription opens its own stream and store observation. Values are
//! delivered from a task on the given tokio runtime.

use super::error::ReactiveError;
use super::stream::AttributeStream;
use crate::attribute::{AttributeError, Setting};
use crate::store::Subscription;
use futures::stream::{BoxStream, StreamExt};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::debug;

type Upstream<V> = (BoxStream<'static, Result<V, AttributeError>>, Arc<Subscription>);
type Opener<V> = Arc<dyn Fn() -> Upstream<V> + Send + Sync>;

pub struct Publisher<V> {
    key: String,
    open: Opener<V>,
}

impl<V: Send + 'static> Publisher<V> {
    pub fn new<A>(setting: A) -> Self
    where
        A: Setting<Output = V> + Clone,
    {
        let key = setting.key().to_string();
        let open: Opener<V> = Arc::new(move || {
            let stream = AttributeStream::open(setting.clone());
            let subscription = stream.subscription();
            (stream.boxed(), subscription)
        });
        Self { key, open }
    }

    /// Publisher of `projection(value)`, deduplicated like
    /// [`AttributeStream::project`].
    pub fn projected<A, F>(setting: A, projection: F) -> Self
    where
        A: Setting + Clone,
        F: Fn(&A::Output) -> V + Clone + Send + Sync + 'static,
        V: PartialEq + Clone,
    {
        let key = setting.key().to_string();
        let open: Opener<V> = Arc::new(move || {
            let stream = AttributeStream::open(setting.clone());
            let subscription = stream.subscription();
            (stream.project(projection.clone()).boxed(), subscription)
        });
        Self { key, open }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Subscribe on the current tokio runtime.
    ///
    /// `on_value` runs for every update. The subscription ends with exactly
    /// one of `on_error` (decode failure) or `on_complete` (the store ended
    /// the observation), unless it is cancelled first.
    pub fn subscribe<N, E, C>(
        &self,
        on_value: N,
        on_error: E,
        on_complete: C,
    ) -> Result<Cancellable, ReactiveError>
    where
        N: FnMut(V) + Send + 'static,
        E: FnOnce(AttributeError) + Send + 'static,
        C: FnOnce() + Send + 'static,
    {
        let handle = Handle::try_current().map_err(|_| ReactiveError::NoRuntime)?;
        Ok(self.subscribe_on(&handle, on_value, on_error, on_complete))
    }

    pub fn subscribe_on<N, E, C>(
        &self,
        handle: &Handle,
        mut on_value: N,
        on_error: E,
        on_complete: C,
    ) -> Cancellable
    where
        N: FnMut(V) + Send + 'static,
        E: FnOnce(AttributeError) + Send + 'static,
        C: FnOnce() + Send + 'static,
    {
        let (mut upstream, subscription) = (self.open)();
        let cancelled = Arc::new(AtomicBool::new(false));
        let key = self.key.clone();
        debug!(key = %key, "Publisher subscription started");

        let stop = cancelled.clone();
        let task = handle.spawn(async move {
            while let Some(item) = upstream.next().await {
                if stop.load(Ordering::Acquire) {
                    return;
                }
                match item {
                    Ok(value) => on_value(value),
                    Err(e) => {
                        debug!(key = %key, error = %e, "Publisher subscription failed");
                        on_error(e);
                        return;
                    }
                }
            }
            if !stop.load(Ordering::Acquire) {
                debug!(key = %key, "Publisher subscription finished");
                on_complete();
            }
        });

        Cancellable {
            key: self.key.clone(),
            subscription,
            cancelled,
            task,
        }
    }
}

impl<V> Clone for Publisher<V> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            open: self.open.clone(),
        }
    }
}

impl<V> fmt::Debug for Publisher<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher").field("key", &self.key).finish()
    }
}

/// Handle to one publisher subscription. Dropping it cancels.
pub struct Cancellable {
    key: String,
    subscription: Arc<Subscription>,
    cancelled: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl Cancellable {
    /// Stop delivery. The store observation is released before this returns.
    pub fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        self.subscription.cancel();
        self.task.abort();
        debug!(key = %self.key, "Publisher subscription cancelled");
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Whether the delivery task has ended, for any reason.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for Cancellable {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for Cancellable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cancellable")
            .field("key", &self.key)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
