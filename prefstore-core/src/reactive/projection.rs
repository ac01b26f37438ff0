//! Projection with consecutive deduplication

use crate::attribute::AttributeError;
use futures::stream::{FusedStream, Stream};
use std::pin::Pin;
use std::task::{Context, Poll};

/// Yields `projection(value)` for each upstream value whose projection
/// differs from the previous one. The comparison starts from a baseline,
/// when one is given, so the first upstream value is dropped if it projects
/// to the baseline. Errors pass through.
pub struct ProjectedStream<S, F, V> {
    inner: S,
    projection: F,
    last: Option<V>,
}

impl<S, F, V> ProjectedStream<S, F, V> {
    pub fn new(inner: S, projection: F) -> Self {
        Self {
            inner,
            projection,
            last: None,
        }
    }

    /// Start deduplicating against `baseline` instead of emitting the first
    /// value unconditionally.
    pub fn with_baseline(inner: S, projection: F, baseline: Option<V>) -> Self {
        Self {
            inner,
            projection,
            last: baseline,
        }
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

// `projection` and `last` are never pinned, so only `inner` needs `Unpin`.
impl<S: Unpin, F, V> Unpin for ProjectedStream<S, F, V> {}

impl<S, F, T, V> Stream for ProjectedStream<S, F, V>
where
    S: Stream<Item = Result<T, AttributeError>> + Unpin,
    F: FnMut(&T) -> V,
    V: PartialEq + Clone,
{
    type Item = Result<V, AttributeError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            let value = match Pin::new(&mut this.inner).poll_next(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Ready(Some(Err(e))) => return Poll::Ready(Some(Err(e))),
                Poll::Ready(Some(Ok(value))) => value,
            };

            let projected = (this.projection)(&value);
            if this.last.as_ref() == Some(&projected) {
                continue;
            }
            this.last = Some(projected.clone());
            return Poll::Ready(Some(Ok(projected)));
        }
    }
}

impl<S, F, T, V> FusedStream for ProjectedStream<S, F, V>
where
    S: FusedStream<Item = Result<T, AttributeError>> + Unpin,
    F: FnMut(&T) -> V,
    V: PartialEq + Clone,
{
    fn is_terminated(&self) -> bool {
        self.inner.is_terminated()
    }
}
