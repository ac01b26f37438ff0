//! Reactive bridge
//!
//! Turns store observations into async streams of decoded attribute values,
//! optionally projected onto a field, and wraps them in cold publishers for
//! callback-style consumers.

mod error;
mod projection;
mod publisher;
mod stream;

pub use error::ReactiveError;
pub use projection::ProjectedStream;
pub use publisher::{Cancellable, Publisher};
pub use stream::AttributeStream;

use crate::attribute::Setting;

/// Open a stream over `setting`.
pub fn stream<A: Setting>(setting: A) -> AttributeStream<A> {
    AttributeStream::open(setting)
}

pub fn stream_for<A, F, V>(setting: A, projection: F) -> ProjectedStream<AttributeStream<A>, F, V>
where
    A: Setting,
    F: FnMut(&A::Output) -> V,
    V: PartialEq + Clone,
{
    AttributeStream::open(setting).project(projection)
}

pub fn publisher<A>(setting: A) -> Publisher<A::Output>
where
    A: Setting + Clone,
{
    Publisher::new(setting)
}

pub fn publisher_for<A, F, V>(setting: A, projection: F) -> Publisher<V>
where
    A: Setting + Clone,
    F: Fn(&A::Output) -> V + Clone + Send + Sync + 'static,
    V: PartialEq + Clone + Send + 'static,
{
    Publisher::projected(setting, projection)
}
