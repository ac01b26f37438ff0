//! prefstore-core: typed, observable application settings
//!
//! - [`store`]: the layered [`Store`] contract and the in-memory
//!   [`MemoryStore`] reference implementation
//! - [`attribute`]: typed attributes declared through a [`Container`]
//! - [`registrar`]: exactly-once default registration
//! - [`reactive`]: change streams, projections and publishers
//! - [`config`] and [`logging`]: runtime configuration and tracing setup

pub mod attribute;
pub mod config;
pub mod logging;
pub mod reactive;
pub mod registrar;
pub mod store;

pub use attribute::{Attribute, AttributeError, CoderKind, Container, OptionalAttribute, Setting};
pub use config::Config;
pub use logging::{init_logging, LogLevel};
pub use reactive::{AttributeStream, Cancellable, Publisher, ReactiveError};
pub use store::{ChangeEvent, MemoryStore, Store, Subscription, Value};
