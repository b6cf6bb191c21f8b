//! Capability traits for call sources and the registry that builds them.
//!
//! Three sources ship with the crate: `serial`, `mock` and `poll`. A source
//! owns whatever connection it reads from and runs on its own thread. It
//! hands every [`CallRecord`] it produces to a [`RecordSink`], which in the
//! daemon is the [`BoundedQueue`](crate::queue::BoundedQueue) feeding the
//! delivery worker.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::call_record::CallRecord;
use crate::queue::QueueError;
use crate::settings::Settings;
use crate::shutdown::ShutdownSignal;
use crate::{mock_source, poll_source, serial_source};

/// Destination for records produced by a source.
pub trait RecordSink: Send + Sync {
    /// Hand a finished record over. On error the record has been dropped.
    fn push(&self, record: CallRecord) -> Result<(), QueueError>;
}

/// A producer of call records.
pub trait CallSource: Send {
    /// Short identifier used in logs and for registry lookup.
    fn name(&self) -> &str;

    /// Run until `shutdown` fires, pushing every record into `sink`.
    ///
    /// Transient failures are handled internally; this only returns on
    /// shutdown.
    fn entrypoint(&mut self, sink: &dyn RecordSink, shutdown: &ShutdownSignal);
}

/// Errors raised while constructing a source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("unknown plugin {name:?}; available plugins: {available}")]
    UnknownPlugin { name: String, available: String },
    #[error("invalid {plugin} settings: {message}")]
    InvalidSettings {
        plugin: &'static str,
        message: String,
    },
}

/// Constructor stored in a [`SourceRegistry`].
pub type SourceFactory = fn(&Settings) -> Result<Box<dyn CallSource>, SourceError>;

/// Explicit name-to-constructor map, populated once at process start.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    factories: BTreeMap<String, SourceFactory>,
}

impl SourceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry containing the sources shipped with the crate.
    pub fn with_builtin() -> Self {
        Self::new()
            .register("serial", serial_source::from_settings)
            .register("mock", mock_source::from_settings)
            .register("poll", poll_source::from_settings)
    }

    /// Add or replace the constructor for `name`.
    pub fn register(mut self, name: impl Into<String>, factory: SourceFactory) -> Self {
        self.factories.insert(name.into(), factory);
        self
    }

    /// Whether a constructor is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Build the source registered under `name`.
    pub fn build(&self, name: &str, settings: &Settings) -> Result<Box<dyn CallSource>, SourceError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| SourceError::UnknownPlugin {
                name: name.to_owned(),
                available: self.names().collect::<Vec<_>>().join(", "),
            })?;
        factory(settings)
    }
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("names", &self.names().collect::<Vec<_>>())
            .finish()
    }
}
