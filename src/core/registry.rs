//! Configuration-time registries consulted by the dispatcher.
//!
//! Both are plain values built once and handed to
//! [`Dispatcher::new`](crate::core::Dispatcher::new); they are only read
//! while requests are in flight.
use std::{fmt, sync::Arc};

use crate::{
    config::ClientConfig,
    core::request::{RequestMetadata, TypeInfo},
    ports::codec::{BodyReader, BodyWriter},
};

pub type RootPredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;
pub type RootSupplier = Arc<dyn Fn() -> String + Send + Sync>;
pub type MetadataMatcher = Arc<dyn Fn(&RequestMetadata) -> bool + Send + Sync>;

/// Ordered list of `(predicate, root)` rules over the path template with a
/// fallback default root. The first matching rule wins.
#[derive(Clone)]
pub struct RootResolver {
    rules: Vec<(RootPredicate, RootSupplier)>,
    default_root: String,
}

impl RootResolver {
    pub fn new(default_root: impl Into<String>) -> Self {
        Self {
            rules: Vec::new(),
            default_root: default_root.into(),
        }
    }

    /// Rules for every configured prefix, in declaration order.
    pub fn from_config(config: &ClientConfig) -> Self {
        let mut resolver = Self::new(config.default_root.clone());
        for rule in &config.roots {
            resolver.add_prefix_root(rule.prefix.clone(), rule.root.clone());
        }
        resolver
    }

    pub fn add_root(
        &mut self,
        predicate: impl Fn(&str) -> bool + Send + Sync + 'static,
        root: impl Fn() -> String + Send + Sync + 'static,
    ) -> &mut Self {
        self.rules.push((Arc::new(predicate), Arc::new(root)));
        self
    }

    /// Rule matching templates that start with `prefix`.
    pub fn add_prefix_root(
        &mut self,
        prefix: impl Into<String>,
        root: impl Into<String>,
    ) -> &mut Self {
        let prefix = prefix.into();
        let root = root.into();
        self.add_root(
            move |path| path.starts_with(prefix.as_str()),
            move || root.clone(),
        )
    }

    pub fn default_root(&self) -> &str {
        &self.default_root
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn resolve(&self, path: &str) -> String {
        self.rules
            .iter()
            .find(|(predicate, _)| predicate(path))
            .map(|(_, root)| root())
            .unwrap_or_else(|| self.default_root.clone())
    }
}

impl Default for RootResolver {
    fn default() -> Self {
        Self::new(ClientConfig::default().default_root)
    }
}

impl fmt::Debug for RootResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootResolver")
            .field("rules", &self.rules.len())
            .field("default_root", &self.default_root)
            .finish()
    }
}

/// Readers and writers keyed by request metadata matchers. Lookups return
/// the first registered match.
#[derive(Clone, Default)]
pub struct CodecRegistry {
    readers: Vec<(MetadataMatcher, Arc<dyn BodyReader>)>,
    writers: Vec<(MetadataMatcher, Arc<dyn BodyWriter>)>,
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_reader(
        &mut self,
        matcher: impl Fn(&RequestMetadata) -> bool + Send + Sync + 'static,
        reader: Arc<dyn BodyReader>,
    ) -> &mut Self {
        self.readers.push((Arc::new(matcher), reader));
        self
    }

    pub fn register_writer(
        &mut self,
        matcher: impl Fn(&RequestMetadata) -> bool + Send + Sync + 'static,
        writer: Arc<dyn BodyWriter>,
    ) -> &mut Self {
        self.writers.push((Arc::new(matcher), writer));
        self
    }

    /// Reader for requests whose response type is `T`.
    pub fn register_reader_for<T: 'static>(&mut self, reader: Arc<dyn BodyReader>) -> &mut Self {
        let wanted = TypeInfo::of::<T>();
        self.register_reader(move |meta| meta.response_type == wanted, reader)
    }

    /// Writer for requests whose body type is `B`.
    pub fn register_writer_for<B: 'static>(&mut self, writer: Arc<dyn BodyWriter>) -> &mut Self {
        let wanted = TypeInfo::of::<B>();
        self.register_writer(move |meta| meta.body_type == Some(wanted), writer)
    }

    pub fn find_reader(&self, metadata: &RequestMetadata) -> Option<Arc<dyn BodyReader>> {
        self.readers
            .iter()
            .find(|(matcher, _)| matcher(metadata))
            .map(|(_, reader)| reader.clone())
    }

    pub fn find_writer(&self, metadata: &RequestMetadata) -> Option<Arc<dyn BodyWriter>> {
        self.writers
            .iter()
            .find(|(matcher, _)| matcher(metadata))
            .map(|(_, writer)| writer.clone())
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("readers", &self.readers.len())
            .field("writers", &self.writers.len())
            .finish()
    }
}
