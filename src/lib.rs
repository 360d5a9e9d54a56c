//! restplate - the request layer of a REST client.
//!
//! restplate turns a URL template plus parameter bindings into a concrete URL, models that URL
//! as a structured [`PathExpression`], and drives each request through an explicit lifecycle
//! with interceptors, pluggable body codecs, timeout retries and abort. The wire transport is a
//! port: bring any HTTP stack by implementing [`Transport`].
//!
//! # Features
//! - URI templating with `:name`, `{name}` and `{name:regex}` placeholders in path, matrix,
//!   query and fragment positions
//! - Path expressions with matrix parameters, multi-valued queries and fragments
//! - Dynamic service roots chosen by template prefix or arbitrary predicate
//! - Interceptors that may finish asynchronously; the request waits for all of them
//! - Body readers and writers chosen explicitly or from a type-keyed registry
//! - Configurable accepted status codes, per-attempt timeouts and timeout-only retries
//! - Abort at any point before completion; callbacks never run after an abort
//! - Metrics via the `metrics` facade and structured tracing via `tracing`
//!
//! # Quick Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use restplate::{ClientConfig, CodecRegistry, Dispatcher, Request, Transport};
//!
//! # fn transport() -> Arc<dyn Transport> { unimplemented!() }
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let config = ClientConfig::builder()
//!     .default_root("https://api.example.com/v1")
//!     .build();
//! let dispatcher = Dispatcher::from_config(transport(), &config, CodecRegistry::new());
//!
//! let request = Request::<()>::builder("DELETE", "/users/{id}")
//!     .path_param("id", "42")
//!     .defaults(&config)
//!     .on_success(|()| println!("deleted"))
//!     .on_failure(|failure| eprintln!("delete failed: {failure}"))
//!     .build()?;
//! dispatcher.send(request)?.finished().await;
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! The crate separates **ports** (traits) from **adapters** (implementations) while keeping
//! the request logic inside `core`. Prefer the re-exports below over reaching into internal
//! modules directly.
//!
//! # Error Handling
//! Each module has its own `thiserror` enum. Errors found before a request is sent are returned
//! from [`Dispatcher::send`]; everything after that reaches the failure callback as a
//! [`RequestFailure`]. Configuration loading and the CLI use `eyre::Result`.
pub mod config;
pub mod metrics;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

pub mod adapters;
pub mod core;

pub use crate::{
    adapters::{JsonReader, JsonWriter, StaticHeadersInterceptor},
    config::ClientConfig,
    core::{
        Bindings, CodecRegistry, Context, DispatchError, Dispatcher, DispatcherOptions,
        PathExpression, Request, RequestFailure, RequestHandle, RequestState, RootResolver,
        Templater,
    },
    ports::{RequestInterceptor, Transport, TransportRequest, TransportResponse},
};
