//! HTTP client for hosts that expose a poll-based resource model.
//!
//! The host only offers pull-style primitives: "how many bytes will you
//! take", "try to read a chunk", and futures that must be re-polled after
//! subscribing to a pollable. [`BodyWriter`] and [`BodyReader`] turn those
//! into push-style async byte streams with backpressure, and [`Client`]
//! runs one request/response exchange, streaming the request body out
//! concurrently with the wait for the response head.
//!
//! Host resources are consumed through the traits in [`host`]; the WASI 0.2
//! bindings implement them on wasi targets.

mod client;
mod error;
#[cfg(test)]
mod fake;
pub mod host;
mod streams;
#[cfg(target_os = "wasi")]
mod wasi;

pub use self::client::{Client, Options, Response};
pub use self::error::Error;
pub use self::streams::{BodyReader, BodyWriter};
#[cfg(target_os = "wasi")]
pub use self::wasi::WasiHost;
