//! Interfaces onto the host's poll-based resource model.
//!
//! These traits mirror the shape of the `wasi:io/streams` and
//! `wasi:http/types` resources: readiness is advertised through pollables,
//! reads may return nothing, writes are bounded by an explicitly queried
//! budget, and every resource is released exactly once. The real WASI
//! bindings implement them on wasi targets; tests drive the same traits
//! with scripted in-memory hosts.

use std::{fmt, io};

use guestio_reactor::Pollable;

use crate::{client::Options, error::Error};

/// Failure surfaced by a host stream operation.
#[derive(Debug)]
pub enum StreamError {
    /// The stream will produce or accept no further bytes. Terminal.
    Closed,
    /// The last operation failed.
    Failed(io::Error),
}

impl From<StreamError> for io::Error {
    fn from(e: StreamError) -> Self {
        match e {
            StreamError::Closed => Self::new(io::ErrorKind::BrokenPipe, "stream closed"),
            StreamError::Failed(e) => e,
        }
    }
}

/// A readable host stream. Reads pull up to `max` bytes; an empty chunk
/// means "nothing available yet", not end of stream.
pub trait ReadStream {
    type Pollable: Pollable;

    fn read(&self, max: u64) -> Result<Vec<u8>, StreamError>;

    /// Pollable that signals when a read may make progress.
    fn subscribe(&self) -> Self::Pollable;
}

/// A writable host stream with explicit capacity checks and an
/// asynchronous flush.
pub trait WriteStream {
    type Pollable: Pollable;

    /// Number of bytes the stream currently accepts. Zero means the writer
    /// must wait; after a flush, zero until the flush has completed.
    fn check_write(&self) -> Result<u64, StreamError>;

    /// Write all of `bytes`. The caller must stay within the budget
    /// reported by [`check_write`](Self::check_write).
    fn write(&self, bytes: &[u8]) -> Result<(), StreamError>;

    /// Request a flush; completion is signalled through the pollable.
    fn flush(&self) -> Result<(), StreamError>;

    fn subscribe(&self) -> Self::Pollable;
}

/// Response-body resource. The stream is a child of the body, so release
/// order is stream first, then body.
pub trait IncomingBody {
    type Stream: ReadStream;

    /// Take the body's read stream. Callable once.
    fn stream(&self) -> Result<Self::Stream, ()>;

    /// Signal that the consumer is done with the body.
    fn finish(self);
}

/// Request-body resource; same parent/child release order as
/// [`IncomingBody`].
pub trait OutgoingBody {
    type Stream: WriteStream;

    /// Take the body's write stream. Callable once.
    fn stream(&self) -> Result<Self::Stream, ()>;

    /// Complete the body with no trailers, marking the end of the request
    /// body on the wire.
    fn finish(self) -> io::Result<()>;
}

/// Head of a submitted exchange: resolves exactly once with the host's
/// nested transport/application result.
pub trait ResponseFuture {
    type Pollable: Pollable;
    type Response;
    type ErrorCode: fmt::Debug;

    /// `None` until resolved. The outer result is `Err` only if the value
    /// was already taken, which the orchestrator treats as unreachable.
    fn get(&self) -> Option<Result<Result<Self::Response, Self::ErrorCode>, ()>>;

    fn subscribe(&self) -> Self::Pollable;
}

/// A resolved response head plus its body resource.
pub trait IncomingResponse {
    type Body: IncomingBody;

    fn status(&self) -> u16;

    /// Ordered header entries; duplicate names allowed.
    fn headers(&self) -> Vec<(String, Vec<u8>)>;

    /// Take the body resource. Callable once.
    fn consume(&self) -> Result<Self::Body, ()>;
}

/// The wire-independent request head handed to the host.
#[derive(Debug)]
pub struct RequestHead {
    pub method: http::Method,
    pub scheme: String,
    pub authority: String,
    pub path_with_query: String,
    /// Ordered `(name, raw value)` pairs; duplicates allowed.
    pub headers: Vec<(String, Vec<u8>)>,
}

/// Everything the orchestrator needs from the host to run one exchange.
pub trait HttpHost {
    type Pollable: Pollable;
    type RequestStream: WriteStream<Pollable = Self::Pollable>;
    type RequestBody: OutgoingBody<Stream = Self::RequestStream>;
    type ResponseStream: ReadStream<Pollable = Self::Pollable>;
    type ResponseBody: IncomingBody<Stream = Self::ResponseStream>;
    type Response: IncomingResponse<Body = Self::ResponseBody>;
    type Future: ResponseFuture<Pollable = Self::Pollable, Response = Self::Response>;

    /// Build and submit the request head, returning the response future
    /// and the request-body resource.
    fn start(
        &self,
        head: RequestHead,
        options: &Options,
    ) -> Result<(Self::Future, Self::RequestBody), Error>;
}
