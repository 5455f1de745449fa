//! Byte-stream adapters over the host's pull-style body resources.

use std::io;

use guestio_reactor::Reactor;

use crate::host::{IncomingBody, OutgoingBody, ReadStream, StreamError, WriteStream};

/// Bytes requested from the host per read.
const READ_CHUNK: u64 = 16 * 1024;

/// Async reader over a response body.
///
/// Owns the stream and its parent body handle; both are released exactly
/// once, stream first, on [`close`](Self::close) or drop.
pub struct BodyReader<B: IncomingBody> {
    reactor: Reactor<<B::Stream as ReadStream>::Pollable>,
    stream: Option<B::Stream>,
    body: Option<B>,
    /// At most one chunk read from the host but not yet delivered.
    pending: Option<Vec<u8>>,
    offset: usize,
    closed: bool,
}

impl<B: IncomingBody> BodyReader<B> {
    /// # Panics
    ///
    /// Panics if the body's stream was already taken.
    pub fn new(reactor: Reactor<<B::Stream as ReadStream>::Pollable>, body: B) -> Self {
        let stream = body.stream().expect("incoming body stream already taken");
        Self {
            reactor,
            stream: Some(stream),
            body: Some(body),
            pending: None,
            offset: 0,
            closed: false,
        }
    }

    /// Read up to `buf.len()` bytes, suspending until the host has data.
    ///
    /// Returns `Ok(0)` once the stream has closed; further calls keep
    /// returning `Ok(0)` without touching the host.
    ///
    /// # Errors
    ///
    /// Any host failure other than the closed-stream signal.
    pub async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            if self.closed {
                return Ok(0);
            }

            if let Some(pending) = self.pending.take() {
                let n = (pending.len() - self.offset).min(buf.len());
                buf[..n].copy_from_slice(&pending[self.offset..self.offset + n]);
                if self.offset + n < pending.len() {
                    self.offset += n;
                    self.pending = Some(pending);
                } else {
                    self.offset = 0;
                }
                return Ok(n);
            }

            let stream = self.stream.as_ref().expect("reader used after close");
            match stream.read(READ_CHUNK) {
                Ok(chunk) if chunk.is_empty() => {
                    self.reactor.wait_for(stream.subscribe()).await;
                }
                Ok(chunk) => {
                    self.pending = Some(chunk);
                    self.offset = 0;
                }
                Err(StreamError::Closed) => {
                    self.closed = true;
                    return Ok(0);
                }
                Err(StreamError::Failed(e)) => return Err(e),
            }
        }
    }

    /// Read the rest of the stream.
    ///
    /// # Errors
    ///
    /// Any host failure other than the closed-stream signal.
    pub async fn read_to_end(&mut self) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut buf = [0; 4096];
        loop {
            let n = self.read(&mut buf).await?;
            if n == 0 {
                return Ok(out);
            }
            out.extend_from_slice(&buf[..n]);
        }
    }

    /// Release the stream and body handles. Idempotent; also runs on drop.
    pub fn close(&mut self) {
        drop(self.stream.take());
        if let Some(body) = self.body.take() {
            body.finish();
        }
    }
}

impl<B: IncomingBody> Drop for BodyReader<B> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Async writer over a request body.
///
/// Owns the stream and its parent body handle. [`close`](Self::close)
/// finishes the body, marking end of the request body on the wire; drop is
/// a backstop that does the same and logs instead of propagating failures.
pub struct BodyWriter<B: OutgoingBody> {
    reactor: Reactor<<B::Stream as WriteStream>::Pollable>,
    stream: Option<B::Stream>,
    body: Option<B>,
}

impl<B: OutgoingBody> BodyWriter<B> {
    /// # Panics
    ///
    /// Panics if the body's stream was already taken.
    pub fn new(reactor: Reactor<<B::Stream as WriteStream>::Pollable>, body: B) -> Self {
        let stream = body.stream().expect("outgoing body stream already taken");
        Self {
            reactor,
            stream: Some(stream),
            body: Some(body),
        }
    }

    /// Send all of `bytes`, suspending whenever the host reports no
    /// capacity, then flush and wait for the flush to complete.
    ///
    /// # Errors
    ///
    /// Any host failure, including writing to a closed stream.
    pub async fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        let stream = self.stream.as_ref().expect("writer used after close");
        let mut offset = 0;
        let mut flushing = false;
        loop {
            let count = usize::try_from(stream.check_write()?).unwrap_or(usize::MAX);
            if count == 0 {
                self.reactor.wait_for(stream.subscribe()).await;
            } else if offset == bytes.len() {
                if flushing {
                    return Ok(());
                }
                stream.flush()?;
                flushing = true;
            } else {
                let n = count.min(bytes.len() - offset);
                stream.write(&bytes[offset..offset + n])?;
                offset += n;
            }
        }
    }

    /// Release the stream handle and complete the body with no trailers.
    /// Idempotent.
    ///
    /// # Errors
    ///
    /// The host rejected completing the body.
    pub fn close(&mut self) -> io::Result<()> {
        drop(self.stream.take());
        match self.body.take() {
            Some(body) => body.finish(),
            None => Ok(()),
        }
    }
}

impl<B: OutgoingBody> Drop for BodyWriter<B> {
    fn drop(&mut self) {
        if self.body.is_some()
            && let Err(e) = self.close()
        {
            log::warn!("request body finish failed during drop: {e}");
        }
    }
}
