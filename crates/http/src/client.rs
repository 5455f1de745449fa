use std::time::Duration;

use guestio_reactor::Reactor;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};

use crate::{
    error::Error,
    host::{HttpHost, IncomingResponse, RequestHead, ResponseFuture},
    streams::{BodyReader, BodyWriter},
};

/// Per-request knobs forwarded to the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct Options {
    /// Deadline for the first byte of the response head.
    pub first_byte_timeout: Option<Duration>,
}

/// Runs request/response exchanges against one host.
pub struct Client<H: HttpHost> {
    host: H,
    reactor: Reactor<H::Pollable>,
}

impl<H: HttpHost> Client<H> {
    pub fn new(host: H, reactor: Reactor<H::Pollable>) -> Self {
        Self { host, reactor }
    }

    /// Send `request` with default [`Options`].
    ///
    /// # Errors
    ///
    /// See [`send_with`](Self::send_with).
    pub async fn send<B: AsRef<[u8]>>(
        &self,
        request: &http::Request<B>,
    ) -> Result<Response<H>, Error> {
        self.send_with(request, &Options::default()).await
    }

    /// Send `request`, streaming its body out while concurrently waiting
    /// for the response head. Returns as soon as the head arrives and the
    /// body has been fully submitted; the response body streams lazily.
    ///
    /// # Errors
    ///
    /// Request heads the host rejects, transport failures, body I/O
    /// failures, and response heads that cannot be represented.
    pub async fn send_with<B: AsRef<[u8]>>(
        &self,
        request: &http::Request<B>,
        options: &Options,
    ) -> Result<Response<H>, Error> {
        let head = build_head(request);
        let (future, body) = self.host.start(head, options)?;

        let send_body = async {
            let mut writer = BodyWriter::new(self.reactor.clone(), body);
            writer.write(request.body().as_ref()).await?;
            writer.close()?;
            Ok::<_, Error>(())
        };

        let recv_head = async {
            loop {
                if let Some(resolved) = future.get() {
                    let inner = resolved.expect("response future resolved twice");
                    return inner.map_err(|code| Error::Transport(format!("{code:?}")));
                }
                self.reactor.wait_for(future.subscribe()).await;
            }
        };

        let (incoming, ()) = futures::try_join!(recv_head, send_body)?;

        let status = StatusCode::from_u16(incoming.status())
            .map_err(|_| Error::InvalidStatus(incoming.status()))?;

        let mut headers = HeaderMap::new();
        let mut content_headers = HeaderMap::new();
        for (name, value) in incoming.headers() {
            let parsed = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| Error::InvalidHeader(name.clone()))?;
            let value =
                HeaderValue::from_bytes(&value).map_err(|_| Error::InvalidHeader(name.clone()))?;
            if is_content_header(&name) {
                content_headers.append(parsed, value);
            } else {
                headers.append(parsed, value);
            }
        }

        let body = incoming.consume().expect("response body already taken");
        Ok(Response {
            status,
            headers,
            content_headers,
            body: BodyReader::new(self.reactor.clone(), body),
        })
    }
}

/// Flatten a request into the head the host consumes, applying the
/// defaults the host requires: missing scheme becomes `http`, a missing
/// authority becomes the scheme's default port with an empty host, and a
/// missing path becomes `/`.
fn build_head<B>(request: &http::Request<B>) -> RequestHead {
    let uri = request.uri();
    let scheme = uri.scheme_str().unwrap_or("http").to_owned();
    let authority = uri.authority().map_or_else(
        || {
            if scheme == "https" {
                ":443".to_owned()
            } else {
                ":80".to_owned()
            }
        },
        |a| a.as_str().to_owned(),
    );
    let path_with_query = uri
        .path_and_query()
        .map_or_else(|| "/".to_owned(), |pq| pq.as_str().to_owned());
    let headers = request
        .headers()
        .iter()
        .map(|(name, value)| (name.as_str().to_owned(), value.as_bytes().to_vec()))
        .collect();
    RequestHead {
        method: request.method().clone(),
        scheme,
        authority,
        path_with_query,
        headers,
    }
}

/// Headers that describe the representation rather than the exchange.
fn is_content_header(name: &str) -> bool {
    name.get(..8)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("content-"))
        || name.eq_ignore_ascii_case("last-modified")
        || name.eq_ignore_ascii_case("expires")
}

/// A received response head with its lazily streamed body.
pub struct Response<H: HttpHost> {
    status: StatusCode,
    headers: HeaderMap,
    content_headers: HeaderMap,
    body: BodyReader<H::ResponseBody>,
}

impl<H: HttpHost> Response<H> {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Envelope headers (everything not describing the representation).
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Representation headers: `content-*`, `last-modified` and `expires`.
    pub fn content_headers(&self) -> &HeaderMap {
        &self.content_headers
    }

    pub fn body_mut(&mut self) -> &mut BodyReader<H::ResponseBody> {
        &mut self.body
    }

    pub fn into_body(self) -> BodyReader<H::ResponseBody> {
        self.body
    }
}
