//! WASI 0.2 implementations of the host traits.

use std::io;

use ::wasi::http::{outgoing_handler, types as wasi_http};
use ::wasi::io::streams::{InputStream, OutputStream};

use crate::{
    client::Options,
    error::Error,
    host::{
        HttpHost, IncomingBody, IncomingResponse, OutgoingBody, ReadStream, RequestHead,
        ResponseFuture, StreamError, WriteStream,
    },
};

fn map_stream_error(e: ::wasi::io::streams::StreamError) -> StreamError {
    match e {
        ::wasi::io::streams::StreamError::Closed => StreamError::Closed,
        ::wasi::io::streams::StreamError::LastOperationFailed(e) => {
            StreamError::Failed(io::Error::other(e.to_debug_string()))
        }
    }
}

impl ReadStream for InputStream {
    type Pollable = ::wasi::io::poll::Pollable;

    fn read(&self, max: u64) -> Result<Vec<u8>, StreamError> {
        InputStream::read(self, max).map_err(map_stream_error)
    }

    fn subscribe(&self) -> Self::Pollable {
        InputStream::subscribe(self)
    }
}

impl WriteStream for OutputStream {
    type Pollable = ::wasi::io::poll::Pollable;

    fn check_write(&self) -> Result<u64, StreamError> {
        OutputStream::check_write(self).map_err(map_stream_error)
    }

    fn write(&self, bytes: &[u8]) -> Result<(), StreamError> {
        OutputStream::write(self, bytes).map_err(map_stream_error)
    }

    fn flush(&self) -> Result<(), StreamError> {
        OutputStream::flush(self).map_err(map_stream_error)
    }

    fn subscribe(&self) -> Self::Pollable {
        OutputStream::subscribe(self)
    }
}

impl IncomingBody for wasi_http::IncomingBody {
    type Stream = InputStream;

    fn stream(&self) -> Result<InputStream, ()> {
        wasi_http::IncomingBody::stream(self)
    }

    fn finish(self) {
        // The trailers future is not consumed; dropping it releases it.
        drop(wasi_http::IncomingBody::finish(self));
    }
}

impl OutgoingBody for wasi_http::OutgoingBody {
    type Stream = OutputStream;

    fn stream(&self) -> Result<OutputStream, ()> {
        self.write()
    }

    fn finish(self) -> io::Result<()> {
        wasi_http::OutgoingBody::finish(self, None).map_err(|e| io::Error::other(format!("{e:?}")))
    }
}

impl ResponseFuture for wasi_http::FutureIncomingResponse {
    type Pollable = ::wasi::io::poll::Pollable;
    type Response = wasi_http::IncomingResponse;
    type ErrorCode = wasi_http::ErrorCode;

    fn get(&self) -> Option<Result<Result<wasi_http::IncomingResponse, wasi_http::ErrorCode>, ()>> {
        wasi_http::FutureIncomingResponse::get(self)
    }

    fn subscribe(&self) -> Self::Pollable {
        wasi_http::FutureIncomingResponse::subscribe(self)
    }
}

impl IncomingResponse for wasi_http::IncomingResponse {
    type Body = wasi_http::IncomingBody;

    fn status(&self) -> u16 {
        wasi_http::IncomingResponse::status(self)
    }

    fn headers(&self) -> Vec<(String, Vec<u8>)> {
        wasi_http::IncomingResponse::headers(self).entries()
    }

    fn consume(&self) -> Result<wasi_http::IncomingBody, ()> {
        wasi_http::IncomingResponse::consume(self)
    }
}

/// The outbound HTTP capability of a WASI 0.2 host.
pub struct WasiHost;

impl HttpHost for WasiHost {
    type Pollable = ::wasi::io::poll::Pollable;
    type RequestStream = OutputStream;
    type RequestBody = wasi_http::OutgoingBody;
    type ResponseStream = InputStream;
    type ResponseBody = wasi_http::IncomingBody;
    type Response = wasi_http::IncomingResponse;
    type Future = wasi_http::FutureIncomingResponse;

    fn start(
        &self,
        head: RequestHead,
        options: &Options,
    ) -> Result<(Self::Future, Self::RequestBody), Error> {
        let headers = wasi_http::Fields::new();
        for (name, value) in &head.headers {
            headers
                .append(name, value)
                .map_err(|_| Error::InvalidRequest("header rejected by host"))?;
        }

        let request = wasi_http::OutgoingRequest::new(headers);
        request
            .set_method(&method(&head.method))
            .map_err(|()| Error::InvalidRequest("invalid method"))?;
        request
            .set_scheme(Some(&scheme(&head.scheme)))
            .map_err(|()| Error::InvalidRequest("invalid scheme"))?;
        request
            .set_authority(Some(&head.authority))
            .map_err(|()| Error::InvalidRequest("invalid authority"))?;
        request
            .set_path_with_query(Some(&head.path_with_query))
            .map_err(|()| Error::InvalidRequest("invalid path"))?;

        // The body must be taken before `handle` consumes the request.
        let body = request
            .body()
            .map_err(|()| Error::InvalidRequest("request body already taken"))?;

        let request_options = match options.first_byte_timeout {
            Some(timeout) => {
                let opts = wasi_http::RequestOptions::new();
                let nanos = u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX);
                opts.set_first_byte_timeout(Some(nanos))
                    .map_err(|()| Error::InvalidRequest("timeout not supported"))?;
                Some(opts)
            }
            None => None,
        };

        let future = outgoing_handler::handle(request, request_options)
            .map_err(|e| Error::Transport(format!("{e:?}")))?;
        Ok((future, body))
    }
}

fn method(method: &http::Method) -> wasi_http::Method {
    match method.as_str() {
        "GET" => wasi_http::Method::Get,
        "HEAD" => wasi_http::Method::Head,
        "POST" => wasi_http::Method::Post,
        "PUT" => wasi_http::Method::Put,
        "DELETE" => wasi_http::Method::Delete,
        "CONNECT" => wasi_http::Method::Connect,
        "OPTIONS" => wasi_http::Method::Options,
        "TRACE" => wasi_http::Method::Trace,
        "PATCH" => wasi_http::Method::Patch,
        other => wasi_http::Method::Other(other.to_owned()),
    }
}

fn scheme(scheme: &str) -> wasi_http::Scheme {
    match scheme {
        "http" => wasi_http::Scheme::Http,
        "https" => wasi_http::Scheme::Https,
        other => wasi_http::Scheme::Other(other.to_owned()),
    }
}
