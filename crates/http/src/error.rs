#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The host rejected part of the request head.
    #[error("invalid request: {0}")]
    InvalidRequest(&'static str),

    /// The host reported a transport-level failure for the exchange.
    #[error("transport error: {0}")]
    Transport(String),

    /// A body stream operation failed.
    #[error("body I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The host returned a header the response cannot represent.
    #[error("invalid response header {0:?}")]
    InvalidHeader(String),

    /// The host returned an out-of-range status code.
    #[error("invalid response status {0}")]
    InvalidStatus(u16),
}
