use std::error::Error as StdError;
use std::io;

use uplink_protocol::NetError;

/// Errors from building an HTTP client.
#[derive(Debug, thiserror::Error)]
pub enum HttpClientError {
    #[error("HTTP client error: {0}")]
    Build(#[from] reqwest::Error),
}

/// Maps a reqwest failure onto the closest network error code.
pub fn map_reqwest_error(err: &reqwest::Error) -> NetError {
    if err.is_timeout() {
        return NetError::TimedOut;
    }
    if err.is_redirect() {
        return NetError::TooManyRedirects;
    }
    if let Some(error) = map_transport_failure(io_error_kind(err), err.is_connect()) {
        return error;
    }
    if err.is_decode() || err.is_body() {
        return NetError::InvalidResponse;
    }
    if err.is_builder() {
        return NetError::InvalidUrl;
    }
    NetError::Failed
}

/// First `io::ErrorKind` found in the source chain.
fn io_error_kind(err: &(dyn StdError + 'static)) -> Option<io::ErrorKind> {
    let mut source = Some(err);
    while let Some(e) = source {
        if let Some(io) = e.downcast_ref::<io::Error>() {
            return Some(io.kind());
        }
        source = e.source();
    }
    None
}

/// Classifies a failure by its io cause, if it has one.
///
/// Resolver failures carry no typed cause, so they land in
/// `ConnectionFailed` together with every other unexplained connect error.
/// Both are transient, which is all the retry logic needs.
fn map_transport_failure(kind: Option<io::ErrorKind>, during_connect: bool) -> Option<NetError> {
    match kind {
        Some(kind) => Some(map_io_kind(kind, during_connect)),
        None if during_connect => Some(NetError::ConnectionFailed),
        None => None,
    }
}

pub(crate) fn map_io_kind(kind: io::ErrorKind, during_connect: bool) -> NetError {
    match kind {
        io::ErrorKind::ConnectionRefused => NetError::ConnectionRefused,
        io::ErrorKind::ConnectionReset => NetError::ConnectionReset,
        io::ErrorKind::ConnectionAborted => NetError::ConnectionAborted,
        io::ErrorKind::NotConnected | io::ErrorKind::BrokenPipe => NetError::ConnectionClosed,
        io::ErrorKind::AddrNotAvailable => NetError::AddressUnreachable,
        io::ErrorKind::TimedOut if during_connect => NetError::ConnectionTimedOut,
        io::ErrorKind::TimedOut => NetError::TimedOut,
        io::ErrorKind::UnexpectedEof => NetError::EmptyResponse,
        _ if during_connect => NetError::ConnectionFailed,
        _ => NetError::Failed,
    }
}
