//! Wire types shared by the resumable upload engine and the keepalive loader.
//!
//! Nothing in here performs I/O. The types describe requests, responses and
//! network outcomes as they cross the boundary between the engines and
//! whatever HTTP stack drives them.

pub mod constants;
pub mod net_error;
pub mod request;
pub mod response;

pub use net_error::NetError;
pub use request::{
    BodySource, HttpRequest, RequestBody, RequestPriority, ResourceRequest, RetryOptions,
};
pub use response::{CompletionStatus, HttpResponse, RedirectInfo, ResponseHead};

/// Errors produced while building wire types.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),
}
