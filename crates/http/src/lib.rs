//! Real network backends for uplink.
//!
//! [`ReqwestTransport`] carries resumable-upload exchanges and
//! [`ReqwestLoaderFactory`] runs keepalive attempts, both over `reqwest`
//! with rustls.

pub mod error;
pub mod loader;
pub mod transport;

#[cfg(test)]
mod test_server;

pub use error::{HttpClientError, map_reqwest_error};
pub use loader::ReqwestLoaderFactory;
pub use transport::ReqwestTransport;
