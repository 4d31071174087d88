//! Transport seam for the upload engine.

use std::future::Future;
use std::pin::Pin;

use uplink_protocol::{HttpRequest, HttpResponse, NetError};

/// Issues HTTP exchanges on behalf of the upload engine.
///
/// Implemented over a real client in `uplink-http`; tests use in-process
/// fakes. A returned `Ok` carries any status code, including 4xx/5xx;
/// `Err` is reserved for exchanges that never produced a response.
/// Dropping the returned future cancels the exchange.
pub trait HttpTransport: Send + Sync {
    fn send(
        &self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, NetError>> + Send + '_>>;
}
