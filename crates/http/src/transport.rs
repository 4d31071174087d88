//! [`HttpTransport`] over `reqwest`.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream;
use http::header::{CONTENT_LENGTH, HeaderValue};
use tracing::{debug, warn};
use uplink_protocol::{BodySource, HttpRequest, HttpResponse, NetError, RequestBody};
use uplink_upload::HttpTransport;

use crate::error::{HttpClientError, map_reqwest_error};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Upload transport backed by a shared `reqwest::Client`.
#[derive(Clone)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, HttpClientError> {
        let http = reqwest::Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()?;
        Ok(Self { http })
    }

    /// Uses an existing client, e.g. one shared with other components.
    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }

    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, NetError> {
        let HttpRequest {
            method,
            url,
            mut headers,
            body,
        } = request;

        if !matches!(body, RequestBody::Empty) && !headers.contains_key(CONTENT_LENGTH) {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
        }
        debug!(%method, %url, body_len = body.len(), "sending upload request");

        let mut builder = self.http.request(method, url).headers(headers);
        builder = match body {
            RequestBody::Empty => builder,
            RequestBody::Bytes(bytes) => builder.body(bytes),
            RequestBody::Stream(source) => {
                builder.body(reqwest::Body::wrap_stream(body_stream(source)))
            }
        };

        let resp = builder.send().await.map_err(|e| {
            let mapped = map_reqwest_error(&e);
            warn!(error = %e, net_error = %mapped, "upload request failed");
            mapped
        })?;

        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.bytes().await.map_err(|e| map_reqwest_error(&e))?;
        debug!(status = status.as_u16(), "upload response received");

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

impl HttpTransport for ReqwestTransport {
    fn send(
        &self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, NetError>> + Send + '_>> {
        Box::pin(self.execute(request))
    }
}

/// Adapts a pull-based body source to the stream reqwest consumes. A read
/// error ends the stream after being reported once.
fn body_stream(
    source: Box<dyn BodySource>,
) -> impl futures_util::Stream<Item = std::io::Result<Bytes>> + Send + 'static {
    stream::unfold(Some(source), |state| async move {
        let mut source = state?;
        match source.next_chunk().await {
            Ok(Some(chunk)) => Some((Ok(chunk), Some(source))),
            Ok(None) => None,
            Err(e) => Some((Err(e), None)),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Method, StatusCode};
    use uplink_protocol::constants::{
        UPLOAD_STATUS_HEADER, UPLOAD_URL_HEADER,
    };
    use uplink_transfer::ContentStream;
    use url::Url;

    use crate::test_server::{refused_url, response, scripted_server};

    #[tokio::test]
    async fn posts_bytes_and_returns_headers() {
        let (base, server) = scripted_server(vec![response(
            "200 OK",
            &[
                (UPLOAD_STATUS_HEADER, "active"),
                (UPLOAD_URL_HEADER, "https://upload.example/session/1"),
            ],
            "",
        )])
        .await;

        let mut request = HttpRequest::new(Method::POST, Url::parse(&format!("{base}/upload")).unwrap());
        request.set_header("X-Upload-Command", "start").unwrap();
        request.body = RequestBody::Bytes(Bytes::from_static(b"meta"));

        let transport = ReqwestTransport::new().unwrap();
        let resp = transport.send(request).await.unwrap();
        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(resp.header(UPLOAD_STATUS_HEADER), Some("active"));
        assert_eq!(
            resp.header(UPLOAD_URL_HEADER),
            Some("https://upload.example/session/1")
        );

        let captured = server.await.unwrap();
        assert_eq!(captured[0].request_line(), "post /upload http/1.1");
        assert_eq!(captured[0].header("x-upload-command"), Some("start"));
        assert_eq!(captured[0].body, b"meta");
    }

    #[tokio::test]
    async fn streams_body_with_known_length() {
        let (base, server) = scripted_server(vec![response("200 OK", &[], "")]).await;

        let data = Bytes::from(vec![7u8; 10_000]);
        let mut request = HttpRequest::new(Method::PUT, Url::parse(&format!("{base}/s")).unwrap());
        request.body = RequestBody::Stream(Box::new(ContentStream::from_bytes(data.clone(), 1024)));

        let transport = ReqwestTransport::new().unwrap();
        let resp = transport.send(request).await.unwrap();
        assert!(resp.status.is_success());

        let captured = server.await.unwrap();
        assert_eq!(captured[0].header("content-length"), Some("10000"));
        assert_eq!(captured[0].body, data.to_vec());
    }

    #[tokio::test]
    async fn error_status_is_a_response() {
        let (base, server) =
            scripted_server(vec![response("403 Forbidden", &[], "denied")]).await;

        let request = HttpRequest::new(Method::GET, Url::parse(&base).unwrap());
        let transport = ReqwestTransport::new().unwrap();
        let resp = transport.send(request).await.unwrap();
        assert_eq!(resp.status, StatusCode::FORBIDDEN);
        assert_eq!(resp.body, Bytes::from_static(b"denied"));
        server.abort();
    }

    #[tokio::test]
    async fn refused_connection_maps_to_net_error() {
        let url = refused_url().await;
        let request = HttpRequest::new(Method::GET, Url::parse(&url).unwrap());
        let transport = ReqwestTransport::new().unwrap();
        let err = transport.send(request).await.unwrap_err();
        assert_eq!(err, NetError::ConnectionRefused);
    }
}
