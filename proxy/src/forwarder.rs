use crate::errors::ProxyError;
use crate::headers::filter_hop_by_hop;
use crate::plan::ForwardRequest;
use crate::upstreams::UpstreamKind;
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty};
use hyper::body::{Body, Incoming};
use hyper::{Request, Response};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use std::time::Duration;
use tokio::time::timeout;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Body type of every outbound request: the streamed inbound body, or nothing.
pub type ClientBody = BoxBody<Bytes, BoxError>;

/// Sends planned requests to their upstream and hands back the streaming response.
///
/// The client never follows redirects: a 3xx from the upstream, `Location` included,
/// is returned to the caller as is.
pub struct Forwarder {
    client: Client<HttpsConnector<HttpConnector>, ClientBody>,
    timeout: Duration,
}

impl Forwarder {
    pub fn new(timeout: Duration) -> Self {
        // Fails only when a provider is already installed, which is fine.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let mut http_connector = HttpConnector::new();
        http_connector.set_nodelay(true);
        http_connector.enforce_http(false);

        let https_connector = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .wrap_connector(http_connector);

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .build(https_connector);

        Self { client, timeout }
    }

    /// Issues `request` against its upstream.
    ///
    /// The timeout covers connecting, sending the request and receiving the response
    /// head. The response body is streamed afterwards and is not bounded by it.
    pub async fn forward<B>(
        &self,
        request: ForwardRequest<B>,
    ) -> Result<Response<Incoming>, ProxyError>
    where
        B: Body<Data = Bytes> + Send + Sync + 'static,
        B::Error: Into<BoxError>,
    {
        let upstream = request.upstream();
        let upstream_identifier = request
            .uri()
            .host()
            .unwrap_or(upstream.as_str())
            .to_string();

        let upstream_request: Request<ClientBody> = request.into_request(
            |body| body.map_err(Into::into).boxed(),
            || Empty::new().map_err(|never| match never {}).boxed(),
        )?;

        let response = timeout(self.timeout, self.client.request(upstream_request))
            .await
            .map_err(|_| {
                record_upstream_error(upstream, "timeout");
                ProxyError::UpstreamTimeout(upstream_identifier.clone())
            })?
            .map_err(|e| {
                record_upstream_error(upstream, "request");
                ProxyError::UpstreamUnreachable(upstream_identifier.clone(), error_chain(&e))
            })?;

        let (mut parts, body) = response.into_parts();
        let version = parts.version;
        filter_hop_by_hop(&mut parts.headers, version);

        Ok(Response::from_parts(parts, body))
    }
}

fn record_upstream_error(upstream: UpstreamKind, kind: &'static str) {
    shared::counter!(
        crate::metrics_defs::UPSTREAM_ERRORS,
        "upstream" => upstream.as_str(),
        "kind" => kind,
    )
    .increment(1);
}

// The legacy client wraps the interesting cause (DNS, refused, TLS) a few levels deep.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
