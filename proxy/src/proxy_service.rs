use crate::errors::ProxyError;
use crate::forwarder::{BoxError, Forwarder};
use crate::metrics_defs::{REQUEST_DURATION, REQUESTS_INFLIGHT};
use crate::plan::{BANNER, Gateway, Plan};
use bytes::Bytes;
use http::HeaderMap;
use http::header::{HeaderName, REFERER, USER_AGENT};
use http_body_util::BodyExt;
use http_body_util::combinators::BoxBody;
use hyper::body::{Body, Incoming};
use hyper::service::Service as HyperService;
use hyper::{Request, Response, StatusCode};
use shared::http::{make_boxed_error_response, make_text_response};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

pub type ProxyBody = BoxBody<Bytes, ProxyError>;

/// Decrements the in-flight gauge even when the caller goes away mid-request.
struct InflightGuard(metrics::Gauge);

impl InflightGuard {
    fn new() -> Self {
        let gauge = shared::gauge!(REQUESTS_INFLIGHT);
        gauge.increment(1.0);
        InflightGuard(gauge)
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.0.decrement(1.0);
    }
}

#[derive(Clone)]
pub struct ProxyService {
    gateway: Arc<Gateway>,
    forwarder: Arc<Forwarder>,
}

impl ProxyService {
    pub fn new(gateway: Gateway, forwarder: Forwarder) -> Self {
        Self {
            gateway: Arc::new(gateway),
            forwarder: Arc::new(forwarder),
        }
    }

    /// Handles a single request end to end. Never fails: routing and upstream errors
    /// become plain-text error responses.
    pub async fn handle<B>(&self, req: Request<B>) -> Response<ProxyBody>
    where
        B: Body<Data = Bytes> + Send + Sync + 'static,
        B::Error: Into<BoxError>,
    {
        let start = Instant::now();
        let _inflight = InflightGuard::new();

        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let user_agent = header_str(req.headers(), &USER_AGENT);
        let referer = header_str(req.headers(), &REFERER);

        let (upstream, response) = match self.gateway.plan(req) {
            Plan::Banner => ("none", make_text_response(StatusCode::OK, BANNER)),
            Plan::NotFound => ("none", make_boxed_error_response(StatusCode::NOT_FOUND)),
            Plan::BadRequest(e) => {
                tracing::warn!(%method, error = %e, "Rejected request");
                ("none", make_boxed_error_response(e.status_code()))
            }
            Plan::Forward(fwd) => {
                let upstream = fwd.upstream().as_str();
                let response = match self.forwarder.forward(fwd).await {
                    Ok(response) => response.map(|body| body.map_err(ProxyError::from).boxed()),
                    Err(e) => {
                        tracing::warn!(error = %e, upstream, "Upstream request failed");
                        make_boxed_error_response(e.status_code())
                    }
                };
                (upstream, response)
            }
        };

        let status = response.status();
        let elapsed = start.elapsed();

        tracing::info!(
            %method,
            %path,
            status = status.as_u16(),
            upstream,
            user_agent = %user_agent,
            referer = %referer,
            duration_ms = elapsed.as_millis() as u64,
            "request"
        );
        shared::histogram!(
            REQUEST_DURATION,
            "status" => status.as_str().to_string(),
            "upstream" => upstream,
        )
        .record(elapsed.as_secs_f64());

        response
    }
}

fn header_str(headers: &HeaderMap, name: &HeaderName) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string()
}

impl HyperService<Request<Incoming>> for ProxyService {
    type Response = Response<ProxyBody>;
    type Error = ProxyError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let service = self.clone();
        Box::pin(async move { Ok(service.handle(req).await) })
    }
}
