//! Request planning
//!
//! Turns an inbound request into a [`Plan`] without doing any I/O. Both hosting shapes
//! (the long-running listener and a one-shot handler) call [`Gateway::plan`] and only
//! differ in how they execute the result.
//!
//! ```text
//! Request ──► match_route ──► strip_prefix ──► resolve_upstream ──► transform_request_headers
//!                 │                                                          │
//!          Root / NotFound                                          Plan::Forward(ForwardRequest)
//! ```

use crate::errors::ProxyError;
use crate::headers::{InboundContext, transform_request_headers};
use crate::rewrite::{strip_prefix, upstream_uri};
use crate::routes::{RouteMatch, match_route};
use crate::upstreams::{UpstreamKind, Upstreams, resolve_upstream};
use http::header::HOST;
use http::{HeaderMap, HeaderValue, Method, Request};

/// What the gateway will do with a request.
#[derive(Debug)]
pub enum Plan<B> {
    /// Informational text for `/`; no upstream is contacted.
    Banner,
    NotFound,
    /// The request target could not be routed at all (e.g. `*` or authority-form).
    BadRequest(ProxyError),
    Forward(ForwardRequest<B>),
}

/// Fully resolved outbound request. Built once per inbound request and consumed by the forwarder.
#[derive(Debug)]
pub struct ForwardRequest<B> {
    method: Method,
    upstream: UpstreamKind,
    uri: http::Uri,
    path: String,
    query: Option<String>,
    headers: HeaderMap,
    body: Option<B>,
}

impl<B> ForwardRequest<B> {
    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn upstream(&self) -> UpstreamKind {
        self.upstream
    }

    /// Absolute URI on the upstream origin.
    pub fn uri(&self) -> &http::Uri {
        &self.uri
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    /// Builds the outbound request, substituting `empty` when there is no body to send.
    pub fn into_request<T>(
        self,
        with_body: impl FnOnce(B) -> T,
        empty: impl FnOnce() -> T,
    ) -> Result<Request<T>, ProxyError> {
        let body = match self.body {
            Some(body) => with_body(body),
            None => empty(),
        };

        let mut request = Request::builder()
            .method(self.method)
            .uri(self.uri)
            .body(body)?;
        *request.headers_mut() = self.headers;

        Ok(request)
    }
}

fn carries_body(method: &Method) -> bool {
    !matches!(*method, Method::GET | Method::HEAD)
}

pub const BANNER: &str = "\
Multi-proxy is running.

Paths:
  /gh/*           -> github.com
  /tmdb/*         -> api.themoviedb.org
  /docker/*       -> docker hub (token + registry)
  /docker-auth/*  -> auth.docker.io
  /docker-reg/*   -> registry-1.docker.io
";

/// The routing core: static route table plus the resolved upstream origins.
#[derive(Clone, Debug)]
pub struct Gateway {
    upstreams: Upstreams,
}

impl Gateway {
    pub fn new(upstreams: Upstreams) -> Self {
        Self { upstreams }
    }

    pub fn plan<B>(&self, req: Request<B>) -> Plan<B> {
        let (parts, body) = req.into_parts();

        let path = parts.uri.path();
        // Only origin-form and absolute-form targets carry a routable path.
        if !path.starts_with('/') {
            return Plan::BadRequest(ProxyError::MalformedRequest(format!(
                "unsupported request target: {}",
                parts.uri
            )));
        }

        let route = match match_route(path) {
            RouteMatch::Proxy(route) => route,
            RouteMatch::Root => return Plan::Banner,
            RouteMatch::NotFound => return Plan::NotFound,
        };

        let rewritten_path = strip_prefix(route.prefix, path);
        let kind = resolve_upstream(route.kind, &rewritten_path);
        let upstream = self.upstreams.get(kind);
        let query = parts.uri.query().map(str::to_string);

        let uri = match upstream_uri(upstream, &rewritten_path, query.as_deref()) {
            Ok(uri) => uri,
            Err(e) => {
                return Plan::BadRequest(ProxyError::MalformedRequest(e.to_string()));
            }
        };

        let ctx = InboundContext {
            scheme: parts.uri.scheme_str().unwrap_or("http").to_string(),
            host: inbound_host(&parts.uri, &parts.headers),
            version: parts.version,
        };

        let has_body = carries_body(&parts.method);
        let mut headers = parts.headers;
        transform_request_headers(&mut headers, &ctx, kind, upstream, has_body);

        tracing::debug!(
            prefix = route.prefix,
            upstream = kind.as_str(),
            uri = %uri,
            "Planned forward"
        );

        Plan::Forward(ForwardRequest {
            method: parts.method,
            upstream: kind,
            uri,
            path: rewritten_path,
            query,
            headers,
            body: has_body.then_some(body),
        })
    }
}

/// The host the caller addressed: the `Host` header, or the URI authority for HTTP/2.
fn inbound_host(uri: &http::Uri, headers: &HeaderMap) -> Option<HeaderValue> {
    headers.get(HOST).cloned().or_else(|| {
        uri.authority()
            .and_then(|a| HeaderValue::from_str(a.as_str()).ok())
    })
}
