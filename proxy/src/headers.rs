// Outbound header rules. Hop-by-hop filtering applies to both legs; the forwarding
// headers and the per-upstream overrides apply to the request leg only.

use crate::upstreams::{Upstream, UpstreamKind};
use http::Version;
use http::header::{
    CONNECTION, CONTENT_LENGTH, HOST, HeaderMap, HeaderName, HeaderValue, ORIGIN,
    PROXY_AUTHENTICATE, PROXY_AUTHORIZATION, REFERER, TE, TRAILER, TRANSFER_ENCODING, UPGRADE,
};

static HOP_BY_HOP_NAMES: &[HeaderName] = &[
    CONNECTION,
    TRANSFER_ENCODING,
    TE,
    TRAILER,
    UPGRADE,
    PROXY_AUTHORIZATION,
    PROXY_AUTHENTICATE,
];

pub static X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
pub static X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");

pub fn is_http1(v: Version) -> bool {
    matches!(v, Version::HTTP_09 | Version::HTTP_10 | Version::HTTP_11)
}

// For HTTP/1.x connections, hop-by-hop headers are removed before forwarding:
// - standard hop-by-hop headers
// - any extra headers listed in the Connection header value
// - keep-alive header for HTTP/0.9 and HTTP/1.0 only
//
// HTTP/2 and HTTP/3 don't use hop-by-hop headers, so no filtering is performed.
pub fn filter_hop_by_hop(headers: &mut HeaderMap, version: Version) -> &mut HeaderMap {
    if !is_http1(version) {
        return headers;
    }

    let mut extra_drops = Vec::new();
    for connection in headers.get_all(CONNECTION) {
        let Ok(s) = connection.to_str() else {
            continue;
        };
        for token in s.split(',').map(|t| t.trim()).filter(|t| !t.is_empty()) {
            if let Ok(name) = HeaderName::from_bytes(token.as_bytes()) {
                extra_drops.push(name);
            }
        }
    }

    for name in HOP_BY_HOP_NAMES {
        headers.remove(name);
    }

    for name in extra_drops {
        headers.remove(&name);
    }

    if matches!(version, Version::HTTP_09 | Version::HTTP_10) {
        headers.remove(HeaderName::from_static("keep-alive"));
    }

    headers
}

/// What the gateway knew about the inbound request when it arrived.
#[derive(Clone, Debug)]
pub struct InboundContext {
    /// `http` unless the request arrived in absolute-form with another scheme.
    pub scheme: String,
    /// The `Host` the caller addressed, if any.
    pub host: Option<HeaderValue>,
    pub version: Version,
}

/// Derives the outbound header set for a request to `upstream`.
///
/// Inbound headers are kept (multi-valued ones in order), `Host` is pointed at the upstream
/// and `X-Forwarded-Proto`/`X-Forwarded-Host` describe the original request. The metadata
/// API rejects browser-style requests whose origin does not match it, so for that upstream
/// `X-Forwarded-Host` is pinned to the API host and `Referer`/`Origin` are dropped.
pub fn transform_request_headers(
    headers: &mut HeaderMap,
    ctx: &InboundContext,
    kind: UpstreamKind,
    upstream: &Upstream,
    has_body: bool,
) {
    filter_hop_by_hop(headers, ctx.version);

    if !has_body {
        headers.remove(CONTENT_LENGTH);
    }

    let upstream_host = HeaderValue::from_str(upstream.authority.as_str()).ok();
    if let Some(host) = &upstream_host {
        headers.insert(HOST, host.clone());
    }

    let forwarded_host = if kind == UpstreamKind::MetadataApi {
        headers.remove(REFERER);
        headers.remove(ORIGIN);
        upstream_host
    } else {
        ctx.host.clone()
    };

    // A caller-supplied value never survives.
    match forwarded_host {
        Some(host) => {
            headers.insert(X_FORWARDED_HOST.clone(), host);
        }
        None => {
            headers.remove(&X_FORWARDED_HOST);
        }
    }

    if let Ok(proto) = HeaderValue::from_str(&ctx.scheme) {
        headers.insert(X_FORWARDED_PROTO.clone(), proto);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
    use http::uri::{Authority, Scheme};

    fn upstream(authority: &'static str) -> Upstream {
        Upstream {
            scheme: Scheme::HTTPS,
            authority: Authority::from_static(authority),
        }
    }

    fn inbound_ctx() -> InboundContext {
        InboundContext {
            scheme: "http".into(),
            host: Some(HeaderValue::from_static("proxy.example.com:8000")),
            version: Version::HTTP_11,
        }
    }

    fn browser_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(HOST, HeaderValue::from_static("proxy.example.com:8000"));
        headers.insert(REFERER, HeaderValue::from_static("https://app.example.com/"));
        headers.insert(ORIGIN, HeaderValue::from_static("https://app.example.com"));
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        headers
    }

    #[test]
    fn test_filter_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive, custom"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("cusTOM", HeaderValue::from_static("some-value"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));

        let filtered = filter_hop_by_hop(&mut headers, Version::HTTP_11);

        assert_eq!(filtered.len(), 1);
        assert_eq!(
            filtered.get(CONTENT_TYPE),
            Some(&HeaderValue::from_static("application/json"))
        );
        assert!(filtered.get(CONNECTION).is_none());
        // listed in the Connection header value
        assert!(filtered.get("keep-alive").is_none());
        // Case-insensitive match with "cusTOM"
        assert!(filtered.get("custom").is_none());
    }

    #[test]
    fn test_http2_headers_untouched() {
        let mut headers = HeaderMap::new();
        headers.insert(TE, HeaderValue::from_static("trailers"));
        filter_hop_by_hop(&mut headers, Version::HTTP_2);
        assert!(headers.contains_key(TE));
    }

    #[test]
    fn test_default_forwarding_headers() {
        let mut headers = browser_headers();
        headers.append(ACCEPT, HeaderValue::from_static("text/html"));
        headers.append(ACCEPT, HeaderValue::from_static("application/json"));

        transform_request_headers(
            &mut headers,
            &inbound_ctx(),
            UpstreamKind::CodeHost,
            &upstream("github.com"),
            false,
        );

        assert_eq!(headers.get(HOST).unwrap(), "github.com");
        assert_eq!(headers.get(&X_FORWARDED_PROTO).unwrap(), "http");
        assert_eq!(
            headers.get(&X_FORWARDED_HOST).unwrap(),
            "proxy.example.com:8000"
        );
        // browser headers are left alone for other upstreams
        assert!(headers.contains_key(REFERER));
        assert!(headers.contains_key(ORIGIN));
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer abc");

        let accept: Vec<_> = headers.get_all(ACCEPT).iter().collect();
        assert_eq!(accept, ["text/html", "application/json"]);
    }

    #[test]
    fn test_metadata_api_overrides() {
        let mut headers = browser_headers();
        headers.insert("x-forwarded-host", HeaderValue::from_static("spoofed"));

        transform_request_headers(
            &mut headers,
            &inbound_ctx(),
            UpstreamKind::MetadataApi,
            &upstream("api.themoviedb.org"),
            false,
        );

        assert_eq!(headers.get(HOST).unwrap(), "api.themoviedb.org");
        let forwarded_host: Vec<_> = headers.get_all(&X_FORWARDED_HOST).iter().collect();
        assert_eq!(forwarded_host, ["api.themoviedb.org"]);
        assert!(headers.get(REFERER).is_none());
        assert!(headers.get(ORIGIN).is_none());
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer abc");
    }

    #[test]
    fn test_metadata_api_without_browser_headers() {
        let mut headers = HeaderMap::new();
        transform_request_headers(
            &mut headers,
            &inbound_ctx(),
            UpstreamKind::MetadataApi,
            &upstream("api.themoviedb.org"),
            false,
        );
        assert!(headers.get(REFERER).is_none());
        assert!(headers.get(ORIGIN).is_none());
        assert_eq!(headers.get(&X_FORWARDED_HOST).unwrap(), "api.themoviedb.org");
    }

    #[test]
    fn test_content_length_follows_body() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("3"));
        let mut with_body = headers.clone();

        transform_request_headers(
            &mut headers,
            &inbound_ctx(),
            UpstreamKind::RegistryBlob,
            &upstream("registry-1.docker.io"),
            false,
        );
        assert!(headers.get(CONTENT_LENGTH).is_none());

        transform_request_headers(
            &mut with_body,
            &inbound_ctx(),
            UpstreamKind::RegistryBlob,
            &upstream("registry-1.docker.io"),
            true,
        );
        assert_eq!(with_body.get(CONTENT_LENGTH).unwrap(), "3");
    }

    #[test]
    fn test_missing_inbound_host() {
        let mut headers = HeaderMap::new();
        let ctx = InboundContext {
            host: None,
            ..inbound_ctx()
        };
        transform_request_headers(
            &mut headers,
            &ctx,
            UpstreamKind::RegistryAuth,
            &upstream("auth.docker.io"),
            false,
        );
        assert_eq!(headers.get(HOST).unwrap(), "auth.docker.io");
        assert!(headers.get(&X_FORWARDED_HOST).is_none());
    }

    #[test]
    fn test_caller_forwarded_host_dropped_without_inbound_host() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-host", HeaderValue::from_static("evil.example"));
        let ctx = InboundContext {
            host: None,
            ..inbound_ctx()
        };
        transform_request_headers(
            &mut headers,
            &ctx,
            UpstreamKind::CodeHost,
            &upstream("github.com"),
            false,
        );
        assert!(headers.get(&X_FORWARDED_HOST).is_none());

        // with an inbound host the caller's value is replaced, not appended to
        let mut headers = HeaderMap::new();
        headers.append("x-forwarded-host", HeaderValue::from_static("evil.example"));
        headers.append("x-forwarded-host", HeaderValue::from_static("other.example"));
        transform_request_headers(
            &mut headers,
            &inbound_ctx(),
            UpstreamKind::CodeHost,
            &upstream("github.com"),
            false,
        );
        let forwarded_host: Vec<_> = headers.get_all(&X_FORWARDED_HOST).iter().collect();
        assert_eq!(forwarded_host, ["proxy.example.com:8000"]);
    }
}
