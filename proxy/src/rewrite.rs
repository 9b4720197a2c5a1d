use crate::errors::ProxyError;
use crate::upstreams::Upstream;
use http::Uri;

/// Removes `prefix` from the start of `path`. An empty remainder becomes `/`.
///
/// Callers only pass prefixes that matched, so a non-matching prefix leaves the path as is.
pub fn strip_prefix(prefix: &str, path: &str) -> String {
    match path.strip_prefix(prefix) {
        Some("") => "/".to_string(),
        Some(rest) => rest.to_string(),
        None => path.to_string(),
    }
}

/// Absolute URI on `upstream` for the rewritten path, with the original query reattached verbatim.
pub fn upstream_uri(upstream: &Upstream, path: &str, query: Option<&str>) -> Result<Uri, ProxyError> {
    let path_and_query = match query {
        Some(q) => format!("{path}?{q}"),
        None => path.to_string(),
    };

    let uri = Uri::builder()
        .scheme(upstream.scheme.clone())
        .authority(upstream.authority.clone())
        .path_and_query(path_and_query)
        .build()?;

    Ok(uri)
}
