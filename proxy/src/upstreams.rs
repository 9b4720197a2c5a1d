use crate::config::UpstreamsConfig;
use crate::errors::ProxyError;
use crate::routes::RouteKind;
use http::uri::{Authority, Scheme, Uri};
use url::Url;

/// Concrete origin a request is forwarded to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpstreamKind {
    CodeHost,
    MetadataApi,
    RegistryAuth,
    RegistryBlob,
}

impl UpstreamKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            UpstreamKind::CodeHost => "code_host",
            UpstreamKind::MetadataApi => "metadata_api",
            UpstreamKind::RegistryAuth => "registry_auth",
            UpstreamKind::RegistryBlob => "registry_blob",
        }
    }
}

/// Picks the upstream for a matched route.
///
/// Every route maps to a fixed upstream except the aggregate registry route, which
/// looks at the already-rewritten path: `/token…` goes to the auth service, anything
/// else (including `/v2…`) to the blob/manifest registry.
pub fn resolve_upstream(kind: RouteKind, rewritten_path: &str) -> UpstreamKind {
    match kind {
        RouteKind::CodeHost => UpstreamKind::CodeHost,
        RouteKind::MetadataApi => UpstreamKind::MetadataApi,
        RouteKind::RegistryAuth => UpstreamKind::RegistryAuth,
        RouteKind::RegistryBlob => UpstreamKind::RegistryBlob,
        RouteKind::RegistrySmart => {
            if rewritten_path.starts_with("/token") {
                UpstreamKind::RegistryAuth
            } else if rewritten_path.starts_with("/v2") {
                UpstreamKind::RegistryBlob
            } else {
                // Unrecognised sub-paths fall back to the registry.
                UpstreamKind::RegistryBlob
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Upstream {
    pub scheme: Scheme,
    pub authority: Authority,
}

impl Upstream {
    fn https(authority: &'static str) -> Self {
        Upstream {
            scheme: Scheme::HTTPS,
            authority: Authority::from_static(authority),
        }
    }
}

impl TryFrom<&Url> for Upstream {
    type Error = ProxyError;
    fn try_from(url: &Url) -> Result<Self, Self::Error> {
        let invalid = |reason: &str| ProxyError::InvalidUpstream(format!("{url}: {reason}"));

        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid("scheme must be http or https"));
        }
        if url.path() != "/" || url.query().is_some() || url.fragment().is_some() {
            return Err(invalid("must be an origin without path, query or fragment"));
        }

        let uri: Uri = url.as_str().parse()?;
        let scheme = uri.scheme().ok_or_else(|| invalid("missing scheme"))?.clone();
        let authority = uri
            .authority()
            .ok_or_else(|| invalid("missing host"))?
            .clone();

        Ok(Self { scheme, authority })
    }
}

/// The four resolved upstream origins. Immutable after startup.
#[derive(Clone, Debug)]
pub struct Upstreams {
    code_host: Upstream,
    metadata_api: Upstream,
    registry_auth: Upstream,
    registry_blob: Upstream,
}

impl Upstreams {
    pub fn try_new(config: &UpstreamsConfig) -> Result<Self, ProxyError> {
        let or_default = |url: &Option<Url>, authority: &'static str| match url {
            Some(url) => Upstream::try_from(url),
            None => Ok(Upstream::https(authority)),
        };

        Ok(Upstreams {
            code_host: or_default(&config.code_host, "github.com")?,
            metadata_api: or_default(&config.metadata_api, "api.themoviedb.org")?,
            registry_auth: or_default(&config.registry_auth, "auth.docker.io")?,
            registry_blob: or_default(&config.registry_blob, "registry-1.docker.io")?,
        })
    }

    pub fn get(&self, kind: UpstreamKind) -> &Upstream {
        match kind {
            UpstreamKind::CodeHost => &self.code_host,
            UpstreamKind::MetadataApi => &self.metadata_api,
            UpstreamKind::RegistryAuth => &self.registry_auth,
            UpstreamKind::RegistryBlob => &self.registry_blob,
        }
    }
}
