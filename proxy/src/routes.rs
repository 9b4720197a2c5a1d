//! Static prefix table and the longest-prefix matcher over it.

/// Logical destination of a public path prefix.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteKind {
    CodeHost,
    MetadataApi,
    RegistryAuth,
    RegistryBlob,
    /// Aggregate registry entry point, split between auth and blob after rewriting.
    RegistrySmart,
}

#[derive(Debug, PartialEq, Eq)]
pub struct Route {
    pub prefix: &'static str,
    pub kind: RouteKind,
}

pub static ROUTES: &[Route] = &[
    Route {
        prefix: "/gh",
        kind: RouteKind::CodeHost,
    },
    Route {
        prefix: "/tmdb",
        kind: RouteKind::MetadataApi,
    },
    Route {
        prefix: "/docker-auth",
        kind: RouteKind::RegistryAuth,
    },
    Route {
        prefix: "/docker-reg",
        kind: RouteKind::RegistryBlob,
    },
    Route {
        prefix: "/docker",
        kind: RouteKind::RegistrySmart,
    },
];

#[derive(Debug, PartialEq, Eq)]
pub enum RouteMatch {
    Proxy(&'static Route),
    /// `/` or an empty path: the informational banner.
    Root,
    NotFound,
}

fn prefix_matches(prefix: &str, path: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Finds the route for `path`. When several prefixes match, the longest one wins,
/// so the table order does not matter.
pub fn match_route(path: &str) -> RouteMatch {
    if path.is_empty() || path == "/" {
        return RouteMatch::Root;
    }

    ROUTES
        .iter()
        .filter(|route| prefix_matches(route.prefix, path))
        .max_by_key(|route| route.prefix.len())
        .map_or(RouteMatch::NotFound, RouteMatch::Proxy)
}
