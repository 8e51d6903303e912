//! Cache-busting query parameters for descriptor requests.

/// Query parameter name carrying the cache-busting token.
pub const CACHE_BUST_PARAM: &str = "t";

/// Append `t=<token>` to a root-relative path or URL, replacing an existing
/// `t` parameter if there is one.
#[must_use]
pub fn with_cache_bust(path: &str, token: &str) -> String {
    let (base, fragment) = match path.split_once('#') {
        Some((base, fragment)) => (base, Some(fragment)),
        None => (path, None),
    };

    let (route, query) = match base.split_once('?') {
        Some((route, query)) => (route, query),
        None => (base, ""),
    };

    let mut params: Vec<&str> = query
        .split('&')
        .filter(|p| !p.is_empty())
        .filter(|p| p.split('=').next() != Some(CACHE_BUST_PARAM))
        .collect();
    let bust = format!("{CACHE_BUST_PARAM}={token}");
    params.push(&bust);

    let mut out = format!("{route}?{}", params.join("&"));
    if let Some(fragment) = fragment {
        out.push('#');
        out.push_str(fragment);
    }
    out
}
