//! URL normalization and source identity
//!
//! Two URLs that normalize to the same string are the same document.
//! Two hosts with the same source key are the same logical source
//! (mirrors such as `www.` or `m.` variants).

use url::Url;

/// Query parameters that only carry tracking state
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "mc_cid", "mc_eid", "ref_src"];

/// Host prefixes that denote a mirror of the bare domain
const MIRROR_PREFIXES: &[&str] = &["www.", "m.", "mobile.", "amp."];

/// Parse and normalize an http(s) URL
///
/// Lowercases scheme and host, drops the default port and the fragment,
/// removes `utm_*` and other tracking parameters, and strips a trailing
/// slash from non-root paths. Returns `None` for unparseable or
/// non-http(s) input.
#[must_use]
pub fn normalize_url(raw: &str) -> Option<Url> {
    let mut url = Url::parse(raw.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return None;
    }

    url.set_fragment(None);

    if url.query().is_some() {
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| !is_tracking_param(key))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        if kept.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(kept);
        }
    }

    let path = url.path();
    if path.len() > 1 && path.ends_with('/') {
        let trimmed = path.trim_end_matches('/').to_string();
        url.set_path(if trimmed.is_empty() { "/" } else { &trimmed });
    }

    Some(url)
}

/// Normalize to a string key, if possible
#[must_use]
pub fn normalize_url_str(raw: &str) -> Option<String> {
    normalize_url(raw).map(String::from)
}

/// Lowercased host of a URL string
#[must_use]
pub fn domain_of(raw: &str) -> Option<String> {
    Url::parse(raw.trim())
        .ok()
        .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
}

/// Logical source behind a host
///
/// `www.example.com`, `m.example.com` and `example.com` share a key.
#[must_use]
pub fn source_key(host: &str) -> String {
    let mut host = host.trim().trim_end_matches('.').to_ascii_lowercase();
    loop {
        let Some(prefix) = MIRROR_PREFIXES.iter().find(|p| host.starts_with(**p)) else {
            break;
        };
        let rest = &host[prefix.len()..];
        if !rest.contains('.') {
            break;
        }
        host = rest.to_string();
    }
    host
}

fn is_tracking_param(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key.as_str())
}
