//! URL normalization helpers and request-path namespace suffixing
//!
//! Mirrors the two independent suffix rules used by the wire protocol: the request
//! path suffix (driven by `configType`) and the subscription-key suffix (driven by
//! whether the namespace name already carries a file extension). See [`crate::subscribe`]
//! for the latter.

use rand::seq::SliceRandom;

use crate::DEFAULT_CONFIG_TYPE;

/// Prefix `http://` onto a bare host:port and strip a trailing slash.
pub fn normalize_url(url: &str) -> String {
    let url = if !url.starts_with("http://") && !url.starts_with("https://") {
        format!("http://{url}")
    } else {
        url.to_string()
    };

    url.strip_suffix('/').map(str::to_string).unwrap_or(url)
}

/// Split a comma-separated list of server URLs, normalizing each entry.
pub fn split_comma_separated(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(normalize_url)
        .collect()
}

/// Resolve the server list an explicit value takes precedence over the given
/// environment variable; they are never merged.
pub fn resolve_servers(explicit: &str, env_var: &str) -> Vec<String> {
    let candidate = if !explicit.is_empty() {
        explicit.to_string()
    } else {
        std::env::var(env_var).unwrap_or_default()
    };

    split_comma_separated(&candidate)
}

/// Resolve a single meta-server address, picking at random among a comma-separated
/// list and falling back to `default` when nothing was configured.
pub fn resolve_meta_server(explicit: &str, env_var: &str, default: &str) -> String {
    let urls = resolve_servers(explicit, env_var);

    if urls.is_empty() {
        return default.to_string();
    }

    urls.choose(&mut rand::thread_rng())
        .cloned()
        .unwrap_or_else(|| default.to_string())
}

/// Append the `configType` suffix to a namespace name for use in a request path.
/// The default config type carries no suffix.
pub fn namespace_for_request(config_type: &str, namespace: &str) -> String {
    if config_type.is_empty() || config_type == DEFAULT_CONFIG_TYPE {
        namespace.to_string()
    } else {
        format!("{namespace}.{config_type}")
    }
}
