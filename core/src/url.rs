//! URL assembly: base-URL joining and query-string serialization.

use serde_json::Value;

use crate::config::{Params, ParamsSerializer};

/// Join `base_url` and `url` unless `url` is already absolute.
pub fn build_full_path(base_url: Option<&str>, url: &str) -> String {
    match base_url {
        Some(base) if !is_absolute_url(url) => combine_urls(base, url),
        _ => url.to_string(),
    }
}

/// `scheme://...` or protocol-relative `//...`.
pub fn is_absolute_url(url: &str) -> bool {
    if url.starts_with("//") {
        return true;
    }
    let Some((scheme, rest)) = url.split_once(':') else {
        return false;
    };
    let mut chars = scheme.chars();
    let starts_alpha = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
    starts_alpha
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        && rest.starts_with("//")
}

/// Join with exactly one slash. An empty `relative` returns `base` untouched.
pub fn combine_urls(base: &str, relative: &str) -> String {
    if relative.is_empty() {
        return base.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        relative.trim_start_matches('/')
    )
}

/// Append serialized `params` to `url`.
///
/// A custom serializer wins over the built-in one. Null values are skipped,
/// arrays become repeated `key[]=` pairs and objects are sent as JSON. Any
/// `#fragment` is dropped once there is something to append.
pub fn build_url(url: &str, params: Option<&Params>, serializer: Option<&ParamsSerializer>) -> String {
    let Some(params) = params else {
        return url.to_string();
    };
    let serialized = match serializer {
        Some(serializer) => serializer.serialize(params),
        None => serialize_params(params),
    };
    if serialized.is_empty() {
        return url.to_string();
    }
    let base = url.split_once('#').map_or(url, |(before, _)| before);
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{base}{separator}{serialized}")
}

fn serialize_params(params: &Params) -> String {
    let mut parts = Vec::new();
    for (key, value) in params {
        match value {
            Value::Null => {}
            Value::Array(items) => {
                let key = encode(&format!("{key}[]"));
                for item in items {
                    parts.push(format!("{key}={}", encode(&param_value(item))));
                }
            }
            other => parts.push(format!("{}={}", encode(key), encode(&param_value(other)))),
        }
    }
    parts.join("&")
}

fn param_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// `encodeURIComponent`, then relaxed for characters that read fine in a
/// query string.
fn encode(raw: &str) -> String {
    const RELAXED: [(&str, &str); 12] = [
        ("%21", "!"),
        ("%27", "'"),
        ("%28", "("),
        ("%29", ")"),
        ("%2A", "*"),
        ("%40", "@"),
        ("%3A", ":"),
        ("%24", "$"),
        ("%2C", ","),
        ("%20", "+"),
        ("%5B", "["),
        ("%5D", "]"),
    ];
    let mut encoded = urlencoding::encode(raw).into_owned();
    for (from, to) in RELAXED {
        encoded = encoded.replace(from, to);
    }
    encoded
}
