//! Fragment codec: `key=value` tokens joined by `&`, values percent-encoded
//! the way `encodeURIComponent` does it.

use std::borrow::Cow;
use std::sync::LazyLock;

use fancy_regex::Regex;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use url::Url;

use crate::value::{StateMapping, StateValue};
use crate::{Error, Result};

/// Internal marker key. Never readable or writable through the state API.
pub const RESERVED_KEY: &str = "__t";

/// Everything except `A-Z a-z 0-9 - _ . ! ~ * ' ( )`.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

static MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?:^|&){RESERVED_KEY}=[0-9]*(?=&|$)"))
        .expect("marker pattern compiles")
});

/// Fragment of `href` in the poller's comparison form: always `#`-prefixed,
/// `#` alone when the address has no fragment.
pub fn fragment_of(href: &str) -> String {
    match href.split_once('#') {
        Some((_, fragment)) => format!("#{fragment}"),
        None => "#".to_string(),
    }
}

/// Fragment of `href` as `location.hash` reports it: empty when there is no
/// fragment or the fragment is empty.
pub fn hash_of(href: &str) -> String {
    match href.split_once('#') {
        Some((_, fragment)) if !fragment.is_empty() => format!("#{fragment}"),
        _ => String::new(),
    }
}

pub fn without_fragment(href: &str) -> &str {
    href.split_once('#').map_or(href, |(head, _)| head)
}

/// Scheme, host, path and query of `href`, ready to have a new fragment
/// appended.
pub fn full_uri(href: &str) -> Result<String> {
    let mut url = Url::parse(href).map_err(|err| Error::InvalidLocation(format!("{href}: {err}")))?;
    url.set_fragment(None);
    Ok(url.into())
}

pub fn encode_component(raw: &str) -> String {
    utf8_percent_encode(raw, COMPONENT).to_string()
}

pub fn decode_component(encoded: &str) -> String {
    percent_decode_str(encoded).decode_utf8_lossy().into_owned()
}

pub fn split_tokens(body: &str) -> impl Iterator<Item = &str> {
    body.split('&')
}

pub fn token_key(token: &str) -> &str {
    token.split_once('=').map_or(token, |(key, _)| key)
}

pub fn token_value(token: &str) -> &str {
    token.split_once('=').map_or("", |(_, value)| value)
}

pub fn token(key: &str, value: &StateValue) -> String {
    format!("{key}={}", encode_component(&value.to_fragment_string()))
}

/// Drops every `__t=<digits>` token from a fragment body (no leading `#`).
pub fn strip_markers(body: &str) -> String {
    let stripped = MARKER.replace_all(body, "");
    match stripped {
        Cow::Borrowed(unchanged) => unchanged.to_string(),
        Cow::Owned(owned) => owned.trim_start_matches('&').to_string(),
    }
}

/// Decodes a fragment (with or without its `#`) into a mapping. Empty tokens
/// and the reserved key are skipped; a repeated key keeps its first value.
pub fn decode(fragment: &str) -> StateMapping {
    let body = fragment.strip_prefix('#').unwrap_or(fragment);
    let mut mapping = StateMapping::new();
    for token in split_tokens(body) {
        let key = token_key(token);
        if key.is_empty() || key == RESERVED_KEY || mapping.contains_key(key) {
            continue;
        }
        mapping.insert(key, decode_component(token_value(token)));
    }
    mapping
}

/// Encodes a mapping as a `#`-prefixed fragment, skipping the reserved key.
pub fn encode(mapping: &StateMapping) -> String {
    let body = mapping
        .iter()
        .filter(|(key, _)| !key.is_empty() && *key != RESERVED_KEY)
        .map(|(key, value)| token(key, value))
        .collect::<Vec<_>>()
        .join("&");
    format!("#{body}")
}
