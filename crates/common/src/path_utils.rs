//! Key and path utilities for object-store operations.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Characters escaped in the key portion of a copy-source string.
///
/// RFC 3986 unreserved characters and `/` are kept verbatim.
const COPY_SOURCE_KEY: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Percent-escape an object key for use in a copy-source string.
///
/// Spaces become `%20`, forward slashes are preserved.
///
/// # Arguments
/// * `key` - Raw object key
///
/// # Returns
/// The escaped key.
pub fn escape_copy_source_key(key: &str) -> String {
    utf8_percent_encode(key, COPY_SOURCE_KEY).to_string()
}

/// Join key segments with single `/` separators.
///
/// Empty segments are skipped and duplicate slashes at the joints are
/// collapsed; a trailing slash on the last segment is preserved.
///
/// # Arguments
/// * `segments` - Key segments in order
///
/// # Returns
/// The joined key.
pub fn join_key(segments: &[&str]) -> String {
    let mut key: String = String::new();
    let last: usize = segments.len().saturating_sub(1);

    for (index, segment) in segments.iter().enumerate() {
        let trimmed: &str = if index == last {
            segment.trim_start_matches('/')
        } else {
            segment.trim_matches('/')
        };
        if trimmed.is_empty() {
            continue;
        }
        if !key.is_empty() {
            key.push('/');
        }
        key.push_str(trimmed);
    }

    key
}

/// Ensure a prefix ends with `/`.
///
/// # Arguments
/// * `prefix` - Prefix to normalize (empty stays empty)
pub fn ensure_trailing_slash(prefix: &str) -> String {
    if prefix.is_empty() || prefix.ends_with('/') {
        prefix.to_string()
    } else {
        format!("{}/", prefix)
    }
}
