//! Helpers for slash-separated storage keys.
//!
//! Keys never start with a separator. Folder prefixes always end with one,
//! except the root prefix, which is the empty string.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Characters escaped in a path segment. Unreserved characters and the
/// separator itself pass through.
const PATH_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'/');

/// Strip leading and trailing separators.
pub fn trim_key(key: &str) -> &str {
    key.trim_matches('/')
}

/// Turn a path into a folder prefix (`a/b` -> `a/b/`). Root stays empty.
pub fn folder_prefix(path: &str) -> String {
    let trimmed = trim_key(path);
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}/", trimmed)
    }
}

/// Whether the key is folder-shaped.
pub fn is_folder_key(key: &str) -> bool {
    key.ends_with('/')
}

/// Last non-empty segment of a key (`a/b/c.txt` -> `c.txt`, `a/b/` -> `b`).
pub fn file_name(key: &str) -> &str {
    let trimmed = trim_key(key);
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

/// Folder prefix containing the key (`a/b/c.txt` -> `a/b/`, `c.txt` -> ``).
pub fn parent_prefix(key: &str) -> String {
    let trimmed = trim_key(key);
    match trimmed.rfind('/') {
        Some(idx) => format!("{}/", &trimmed[..idx]),
        None => String::new(),
    }
}

/// Replace the first occurrence of `from` inside `key` with `to`.
///
/// Keys produced by listing `from` always start with it, so the first
/// occurrence is the prefix. A key that does not contain `from` at all is
/// rewritten wherever the fragment first appears.
pub fn replace_prefix(key: &str, from: &str, to: &str) -> String {
    key.replacen(from, to, 1)
}

/// The part of `key` below `base`, if `key` lives under it.
pub fn relative_to<'a>(key: &'a str, base: &str) -> Option<&'a str> {
    key.strip_prefix(base)
}

/// Percent-encode every segment of a key, keeping the separators.
pub fn encode_path(key: &str) -> String {
    utf8_percent_encode(trim_key(key), PATH_ESCAPE).to_string()
}
