//! URL-scheme and path-name helpers.
//!
//! Batch input paths may be plain filesystem paths or `scheme://` URLs;
//! these helpers classify them and derive human-meaningful leaf names
//! without any credential or query component.

/// Extract the scheme of a path, if it has one.
///
/// Returns `None` for plain filesystem paths. A scheme is a leading run
/// of ASCII alphanumerics (first character alphabetic) followed by
/// `://`, matching what cloud object-store URLs look like.
#[must_use]
pub fn url_scheme(path: &str) -> Option<&str> {
    let (scheme, _) = path.split_once("://")?;
    let mut chars = scheme.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return None,
    }
    if chars.all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.') {
        Some(scheme)
    } else {
        None
    }
}

/// Strip any `?query` suffix from a path.
///
/// Object-store URLs can carry credential material (e.g. SAS tokens) in
/// the query string; it must never leak into an on-disk staging name.
#[must_use]
pub fn strip_query(path: &str) -> &str {
    match path.split_once('?') {
        Some((head, _)) => head,
        None => path,
    }
}

/// Derive the leaf name of a path, ignoring trailing separators.
#[must_use]
pub fn basename(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rsplit_once('/') {
        Some((_, name)) => name,
        None => trimmed,
    }
}
