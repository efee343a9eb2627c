//! Slug derivation
//!
//! The slug is the app's primary key on the service.

/// Derive a slug from a display name.
///
/// Lower-cases, collapses every run of characters outside `[a-z0-9]` into a
/// single `-`, and trims leading and trailing `-`. Total: an input made only
/// of separators yields the empty string.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;

    for c in name.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }
    slug
}
