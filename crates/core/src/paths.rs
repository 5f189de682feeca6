//! Filesystem-safe names for peer-supplied strings
//!
//! Room ids, report names and announced transfer names all come from the
//! remote side and end up as path components.

/// Reduce `name` to a single safe path component
///
/// Keeps ASCII alphanumerics, `-`, `_` and `.`; everything else becomes `_`.
/// Leading dots are stripped so the result is never hidden, `.` or `..`.
/// Falls back to `unnamed` when nothing is left.
pub fn sanitize_component(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed.chars().take(255).collect()
    }
}
