//! Allow-list filtering for strings placed into a command line.
//!
//! Commands are always executed in argument-vector form, so nothing here is
//! needed to stop shell injection. The filters exist so that crafted names
//! cannot smuggle option flags, path separators or column delimiters into
//! the storage tools.

/// Strip every character except ASCII letters, digits, `-` and `_`.
///
/// Used for pool names handed to the status family of commands.
pub fn sanitize_strict(raw: &str) -> String {
    raw.chars().filter(|&c| is_strict(c)).collect()
}

/// Strip every character except ASCII letters, digits and `-_:.%,`.
///
/// These are the characters that may appear in dataset, snapshot and
/// property names, and in comma-separated property lists.
pub fn sanitize(raw: &str) -> String {
    raw.chars()
        .filter(|&c| is_strict(c) || matches!(c, ':' | '.' | '%' | ','))
        .collect()
}

fn is_strict(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}
