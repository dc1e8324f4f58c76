//! POSIX shell quoting helpers

/// Escape every `'` as `'\''` so the text can sit inside single quotes
pub fn escape_single_quotes(s: &str) -> String {
    s.replace('\'', r"'\''")
}

/// Wrap `s` in single quotes for a POSIX shell
pub fn quote(s: &str) -> String {
    format!("'{}'", escape_single_quotes(s))
}
