//! Cache key pattern matching.
//!
//! A pattern ending in [`PREFIX_SEPARATOR`] selects every key that starts
//! with it. Any other pattern selects the key equal to it and every key that
//! contains it anywhere.
//!
//! The substring rule is wide: `"123"` matches `"user_123_settings"`. The
//! business-event tables are written against this behavior, so it stays.

/// Trailing character that turns a pattern into a prefix selector.
pub const PREFIX_SEPARATOR: char = '_';

/// Pattern that selects every key. Used by full clears.
pub const MATCH_ALL: &str = "*";

/// Returns true if `key` is selected by `pattern`.
pub fn matches_pattern(key: &str, pattern: &str) -> bool {
    if pattern.ends_with(PREFIX_SEPARATOR) {
        return key.starts_with(pattern);
    }
    key == pattern || key.contains(pattern)
}

/// Returns true if `pattern` uses prefix semantics.
pub fn is_prefix_pattern(pattern: &str) -> bool {
    pattern.ends_with(PREFIX_SEPARATOR)
}
