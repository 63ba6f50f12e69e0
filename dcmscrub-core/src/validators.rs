// File: dcmscrub-core/src/validators.rs
//! Programmatic validation of values before they are used to rewrite records
//! or scripts.
//!
//! License: MIT OR APACHE 2.0

use once_cell::sync::Lazy;
use regex::Regex;

/// Longest UID root accepted, leaving room for a generated suffix within the
/// 64-character UID limit.
pub const UID_ROOT_MAX_LENGTH: usize = 32;

/// Maximum length of a UID.
pub const UID_MAX_LENGTH: usize = 64;

static UID_ROOT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"^[1-9][0-9.]{{0,{}}}$", UID_ROOT_MAX_LENGTH - 1))
        .expect("UID root pattern is a valid regex")
});

/// Returns `true` if `value` is non-empty and made only of ASCII digits.
///
/// Only such values are textually substituted inside numeric fields: a value
/// like `"12AB"` can never appear in the decimal form of a number.
pub fn is_all_digits(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_digit())
}

/// Checks that a UID root starts with 1-9, holds only digits and dots, and
/// is at most [`UID_ROOT_MAX_LENGTH`] characters long. A trailing dot is
/// allowed.
pub fn is_valid_uid_root(root: &str) -> bool {
    UID_ROOT_REGEX.is_match(root.trim())
}

/// The UID root as a prefix, i.e. with exactly one trailing dot.
pub fn uid_prefix(root: &str) -> String {
    let root = root.trim();
    if root.ends_with('.') {
        root.to_string()
    } else {
        format!("{}.", root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_all_digits() {
        assert!(is_all_digits("20240115"));
        assert!(is_all_digits("0"));
        assert!(!is_all_digits(""));
        assert!(!is_all_digits("12AB"));
        assert!(!is_all_digits("12.5"));
        assert!(!is_all_digits("-12"));
        assert!(!is_all_digits("½"));
        assert!(!is_all_digits("Ⅻ"));
        assert!(!is_all_digits("١٢٣"));
    }

    #[test]
    fn test_uid_root_validation() {
        assert!(is_valid_uid_root("1.2.826.0.1.3680043.8.498"));
        assert!(is_valid_uid_root("1.2.840.123."));
        assert!(!is_valid_uid_root("0.1.2"));
        assert!(!is_valid_uid_root("1.2.abc"));
        assert!(!is_valid_uid_root(""));
        assert!(!is_valid_uid_root(&"1".repeat(UID_ROOT_MAX_LENGTH + 1)));
    }

    #[test]
    fn test_uid_prefix_appends_single_dot() {
        assert_eq!(uid_prefix("1.2.3"), "1.2.3.");
        assert_eq!(uid_prefix("1.2.3."), "1.2.3.");
        assert_eq!(uid_prefix(" 1.2.3 "), "1.2.3.");
    }
}
