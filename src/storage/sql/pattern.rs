//! `LIKE` pattern construction and byte-wise matching.
//!
//! Prefix scans are expressed as `key LIKE ? ESCAPE '\'`. The prefix is
//! escaped so that literal `%`, `_` and escape bytes in a key never act as
//! wildcards, then a single trailing `%` is appended.
//!
//! [`like_match`] is the matcher registered on `SQLite` connections in place of
//! the built-in `like()`, which decodes its operands as UTF-8 text and stops at
//! the first NUL byte. Keys are arbitrary bytes, so matching has to be too.

/// `LIKE` wildcard matching any sequence of bytes, including none.
pub const ANY_SEQUENCE: u8 = b'%';

/// `LIKE` wildcard matching exactly one byte.
pub const ANY_SINGLE: u8 = b'_';

/// Escapes the `LIKE` wildcards in `pattern` so they match literally.
///
/// Runs in a single pass, so the escape byte itself is doubled before any
/// wildcard escape is emitted and nothing is escaped twice.
///
/// # Examples
///
/// ```
/// use sqlkv::storage::sql::escape_like_wildcards;
///
/// assert_eq!(escape_like_wildcards(b"100%", b'\\'), b"100\\%");
/// assert_eq!(escape_like_wildcards(b"user_name", b'\\'), b"user\\_name");
/// assert_eq!(escape_like_wildcards(b"path\\file", b'\\'), b"path\\\\file");
/// ```
#[must_use]
pub fn escape_like_wildcards(pattern: &[u8], escape: u8) -> Vec<u8> {
    let mut result = Vec::with_capacity(pattern.len() + pattern.len() / 4);
    for &byte in pattern {
        if byte == escape || byte == ANY_SEQUENCE || byte == ANY_SINGLE {
            result.push(escape);
        }
        result.push(byte);
    }
    result
}

/// Builds a `LIKE` pattern matching every value that starts with `prefix`.
///
/// # Examples
///
/// ```
/// use sqlkv::storage::sql::prefix_pattern;
///
/// assert_eq!(prefix_pattern(b"pkg_", b'\\'), b"pkg\\_%");
/// assert_eq!(prefix_pattern(b"", b'\\'), b"%");
/// ```
#[must_use]
pub fn prefix_pattern(prefix: &[u8], escape: u8) -> Vec<u8> {
    let mut pattern = escape_like_wildcards(prefix, escape);
    pattern.push(ANY_SEQUENCE);
    pattern
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Literal(u8),
    AnySingle,
    AnySequence,
}

/// Splits a pattern into tokens. Returns `None` for a dangling escape byte.
fn tokenize(pattern: &[u8], escape: Option<u8>) -> Option<Vec<Token>> {
    let mut tokens = Vec::with_capacity(pattern.len());
    let mut bytes = pattern.iter().copied();
    while let Some(byte) = bytes.next() {
        let token = if Some(byte) == escape {
            Token::Literal(bytes.next()?)
        } else if byte == ANY_SEQUENCE {
            Token::AnySequence
        } else if byte == ANY_SINGLE {
            Token::AnySingle
        } else {
            Token::Literal(byte)
        };
        tokens.push(token);
    }
    Some(tokens)
}

/// Matches `subject` against a `LIKE` pattern, byte for byte and case-sensitively.
///
/// `%` matches any byte sequence, `_` exactly one byte, and `escape` makes the
/// following byte literal. A pattern ending in a bare escape byte matches
/// nothing.
///
/// # Examples
///
/// ```
/// use sqlkv::storage::sql::like_match;
///
/// assert!(like_match(b"ab%", b"abc", Some(b'\\')));
/// assert!(!like_match(b"ab%", b"AB", Some(b'\\')));
/// assert!(like_match(b"a\\%%", b"a%b", Some(b'\\')));
/// assert!(!like_match(b"a\\%%", b"ab", Some(b'\\')));
/// ```
#[must_use]
pub fn like_match(pattern: &[u8], subject: &[u8], escape: Option<u8>) -> bool {
    let Some(tokens) = tokenize(pattern, escape) else {
        return false;
    };

    let (mut p, mut s) = (0, 0);
    // Most recent `%`: token index and the subject position it is retried from.
    let mut backtrack: Option<(usize, usize)> = None;

    while s < subject.len() {
        match tokens.get(p) {
            Some(Token::AnySequence) => {
                backtrack = Some((p, s));
                p += 1;
            },
            Some(Token::AnySingle) => {
                p += 1;
                s += 1;
            },
            Some(Token::Literal(byte)) if *byte == subject[s] => {
                p += 1;
                s += 1;
            },
            _ => match backtrack {
                Some((star, from)) => {
                    p = star + 1;
                    s = from + 1;
                    backtrack = Some((star, from + 1));
                },
                None => return false,
            },
        }
    }

    tokens[p..].iter().all(|t| *t == Token::AnySequence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    const ESC: u8 = b'\\';

    #[test]
    fn test_escape_like_wildcards() {
        // No special characters
        assert_eq!(escape_like_wildcards(b"normal", ESC), b"normal");

        // Percent sign
        assert_eq!(escape_like_wildcards(b"100%", ESC), b"100\\%");
        assert_eq!(escape_like_wildcards(b"%prefix", ESC), b"\\%prefix");

        // Underscore
        assert_eq!(escape_like_wildcards(b"_private", ESC), b"\\_private");

        // Escape character itself is doubled, never re-escaped
        assert_eq!(escape_like_wildcards(b"\\%", ESC), b"\\\\\\%");

        // Multiple special characters
        assert_eq!(
            escape_like_wildcards(b"100%_test\\", ESC),
            b"100\\%\\_test\\\\"
        );

        // Empty input
        assert!(escape_like_wildcards(b"", ESC).is_empty());
    }

    #[test]
    fn test_escape_with_other_escape_byte() {
        assert_eq!(escape_like_wildcards(b"a!b%", b'!'), b"a!!b!%");
        // Backslash is ordinary when it is not the escape byte
        assert_eq!(escape_like_wildcards(b"a\\b", b'!'), b"a\\b");
    }

    #[test]
    fn test_escape_binary_passthrough() {
        let input: Vec<u8> = (0u8..=255).collect();
        let escaped = escape_like_wildcards(&input, ESC);
        assert_eq!(escaped.len(), input.len() + 3);
    }

    #[test]
    fn test_prefix_pattern() {
        assert_eq!(prefix_pattern(b"Pamd64 ", ESC), b"Pamd64 %");
        assert_eq!(prefix_pattern(&[0x80], ESC), vec![0x80, b'%']);
        assert_eq!(prefix_pattern(b"", ESC), b"%");
    }

    #[test_case(b"%", b"", true ; "any sequence matches empty")]
    #[test_case(b"%", b"anything", true ; "any sequence matches all")]
    #[test_case(b"a_c", b"abc", true ; "single wildcard")]
    #[test_case(b"a_c", b"ac", false ; "single wildcard needs a byte")]
    #[test_case(b"a%c", b"abbbc", true ; "inner sequence")]
    #[test_case(b"a%c", b"abbbd", false ; "inner sequence no match")]
    #[test_case(b"%b%", b"aaba", true ; "leading and trailing sequence")]
    #[test_case(b"abc", b"abc", true ; "exact")]
    #[test_case(b"abc", b"abcd", false ; "exact is not prefix")]
    #[test_case(b"KEY%", b"key", false ; "case sensitive")]
    #[test_case(b"a\\_%", b"a_b", true ; "escaped underscore literal")]
    #[test_case(b"a\\_%", b"axb", false ; "escaped underscore not wildcard")]
    #[test_case(b"a\\\\%", b"a\\b", true ; "escaped escape")]
    #[test_case(b"a\\", b"a\\", false ; "dangling escape matches nothing")]
    fn test_like_match(pattern: &[u8], subject: &[u8], expected: bool) {
        assert_eq!(like_match(pattern, subject, Some(ESC)), expected);
    }

    #[test]
    fn test_like_match_without_escape() {
        assert!(like_match(b"a\\%", b"a\\bc", None));
        assert!(!like_match(b"a\\%", b"abc", None));
    }

    #[test]
    fn test_like_match_binary() {
        // NUL and high bytes are ordinary bytes
        assert!(like_match(&[0x00, b'%'], &[0x00, 0xFF], Some(ESC)));
        assert!(!like_match(&[0x00, b'%'], &[0x01], Some(ESC)));
        assert!(like_match(&[0xC3, b'%'], &[0xC3, 0xA9], Some(ESC)));
        assert!(!like_match(&[b'a', 0x00, b'%'], b"a", Some(ESC)));
    }

    #[test]
    fn test_prefix_pattern_matches_only_prefixed() {
        let prefix = b"x%_\\";
        let pattern = prefix_pattern(prefix, ESC);
        assert!(like_match(&pattern, b"x%_\\", Some(ESC)));
        assert!(like_match(&pattern, b"x%_\\tail", Some(ESC)));
        assert!(!like_match(&pattern, b"xa_\\tail", Some(ESC)));
        assert!(!like_match(&pattern, b"x%a\\", Some(ESC)));
    }
}
