//! RFC 2396 escaping of path component text.
//!
//! Used when rendering `file:///` and `trash:///` URIs and when reading or
//! writing the `Path=` field of `.trashinfo` records.

use crate::errors::{CoreError, Result};

/// Prefix of local URIs.
pub const FILE_URI_PREFIX: &str = "file:///";

/// Prefix of trash URIs.
pub const TRASH_URI_PREFIX: &str = "trash:///";

/// Character classes for ASCII 32 (space) through 127 (DEL).
#[rustfmt::skip]
const ACCEPTABLE_URI_CHARS: [u8; 96] = [
    /*      !     "     #     $     %     &     '     (     )     *     +     ,     -     .     / */
    0x00, 0x3F, 0x20, 0x20, 0x28, 0x00, 0x2C, 0x3F, 0x3F, 0x3F, 0x3F, 0x2A, 0x28, 0x3F, 0x3F, 0x1C,
    /* 0    1     2     3     4     5     6     7     8     9     :     ;     <     =     >     ? */
    0x3F, 0x3F, 0x3F, 0x3F, 0x3F, 0x3F, 0x3F, 0x3F, 0x3F, 0x3F, 0x38, 0x20, 0x20, 0x2C, 0x20, 0x20,
    /* @    A     B     C     D     E     F     G     H     I     J     K     L     M     N     O */
    0x38, 0x3F, 0x3F, 0x3F, 0x3F, 0x3F, 0x3F, 0x3F, 0x3F, 0x3F, 0x3F, 0x3F, 0x3F, 0x3F, 0x3F, 0x3F,
    /* P    Q     R     S     T     U     V     W     X     Y     Z     [     \     ]     ^     _ */
    0x3F, 0x3F, 0x3F, 0x3F, 0x3F, 0x3F, 0x3F, 0x3F, 0x3F, 0x3F, 0x3F, 0x20, 0x20, 0x20, 0x20, 0x3F,
    /* `    a     b     c     d     e     f     g     h     i     j     k     l     m     n     o */
    0x20, 0x3F, 0x3F, 0x3F, 0x3F, 0x3F, 0x3F, 0x3F, 0x3F, 0x3F, 0x3F, 0x3F, 0x3F, 0x3F, 0x3F, 0x3F,
    /* p    q     r     s     t     u     v     w     x     y     z     {     |     }     ~   DEL */
    0x3F, 0x3F, 0x3F, 0x3F, 0x3F, 0x3F, 0x3F, 0x3F, 0x3F, 0x3F, 0x3F, 0x20, 0x20, 0x20, 0x3F, 0x20,
];

/// Mask selecting the characters that may appear unescaped in a path.
const UNSAFE_PATH_MASK: u8 = 0x08;

const HEX_CHARS: &[u8; 16] = b"0123456789ABCDEF";

/// Returns true if `c` may be copied verbatim into a URI path.
#[inline]
pub fn is_acceptable(c: u8) -> bool {
    (32..128).contains(&c) && ACCEPTABLE_URI_CHARS[usize::from(c - 32)] & UNSAFE_PATH_MASK != 0
}

/// Number of bytes `escape` produces for `bytes`.
pub fn escaped_len(bytes: &[u8]) -> usize {
    bytes
        .iter()
        .map(|&c| if is_acceptable(c) { 1 } else { 3 })
        .sum()
}

/// Appends the escaped form of `bytes` to `out`.
pub fn escape_into(bytes: &[u8], out: &mut String) {
    for &c in bytes {
        if is_acceptable(c) {
            out.push(char::from(c));
        } else {
            out.push('%');
            out.push(char::from(HEX_CHARS[usize::from(c >> 4)]));
            out.push(char::from(HEX_CHARS[usize::from(c & 15)]));
        }
    }
}

/// Writes the escaped form of `bytes` to the start of `out` and returns the
/// number of bytes written. `out` must hold at least `escaped_len(bytes)` bytes.
pub fn escape_to_slice(bytes: &[u8], out: &mut [u8]) -> usize {
    let mut pos = 0;
    for &c in bytes {
        if is_acceptable(c) {
            out[pos] = c;
            pos += 1;
        } else {
            out[pos] = b'%';
            out[pos + 1] = HEX_CHARS[usize::from(c >> 4)];
            out[pos + 2] = HEX_CHARS[usize::from(c & 15)];
            pos += 3;
        }
    }
    pos
}

/// Escapes a single path component (or any byte string) per RFC 2396.
pub fn escape(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(escaped_len(bytes));
    escape_into(bytes, &mut out);
    out
}

fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

/// Decodes `%XX` sequences in `escaped`.
///
/// Fails on truncated or non-hex sequences, on escaped NUL bytes, on any
/// escaped byte listed in `illegal`, and (if `ascii_must_not_be_escaped`) on
/// escaped printable ASCII.
pub fn unescape(escaped: &[u8], illegal: &[u8], ascii_must_not_be_escaped: bool) -> Result<Vec<u8>> {
    let invalid = || CoreError::invalid_uri(format!("invalidly escaped characters in {:?}", String::from_utf8_lossy(escaped)));

    let mut out = Vec::with_capacity(escaped.len());
    let mut iter = escaped.iter().copied();
    while let Some(c) = iter.next() {
        if c != b'%' {
            out.push(c);
            continue;
        }

        let hi = iter.next().and_then(hex_value).ok_or_else(invalid)?;
        let lo = iter.next().and_then(hex_value).ok_or_else(invalid)?;
        let decoded = (hi << 4) | lo;

        if decoded == 0
            || (ascii_must_not_be_escaped && (0x20..=0x7f).contains(&decoded))
            || illegal.contains(&decoded)
        {
            return Err(invalid());
        }
        out.push(decoded);
    }
    Ok(out)
}

/// Unescapes a path string where `/` must appear literally.
pub fn unescape_path(escaped: &str) -> Result<Vec<u8>> {
    unescape(escaped.as_bytes(), b"/", false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_characters_pass_through() {
        assert_eq!(escape(b"Documents"), "Documents");
        assert_eq!(escape(b"a-b_c.d~e!f*g'h(i)"), "a-b_c.d~e!f*g'h(i)");
        assert_eq!(escape(b"x=y&z$"), "x=y&z$");
    }

    #[test]
    fn unsafe_characters_are_escaped() {
        assert_eq!(escape(b"hello world"), "hello%20world");
        assert_eq!(escape(b"100%"), "100%25");
        assert_eq!(escape(b"user@host:1"), "user@host:1");
        assert_eq!(escape(b"q?#"), "q%3F%23");
        assert_eq!(escape("é".as_bytes()), "%C3%A9");
        assert_eq!(escaped_len(b"a b"), 5);

        let mut out = [0u8; 8];
        assert_eq!(escape_to_slice(b"a b#", &mut out), 8);
        assert_eq!(&out, b"a%20b%23");
    }

    #[test]
    fn escape_then_unescape_recovers_bytes() {
        let samples: &[&[u8]] = &[b"simple", b"with space", b"%%%", b"\xff\xfe\x01", "ümlaut ñ".as_bytes()];
        for sample in samples {
            let escaped = escape(sample);
            assert_eq!(unescape(escaped.as_bytes(), b"", false).unwrap(), sample.to_vec());
        }
    }

    #[test]
    fn unescape_accepts_lowercase_hex() {
        assert_eq!(unescape(b"%c3%a9", b"", false).unwrap(), "é".as_bytes());
    }

    #[test]
    fn unescape_rejects_bad_sequences() {
        assert!(unescape(b"abc%", b"", false).is_err());
        assert!(unescape(b"abc%4", b"", false).is_err());
        assert!(unescape(b"%zz", b"", false).is_err());
        assert!(unescape(b"%00", b"", false).is_err());
        assert!(unescape_path("a%2Fb").is_err());
        assert!(unescape(b"%41", b"", true).is_err());
        assert_eq!(unescape(b"%41", b"", false).unwrap(), b"A");
    }
}
