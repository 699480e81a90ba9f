//! Parses a region's compact attribute string (e.g. `"!w!x!s"`) into a
//! [`MemAttr`].
//!
//! The upstream tool validated this string with the regex
//! `(?!!?w!?x!?s)`, a negative lookahead that matches almost any input —
//! attribute validation was effectively absent. This parser instead walks
//! the string token by token and rejects anything outside `{!w, !x, !s}`.

use snafu::Snafu;

use crate::region::MemAttr;

#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum AttrError {
    #[snafu(display(
        "unrecognised attribute token '{token}' in attribute string (expected some \
         combination of !w, !x, !s)"
    ))]
    UnknownToken { token: String },
}

/// Parse an attribute string into its `MemAttr`.
///
/// `!w` marks the region read-only (`AP = 0b11`); absent, the region is
/// read-write (`AP = 0b01`). `!x` sets execute-never, `!s` sets non-secure.
/// EL0 access is always implied.
pub fn parse_attr_string(s: &str) -> Result<MemAttr, AttrError> {
    let bytes = s.as_bytes();
    let mut read_only = false;
    let mut xn = false;
    let mut ns = false;

    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'!' || i + 1 >= bytes.len() {
            return Err(AttrError::UnknownToken {
                token: s[i..].to_string(),
            });
        }
        match bytes[i + 1] {
            b'w' => read_only = true,
            b'x' => xn = true,
            b's' => ns = true,
            _ => {
                return Err(AttrError::UnknownToken {
                    token: s[i..i + 2].to_string(),
                })
            }
        }
        i += 2;
    }

    Ok(MemAttr {
        ap: if read_only { MemAttr::RO } else { MemAttr::RW },
        xn,
        ns,
    })
}
