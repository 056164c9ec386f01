//! Fixed-width octal fields.
//!
//! Numeric header fields hold zero-padded base-8 ASCII digits followed by a
//! NUL. Values wider than the field are masked down to the field's range
//! instead of failing; callers that care about the true value carry it in a
//! PAX record.

/// Largest value of an 11-digit field (`size`, `mtime`), 8 GiB - 1.
pub const LONG_FIELD_MAX: u64 = 0o77777777777;

/// Largest value representable with `digits` octal digits.
pub const fn octal_max(digits: usize) -> u64 {
    if digits >= 21 {
        u64::MAX
    } else {
        (1u64 << (3 * digits)) - 1
    }
}

/// Encode `value` as exactly `width` zero-padded octal digits.
///
/// Bits beyond `width` digits are dropped.
pub fn encode_octal(value: u64, width: usize) -> String {
    if width == 0 {
        return String::new();
    }
    let value = value & octal_max(width);
    format!("{:0width$o}", value, width = width)
}

/// Fill `field` with octal digits of `val` and a trailing NUL.
///
/// Returns `false` when `val` did not fit and was truncated.
pub fn format_octal(val: u64, field: &mut [u8]) -> bool {
    let Some(len) = field.len().checked_sub(1) else {
        return val == 0;
    };
    field[..len].copy_from_slice(encode_octal(val, len).as_bytes());
    field[len] = 0; // null terminator
    val <= octal_max(len)
}

/// Parse a NUL or space terminated octal field.
pub fn parse_octal(field: &'_ [u8]) -> std::result::Result<u64, &'_ [u8]> {
    let mut n = 0u64;
    let mut rest = field;
    while let [d, r @ ..] = rest {
        if d == &0 || d == &b' ' {
            break;
        }
        if !(&b'0'..=&b'7').contains(&d) {
            return Err(field);
        }
        rest = r;
        n = n
            .checked_mul(8)
            .and_then(|n| n.checked_add(u64::from(*d - b'0')))
            .ok_or(field)?;
    }
    Ok(n)
}
