//! Escaped-text writer and reader shared by the canonical event and filter
//! codecs. Messages are separated by line breaks, so only the line feed and
//! the escape character itself need escaping. The scheme admits exactly one
//! encoded form per value, which the event id computation depends on.

/// Appends `raw` to `out`, escaping LF as `\n` and backslash as `\\`.
pub fn write_escaped(out: &mut Vec<u8>, raw: &[u8]) {
    for &b in raw {
        match b {
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\\' => out.extend_from_slice(b"\\\\"),
            _ => out.push(b),
        }
    }
}

/// Reverses [`write_escaped`]. A backslash followed by any byte other than
/// `n` or `\\` yields that byte unchanged with the backslash consumed; a
/// trailing backslash is dropped.
pub fn read_escaped(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut escape = false;
    for &b in raw {
        if escape {
            match b {
                b'n' => out.push(b'\n'),
                other => out.push(other),
            }
            escape = false;
        } else if b == b'\\' {
            escape = true;
        } else {
            out.push(b);
        }
    }
    out
}
