//! ASCII-hex token codec.
//!
//! Command-line tokens such as `0D` or `CCDD` are decoded pair by pair into raw
//! bytes. Decoding never fails: it stops at the first pair that is not two hex
//! digits (including a lone trailing digit) and reports how many bytes were
//! produced. Callers that need an exact count check the returned length.

/// Decode hex-digit pairs from `text` into `out`.
///
/// Returns the number of bytes written. Stops at the first malformed pair, at
/// an odd trailing character, when `text` is exhausted or when `out` is full.
pub fn decode(text: &str, out: &mut [u8]) -> usize {
    let mut written = 0;

    for (pair, slot) in text.as_bytes().chunks(2).zip(out.iter_mut()) {
        let [hi, lo] = pair else {
            break;
        };
        match (nibble(*hi), nibble(*lo)) {
            (Some(hi), Some(lo)) => {
                *slot = (hi << 4) | lo;
                written += 1;
            },
            _ => break,
        }
    }

    written
}

/// Decode a token that must hold exactly one byte.
///
/// `"0D"` and `"0Dz"` yield `Some(0x0D)`; `"0D0E"`, `"Z1"` and `""` yield `None`.
pub fn decode_byte(token: &str) -> Option<u8> {
    let mut buf = [0u8; 2];
    match decode(token, &mut buf) {
        1 => Some(buf[0]),
        _ => None,
    }
}

/// Decode a token and keep only its first byte.
pub fn decode_first(token: &str) -> Option<u8> {
    let mut buf = [0u8; 1];
    (decode(token, &mut buf) == 1).then_some(buf[0])
}

/// Format bytes as space separated lower-case hex pairs, for dumps and reports.
pub fn dump(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn nibble(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}
