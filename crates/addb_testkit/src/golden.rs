//! Golden byte helpers for format verification.

/// Encodes bytes as lowercase hex.
#[must_use]
pub fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Decodes a hex string. Whitespace is ignored, so long vectors can be laid
/// out field by field.
///
/// # Panics
///
/// Panics on odd-length input or a non-hex digit.
#[must_use]
pub fn hex_decode(hex: &str) -> Vec<u8> {
    let digits: Vec<u8> = hex
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .map(|b| match b {
            b'0'..=b'9' => b - b'0',
            b'a'..=b'f' => b - b'a' + 10,
            b'A'..=b'F' => b - b'A' + 10,
            _ => panic!("Invalid hex digit {:?} in {:?}", b as char, hex),
        })
        .collect();
    assert!(digits.len() % 2 == 0, "Odd-length hex string {hex:?}");
    digits.chunks(2).map(|pair| (pair[0] << 4) | pair[1]).collect()
}

/// Asserts that `actual` encodes to `expected_hex`, printing both in hex on
/// failure.
///
/// # Panics
///
/// Panics if the bytes differ.
pub fn assert_hex_eq(name: &str, expected_hex: &str, actual: &[u8]) {
    let expected = hex_decode(expected_hex);
    if actual != expected.as_slice() {
        panic!(
            "Golden bytes '{}' differ:\n\
             Expected ({} bytes): {}\n\
             Actual ({} bytes): {}",
            name,
            expected.len(),
            hex_encode(&expected),
            actual.len(),
            hex_encode(actual)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_ignores_whitespace() {
        assert_eq!(hex_decode("01 ff\n0A"), vec![0x01, 0xff, 0x0a]);
        assert_eq!(hex_encode(&[0x00, 0xab]), "00ab");
    }

    #[test]
    #[should_panic(expected = "Odd-length")]
    fn odd_hex_panics() {
        let _ = hex_decode("abc");
    }

    #[test]
    #[should_panic(expected = "Golden bytes 'x' differ")]
    fn mismatch_panics_with_name() {
        assert_hex_eq("x", "00", &[1]);
    }
}
