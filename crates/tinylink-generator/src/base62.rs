/// The base-62 digit alphabet, lowest digit first.
pub const ALPHABET: &[u8; 62] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

const BASE: u32 = 62;

/// Encodes `bytes`, read as an unsigned big-endian integer, in base 62.
///
/// Digits are emitted most-significant first. A value of zero (including an
/// empty or all-zero input) encodes to the empty string.
pub fn encode(bytes: &[u8]) -> String {
    let mut number: Vec<u8> = bytes.iter().copied().skip_while(|b| *b == 0).collect();
    let mut digits = Vec::with_capacity(bytes.len() * 2);

    // Schoolbook long division of the byte string by 62.
    while !number.is_empty() {
        let mut remainder: u32 = 0;
        let mut quotient = Vec::with_capacity(number.len());

        for &byte in &number {
            let acc = (remainder << 8) | u32::from(byte);
            let digit = acc / BASE;
            remainder = acc % BASE;
            if !quotient.is_empty() || digit != 0 {
                quotient.push(digit as u8);
            }
        }

        digits.push(ALPHABET[remainder as usize]);
        number = quotient;
    }

    digits.iter().rev().map(|&d| char::from(d)).collect()
}

/// Encodes `bytes` and fits the result to exactly `len` characters.
///
/// Longer encodings keep their first `len` digits. Shorter ones are
/// left-padded with `ALPHABET[0]`.
pub fn encode_fixed(bytes: &[u8], len: usize) -> String {
    let encoded = encode(bytes);
    if encoded.len() >= len {
        return encoded[..len].to_owned();
    }

    let mut padded = String::with_capacity(len);
    padded.extend(std::iter::repeat_n(char::from(ALPHABET[0]), len - encoded.len()));
    padded.push_str(&encoded);
    padded
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_u64(mut value: u64) -> String {
        let mut out = Vec::new();
        while value > 0 {
            out.push(ALPHABET[(value % 62) as usize]);
            value /= 62;
        }
        out.iter().rev().map(|&d| char::from(d)).collect()
    }

    #[test]
    fn zero_encodes_to_empty() {
        assert_eq!(encode(&[]), "");
        assert_eq!(encode(&[0, 0, 0]), "");
    }

    #[test]
    fn small_values() {
        assert_eq!(encode(&[1]), "b");
        assert_eq!(encode(&[61]), "9");
        assert_eq!(encode(&[62]), "ba");
        assert_eq!(encode(&[255]), "eh");
        assert_eq!(encode(&[1, 0]), "ei");
    }

    #[test]
    fn leading_zero_bytes_are_ignored() {
        assert_eq!(encode(&[0, 0, 1, 0]), encode(&[1, 0]));
    }

    #[test]
    fn matches_integer_conversion() {
        for value in [1_u64, 61, 62, 3_843, 3_844, 1 << 32, 0xDEAD_BEEF_CAFE_BABE, u64::MAX] {
            assert_eq!(encode(&value.to_be_bytes()), encode_u64(value), "value {value}");
        }
        assert_eq!(encode(&u64::MAX.to_be_bytes()), "v8QrKbgkrIp");
    }

    #[test]
    fn fixed_truncates_long_encodings() {
        assert_eq!(encode_fixed(&u64::MAX.to_be_bytes(), 8), "v8QrKbgk");
    }

    #[test]
    fn fixed_pads_short_encodings() {
        assert_eq!(encode_fixed(&[0; 8], 8), "aaaaaaaa");
        assert_eq!(encode_fixed(&[1], 8), "aaaaaaab");
        assert_eq!(encode_fixed(&[255], 4), "aaeh");
    }
}
