/*!
 Decoding for the modified UTF-8 encoding Java uses for names and strings.

 Modified UTF-8 differs from standard UTF-8 in two ways: `NUL` is written as the two bytes `0xC0 0x80`,
 and characters outside the Basic Multilingual Plane are written as two encoded UTF-16 surrogates
 of three bytes each instead of a single four byte sequence.
*/

/// Decode modified UTF-8 bytes into a [`String`]
///
/// Returns [`None`] if the bytes are not a valid modified UTF-8 sequence.
pub fn decode(bytes: &[u8]) -> Option<String> {
    // Most names are plain ASCII
    if bytes.iter().all(|byte| (0x01..0x80).contains(byte)) {
        return std::str::from_utf8(bytes).ok().map(str::to_string);
    }

    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut idx = 0;
    while idx < bytes.len() {
        let first = bytes[idx];
        match first {
            0x00..=0x7F => {
                units.push(u16::from(first));
                idx += 1;
            }
            0xC0..=0xDF => {
                let second = continuation(bytes.get(idx + 1))?;
                units.push((u16::from(first & 0x1F) << 6) | second);
                idx += 2;
            }
            0xE0..=0xEF => {
                let second = continuation(bytes.get(idx + 1))?;
                let third = continuation(bytes.get(idx + 2))?;
                units.push((u16::from(first & 0x0F) << 12) | (second << 6) | third);
                idx += 3;
            }
            // Four byte sequences and stray continuation bytes never appear in modified UTF-8
            _ => return None,
        }
    }

    String::from_utf16(&units).ok()
}

/// Get the payload bits of a continuation byte
fn continuation(byte: Option<&u8>) -> Option<u16> {
    match byte {
        Some(byte) if byte & 0xC0 == 0x80 => Some(u16::from(byte & 0x3F)),
        _ => None,
    }
}
