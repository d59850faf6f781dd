//! Byte-to-text decoding with an ordered list of candidate encodings.

use doki_shared::TextEncoding;

/// Decode `body` with the first encoding in `encodings` that accepts it.
///
/// Returns the text and the encoding used. `None` means every candidate
/// failed and the text was decoded as lossy UTF-8.
pub fn decode_body(body: &[u8], encodings: &[TextEncoding]) -> (String, Option<TextEncoding>) {
    for &encoding in encodings {
        if let Some(text) = decode_with(body, encoding) {
            return (text, Some(encoding));
        }
    }
    (String::from_utf8_lossy(body).into_owned(), None)
}

fn decode_with(body: &[u8], encoding: TextEncoding) -> Option<String> {
    match encoding {
        TextEncoding::Utf8 => std::str::from_utf8(body).ok().map(str::to_owned),
        TextEncoding::Windows1252 => body.iter().map(|&b| windows_1252_char(b)).collect(),
        // Every byte maps to the code point of the same value.
        TextEncoding::Latin1 => Some(body.iter().map(|&b| char::from(b)).collect()),
    }
}

/// windows-1252 differs from latin-1 only in 0x80..=0x9F; five of those bytes are unassigned.
fn windows_1252_char(byte: u8) -> Option<char> {
    let c = match byte {
        0x80 => '\u{20AC}',
        0x82 => '\u{201A}',
        0x83 => '\u{0192}',
        0x84 => '\u{201E}',
        0x85 => '\u{2026}',
        0x86 => '\u{2020}',
        0x87 => '\u{2021}',
        0x88 => '\u{02C6}',
        0x89 => '\u{2030}',
        0x8A => '\u{0160}',
        0x8B => '\u{2039}',
        0x8C => '\u{0152}',
        0x8E => '\u{017D}',
        0x91 => '\u{2018}',
        0x92 => '\u{2019}',
        0x93 => '\u{201C}',
        0x94 => '\u{201D}',
        0x95 => '\u{2022}',
        0x96 => '\u{2013}',
        0x97 => '\u{2014}',
        0x98 => '\u{02DC}',
        0x99 => '\u{2122}',
        0x9A => '\u{0161}',
        0x9B => '\u{203A}',
        0x9C => '\u{0153}',
        0x9E => '\u{017E}',
        0x9F => '\u{0178}',
        0x81 | 0x8D | 0x8F | 0x90 | 0x9D => return None,
        other => char::from(other),
    };
    Some(c)
}
