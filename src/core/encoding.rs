// Text decoding for header strings.
//
// Strings in .acq files carry no encoding tag. Candidates are tried in
// order: UTF-8, then Windows-1252, then MacRoman; the first decode with no
// replacement characters and no C1 controls wins. (The single-byte codecs
// map every byte to *something*, so "decoded without errors" alone would
// make Windows-1252 always win -- C1 controls are the tell that the guess
// was wrong.)

use encoding_rs::{MACINTOSH, WINDOWS_1252};

use crate::core::error::ReadWarning;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize)]
pub enum TextEncoding {
    Utf8,
    Windows1252,
    MacRoman,
}

impl std::fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TextEncoding::Utf8 => write!(f, "utf-8"),
            TextEncoding::Windows1252 => write!(f, "windows-1252"),
            TextEncoding::MacRoman => write!(f, "mac-roman"),
        }
    }
}

fn clean(s: &str) -> bool {
    !s.chars().any(|c| ('\u{80}'..='\u{9f}').contains(&c))
}

/// Decodes header strings, remembering the most specific encoding any
/// string in the file needed. That encoding is reported on the `Datafile`.
#[derive(Debug)]
pub struct TextDecoder {
    chosen: TextEncoding,
}

impl TextDecoder {
    pub fn new() -> Self {
        Self {
            chosen: TextEncoding::Utf8,
        }
    }

    pub fn chosen(&self) -> TextEncoding {
        self.chosen
    }

    /// Decode a NUL-padded fixed-width field or raw text run.
    pub fn decode(&mut self, raw: &[u8], warnings: &mut Vec<ReadWarning>) -> String {
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        let raw = &raw[..end];

        if let Ok(s) = std::str::from_utf8(raw) {
            return s.to_string();
        }

        let (s, _, had_errors) = WINDOWS_1252.decode(raw);
        if !had_errors && clean(&s) {
            self.chosen = self.chosen.max(TextEncoding::Windows1252);
            return s.into_owned();
        }

        let (s, _, had_errors) = MACINTOSH.decode(raw);
        if !had_errors && clean(&s) {
            self.chosen = self.chosen.max(TextEncoding::MacRoman);
            return s.into_owned();
        }

        let decoded = String::from_utf8_lossy(raw).into_owned();
        warnings.push(ReadWarning::LossyText {
            raw: raw.to_vec(),
            decoded: decoded.clone(),
        });
        decoded
    }
}

impl Default for TextDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_stays_utf8() {
        let mut dec = TextDecoder::new();
        let mut warnings = Vec::new();
        assert_eq!(dec.decode(b"EDA100C\0\0\0", &mut warnings), "EDA100C");
        assert_eq!(dec.chosen(), TextEncoding::Utf8);
        assert!(warnings.is_empty());
    }

    #[test]
    fn latin_bytes_fall_back_to_windows_1252() {
        let mut dec = TextDecoder::new();
        let mut warnings = Vec::new();
        // 0xB5 MICRO SIGN, 0x56 'V': "µV" in windows-1252, invalid UTF-8.
        assert_eq!(dec.decode(&[0xB5, 0x56, 0x00], &mut warnings), "\u{b5}V");
        assert_eq!(dec.chosen(), TextEncoding::Windows1252);
        assert!(warnings.is_empty());
    }

    #[test]
    fn c1_controls_push_past_windows_1252() {
        let mut dec = TextDecoder::new();
        let mut warnings = Vec::new();
        // 0x8D has no windows-1252 glyph (decodes to a C1 control) but is
        // a printable character in MacRoman.
        let s = dec.decode(&[0x8D, 0x41], &mut warnings);
        assert_eq!(dec.chosen(), TextEncoding::MacRoman);
        assert!(warnings.is_empty());
        assert!(!s.is_empty());
    }

    #[test]
    fn nul_padding_is_trimmed_before_decoding() {
        let mut dec = TextDecoder::new();
        let mut warnings = Vec::new();
        assert_eq!(dec.decode(b"mV\0garbage", &mut warnings), "mV");
    }
}
