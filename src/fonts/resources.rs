//! Per-page font resource tables.
//!
//! The PDF container reader is an external collaborator: it hands the
//! engine a [`FontResources`] table describing, for each font resource
//! name appearing in `Tf` operators, how to decode shown bytes into text,
//! how to encode text back into bytes, and the glyph advance widths in
//! thousandths of text space.

use std::collections::HashMap;
use std::ops::Range;

/// Metrics and encoding for one font resource.
#[derive(Debug, Clone)]
pub struct FontMetrics {
    /// Bytes per character code (1 for simple fonts, 2 for CID fonts)
    pub code_size: usize,
    /// Glyph widths in thousandths of text space, keyed by character
    widths: HashMap<char, f32>,
    /// Width used for characters absent from the width table
    default_width: Option<f32>,
}

impl FontMetrics {
    /// Create metrics for a simple single-byte font with explicit widths.
    pub fn simple(widths: HashMap<char, f32>) -> Self {
        Self {
            code_size: 1,
            widths,
            default_width: None,
        }
    }

    /// Create metrics for a 2-byte (CID) font with explicit widths.
    pub fn cid(widths: HashMap<char, f32>, default_width: f32) -> Self {
        Self {
            code_size: 2,
            widths,
            default_width: Some(default_width),
        }
    }

    /// Create a single-byte font where every printable character has the
    /// same advance. Handy for tests and synthetic fixtures.
    pub fn monospaced(width: f32) -> Self {
        let widths = (0x20u8..=0x7E)
            .map(|b| (b as char, width))
            .collect();
        Self {
            code_size: 1,
            widths,
            default_width: Some(width),
        }
    }

    /// Override the width of a single character (builder-style).
    pub fn with_width(mut self, ch: char, width: f32) -> Self {
        self.widths.insert(ch, width);
        self
    }

    /// Advance width for a character, in thousandths of text space.
    pub fn width(&self, ch: char) -> Option<f32> {
        self.widths.get(&ch).copied().or(self.default_width)
    }

    /// Summed advance width of a string, in thousandths of text space.
    ///
    /// Returns `None` when any character has no width entry and no
    /// default, which means the font cannot paint the string at all.
    pub fn text_width(&self, text: &str) -> Option<f32> {
        text.chars().map(|ch| self.width(ch)).sum()
    }

    /// Decode shown bytes into characters with their relative byte ranges.
    ///
    /// Simple fonts decode one byte per character (Latin-1, matching the
    /// identity-ish encodings this boundary receives already normalized);
    /// CID fonts decode big-endian 2-byte codes. A trailing odd byte in a
    /// CID string decodes as its own code, which is what lenient viewers
    /// do with truncated strings.
    pub fn decode(&self, bytes: &[u8]) -> Vec<(char, Range<usize>)> {
        let mut out = Vec::new();
        if self.code_size == 1 {
            for (i, &b) in bytes.iter().enumerate() {
                out.push((b as char, i..i + 1));
            }
        } else {
            let mut i = 0;
            while i < bytes.len() {
                if i + 1 < bytes.len() {
                    let code = u16::from_be_bytes([bytes[i], bytes[i + 1]]) as u32;
                    let ch = char::from_u32(code).unwrap_or('\u{FFFD}');
                    out.push((ch, i..i + 2));
                    i += 2;
                } else {
                    out.push((bytes[i] as char, i..i + 1));
                    i += 1;
                }
            }
        }
        out
    }

    /// Decode shown bytes into a string.
    pub fn decode_text(&self, bytes: &[u8]) -> String {
        self.decode(bytes).into_iter().map(|(ch, _)| ch).collect()
    }

    /// Encode a character back into shown bytes.
    ///
    /// Returns `None` when the font has no slot for the character; the
    /// rewriter turns that into an `UnsupportedEncoding` abort.
    pub fn encode_char(&self, ch: char) -> Option<Vec<u8>> {
        if self.width(ch).is_none() {
            return None;
        }
        let code = ch as u32;
        if self.code_size == 1 {
            if code > 0xFF {
                return None;
            }
            Some(vec![code as u8])
        } else {
            if code > 0xFFFF {
                return None;
            }
            Some((code as u16).to_be_bytes().to_vec())
        }
    }

    /// Encode a whole string, or `None` if any character is unsupported.
    pub fn encode_text(&self, text: &str) -> Option<Vec<u8>> {
        let mut out = Vec::with_capacity(text.len() * self.code_size);
        for ch in text.chars() {
            out.extend(self.encode_char(ch)?);
        }
        Some(out)
    }

    /// Whether word spacing (Tw) applies to this character.
    ///
    /// Per ISO 32000-1 §9.3.3 word spacing applies only to byte 32 in
    /// single-byte encodings.
    pub fn word_space_applies(&self, ch: char) -> bool {
        self.code_size == 1 && ch == ' '
    }
}

/// Font resource table for one page.
#[derive(Debug, Clone, Default)]
pub struct FontResources {
    fonts: HashMap<String, FontMetrics>,
}

impl FontResources {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a font resource (builder-style).
    pub fn with_font(mut self, name: impl Into<String>, metrics: FontMetrics) -> Self {
        self.fonts.insert(name.into(), metrics);
        self
    }

    /// Register a font resource.
    pub fn insert(&mut self, name: impl Into<String>, metrics: FontMetrics) {
        self.fonts.insert(name.into(), metrics);
    }

    /// Look up a font resource by name.
    pub fn get(&self, name: &str) -> Option<&FontMetrics> {
        self.fonts.get(name)
    }

    /// Resource names known to this table.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fonts.keys().map(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monospaced_widths() {
        let font = FontMetrics::monospaced(500.0);
        assert_eq!(font.width('A'), Some(500.0));
        assert_eq!(font.text_width("abc"), Some(1500.0));
    }

    #[test]
    fn test_simple_decode_roundtrip() {
        let font = FontMetrics::monospaced(500.0);
        let decoded = font.decode(b"Hi");
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0], ('H', 0..1));
        assert_eq!(decoded[1], ('i', 1..2));
        assert_eq!(font.encode_text("Hi"), Some(b"Hi".to_vec()));
    }

    #[test]
    fn test_cid_decode() {
        let font = FontMetrics::cid(HashMap::new(), 1000.0);
        let decoded = font.decode(&[0x00, 0x41, 0x00, 0x42]);
        assert_eq!(decoded[0].0, 'A');
        assert_eq!(decoded[0].1, 0..2);
        assert_eq!(decoded[1].0, 'B');
    }

    #[test]
    fn test_encode_unsupported() {
        let font = FontMetrics::simple(HashMap::from([('A', 600.0)]));
        assert_eq!(font.encode_char('A'), Some(vec![b'A']));
        assert_eq!(font.encode_char('B'), None);
        assert_eq!(font.encode_text("AB"), None);
    }

    #[test]
    fn test_word_space_applies() {
        let simple = FontMetrics::monospaced(500.0);
        assert!(simple.word_space_applies(' '));
        assert!(!simple.word_space_applies('A'));
        let cid = FontMetrics::cid(HashMap::new(), 1000.0);
        assert!(!cid.word_space_applies(' '));
    }

    #[test]
    fn test_resources_lookup() {
        let resources =
            FontResources::new().with_font("F1", FontMetrics::monospaced(500.0));
        assert!(resources.get("F1").is_some());
        assert!(resources.get("F2").is_none());
    }
}
