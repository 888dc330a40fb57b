//! Synthetic three-glyph TrueType font for tests.
//!
//! Glyph 0 is `.notdef` (empty), glyph 1 is 'A' (advance 500), glyph 2 is
//! 'B' (advance 600). Outlines are simple triangles so substitution
//! results are easy to tell apart.

use crate::fonts::generator::write_sfnt;

/// One simple glyph record: a single closed triangle contour, padded to
/// a 4-byte boundary.
fn triangle(x_deltas: [i16; 3], y_deltas: [i16; 3], x_max: i16, y_max: i16) -> Vec<u8> {
    let mut g = Vec::new();
    g.extend_from_slice(&1i16.to_be_bytes()); // numberOfContours
    g.extend_from_slice(&0i16.to_be_bytes()); // xMin
    g.extend_from_slice(&0i16.to_be_bytes()); // yMin
    g.extend_from_slice(&x_max.to_be_bytes());
    g.extend_from_slice(&y_max.to_be_bytes());
    g.extend_from_slice(&2u16.to_be_bytes()); // endPtsOfContours
    g.extend_from_slice(&0u16.to_be_bytes()); // instructionLength
    g.extend_from_slice(&[0x01, 0x01, 0x01]); // on-curve, 16-bit deltas
    for d in x_deltas {
        g.extend_from_slice(&d.to_be_bytes());
    }
    for d in y_deltas {
        g.extend_from_slice(&d.to_be_bytes());
    }
    while g.len() % 4 != 0 {
        g.push(0);
    }
    g
}

fn head(index_to_loc_format: i16) -> Vec<u8> {
    let mut t = Vec::with_capacity(54);
    t.extend_from_slice(&0x00010000u32.to_be_bytes()); // version
    t.extend_from_slice(&0u32.to_be_bytes()); // fontRevision
    t.extend_from_slice(&0u32.to_be_bytes()); // checkSumAdjustment
    t.extend_from_slice(&0x5F0F3CF5u32.to_be_bytes()); // magicNumber
    t.extend_from_slice(&0u16.to_be_bytes()); // flags
    t.extend_from_slice(&1000u16.to_be_bytes()); // unitsPerEm
    t.extend_from_slice(&0i64.to_be_bytes()); // created
    t.extend_from_slice(&0i64.to_be_bytes()); // modified
    t.extend_from_slice(&0i16.to_be_bytes()); // xMin
    t.extend_from_slice(&0i16.to_be_bytes()); // yMin
    t.extend_from_slice(&700i16.to_be_bytes()); // xMax
    t.extend_from_slice(&700i16.to_be_bytes()); // yMax
    t.extend_from_slice(&0u16.to_be_bytes()); // macStyle
    t.extend_from_slice(&8u16.to_be_bytes()); // lowestRecPPEM
    t.extend_from_slice(&2i16.to_be_bytes()); // fontDirectionHint
    t.extend_from_slice(&index_to_loc_format.to_be_bytes());
    t.extend_from_slice(&0i16.to_be_bytes()); // glyphDataFormat
    t
}

fn hhea(num_h_metrics: u16) -> Vec<u8> {
    let mut t = Vec::with_capacity(36);
    t.extend_from_slice(&0x00010000u32.to_be_bytes()); // version
    t.extend_from_slice(&800i16.to_be_bytes()); // ascender
    t.extend_from_slice(&(-200i16).to_be_bytes()); // descender
    t.extend_from_slice(&0i16.to_be_bytes()); // lineGap
    t.extend_from_slice(&600u16.to_be_bytes()); // advanceWidthMax
    t.extend_from_slice(&0i16.to_be_bytes()); // minLeftSideBearing
    t.extend_from_slice(&0i16.to_be_bytes()); // minRightSideBearing
    t.extend_from_slice(&700i16.to_be_bytes()); // xMaxExtent
    t.extend_from_slice(&1i16.to_be_bytes()); // caretSlopeRise
    t.extend_from_slice(&0i16.to_be_bytes()); // caretSlopeRun
    t.extend_from_slice(&0i16.to_be_bytes()); // caretOffset
    t.extend_from_slice(&[0u8; 8]); // reserved
    t.extend_from_slice(&0i16.to_be_bytes()); // metricDataFormat
    t.extend_from_slice(&num_h_metrics.to_be_bytes());
    t
}

fn maxp(num_glyphs: u16) -> Vec<u8> {
    let mut t = Vec::with_capacity(32);
    t.extend_from_slice(&0x00010000u32.to_be_bytes());
    t.extend_from_slice(&num_glyphs.to_be_bytes());
    t.extend_from_slice(&16u16.to_be_bytes()); // maxPoints
    t.extend_from_slice(&4u16.to_be_bytes()); // maxContours
    t.extend_from_slice(&0u16.to_be_bytes()); // maxCompositePoints
    t.extend_from_slice(&0u16.to_be_bytes()); // maxCompositeContours
    t.extend_from_slice(&1u16.to_be_bytes()); // maxZones
    t.extend_from_slice(&0u16.to_be_bytes()); // maxTwilightPoints
    t.extend_from_slice(&0u16.to_be_bytes()); // maxStorage
    t.extend_from_slice(&0u16.to_be_bytes()); // maxFunctionDefs
    t.extend_from_slice(&0u16.to_be_bytes()); // maxInstructionDefs
    t.extend_from_slice(&0u16.to_be_bytes()); // maxStackElements
    t.extend_from_slice(&0u16.to_be_bytes()); // maxSizeOfInstructions
    t.extend_from_slice(&0u16.to_be_bytes()); // maxComponentElements
    t.extend_from_slice(&0u16.to_be_bytes()); // maxComponentDepth
    t
}

/// Format 4 cmap mapping 'A'..'B' to glyphs 1..2.
fn cmap() -> Vec<u8> {
    let seg_count_x2 = 4u16; // one real segment plus the sentinel
    let mut sub = Vec::new();
    sub.extend_from_slice(&4u16.to_be_bytes()); // format
    sub.extend_from_slice(&30u16.to_be_bytes()); // length: 14 + 2 segments * 8
    sub.extend_from_slice(&0u16.to_be_bytes()); // language
    sub.extend_from_slice(&seg_count_x2.to_be_bytes());
    sub.extend_from_slice(&4u16.to_be_bytes()); // searchRange
    sub.extend_from_slice(&1u16.to_be_bytes()); // entrySelector
    sub.extend_from_slice(&0u16.to_be_bytes()); // rangeShift
    sub.extend_from_slice(&0x42u16.to_be_bytes()); // endCode[0]
    sub.extend_from_slice(&0xFFFFu16.to_be_bytes()); // endCode[1]
    sub.extend_from_slice(&0u16.to_be_bytes()); // reservedPad
    sub.extend_from_slice(&0x41u16.to_be_bytes()); // startCode[0]
    sub.extend_from_slice(&0xFFFFu16.to_be_bytes()); // startCode[1]
    sub.extend_from_slice(&(-64i16).to_be_bytes()); // idDelta[0]: 0x41 -> 1
    sub.extend_from_slice(&1i16.to_be_bytes()); // idDelta[1]
    sub.extend_from_slice(&0u16.to_be_bytes()); // idRangeOffset[0]
    sub.extend_from_slice(&0u16.to_be_bytes()); // idRangeOffset[1]

    let mut t = Vec::new();
    t.extend_from_slice(&0u16.to_be_bytes()); // version
    t.extend_from_slice(&1u16.to_be_bytes()); // numTables
    t.extend_from_slice(&3u16.to_be_bytes()); // platformID
    t.extend_from_slice(&1u16.to_be_bytes()); // encodingID
    t.extend_from_slice(&12u32.to_be_bytes()); // subtable offset
    t.extend_from_slice(&sub);
    t
}

/// Build the complete fixture font.
pub fn build() -> Vec<u8> {
    let glyph_a = triangle([0, 700, -350], [0, 0, 700], 700, 700);
    let glyph_b = triangle([0, 600, 0], [0, 0, 600], 600, 600);

    let mut glyf = Vec::new();
    let offsets = [
        0u32,
        0,
        glyph_a.len() as u32,
        (glyph_a.len() + glyph_b.len()) as u32,
    ];
    glyf.extend_from_slice(&glyph_a);
    glyf.extend_from_slice(&glyph_b);

    let mut loca = Vec::new();
    for offset in offsets {
        loca.extend_from_slice(&((offset / 2) as u16).to_be_bytes());
    }

    let mut hmtx = Vec::new();
    for (advance, lsb) in [(0u16, 0i16), (500, 0), (600, 0)] {
        hmtx.extend_from_slice(&advance.to_be_bytes());
        hmtx.extend_from_slice(&lsb.to_be_bytes());
    }

    write_sfnt(vec![
        (*b"cmap", cmap()),
        (*b"glyf", glyf),
        (*b"head", head(0)),
        (*b"hhea", hhea(3)),
        (*b"hmtx", hmtx),
        (*b"loca", loca),
        (*b"maxp", maxp(3)),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_font_parses() {
        let font = build();
        let face = ttf_parser::Face::parse(&font, 0).unwrap();
        assert_eq!(face.number_of_glyphs(), 3);
        assert_eq!(face.glyph_index('A').map(|g| g.0), Some(1));
        assert_eq!(face.glyph_index('B').map(|g| g.0), Some(2));
        assert_eq!(face.glyph_hor_advance(ttf_parser::GlyphId(1)), Some(500));
        assert_eq!(face.glyph_hor_advance(ttf_parser::GlyphId(2)), Some(600));
    }
}
