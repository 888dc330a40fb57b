//! Glyph substitution font generation.
//!
//! Realizes a [`FontStrategy`] by raw sfnt table surgery: for each
//! `(source, target)` mapping, the target glyph's `glyf` record and
//! `hmtx` advance are copied onto the source glyph's slot. Copying the
//! raw record preserves hinting instructions and composite references
//! (glyph ids are stable, the full glyph set is kept), so the result
//! renders exactly like the target glyph did.
//!
//! Variable fonts are first instantiated to their default static face by
//! dropping the variation tables; the `glyf` records already hold the
//! default-instance outlines.

use crate::fonts::mapper::{FontStrategy, ZERO_WIDTH};
use byteorder::{BigEndian, ByteOrder};
use std::collections::HashMap;
use thiserror::Error;

/// Tables that make a font variable; dropping them leaves the static
/// default instance.
const VARIATION_TABLES: [&[u8; 4]; 8] = [
    b"fvar", b"gvar", b"avar", b"cvar", b"MVAR", b"HVAR", b"VVAR", b"STAT",
];

/// Font generation failure. Fatal only for the strategy being realized.
#[derive(Debug, Error)]
pub enum FontGenError {
    /// The base font could not be parsed at all
    #[error("Failed to parse base font: {0}")]
    Parse(String),

    /// The base font has no outlines in a format the generator can splice
    #[error("Base font has no TrueType (glyf) outlines")]
    NoGlyfOutlines,

    /// A required sfnt table is absent
    #[error("Base font is missing required table '{0}'")]
    MissingTable(&'static str),

    /// A mapped character has no glyph in the base font's cmap
    #[error("Base font has no glyph for character U+{0:04X}")]
    MissingGlyph(u32),

    /// The variable font could not be reduced to a static face
    #[error("Could not instance variable font to a static face: {0}")]
    Instancing(String),

    /// A table's contents do not match its declared layout
    #[error("Malformed '{table}' table: {reason}")]
    Malformed {
        table: &'static str,
        reason: String,
    },
}

/// What a glyph slot receives during substitution.
#[derive(Debug, Clone, Copy)]
enum SlotContent {
    /// Clone another glyph id's outline and metrics
    Glyph(u16),
    /// Empty outline with zero advance
    Empty,
}

/// Generates substitution fonts from one base font.
#[derive(Debug, Clone)]
pub struct FontGenerator {
    base: Vec<u8>,
}

impl FontGenerator {
    /// Create a generator over a TrueType/OpenType base font.
    pub fn new(base_font: Vec<u8>) -> Self {
        Self { base: base_font }
    }

    /// Realize one strategy as a complete font file.
    ///
    /// Each call starts from a pristine copy of the base font, so a
    /// previously realized strategy can never leak its mutated glyphs
    /// into this one.
    pub fn realize(&self, strategy: &FontStrategy) -> Result<Vec<u8>, FontGenError> {
        let mut tables = parse_tables(&self.base)?;

        if table(&tables, b"fvar").is_some() {
            log::debug!("instancing variable base font to its default static face");
            tables.retain(|(tag, _)| !VARIATION_TABLES.contains(&tag));
            if table(&tables, b"glyf").is_none() {
                return Err(FontGenError::Instancing(
                    "default instance has no glyf outlines".to_string(),
                ));
            }
        }
        if table(&tables, b"glyf").is_none() {
            return Err(FontGenError::NoGlyfOutlines);
        }

        let face = ttf_parser::Face::parse(&self.base, 0)
            .map_err(|e| FontGenError::Parse(e.to_string()))?;
        let num_glyphs = face.number_of_glyphs();

        let substitutions = self.resolve_slots(&face, strategy)?;

        let head = table(&tables, b"head").ok_or(FontGenError::MissingTable("head"))?;
        if head.len() < 54 {
            return Err(FontGenError::Malformed {
                table: "head",
                reason: format!("{} bytes, need 54", head.len()),
            });
        }
        let loca_format = BigEndian::read_i16(&head[50..52]);

        let loca = table(&tables, b"loca").ok_or(FontGenError::MissingTable("loca"))?;
        let offsets = parse_loca(loca, loca_format, num_glyphs)?;

        let glyf = table(&tables, b"glyf").ok_or(FontGenError::MissingTable("glyf"))?;
        let (new_glyf, new_offsets) = rebuild_glyf(glyf, &offsets, num_glyphs, &substitutions);

        let hhea = table(&tables, b"hhea").ok_or(FontGenError::MissingTable("hhea"))?;
        if hhea.len() < 36 {
            return Err(FontGenError::Malformed {
                table: "hhea",
                reason: format!("{} bytes, need 36", hhea.len()),
            });
        }
        let num_h_metrics = BigEndian::read_u16(&hhea[34..36]);
        let hmtx = table(&tables, b"hmtx").ok_or(FontGenError::MissingTable("hmtx"))?;
        let new_hmtx = rebuild_hmtx(hmtx, num_h_metrics, num_glyphs, &substitutions);

        let new_loca_format: i16 = if new_glyf.len() > 0x1FFFE { 1 } else { 0 };
        let new_loca = build_loca(&new_offsets, new_loca_format);

        let mut new_head = head.to_vec();
        BigEndian::write_u32(&mut new_head[8..12], 0); // checkSumAdjustment, fixed at the end
        BigEndian::write_i16(&mut new_head[50..52], new_loca_format);

        let mut new_hhea = hhea.to_vec();
        BigEndian::write_u16(&mut new_hhea[34..36], num_glyphs); // full metrics for every glyph

        replace_table(&mut tables, b"glyf", new_glyf);
        replace_table(&mut tables, b"loca", new_loca);
        replace_table(&mut tables, b"hmtx", new_hmtx);
        replace_table(&mut tables, b"head", new_head);
        replace_table(&mut tables, b"hhea", new_hhea);

        log::debug!(
            "realized strategy '{}': {} substitutions over {} glyphs",
            strategy.id,
            substitutions.len(),
            num_glyphs
        );

        Ok(write_sfnt(tables))
    }

    /// Turn the strategy's character mapping into glyph-slot content.
    fn resolve_slots(
        &self,
        face: &ttf_parser::Face,
        strategy: &FontStrategy,
    ) -> Result<HashMap<u16, SlotContent>, FontGenError> {
        let mut slots = HashMap::new();
        for (&source, &target) in &strategy.mapping {
            let source_gid = match face.glyph_index(source) {
                Some(gid) => gid.0,
                // synthetic padding positions have no slot in generated
                // fonts; prebuilt pair files carry them instead
                None if source == ZERO_WIDTH => continue,
                None => return Err(FontGenError::MissingGlyph(source as u32)),
            };
            let content = if target == ZERO_WIDTH {
                match face.glyph_index(target) {
                    Some(gid) => SlotContent::Glyph(gid.0),
                    None => SlotContent::Empty,
                }
            } else {
                SlotContent::Glyph(
                    face.glyph_index(target)
                        .ok_or(FontGenError::MissingGlyph(target as u32))?
                        .0,
                )
            };
            slots.insert(source_gid, content);
        }
        Ok(slots)
    }
}

fn table<'a>(tables: &'a [([u8; 4], Vec<u8>)], tag: &[u8; 4]) -> Option<&'a [u8]> {
    tables
        .iter()
        .find(|(t, _)| t == tag)
        .map(|(_, data)| data.as_slice())
}

fn replace_table(tables: &mut Vec<([u8; 4], Vec<u8>)>, tag: &[u8; 4], data: Vec<u8>) {
    match tables.iter_mut().find(|(t, _)| t == tag) {
        Some(entry) => entry.1 = data,
        None => tables.push((*tag, data)),
    }
}

/// Split an sfnt file into its tables.
fn parse_tables(data: &[u8]) -> Result<Vec<([u8; 4], Vec<u8>)>, FontGenError> {
    if data.len() < 12 {
        return Err(FontGenError::Parse("file shorter than sfnt header".to_string()));
    }
    let num_tables = BigEndian::read_u16(&data[4..6]) as usize;
    let mut tables = Vec::with_capacity(num_tables);
    for i in 0..num_tables {
        let entry = 12 + i * 16;
        if entry + 16 > data.len() {
            return Err(FontGenError::Parse("truncated table directory".to_string()));
        }
        let mut tag = [0u8; 4];
        tag.copy_from_slice(&data[entry..entry + 4]);
        let offset = BigEndian::read_u32(&data[entry + 8..entry + 12]) as usize;
        let length = BigEndian::read_u32(&data[entry + 12..entry + 16]) as usize;
        if offset + length > data.len() {
            return Err(FontGenError::Parse(format!(
                "table '{}' extends past end of file",
                String::from_utf8_lossy(&tag)
            )));
        }
        tables.push((tag, data[offset..offset + length].to_vec()));
    }
    Ok(tables)
}

fn parse_loca(data: &[u8], format: i16, num_glyphs: u16) -> Result<Vec<u32>, FontGenError> {
    let count = num_glyphs as usize + 1;
    let entry = if format == 0 { 2 } else { 4 };
    if data.len() < count * entry {
        return Err(FontGenError::Malformed {
            table: "loca",
            reason: format!("{} bytes for {} entries", data.len(), count),
        });
    }
    let offsets = (0..count)
        .map(|i| {
            if format == 0 {
                BigEndian::read_u16(&data[i * 2..i * 2 + 2]) as u32 * 2
            } else {
                BigEndian::read_u32(&data[i * 4..i * 4 + 4])
            }
        })
        .collect();
    Ok(offsets)
}

fn build_loca(offsets: &[u32], format: i16) -> Vec<u8> {
    let mut data = Vec::with_capacity(offsets.len() * if format == 0 { 2 } else { 4 });
    for &offset in offsets {
        if format == 0 {
            data.extend_from_slice(&((offset / 2) as u16).to_be_bytes());
        } else {
            data.extend_from_slice(&offset.to_be_bytes());
        }
    }
    data
}

/// Copy every glyph record, substituting the mapped slots.
fn rebuild_glyf(
    glyf: &[u8],
    offsets: &[u32],
    num_glyphs: u16,
    substitutions: &HashMap<u16, SlotContent>,
) -> (Vec<u8>, Vec<u32>) {
    let record = |gid: u16| -> &[u8] {
        let idx = gid as usize;
        if idx + 1 >= offsets.len() {
            return &[];
        }
        let start = offsets[idx] as usize;
        let end = (offsets[idx + 1] as usize).min(glyf.len());
        if start >= end {
            &[]
        } else {
            &glyf[start..end]
        }
    };

    let mut new_glyf: Vec<u8> = Vec::with_capacity(glyf.len());
    let mut new_offsets: Vec<u32> = Vec::with_capacity(num_glyphs as usize + 1);
    for gid in 0..num_glyphs {
        new_offsets.push(new_glyf.len() as u32);
        let bytes = match substitutions.get(&gid) {
            Some(SlotContent::Glyph(target)) => record(*target),
            Some(SlotContent::Empty) => &[],
            None => record(gid),
        };
        new_glyf.extend_from_slice(bytes);
        while new_glyf.len() % 4 != 0 {
            new_glyf.push(0);
        }
    }
    new_offsets.push(new_glyf.len() as u32);
    (new_glyf, new_offsets)
}

/// Rebuild hmtx with a full metric for every glyph, pulling each mapped
/// slot's advance and left side bearing from its substituted glyph.
fn rebuild_hmtx(
    hmtx: &[u8],
    num_h_metrics: u16,
    num_glyphs: u16,
    substitutions: &HashMap<u16, SlotContent>,
) -> Vec<u8> {
    let metric = |gid: u16| -> (u16, i16) {
        let idx = gid as usize;
        let count = num_h_metrics.max(1) as usize;
        if idx < count {
            let offset = idx * 4;
            if offset + 4 <= hmtx.len() {
                (
                    BigEndian::read_u16(&hmtx[offset..offset + 2]),
                    BigEndian::read_i16(&hmtx[offset + 2..offset + 4]),
                )
            } else {
                (0, 0)
            }
        } else {
            // tail glyphs share the last advance and carry their own lsb
            let last = (count - 1) * 4;
            let advance = if last + 2 <= hmtx.len() {
                BigEndian::read_u16(&hmtx[last..last + 2])
            } else {
                0
            };
            let lsb_offset = count * 4 + (idx - count) * 2;
            let lsb = if lsb_offset + 2 <= hmtx.len() {
                BigEndian::read_i16(&hmtx[lsb_offset..lsb_offset + 2])
            } else {
                0
            };
            (advance, lsb)
        }
    };

    let mut data = Vec::with_capacity(num_glyphs as usize * 4);
    for gid in 0..num_glyphs {
        let (advance, lsb) = match substitutions.get(&gid) {
            Some(SlotContent::Glyph(target)) => metric(*target),
            Some(SlotContent::Empty) => (0, 0),
            None => metric(gid),
        };
        data.extend_from_slice(&advance.to_be_bytes());
        data.extend_from_slice(&lsb.to_be_bytes());
    }
    data
}

/// Assemble tables into an sfnt file with correct directory checksums and
/// head checksum adjustment.
pub(crate) fn write_sfnt(mut tables: Vec<([u8; 4], Vec<u8>)>) -> Vec<u8> {
    tables.sort_by_key(|(tag, _)| *tag);
    for (_, data) in tables.iter_mut() {
        while data.len() % 4 != 0 {
            data.push(0);
        }
    }

    let num_tables = tables.len() as u16;
    let entry_selector = if num_tables > 0 {
        15 - num_tables.leading_zeros() as u16
    } else {
        0
    };
    let search_range = (1u16 << entry_selector) * 16;
    let range_shift = (num_tables * 16).saturating_sub(search_range);

    let mut out: Vec<u8> = Vec::new();
    out.extend_from_slice(&0x00010000u32.to_be_bytes());
    out.extend_from_slice(&num_tables.to_be_bytes());
    out.extend_from_slice(&search_range.to_be_bytes());
    out.extend_from_slice(&entry_selector.to_be_bytes());
    out.extend_from_slice(&range_shift.to_be_bytes());

    let mut offset = 12 + tables.len() * 16;
    for (tag, data) in &tables {
        out.extend_from_slice(tag);
        out.extend_from_slice(&table_checksum(data).to_be_bytes());
        out.extend_from_slice(&(offset as u32).to_be_bytes());
        out.extend_from_slice(&(data.len() as u32).to_be_bytes());
        offset += data.len();
    }
    for (_, data) in &tables {
        out.extend_from_slice(data);
    }

    fix_head_checksum(&mut out);
    out
}

fn table_checksum(data: &[u8]) -> u32 {
    let mut sum: u32 = 0;
    let mut i = 0;
    while i + 4 <= data.len() {
        sum = sum.wrapping_add(BigEndian::read_u32(&data[i..i + 4]));
        i += 4;
    }
    if i < data.len() {
        let mut last = [0u8; 4];
        last[..data.len() - i].copy_from_slice(&data[i..]);
        sum = sum.wrapping_add(u32::from_be_bytes(last));
    }
    sum
}

fn fix_head_checksum(out: &mut [u8]) {
    let num_tables = BigEndian::read_u16(&out[4..6]) as usize;
    for i in 0..num_tables {
        let entry = 12 + i * 16;
        if &out[entry..entry + 4] != b"head" {
            continue;
        }
        let table_offset = BigEndian::read_u32(&out[entry + 8..entry + 12]) as usize;
        let file_checksum = table_checksum(out);
        let adjustment = 0xB1B0AFBAu32.wrapping_sub(file_checksum);
        if table_offset + 12 <= out.len() {
            BigEndian::write_u32(&mut out[table_offset + 8..table_offset + 12], adjustment);
        }
        return;
    }
}
