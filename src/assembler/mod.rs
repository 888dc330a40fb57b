//! PDF document assembler.
//!
//! Assembles complete PDF documents with proper structure: header, body,
//! xref table, and trailer. Pages carry rewritten content streams,
//! substitution fonts are embedded as FontFile2 programs, and an optional
//! PNG snapshot of the original page can be composited beneath the text
//! as a visual fallback layer.

use crate::config::AssemblerConfig;
use crate::error::{Error, Result};
use std::io::Write;

/// Compress data for a FlateDecode filter.
fn compress_data(data: &[u8]) -> std::io::Result<Vec<u8>> {
    use flate2::write::ZlibEncoder;
    use flate2::Compression;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

/// A TrueType font to embed.
struct EmbeddedFont {
    /// Resource name the content stream selects it by (`Tf`)
    resource_name: String,
    bytes: Vec<u8>,
}

/// Internal page data.
struct PageData {
    width: f32,
    height: f32,
    content: Vec<u8>,
    /// PNG to draw beneath the text, decoded at write time
    snapshot: Option<Vec<u8>>,
}

/// Builds the final PDF from rewritten pages and generated fonts.
pub struct PdfAssembler {
    config: AssemblerConfig,
    pages: Vec<PageData>,
    fonts: Vec<EmbeddedFont>,
}

impl PdfAssembler {
    /// Create an assembler with default config.
    pub fn new() -> Self {
        Self::with_config(AssemblerConfig::default())
    }

    /// Create an assembler with custom config.
    pub fn with_config(config: AssemblerConfig) -> Self {
        Self {
            config,
            pages: Vec::new(),
            fonts: Vec::new(),
        }
    }

    /// Add a page with its rewritten content stream. Returns the page
    /// index for snapshot attachment.
    pub fn add_page(&mut self, width: f32, height: f32, content: Vec<u8>) -> usize {
        self.pages.push(PageData {
            width,
            height,
            content,
            snapshot: None,
        });
        self.pages.len() - 1
    }

    /// Attach a PNG snapshot rendered beneath the page's text.
    pub fn set_page_snapshot(&mut self, page_index: usize, png: Vec<u8>) -> Result<()> {
        let page = self
            .pages
            .get_mut(page_index)
            .ok_or_else(|| Error::Image(format!("no page {page_index} to attach snapshot to")))?;
        page.snapshot = Some(png);
        Ok(())
    }

    /// Embed a TrueType font under a resource name usable from `Tf`.
    pub fn add_font(&mut self, resource_name: impl Into<String>, bytes: Vec<u8>) {
        self.fonts.push(EmbeddedFont {
            resource_name: resource_name.into(),
            bytes,
        });
    }

    /// Build the complete PDF document.
    pub fn finish(self) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        let mut xref_offsets: Vec<(u32, usize)> = Vec::new();

        writeln!(output, "%PDF-1.7")?;
        output.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");

        // Object layout: catalog, pages tree, then per page (page,
        // content, optional image), then per font (dict, descriptor,
        // file), then info.
        let catalog_id = 1u32;
        let pages_id = 2u32;
        let mut next_id = 3u32;
        let mut alloc = |n: u32| {
            let id = next_id;
            next_id += n;
            id
        };

        struct PageIds {
            page: u32,
            content: u32,
            image: Option<u32>,
        }
        let page_ids: Vec<PageIds> = self
            .pages
            .iter()
            .map(|p| PageIds {
                page: alloc(1),
                content: alloc(1),
                image: p.snapshot.as_ref().map(|_| alloc(1)),
            })
            .collect();

        struct FontIds {
            dict: u32,
            descriptor: u32,
            file: u32,
        }
        let font_ids: Vec<FontIds> = self
            .fonts
            .iter()
            .map(|_| FontIds {
                dict: alloc(1),
                descriptor: alloc(1),
                file: alloc(1),
            })
            .collect();
        let info_id = alloc(1);
        let object_count = next_id;

        let mut write_obj = |output: &mut Vec<u8>, id: u32, body: &[u8]| -> Result<()> {
            xref_offsets.push((id, output.len()));
            writeln!(output, "{} 0 obj", id)?;
            output.extend_from_slice(body);
            writeln!(output, "\nendobj")?;
            Ok(())
        };

        let font_resource_entries: String = font_ids
            .iter()
            .zip(&self.fonts)
            .map(|(ids, font)| format!("/{} {} 0 R ", font.resource_name, ids.dict))
            .collect();

        write_obj(
            &mut output,
            catalog_id,
            format!("<< /Type /Catalog /Pages {} 0 R >>", pages_id).as_bytes(),
        )?;

        let kids: String = page_ids
            .iter()
            .map(|ids| format!("{} 0 R ", ids.page))
            .collect();
        write_obj(
            &mut output,
            pages_id,
            format!(
                "<< /Type /Pages /Kids [{}] /Count {} >>",
                kids.trim_end(),
                self.pages.len()
            )
            .as_bytes(),
        )?;

        for (page, ids) in self.pages.iter().zip(&page_ids) {
            let mut resources = format!("/Font << {}>>", font_resource_entries);
            let mut content = page.content.clone();
            if let Some(image_id) = ids.image {
                resources.push_str(&format!(" /XObject << /Im{} {} 0 R >>", ids.page, image_id));
                // snapshot painted first so the text draws over it
                let mut prefixed = format!(
                    "q {} 0 0 {} 0 0 cm /Im{} Do Q\n",
                    format_number(page.width),
                    format_number(page.height),
                    ids.page
                )
                .into_bytes();
                prefixed.extend_from_slice(&content);
                content = prefixed;
            }

            write_obj(
                &mut output,
                ids.page,
                format!(
                    "<< /Type /Page /Parent {} 0 R /MediaBox [0 0 {} {}] /Contents {} 0 R /Resources << {} >> >>",
                    pages_id,
                    format_number(page.width),
                    format_number(page.height),
                    ids.content,
                    resources
                )
                .as_bytes(),
            )?;

            let (bytes, filter) = if self.config.compress_streams {
                match compress_data(&content) {
                    Ok(compressed) => (compressed, " /Filter /FlateDecode"),
                    Err(_) => (content, ""),
                }
            } else {
                (content, "")
            };
            let mut body = format!("<< /Length {}{} >>\nstream\n", bytes.len(), filter).into_bytes();
            body.extend_from_slice(&bytes);
            body.extend_from_slice(b"\nendstream");
            write_obj(&mut output, ids.content, &body)?;

            if let (Some(image_id), Some(png)) = (ids.image, page.snapshot.as_ref()) {
                let body = snapshot_object(png)?;
                write_obj(&mut output, image_id, &body)?;
            }
        }

        for (font, ids) in self.fonts.iter().zip(&font_ids) {
            let (dict, descriptor) = font_objects(font, ids.descriptor, ids.file)?;
            write_obj(&mut output, ids.dict, dict.as_bytes())?;
            write_obj(&mut output, ids.descriptor, descriptor.as_bytes())?;

            let compressed = compress_data(&font.bytes)?;
            let mut body = format!(
                "<< /Length {} /Length1 {} /Filter /FlateDecode >>\nstream\n",
                compressed.len(),
                font.bytes.len()
            )
            .into_bytes();
            body.extend_from_slice(&compressed);
            body.extend_from_slice(b"\nendstream");
            write_obj(&mut output, ids.file, &body)?;
        }

        let producer = match &self.config.producer {
            Some(producer) => format!("<< /Producer ({}) >>", escape_pdf_string(producer)),
            None => "<< >>".to_string(),
        };
        write_obj(&mut output, info_id, producer.as_bytes())?;

        // xref table
        let xref_start = output.len();
        writeln!(output, "xref")?;
        writeln!(output, "0 {}", object_count)?;
        writeln!(output, "0000000000 65535 f ")?;
        xref_offsets.sort_by_key(|(id, _)| *id);
        for (_, offset) in &xref_offsets {
            writeln!(output, "{:010} 00000 n ", offset)?;
        }

        writeln!(output, "trailer")?;
        writeln!(
            output,
            "<< /Size {} /Root {} 0 R /Info {} 0 R >>",
            object_count, catalog_id, info_id
        )?;
        writeln!(output, "startxref")?;
        writeln!(output, "{}", xref_start)?;
        write!(output, "%%EOF")?;

        Ok(output)
    }

    /// Save the PDF to a file.
    pub fn save(self, path: impl AsRef<std::path::Path>) -> Result<()> {
        let bytes = self.finish()?;
        std::fs::write(path, bytes)?;
        Ok(())
    }
}

impl Default for PdfAssembler {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode a PNG snapshot into a DeviceRGB image XObject body.
fn snapshot_object(png: &[u8]) -> Result<Vec<u8>> {
    let image = image::load_from_memory(png)
        .map_err(|e| Error::Image(format!("snapshot PNG: {e}")))?
        .to_rgb8();
    let (width, height) = image.dimensions();
    let samples = compress_data(image.as_raw())?;

    let mut body = format!(
        "<< /Type /XObject /Subtype /Image /Width {} /Height {} /ColorSpace /DeviceRGB /BitsPerComponent 8 /Filter /FlateDecode /Length {} >>\nstream\n",
        width,
        height,
        samples.len()
    )
    .into_bytes();
    body.extend_from_slice(&samples);
    body.extend_from_slice(b"\nendstream");
    Ok(body)
}

/// Font dictionary and descriptor for an embedded TrueType program.
///
/// Widths and vertical metrics come from the font itself, scaled to the
/// 1000-unit glyph space PDF expects.
fn font_objects(font: &EmbeddedFont, descriptor_id: u32, file_id: u32) -> Result<(String, String)> {
    let face = ttf_parser::Face::parse(&font.bytes, 0)
        .map_err(|e| Error::Font(format!("embedded font '{}': {e}", font.resource_name)))?;
    let upem = face.units_per_em() as f32;
    let scale = |v: i16| (v as f32 * 1000.0 / upem).round() as i32;

    let widths: Vec<String> = (32u8..=126)
        .map(|code| {
            let advance = face
                .glyph_index(code as char)
                .and_then(|gid| face.glyph_hor_advance(gid))
                .map(|a| (a as f32 * 1000.0 / upem).round() as i32)
                .unwrap_or(0);
            advance.to_string()
        })
        .collect();

    let base_name: String = font
        .resource_name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    let base_name = if base_name.is_empty() {
        "Substitute".to_string()
    } else {
        base_name
    };

    let dict = format!(
        "<< /Type /Font /Subtype /TrueType /BaseFont /{} /FirstChar 32 /LastChar 126 /Widths [{}] /FontDescriptor {} 0 R >>",
        base_name,
        widths.join(" "),
        descriptor_id
    );

    let bbox = face.global_bounding_box();
    let descriptor = format!(
        "<< /Type /FontDescriptor /FontName /{} /Flags 4 /FontBBox [{} {} {} {}] /ItalicAngle 0 /Ascent {} /Descent {} /CapHeight {} /StemV 80 /FontFile2 {} 0 R >>",
        base_name,
        scale(bbox.x_min),
        scale(bbox.y_min),
        scale(bbox.x_max),
        scale(bbox.y_max),
        scale(face.ascender()),
        scale(face.descender()),
        scale(face.ascender()),
        file_id
    );

    Ok((dict, descriptor))
}

fn escape_pdf_string(s: &str) -> String {
    s.chars()
        .flat_map(|c| match c {
            '(' => "\\(".chars().collect::<Vec<_>>(),
            ')' => "\\)".chars().collect(),
            '\\' => "\\\\".chars().collect(),
            _ => vec![c],
        })
        .collect()
}

fn format_number(n: f32) -> String {
    if (n - n.round()).abs() < 1e-4 {
        format!("{}", n.round() as i64)
    } else {
        format!("{:.2}", n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fonts::test_font;

    fn uncompressed() -> PdfAssembler {
        PdfAssembler::with_config(AssemblerConfig::new().with_compress(false))
    }

    #[test]
    fn test_single_page_document_structure() {
        let mut assembler = uncompressed();
        assembler.add_page(612.0, 792.0, b"BT /F1 12 Tf (Hi) Tj ET".to_vec());
        let bytes = assembler.finish().unwrap();
        let content = String::from_utf8_lossy(&bytes);

        assert!(content.starts_with("%PDF-1.7"));
        assert!(content.contains("/Type /Catalog"));
        assert!(content.contains("/Type /Pages"));
        assert!(content.contains("/Count 1"));
        assert!(content.contains("[0 0 612 792]"));
        assert!(content.contains("(Hi) Tj"));
        assert!(content.contains("startxref"));
        assert!(content.ends_with("%%EOF"));
    }

    #[test]
    fn test_compression_wraps_content_stream() {
        let mut assembler = PdfAssembler::new();
        assembler.add_page(612.0, 792.0, b"BT (secret) Tj ET".to_vec());
        let bytes = assembler.finish().unwrap();
        let content = String::from_utf8_lossy(&bytes);

        assert!(content.contains("/Filter /FlateDecode"));
        assert!(!content.contains("(secret)"));
    }

    #[test]
    fn test_producer_written_to_info() {
        let mut assembler = PdfAssembler::with_config(
            AssemblerConfig::new().with_compress(false),
        );
        assembler.add_page(100.0, 100.0, Vec::new());
        let bytes = assembler.finish().unwrap();
        let content = String::from_utf8_lossy(&bytes);
        assert!(content.contains("/Producer (palimpsest"));
    }

    #[test]
    fn test_embedded_font_objects() {
        let mut assembler = uncompressed();
        assembler.add_page(612.0, 792.0, b"BT /Sub1 12 Tf (A) Tj ET".to_vec());
        assembler.add_font("Sub1", test_font::build());
        let bytes = assembler.finish().unwrap();
        let content = String::from_utf8_lossy(&bytes);

        assert!(content.contains("/Subtype /TrueType"));
        assert!(content.contains("/FontFile2"));
        assert!(content.contains("/Sub1"));
        assert!(content.contains("/Length1"));
    }

    #[test]
    fn test_snapshot_composites_beneath_text() {
        let mut png = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(image::RgbImage::new(2, 2))
            .write_to(&mut png, image::ImageFormat::Png)
            .unwrap();

        let mut assembler = uncompressed();
        let page = assembler.add_page(612.0, 792.0, b"BT (over) Tj ET".to_vec());
        assembler.set_page_snapshot(page, png.into_inner()).unwrap();
        let bytes = assembler.finish().unwrap();
        let content = String::from_utf8_lossy(&bytes);

        assert!(content.contains("/Subtype /Image"));
        assert!(content.contains("/DeviceRGB"));
        let do_pos = content.find("Do Q").unwrap();
        let text_pos = content.find("(over)").unwrap();
        assert!(do_pos < text_pos);
    }

    #[test]
    fn test_snapshot_for_missing_page_errors() {
        let mut assembler = uncompressed();
        let err = assembler.set_page_snapshot(3, vec![1, 2, 3]);
        assert!(matches!(err, Err(Error::Image(_))));
    }

    #[test]
    fn test_xref_entry_per_object() {
        let mut assembler = uncompressed();
        assembler.add_page(612.0, 792.0, Vec::new());
        let bytes = assembler.finish().unwrap();
        let content = String::from_utf8_lossy(&bytes);

        // catalog, pages, page, content, info, plus the free entry
        let xref = &content[content.find("xref").unwrap()..];
        let entries = xref.lines().filter(|l| l.ends_with(" n ") || l.ends_with(" f ")).count();
        assert_eq!(entries, 6);
    }
}
