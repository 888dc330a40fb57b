//! Prebuilt pair font library.
//!
//! An alternative to on-the-fly generation: a directory of precomputed
//! single-substitution font files, each mapping exactly one source
//! codepoint to one target glyph, named by the codepoint pair
//! (`u0041_u0042.ttf` maps U+0041 to U+0042's glyph). Used for all-ASCII
//! substitutions, and for zero-width padding pairs when the input and
//! output entities differ in length.

use crate::error::{Error, Result};
use crate::fonts::cache::PairFontCache;
use crate::fonts::mapper::MappingAnalysis;
use std::path::PathBuf;
use std::sync::Arc;

/// One selected pair font.
#[derive(Debug, Clone)]
pub struct PairFont {
    pub source: char,
    pub target: char,
    /// Font file bytes, shared through the library cache
    pub bytes: Arc<Vec<u8>>,
}

/// A directory of precomputed single-pair fonts.
#[derive(Debug, Default)]
pub struct PairFontLibrary {
    root: PathBuf,
    cache: PairFontCache,
}

impl PairFontLibrary {
    /// Open a library rooted at a directory of pair font files.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: PairFontCache::new(),
        }
    }

    /// File name for a codepoint pair, e.g. `u0041_u0042.ttf`.
    pub fn file_name(source: char, target: char) -> String {
        format!("u{:04X}_u{:04X}.ttf", source as u32, target as u32)
    }

    /// Whether the library mode applies to an entity pair. Pair files are
    /// only precomputed for the ASCII range.
    pub fn supports(input_entity: &str, output_entity: &str) -> bool {
        input_entity.is_ascii() && output_entity.is_ascii()
    }

    /// Load the font file for one codepoint pair, reading it at most once
    /// per run.
    pub fn load(&self, source: char, target: char) -> Result<Arc<Vec<u8>>> {
        self.cache.get_or_build((source, target), || {
            let path = self.root.join(Self::file_name(source, target));
            log::debug!("loading prebuilt pair font {}", path.display());
            std::fs::read(&path).map_err(|e| {
                Error::Font(format!("prebuilt pair font {}: {}", path.display(), e))
            })
        })
    }

    /// Select the pair fonts covering an analysis: one per distinct
    /// non-identity `(source, target)` pair of the position map, padding
    /// pairs included.
    pub fn select(&self, analysis: &MappingAnalysis) -> Result<Vec<PairFont>> {
        let mut seen = std::collections::HashSet::new();
        let mut fonts = Vec::new();
        for &(source, target) in &analysis.position_map {
            if source == target || !seen.insert((source, target)) {
                continue;
            }
            fonts.push(PairFont {
                source,
                target,
                bytes: self.load(source, target)?,
            });
        }
        Ok(fonts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fonts::mapper::{analyze_mapping, ZERO_WIDTH};

    fn library_with(pairs: &[(char, char)]) -> (tempfile::TempDir, PairFontLibrary) {
        let dir = tempfile::tempdir().unwrap();
        for &(source, target) in pairs {
            let name = PairFontLibrary::file_name(source, target);
            std::fs::write(dir.path().join(name), [source as u8, target as u8]).unwrap();
        }
        let library = PairFontLibrary::new(dir.path());
        (dir, library)
    }

    #[test]
    fn test_file_name_scheme() {
        assert_eq!(PairFontLibrary::file_name('A', 'B'), "u0041_u0042.ttf");
        assert_eq!(
            PairFontLibrary::file_name('x', ZERO_WIDTH),
            "u0078_u200B.ttf"
        );
    }

    #[test]
    fn test_supports_ascii_only() {
        assert!(PairFontLibrary::supports("Russia", "Canada"));
        assert!(!PairFontLibrary::supports("Zürich", "Geneva"));
    }

    #[test]
    fn test_load_reads_and_caches() {
        let (_dir, library) = library_with(&[('A', 'B')]);
        let first = library.load('A', 'B').unwrap();
        let second = library.load('A', 'B').unwrap();
        assert_eq!(*first, vec![b'A', b'B']);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_missing_pair_is_an_error() {
        let (_dir, library) = library_with(&[]);
        let err = library.load('A', 'B');
        assert!(matches!(err, Err(Error::Font(_))));
    }

    #[test]
    fn test_select_deduplicates_and_pads() {
        let (_dir, library) = library_with(&[
            ('a', 'x'),
            ('b', 'y'),
            ('c', ZERO_WIDTH),
        ]);
        // repeated pairs collapse; the surplus 'c' maps to the zero-width pad
        let analysis = analyze_mapping("ababc", "xyxy");
        let fonts = library.select(&analysis).unwrap();
        let pairs: Vec<(char, char)> = fonts.iter().map(|f| (f.source, f.target)).collect();
        assert_eq!(pairs, vec![('a', 'x'), ('b', 'y'), ('c', ZERO_WIDTH)]);
    }

    #[test]
    fn test_select_skips_identity_positions() {
        let (_dir, library) = library_with(&[('a', 'x')]);
        let analysis = analyze_mapping("ab", "xb");
        let fonts = library.select(&analysis).unwrap();
        assert_eq!(fonts.len(), 1);
        assert_eq!((fonts[0].source, fonts[0].target), ('a', 'x'));
    }
}
