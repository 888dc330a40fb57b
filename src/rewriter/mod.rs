//! Content stream rewriting.
//!
//! Applies a [`ReplacementPlan`] to the original stream bytes. Operators
//! the plan does not touch are copied verbatim from their source spans;
//! affected operators are rebuilt element by element, re-encoding each
//! match segment through its recorded literal kind and synthesizing a
//! spacing adjustment when the replacement's rendered width differs from
//! the original, so total line width is preserved.
//!
//! Rewriting is all-or-nothing: any failure returns an error and no
//! partial byte stream.

use crate::config::RewriterConfig;
use crate::content::operators::{LiteralKind, Operator, TextElement};
use crate::content::records::{OperatorRecord, OperatorStream};
use crate::error::{Error, Result};
use crate::fonts::{FontMetrics, FontResources};
use crate::planner::{ReplacementPlan, Segment, SegmentRole};
use serde::Serialize;
use std::collections::HashMap;

/// Rewrite statistics, consumed by the pipeline for effectiveness scoring
/// and structured-log persistence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RewriteStats {
    /// Replacements performed
    pub replacements: usize,
    /// Targets found by planning
    pub targets_found: usize,
    /// Match segments that had to be emitted as their own operators
    pub isolated_segments: usize,
    /// Operators walked while planning
    pub operators_scanned: usize,
}

impl RewriteStats {
    /// Fold another run's statistics into this one.
    pub fn merge(&mut self, other: &RewriteStats) {
        self.replacements += other.replacements;
        self.targets_found += other.targets_found;
        self.isolated_segments += other.isolated_segments;
        self.operators_scanned += other.operators_scanned;
    }
}

/// A rewritten content stream with its statistics.
#[derive(Debug, Clone)]
pub struct RewriteOutcome {
    /// The full rewritten stream bytes
    pub bytes: Vec<u8>,
    /// Statistics for this plan application
    pub stats: RewriteStats,
}

/// Applies replacement plans to content stream bytes.
#[derive(Debug, Clone, Default)]
pub struct ContentStreamRewriter {
    config: RewriterConfig,
}

/// A byte region of one fragment claimed by a plan segment.
#[derive(Debug, Clone)]
struct Region {
    byte_start: usize,
    byte_end: usize,
    segment: usize,
    /// The segment's replacement is emitted at its first region only;
    /// later regions of a multi-fragment segment emit nothing.
    emit_replacement: bool,
}

/// One element of a rebuilt operator, before serialization.
#[derive(Debug, Clone)]
enum Item {
    Str {
        bytes: Vec<u8>,
        kind: LiteralKind,
        isolated: bool,
    },
    /// TJ positioning number (preserved offset or synthesized adjustment)
    Number(f32),
}

impl ContentStreamRewriter {
    /// Create a rewriter with the given configuration.
    pub fn new(config: RewriterConfig) -> Self {
        Self { config }
    }

    /// Apply a plan to the stream it was built against.
    ///
    /// `data` must be the same bytes `stream` was derived from; untouched
    /// operators round-trip from it byte-identically.
    pub fn apply(
        &self,
        plan: &ReplacementPlan,
        stream: &OperatorStream,
        data: &[u8],
        resources: &FontResources,
    ) -> Result<RewriteOutcome> {
        let regions = collect_regions(plan);

        // Rebuild every affected operator before splicing anything, so a
        // failure in a later operator leaves no partial output.
        let mut rebuilt: Vec<(std::ops::Range<usize>, String)> = Vec::new();
        for op_index in plan.affected_operators() {
            let record = stream.record_for(op_index).ok_or_else(|| {
                Error::PlanMismatch(format!("operator {op_index} has no record"))
            })?;
            let raw = stream.operators.get(op_index).ok_or_else(|| {
                Error::PlanMismatch(format!("operator {op_index} out of range"))
            })?;
            let text = self.rebuild_operator(record, &raw.op, &regions, plan, resources)?;
            rebuilt.push((raw.span.clone(), text));
        }
        rebuilt.sort_by_key(|(span, _)| span.start);

        let mut out = Vec::with_capacity(data.len());
        let mut cursor = 0usize;
        for (span, text) in &rebuilt {
            out.extend_from_slice(&data[cursor..span.start]);
            out.extend_from_slice(text.as_bytes());
            cursor = span.end;
        }
        out.extend_from_slice(&data[cursor..]);

        let isolated = plan
            .match_segments()
            .filter(|s| s.requires_isolation)
            .count();
        log::debug!(
            "rewrote {:?} -> {:?}: {} operators touched, {} isolated segments",
            plan.target_text,
            plan.replacement_text,
            rebuilt.len(),
            isolated
        );

        Ok(RewriteOutcome {
            bytes: out,
            stats: RewriteStats {
                replacements: 1,
                targets_found: 1,
                isolated_segments: isolated,
                operators_scanned: plan.operators_scanned,
            },
        })
    }

    /// Rebuild one affected operator as serialized content stream text.
    fn rebuild_operator(
        &self,
        record: &OperatorRecord,
        op: &Operator,
        regions: &HashMap<(usize, usize), Vec<Region>>,
        plan: &ReplacementPlan,
        resources: &FontResources,
    ) -> Result<String> {
        let font_name = record.font_name.clone().unwrap_or_default();
        let metrics = resources
            .get(&font_name)
            .ok_or_else(|| Error::Font(format!("no metrics for font resource '{font_name}'")))?;

        let elements: Vec<TextElement> = match op {
            Operator::Tj { text } | Operator::Quote { text } => {
                vec![TextElement::String(text.clone())]
            },
            Operator::DoubleQuote { text, .. } => vec![TextElement::String(text.clone())],
            Operator::TJ { array } => array.clone(),
            other => {
                return Err(Error::PlanMismatch(format!(
                    "operator {:?} is not a show-text operator",
                    other
                )))
            },
        };

        let mut items: Vec<Item> = Vec::new();
        let mut fragment_index = 0usize;
        for element in &elements {
            match element {
                TextElement::Offset(offset) => items.push(Item::Number(*offset)),
                TextElement::String(_) => {
                    let fragment =
                        record.fragments.get(fragment_index).ok_or_else(|| {
                            Error::PlanMismatch(format!(
                                "fragment {fragment_index} missing from record {}",
                                record.index
                            ))
                        })?;
                    self.rebuild_fragment(
                        record,
                        fragment_index,
                        &fragment.raw,
                        fragment.kind,
                        regions.get(&(record.index, fragment_index)),
                        plan,
                        metrics,
                        &font_name,
                        &mut items,
                    )?;
                    fragment_index += 1;
                },
            }
        }

        Ok(serialize_operator(op, &items))
    }

    /// Split one fragment's bytes at its region boundaries, emitting
    /// verbatim context and encoded replacements.
    #[allow(clippy::too_many_arguments)]
    fn rebuild_fragment(
        &self,
        record: &OperatorRecord,
        fragment_index: usize,
        raw: &[u8],
        kind: LiteralKind,
        regions: Option<&Vec<Region>>,
        plan: &ReplacementPlan,
        metrics: &FontMetrics,
        font_name: &str,
        items: &mut Vec<Item>,
    ) -> Result<()> {
        let empty = Vec::new();
        let regions = regions.unwrap_or(&empty);

        let mut pos = 0usize;
        for region in regions {
            if region.byte_start < pos || region.byte_end > raw.len() {
                return Err(Error::PlanMismatch(format!(
                    "segment region {}..{} overlaps fragment {} of operator {}",
                    region.byte_start, region.byte_end, fragment_index, record.index
                )));
            }
            if region.byte_start > pos {
                items.push(Item::Str {
                    bytes: raw[pos..region.byte_start].to_vec(),
                    kind,
                    isolated: false,
                });
            }

            let segment = &plan.segments[region.segment];
            match segment.role {
                SegmentRole::Context => items.push(Item::Str {
                    bytes: raw[region.byte_start..region.byte_end].to_vec(),
                    kind,
                    isolated: false,
                }),
                SegmentRole::Match if region.emit_replacement => {
                    let encoded = encode_replacement(segment, metrics, font_name)?;
                    if !encoded.is_empty() {
                        items.push(Item::Str {
                            bytes: encoded,
                            kind: segment.literal_kind,
                            isolated: segment.requires_isolation,
                        });
                    }
                    if let Some(adjustment) =
                        self.spacing_adjustment(segment, record, metrics, font_name)?
                    {
                        items.push(Item::Number(adjustment));
                    }
                },
                // later regions of a multi-fragment match emit nothing
                SegmentRole::Match => {},
            }
            pos = region.byte_end;
        }
        if pos < raw.len() {
            items.push(Item::Str {
                bytes: raw[pos..].to_vec(),
                kind,
                isolated: false,
            });
        }
        Ok(())
    }

    /// TJ number compensating the width difference between a match
    /// segment's original text and its replacement.
    ///
    /// A TJ entry `a` moves the pen by `-a/1000 * font_size`, so the
    /// compensating entry is `a = new_units - orig_units` in thousandths
    /// of text space, with character and word spacing deltas from changed
    /// counts folded in. Negative values widen the gap (the replacement
    /// was narrower).
    fn spacing_adjustment(
        &self,
        segment: &Segment,
        record: &OperatorRecord,
        metrics: &FontMetrics,
        font_name: &str,
    ) -> Result<Option<f32>> {
        if record.font_size == 0.0 {
            return Ok(None);
        }

        let mut orig_units = 0.0f32;
        let mut orig_chars = 0usize;
        let mut orig_spaces = 0usize;
        for fref in &segment.fragments {
            let record_fragment = record
                .fragments
                .get(fref.fragment_index)
                .ok_or_else(|| {
                    Error::PlanMismatch(format!(
                        "fragment {} missing from record {}",
                        fref.fragment_index, record.index
                    ))
                })?;
            for fc in &record_fragment.chars {
                if fc.byte_range.start >= fref.byte_start && fc.byte_range.end <= fref.byte_end {
                    orig_units += fc.width_units;
                    orig_chars += 1;
                    if metrics.word_space_applies(fc.ch) {
                        orig_spaces += 1;
                    }
                }
            }
        }

        let mut new_units = 0.0f32;
        let mut new_chars = 0usize;
        let mut new_spaces = 0usize;
        for ch in segment.replacement_text.chars() {
            new_units += metrics.width(ch).ok_or(Error::UnsupportedEncoding {
                font: font_name.to_string(),
                codepoint: ch as u32,
            })?;
            new_chars += 1;
            if metrics.word_space_applies(ch) {
                new_spaces += 1;
            }
        }

        let spacing_delta = (new_chars as f32 - orig_chars as f32) * record.char_space
            + (new_spaces as f32 - orig_spaces as f32) * record.word_space;
        let adjustment = new_units - orig_units + spacing_delta * 1000.0 / record.font_size;

        if adjustment.abs() < self.config.min_adjustment {
            Ok(None)
        } else {
            Ok(Some(adjustment))
        }
    }
}

/// Encode a segment's replacement text through the segment's font.
fn encode_replacement(
    segment: &Segment,
    metrics: &FontMetrics,
    font_name: &str,
) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(segment.replacement_text.len() * metrics.code_size);
    for ch in segment.replacement_text.chars() {
        let encoded = metrics.encode_char(ch).ok_or(Error::UnsupportedEncoding {
            font: font_name.to_string(),
            codepoint: ch as u32,
        })?;
        out.extend(encoded);
    }
    Ok(out)
}

/// Index plan segments by the operator fragment they claim bytes of.
fn collect_regions(plan: &ReplacementPlan) -> HashMap<(usize, usize), Vec<Region>> {
    let mut regions: HashMap<(usize, usize), Vec<Region>> = HashMap::new();
    for (segment, seg) in plan.segments.iter().enumerate() {
        for (i, fref) in seg.fragments.iter().enumerate() {
            regions
                .entry((fref.op_index, fref.fragment_index))
                .or_default()
                .push(Region {
                    byte_start: fref.byte_start,
                    byte_end: fref.byte_end,
                    segment,
                    emit_replacement: i == 0,
                });
        }
    }
    for list in regions.values_mut() {
        list.sort_by_key(|r| r.byte_start);
    }
    regions
}

/// Serialize rebuilt items back into operator text.
///
/// Adjacent non-isolated strings of one kind are merged; a run that ends
/// up as a single string with no numbers is emitted as `Tj`, anything
/// else as an array-show. Isolation-required segments get their own
/// show-text operator. `'` and `"` contribute their line-advance and
/// spacing side effects as explicit prefix operators.
fn serialize_operator(op: &Operator, items: &[Item]) -> String {
    let mut merged: Vec<Item> = Vec::new();
    for item in items {
        match (merged.last_mut(), item) {
            (
                Some(Item::Str {
                    bytes: prev,
                    kind: prev_kind,
                    isolated: false,
                }),
                Item::Str {
                    bytes,
                    kind,
                    isolated: false,
                },
            ) if *prev_kind == *kind => prev.extend_from_slice(bytes),
            _ => merged.push(item.clone()),
        }
    }

    let mut pieces: Vec<String> = Vec::new();
    let mut run: Vec<&Item> = Vec::new();
    for item in &merged {
        match item {
            Item::Str { isolated: true, .. } => {
                flush_run(&run, &mut pieces);
                run.clear();
                pieces.push(emit_run(&[item]));
            },
            _ => run.push(item),
        }
    }
    flush_run(&run, &mut pieces);

    let mut out = String::new();
    match op {
        Operator::Quote { .. } => out.push_str("T* "),
        Operator::DoubleQuote {
            word_space,
            char_space,
            ..
        } => {
            out.push_str(&format!(
                "{} Tw {} Tc T* ",
                format_number(*word_space),
                format_number(*char_space)
            ));
        },
        _ => {},
    }
    out.push_str(&pieces.join(" "));
    out
}

fn flush_run(run: &[&Item], pieces: &mut Vec<String>) {
    if !run.is_empty() {
        pieces.push(emit_run(run));
    }
}

fn emit_run(run: &[&Item]) -> String {
    if run.len() == 1 {
        if let Item::Str { bytes, kind, .. } = run[0] {
            return format!("{} Tj", serialize_string(bytes, *kind));
        }
    }
    let elements: Vec<String> = run
        .iter()
        .map(|item| match item {
            Item::Str { bytes, kind, .. } => serialize_string(bytes, *kind),
            Item::Number(n) => format_number(*n),
        })
        .collect();
    format!("[{}] TJ", elements.join(" "))
}

/// Serialize string bytes through a literal kind.
fn serialize_string(bytes: &[u8], kind: LiteralKind) -> String {
    match kind {
        LiteralKind::Byte => {
            let hex: String = bytes.iter().map(|b| format!("{:02X}", b)).collect();
            format!("<{}>", hex)
        },
        LiteralKind::Text | LiteralKind::Array => {
            let mut out = String::with_capacity(bytes.len() + 2);
            out.push('(');
            for &b in bytes {
                match b {
                    b'(' => out.push_str("\\("),
                    b')' => out.push_str("\\)"),
                    b'\\' => out.push_str("\\\\"),
                    b'\n' => out.push_str("\\n"),
                    b'\r' => out.push_str("\\r"),
                    b'\t' => out.push_str("\\t"),
                    0x20..=0x7E => out.push(b as char),
                    _ => out.push_str(&format!("\\{:03o}", b)),
                }
            }
            out.push(')');
            out
        },
    }
}

/// Format a number the way content streams write them: integers bare,
/// fractions trimmed to three decimals.
fn format_number(n: f32) -> String {
    if (n - n.round()).abs() < 1e-4 {
        format!("{}", n.round() as i64)
    } else {
        let s = format!("{:.3}", n);
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}
