//! Replacement planning.
//!
//! The planner locates a target substring inside a page's decoded operator
//! stream and produces a [`ReplacementPlan`]: an ordered list of
//! [`Segment`]s that tells the rewriter exactly which operator bytes to
//! replace, under which placement matrix and literal encoding, and how the
//! replacement text is distributed when the match crosses segment
//! boundaries.
//!
//! Plans are built per (target, replacement) pair and consumed exactly
//! once by the rewriter.

use crate::align::SpanAlignment;
use crate::config::PlannerConfig;
use crate::content::graphics_state::Matrix;
use crate::content::operators::LiteralKind;
use crate::content::records::OperatorStream;
use std::collections::{HashMap, HashSet};
use std::ops::Range;
use thiserror::Error;

const MATRIX_EPSILON: f32 = 1e-4;

/// Planning failure.
///
/// `NotFound` is recoverable: the caller falls back to an alternate
/// rendering path rather than failing the document.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    /// Target absent from the page, even after whitespace-relaxed search.
    #[error("target text {0:?} not found in content stream")]
    NotFound(String),

    /// An empty target cannot anchor a rewrite.
    #[error("target text is empty")]
    EmptyTarget,
}

/// Role of a plan segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentRole {
    /// Part of the matched target; its bytes are replaced.
    Match,
    /// Surrounding text inside an affected operator; re-emitted verbatim.
    Context,
}

/// A contiguous byte region of one operator fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentRef {
    /// Operator index in the page's operator sequence
    pub op_index: usize,
    /// Fragment index within the operator
    pub fragment_index: usize,
    /// First byte, relative to the fragment bytes
    pub byte_start: usize,
    /// Past-the-end byte, relative to the fragment bytes
    pub byte_end: usize,
}

/// One segment of a replacement plan.
#[derive(Debug, Clone)]
pub struct Segment {
    /// Match or context
    pub role: SegmentRole,
    /// Decoded text the segment covers
    pub text: String,
    /// Placement matrix of the segment's characters. Taken from the
    /// aligned span; falls back to the owning operator's text matrix when
    /// alignment geometry is missing (never to a default matrix).
    pub matrix: Matrix,
    /// Literal encoding the segment's bytes were written as
    pub literal_kind: LiteralKind,
    /// Half-open character offsets into the target substring.
    /// Empty (0..0) for context segments.
    pub target_start: usize,
    pub target_end: usize,
    /// Replacement text assigned to this segment (empty for context)
    pub replacement_text: String,
    /// Half-open character offsets into the full replacement string
    pub replacement_start: usize,
    pub replacement_end: usize,
    /// Operator byte regions the segment covers, in paint order
    pub fragments: Vec<FragmentRef>,
    /// The segment must be emitted as its own show-text operator because
    /// its run mixes literal kinds that cannot share one show call
    pub requires_isolation: bool,
    /// Maximum character range of the owning fragment a growing
    /// replacement may occupy without colliding with neighboring context.
    /// Extends over adjacent producer whitespace that the relaxed search
    /// excluded from the match.
    pub slice_max_extents: Range<usize>,
}

impl Segment {
    /// Number of target characters the segment covers.
    pub fn len(&self) -> usize {
        self.target_end - self.target_start
    }

    /// Whether the segment covers no target characters.
    pub fn is_empty(&self) -> bool {
        self.target_start == self.target_end
    }
}

/// An ordered replacement plan for one page.
///
/// Invariant: match segments' target ranges are contiguous,
/// non-overlapping, and together exactly cover the target substring.
#[derive(Debug, Clone)]
pub struct ReplacementPlan {
    /// Page the plan applies to
    pub page_index: usize,
    /// The matched target substring
    pub target_text: String,
    /// The full replacement string
    pub replacement_text: String,
    /// Segments in stream order
    pub segments: Vec<Segment>,
    /// Operators walked while searching
    pub operators_scanned: usize,
}

impl ReplacementPlan {
    /// Match segments in target order.
    pub fn match_segments(&self) -> impl Iterator<Item = &Segment> {
        self.segments
            .iter()
            .filter(|s| s.role == SegmentRole::Match)
    }

    /// Sorted, deduplicated indices of the operators the plan touches.
    pub fn affected_operators(&self) -> Vec<usize> {
        let mut ops: Vec<usize> = self
            .segments
            .iter()
            .flat_map(|s| s.fragments.iter().map(|f| f.op_index))
            .collect();
        ops.sort_unstable();
        ops.dedup();
        ops
    }
}

/// Builds replacement plans against a derived operator stream.
#[derive(Debug, Clone)]
pub struct MatchPlanner {
    config: PlannerConfig,
}

/// One decoded character flattened out of the operator stream, with
/// everything the search and segmentation need about it.
#[derive(Debug, Clone)]
struct Candidate {
    /// Index into `OperatorStream::records`
    record_pos: usize,
    /// Operator index in the raw sequence
    op_index: usize,
    fragment_index: usize,
    /// Character index within the fragment
    char_index: usize,
    /// Byte range relative to the fragment bytes
    byte_start: usize,
    byte_end: usize,
    ch: char,
    kind: LiteralKind,
    matrix: Matrix,
    /// Whitespace sitting in the leading or trailing run of its
    /// operator's text, skippable under relaxed search
    boundary_ws: bool,
}

impl MatchPlanner {
    /// Create a planner with the given configuration.
    pub fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    /// Locate `target_text` on the page and plan its replacement.
    ///
    /// Walks operators in order and anchors on the first run of fragment
    /// characters whose concatenated text equals the target. When the
    /// exact scan fails and relaxed matching is enabled, the scan is
    /// retried with whitespace at operator boundaries excluded from the
    /// match region.
    pub fn build_replacement_plan(
        &self,
        page_index: usize,
        target_text: &str,
        replacement_text: &str,
        stream: &OperatorStream,
        alignment: &SpanAlignment,
    ) -> Result<ReplacementPlan, PlanError> {
        let target: Vec<char> = target_text.chars().collect();
        if target.is_empty() {
            return Err(PlanError::EmptyTarget);
        }

        let cands = self.collect_candidates(stream, alignment);

        let matched = self
            .find_window(&cands, &target, false)
            .or_else(|| {
                if self.config.relax_boundary_whitespace {
                    self.find_window(&cands, &target, true)
                } else {
                    None
                }
            })
            .ok_or_else(|| PlanError::NotFound(target_text.to_string()))?;

        let segments = self.build_segments(&cands, &matched, replacement_text);

        Ok(ReplacementPlan {
            page_index,
            target_text: target_text.to_string(),
            replacement_text: replacement_text.to_string(),
            segments,
            operators_scanned: stream.operators.len(),
        })
    }

    /// Flatten every decoded character of every show-text operator.
    fn collect_candidates(
        &self,
        stream: &OperatorStream,
        alignment: &SpanAlignment,
    ) -> Vec<Candidate> {
        let mut cands = Vec::new();

        for (record_pos, record) in stream.records.iter().enumerate() {
            // Leading/trailing whitespace runs of the operator's full text
            let chars: Vec<char> = record.text().chars().collect();
            let lead = chars.iter().take_while(|c| c.is_whitespace()).count();
            let trail_start = if lead == chars.len() {
                lead
            } else {
                chars.len() - chars.iter().rev().take_while(|c| c.is_whitespace()).count()
            };

            let mut flat = 0usize;
            for (fragment_index, fragment) in record.fragments.iter().enumerate() {
                for (char_index, fc) in fragment.chars.iter().enumerate() {
                    let matrix = alignment
                        .slice_at(record.index, fragment_index, fc.byte_range.start)
                        .map(|(slice, _)| slice.matrix)
                        .unwrap_or(record.text_matrix);
                    cands.push(Candidate {
                        record_pos,
                        op_index: record.index,
                        fragment_index,
                        char_index,
                        byte_start: fc.byte_range.start,
                        byte_end: fc.byte_range.end,
                        ch: fc.ch,
                        kind: fragment.kind,
                        matrix,
                        boundary_ws: fc.ch.is_whitespace()
                            && (flat < lead || flat >= trail_start),
                    });
                    flat += 1;
                }
            }
        }

        cands
    }

    /// Find the first window of candidates matching the target.
    ///
    /// Returns the candidate indices consumed for target characters, in
    /// target order. Under relaxed search, boundary whitespace candidates
    /// inside the window are skipped and excluded from the result.
    fn find_window(
        &self,
        cands: &[Candidate],
        target: &[char],
        relaxed: bool,
    ) -> Option<Vec<usize>> {
        'starts: for start in 0..cands.len() {
            if relaxed && cands[start].boundary_ws {
                continue;
            }
            let mut matched = Vec::with_capacity(target.len());
            let mut fragments = HashSet::new();
            let mut t = 0usize;
            let mut i = start;
            while t < target.len() {
                if i >= cands.len() {
                    continue 'starts;
                }
                let cand = &cands[i];
                if relaxed && cand.boundary_ws {
                    i += 1;
                    continue;
                }
                if cand.ch != target[t] {
                    continue 'starts;
                }
                fragments.insert((cand.record_pos, cand.fragment_index));
                if fragments.len() > self.config.max_fragments_per_match {
                    continue 'starts;
                }
                matched.push(i);
                t += 1;
                i += 1;
            }
            return Some(matched);
        }
        None
    }

    /// Segment the matched window and its surrounding context, and
    /// distribute the replacement across the match segments.
    fn build_segments(
        &self,
        cands: &[Candidate],
        matched: &[usize],
        replacement_text: &str,
    ) -> Vec<Segment> {
        let target_pos: HashMap<usize, usize> = matched
            .iter()
            .enumerate()
            .map(|(t, &ci)| (ci, t))
            .collect();
        let affected: HashSet<usize> = matched
            .iter()
            .map(|&ci| cands[ci].record_pos)
            .collect();
        let mixed_kinds = matched
            .iter()
            .map(|&ci| cands[ci].kind)
            .collect::<HashSet<_>>()
            .len()
            > 1;

        let mut segments: Vec<Segment> = Vec::new();
        let mut group: Vec<usize> = Vec::new();

        let flush = |group: &mut Vec<usize>, segments: &mut Vec<Segment>| {
            if let Some(seg) = make_segment(cands, group, &target_pos, mixed_kinds) {
                segments.push(seg);
            }
            group.clear();
        };

        for (ci, cand) in cands.iter().enumerate() {
            if !affected.contains(&cand.record_pos) {
                flush(&mut group, &mut segments);
                continue;
            }
            let breaks = match group.last() {
                Some(&prev_ci) => {
                    let prev = &cands[prev_ci];
                    target_pos.contains_key(&ci) != target_pos.contains_key(&prev_ci)
                        || cand.kind != prev.kind
                        || cand.record_pos != prev.record_pos
                        || !cand.matrix.approx_eq(&prev.matrix, MATRIX_EPSILON)
                },
                None => false,
            };
            if breaks {
                flush(&mut group, &mut segments);
            }
            group.push(ci);
        }
        flush(&mut group, &mut segments);

        self.distribute_replacement(&mut segments, matched.len(), replacement_text);
        extend_slice_extents(cands, &target_pos, &mut segments);
        segments
    }

    /// Assign replacement character ranges to the match segments,
    /// proportionally to their original character counts. Cumulative
    /// rounding keeps the ranges a partition of the replacement.
    fn distribute_replacement(
        &self,
        segments: &mut [Segment],
        target_len: usize,
        replacement_text: &str,
    ) {
        let rep: Vec<char> = replacement_text.chars().collect();
        let match_count = segments
            .iter()
            .filter(|s| s.role == SegmentRole::Match)
            .count();

        let mut consumed = 0usize;
        let mut prev_end = 0usize;
        let mut seen = 0usize;
        for seg in segments.iter_mut() {
            if seg.role != SegmentRole::Match {
                continue;
            }
            seen += 1;
            consumed += seg.len();
            let end = if seen == match_count {
                rep.len()
            } else {
                ((consumed as f32 / target_len as f32) * rep.len() as f32).round() as usize
            };
            let end = end.clamp(prev_end, rep.len());
            seg.replacement_start = prev_end;
            seg.replacement_end = end;
            seg.replacement_text = rep[prev_end..end].iter().collect();
            prev_end = end;
        }
    }
}

/// Build one segment out of a group of consecutive candidate indices.
fn make_segment(
    cands: &[Candidate],
    group: &[usize],
    target_pos: &HashMap<usize, usize>,
    mixed_kinds: bool,
) -> Option<Segment> {
    let first_ci = *group.first()?;
    let first = &cands[first_ci];
    let last = &cands[*group.last()?];
    let is_match = target_pos.contains_key(&first_ci);

    let mut fragments: Vec<FragmentRef> = Vec::new();
    for &ci in group {
        let cand = &cands[ci];
        let extend = matches!(fragments.last(), Some(f)
            if f.op_index == cand.op_index
                && f.fragment_index == cand.fragment_index
                && f.byte_end == cand.byte_start);
        if extend {
            if let Some(f) = fragments.last_mut() {
                f.byte_end = cand.byte_end;
            }
        } else {
            fragments.push(FragmentRef {
                op_index: cand.op_index,
                fragment_index: cand.fragment_index,
                byte_start: cand.byte_start,
                byte_end: cand.byte_end,
            });
        }
    }

    let (target_start, target_end) = if is_match {
        (target_pos[&first_ci], target_pos[group.last()?] + 1)
    } else {
        (0, 0)
    };

    Some(Segment {
        role: if is_match {
            SegmentRole::Match
        } else {
            SegmentRole::Context
        },
        text: group.iter().map(|&ci| cands[ci].ch).collect(),
        matrix: first.matrix,
        literal_kind: first.kind,
        target_start,
        target_end,
        replacement_text: String::new(),
        replacement_start: 0,
        replacement_end: 0,
        fragments,
        requires_isolation: is_match && mixed_kinds,
        slice_max_extents: first.char_index..last.char_index + 1,
    })
}

/// Widen each match segment's extent over adjacent boundary whitespace the
/// relaxed search excluded, so a longer replacement may reclaim it.
fn extend_slice_extents(
    cands: &[Candidate],
    target_pos: &HashMap<usize, usize>,
    segments: &mut [Segment],
) {
    for seg in segments.iter_mut().filter(|s| s.role == SegmentRole::Match) {
        let (Some(first), Some(last)) = (seg.fragments.first(), seg.fragments.last()) else {
            continue;
        };

        for (ci, cand) in cands.iter().enumerate() {
            if target_pos.contains_key(&ci) || !cand.boundary_ws {
                continue;
            }
            let adjoins_start = cand.op_index == first.op_index
                && cand.fragment_index == first.fragment_index
                && cand.byte_end == first.byte_start
                && cand.char_index + 1 == seg.slice_max_extents.start;
            let adjoins_end = cand.op_index == last.op_index
                && cand.fragment_index == last.fragment_index
                && cand.byte_start == last.byte_end
                && cand.char_index == seg.slice_max_extents.end;
            if adjoins_start {
                seg.slice_max_extents.start = cand.char_index;
            } else if adjoins_end {
                seg.slice_max_extents.end = cand.char_index + 1;
            }
        }
    }
}
