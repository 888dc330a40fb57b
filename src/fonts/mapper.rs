//! Character mapping analysis.
//!
//! Decides how the characters of an input entity map onto the glyphs of
//! an output entity, and how many fonts are needed to render the mapping.
//! A font can carry only one substitute glyph per source character, so a
//! source character that must display differently at different positions
//! (a conflicting duplicate) forces additional font strategies.

use serde::Serialize;
use std::collections::HashMap;

/// Codepoint used to pad entities of unequal length: surplus input
/// characters map to it, surplus output characters hang off it.
pub const ZERO_WIDTH: char = '\u{200B}';

/// Shape of a mapping analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// No source character appears at more than one position
    SingleFont,
    /// Exactly one source character appears exactly twice
    DuplicateSimple,
    /// Any other duplication pattern
    DuplicateComplex,
}

/// A source character appearing at two or more positions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateInfo {
    /// The duplicated source character
    pub character: char,
    /// Every position it appears at, ascending
    pub positions: Vec<usize>,
    /// The output character required at each of those positions
    pub outputs: Vec<char>,
    /// Whether the occurrences require different outputs
    pub conflicting: bool,
}

/// One font's worth of character substitutions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FontStrategy {
    /// Stable identifier, usable as a font resource suffix
    pub id: String,
    /// Source character to displayed character. Single target per source.
    pub mapping: HashMap<char, char>,
    /// Entity positions this strategy renders, ascending
    pub positions: Vec<usize>,
    /// Selection priority; lowest wins when two strategies claim a position
    pub priority: usize,
    pub description: String,
}

impl FontStrategy {
    /// Whether this strategy renders the given entity position.
    pub fn covers(&self, position: usize) -> bool {
        self.positions.binary_search(&position).is_ok()
    }
}

/// Full analysis of an input/output entity pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MappingAnalysis {
    pub input_entity: String,
    pub output_entity: String,
    /// Per-position (source, output) pairs, padded with [`ZERO_WIDTH`]
    /// when the entities differ in length
    pub position_map: Vec<(char, char)>,
    /// Source characters appearing at two or more positions
    pub duplicates: Vec<DuplicateInfo>,
    /// Strategies ordered by priority, together covering every position
    pub strategies: Vec<FontStrategy>,
    pub kind: StrategyKind,
}

impl MappingAnalysis {
    /// The strategy rendering a position. Lowest priority wins; the
    /// strategies cover every position, so this only returns `None` for
    /// positions past the entity.
    pub fn strategy_for_position(&self, position: usize) -> Option<&FontStrategy> {
        self.strategies.iter().find(|s| s.covers(position))
    }

    /// Whether a single font suffices.
    pub fn is_single_font(&self) -> bool {
        self.strategies.len() == 1
    }
}

/// Analyze how `input_entity` must map onto `output_entity`.
///
/// Builds the naive per-position map, detects duplicated source
/// characters, and partitions the positions into the minimum number of
/// font strategies: a base strategy (priority 1) takes the first
/// occurrence of every conflicting character, and each later occurrence
/// joins a priority 2+ strategy grouped by its distinct output character.
/// The strategy count never exceeds the maximum duplicate multiplicity.
pub fn analyze_mapping(input_entity: &str, output_entity: &str) -> MappingAnalysis {
    let position_map = build_position_map(input_entity, output_entity);
    let duplicates = detect_duplicates(&position_map);
    let kind = classify(&duplicates);

    let conflicting: Vec<&DuplicateInfo> = duplicates.iter().filter(|d| d.conflicting).collect();

    let strategies = if conflicting.is_empty() {
        vec![base_strategy(&position_map, (0..position_map.len()).collect())]
    } else {
        partition_conflicts(&position_map)
    };

    log::debug!(
        "mapping {:?} -> {:?}: {} positions, {} duplicates, {} strategies ({:?})",
        input_entity,
        output_entity,
        position_map.len(),
        duplicates.len(),
        strategies.len(),
        kind
    );

    MappingAnalysis {
        input_entity: input_entity.to_string(),
        output_entity: output_entity.to_string(),
        position_map,
        duplicates,
        strategies,
        kind,
    }
}

/// Pair input and output characters position by position. Length
/// mismatches pad with the zero-width codepoint: surplus input characters
/// display as nothing, surplus output characters are appended as
/// synthetic zero-width-input glyphs.
fn build_position_map(input_entity: &str, output_entity: &str) -> Vec<(char, char)> {
    let input: Vec<char> = input_entity.chars().collect();
    let output: Vec<char> = output_entity.chars().collect();
    let len = input.len().max(output.len());

    (0..len)
        .map(|i| {
            (
                input.get(i).copied().unwrap_or(ZERO_WIDTH),
                output.get(i).copied().unwrap_or(ZERO_WIDTH),
            )
        })
        .collect()
}

fn detect_duplicates(position_map: &[(char, char)]) -> Vec<DuplicateInfo> {
    let mut order: Vec<char> = Vec::new();
    let mut by_char: HashMap<char, Vec<usize>> = HashMap::new();
    for (i, (source, _)) in position_map.iter().enumerate() {
        let entry = by_char.entry(*source).or_default();
        if entry.is_empty() {
            order.push(*source);
        }
        entry.push(i);
    }

    order
        .into_iter()
        .filter_map(|character| {
            let positions = by_char.remove(&character)?;
            if positions.len() < 2 {
                return None;
            }
            let outputs: Vec<char> = positions.iter().map(|&i| position_map[i].1).collect();
            let conflicting = outputs.iter().any(|&o| o != outputs[0]);
            Some(DuplicateInfo {
                character,
                positions,
                outputs,
                conflicting,
            })
        })
        .collect()
}

fn classify(duplicates: &[DuplicateInfo]) -> StrategyKind {
    match duplicates {
        [] => StrategyKind::SingleFont,
        [one] if one.positions.len() == 2 => StrategyKind::DuplicateSimple,
        _ => StrategyKind::DuplicateComplex,
    }
}

fn base_strategy(position_map: &[(char, char)], positions: Vec<usize>) -> FontStrategy {
    let mut mapping = HashMap::new();
    for &i in &positions {
        let (source, output) = position_map[i];
        mapping.insert(source, output);
    }
    FontStrategy {
        id: "base".to_string(),
        mapping,
        positions,
        priority: 1,
        description: "base substitution font".to_string(),
    }
}

/// Partition positions across strategies when duplicates conflict.
///
/// The base strategy absorbs each position whose source character it has
/// not seen yet, or has seen with the same output. Each leftover position
/// then lands on the alternate level indexed by how many distinct outputs
/// its source character has already claimed, so one character's distinct
/// outputs spread across levels while unrelated characters share them.
/// Total count is 1 + max distinct leftover outputs of any character,
/// never more than the widest duplicate's multiplicity.
fn partition_conflicts(position_map: &[(char, char)]) -> Vec<FontStrategy> {
    let mut base_mapping: HashMap<char, char> = HashMap::new();
    let mut base_positions: Vec<usize> = Vec::new();
    let mut leftovers: Vec<usize> = Vec::new();

    for (i, (source, output)) in position_map.iter().enumerate() {
        match base_mapping.get(source) {
            None => {
                base_mapping.insert(*source, *output);
                base_positions.push(i);
            },
            Some(existing) if existing == output => base_positions.push(i),
            Some(_) => leftovers.push(i),
        }
    }

    let mut strategies = vec![FontStrategy {
        id: "base".to_string(),
        mapping: base_mapping,
        positions: base_positions,
        priority: 1,
        description: "base substitution font".to_string(),
    }];

    // distinct leftover outputs per source character, in first-seen order
    let mut seen_outputs: HashMap<char, Vec<char>> = HashMap::new();
    let mut levels: Vec<(HashMap<char, char>, Vec<usize>)> = Vec::new();
    for &i in &leftovers {
        let (source, output) = position_map[i];
        let outputs = seen_outputs.entry(source).or_default();
        let level = match outputs.iter().position(|&o| o == output) {
            Some(level) => level,
            None => {
                outputs.push(output);
                outputs.len() - 1
            },
        };
        if level == levels.len() {
            levels.push((HashMap::new(), Vec::new()));
        }
        levels[level].0.insert(source, output);
        levels[level].1.push(i);
    }

    for (n, (mapping, positions)) in levels.into_iter().enumerate() {
        strategies.push(FontStrategy {
            id: format!("alt-{}", n + 1),
            mapping,
            positions,
            priority: n + 2,
            description: format!("alternate substitution font {}", n + 1),
        });
    }

    strategies
}
