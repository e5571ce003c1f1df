//! Similarity engine
//!
//! Word n-gram shingles compared with Jaccard similarity. Scores depend only
//! on the unit text, so every retained pair can be traced back to the
//! overlapping word sequences that produced it.

use crate::config::{check_unit_interval, SimilarityConfig};
use crate::deadline::Deadline;
use crate::error::ConfigurationError;
use crate::patterns::{tokenize, truncate_chars};
use crate::segmenter::SegmentedDocument;
use shared_types::{MatchingBlock, Severity, SimilarityPair, TemplateReuseReport, TextUnit};
use std::collections::HashSet;
use tracing::{debug, instrument, warn};

const BLOCK_EXCERPT_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq)]
pub struct SimilaritySettings {
    pub shingle_size: usize,
    pub min_tokens: usize,
    pub template_similarity_threshold: f64,
    pub reuse_flag_percentage: f64,
    pub high_reuse_percentage: f64,
}

impl SimilaritySettings {
    pub fn from_config(config: &SimilarityConfig) -> Result<Self, ConfigurationError> {
        if config.shingle_size == 0 {
            return Err(ConfigurationError::invalid(
                "similarity.shingle_size",
                "must be at least 1",
            ));
        }
        check_unit_interval(
            "similarity.template_similarity_threshold",
            config.template_similarity_threshold,
        )?;
        for (field, value) in [
            ("similarity.reuse_flag_percentage", config.reuse_flag_percentage),
            ("similarity.high_reuse_percentage", config.high_reuse_percentage),
        ] {
            if !(value.is_finite() && (0.0..=100.0).contains(&value)) {
                return Err(ConfigurationError::invalid(
                    field,
                    format!("expected a percentage, got {}", value),
                ));
            }
        }
        if config.high_reuse_percentage < config.reuse_flag_percentage {
            return Err(ConfigurationError::invalid(
                "similarity.high_reuse_percentage",
                "must not be below reuse_flag_percentage",
            ));
        }

        Ok(Self {
            shingle_size: config.shingle_size,
            min_tokens: config.min_tokens,
            template_similarity_threshold: config.template_similarity_threshold,
            reuse_flag_percentage: config.reuse_flag_percentage,
            high_reuse_percentage: config.high_reuse_percentage,
        })
    }
}

impl Default for SimilaritySettings {
    fn default() -> Self {
        let config = SimilarityConfig::default();
        Self {
            shingle_size: config.shingle_size,
            min_tokens: config.min_tokens,
            template_similarity_threshold: config.template_similarity_threshold,
            reuse_flag_percentage: config.reuse_flag_percentage,
            high_reuse_percentage: config.high_reuse_percentage,
        }
    }
}

/// Word n-grams of a token sequence
///
/// A sequence shorter than `n` becomes a single shingle so short units still
/// compare by content.
pub fn shingles(tokens: &[String], n: usize) -> HashSet<String> {
    if tokens.is_empty() {
        return HashSet::new();
    }
    if tokens.len() < n {
        return std::iter::once(tokens.join(" ")).collect();
    }
    tokens.windows(n).map(|w| w.join(" ")).collect()
}

pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => 1.0,
        (true, false) | (false, true) => 0.0,
        _ => {
            let intersection = a.intersection(b).count();
            let union = a.len() + b.len() - intersection;
            intersection as f64 / union as f64
        }
    }
}

/// Shingle similarity of two texts, in [0, 1]
pub fn text_similarity(a: &str, b: &str, shingle_size: usize) -> f64 {
    jaccard(
        &shingles(&tokenize(a), shingle_size),
        &shingles(&tokenize(b), shingle_size),
    )
}

pub fn similarity(a: &TextUnit, b: &TextUnit, shingle_size: usize) -> f64 {
    text_similarity(&a.text, &b.text, shingle_size)
}

struct Fingerprint<'a> {
    unit: &'a TextUnit,
    token_count: usize,
    shingles: HashSet<String>,
}

impl<'a> Fingerprint<'a> {
    fn new(unit: &'a TextUnit, shingle_size: usize) -> Self {
        let tokens = tokenize(&unit.text);
        Self {
            unit,
            token_count: tokens.len(),
            shingles: shingles(&tokens, shingle_size),
        }
    }
}

fn fingerprints(units: &[TextUnit], shingle_size: usize) -> Vec<Fingerprint<'_>> {
    units.iter().map(|u| Fingerprint::new(u, shingle_size)).collect()
}

fn make_pair(a: &TextUnit, b: &TextUnit, score: f64) -> SimilarityPair {
    SimilarityPair {
        unit_a: a.id.clone(),
        unit_b: b.id.clone(),
        score,
        source_doc_a: a.document_id.clone(),
        source_doc_b: b.document_id.clone(),
        page_a: a.page_number,
        page_b: b.page_number,
    }
}

/// Retained pairs of a comparison, possibly cut short by a deadline
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityScan {
    pub pairs: Vec<SimilarityPair>,
    pub units_scanned: usize,
    pub complete: bool,
}

/// Compare every unit of `a` against every unit of `b`
///
/// Pairs scoring at or above `threshold` are kept, provided both units have at
/// least `min_tokens` words. When `a` and `b` are the same sequence each
/// unordered pair is reported once and units are never paired with themselves.
#[instrument(skip_all, fields(units_a = a.len(), units_b = b.len(), threshold))]
pub fn compare_units(
    a: &[TextUnit],
    b: &[TextUnit],
    threshold: f64,
    settings: &SimilaritySettings,
    deadline: Deadline,
) -> SimilarityScan {
    let self_comparison = std::ptr::eq(a, b);
    let prints_a = fingerprints(a, settings.shingle_size);
    let prints_b = if self_comparison {
        Vec::new()
    } else {
        fingerprints(b, settings.shingle_size)
    };
    let prints_b = if self_comparison { &prints_a } else { &prints_b };

    let mut pairs = Vec::new();
    let mut units_scanned = 0;
    let mut complete = true;

    for (i, fa) in prints_a.iter().enumerate() {
        if deadline.is_expired() {
            warn!(units_scanned, total_units = a.len(), "Deadline exceeded, returning partial pairs");
            complete = false;
            break;
        }
        units_scanned += 1;
        if fa.token_count < settings.min_tokens {
            continue;
        }

        let candidates = if self_comparison { &prints_b[i + 1..] } else { &prints_b[..] };
        for fb in candidates {
            if fb.token_count < settings.min_tokens {
                continue;
            }
            let score = jaccard(&fa.shingles, &fb.shingles);
            if score >= threshold {
                pairs.push(make_pair(fa.unit, fb.unit, score));
            }
        }
    }

    debug!(pairs = pairs.len(), units_scanned, "Similarity comparison finished");

    SimilarityScan {
        pairs,
        units_scanned,
        complete,
    }
}

/// Near-duplicate units within one document
pub fn self_similarity(
    document: &SegmentedDocument,
    settings: &SimilaritySettings,
    deadline: Deadline,
) -> SimilarityScan {
    compare_units(
        &document.units,
        &document.units,
        settings.template_similarity_threshold,
        settings,
        deadline,
    )
}

/// How much of `source` is reproduced in `target`
#[instrument(skip_all, fields(source = %source.document_id, target = %target.document_id))]
pub fn template_reuse(
    source: &SegmentedDocument,
    target: &SegmentedDocument,
    settings: &SimilaritySettings,
    deadline: Deadline,
) -> TemplateReuseReport {
    let scan = compare_units(
        &source.units,
        &target.units,
        settings.template_similarity_threshold,
        settings,
        deadline,
    );

    let eligible_units = source
        .units
        .iter()
        .filter(|u| tokenize(&u.text).len() >= settings.min_tokens)
        .count();

    let best = best_matches(source, target, &scan.pairs);
    let matched_units = best.len();
    let percentage_similarity = if eligible_units == 0 {
        0.0
    } else {
        matched_units as f64 / eligible_units as f64 * 100.0
    };

    let is_template_reused = matched_units > 0 && percentage_similarity > settings.reuse_flag_percentage;
    let severity = if is_template_reused && percentage_similarity > settings.high_reuse_percentage {
        Severity::High
    } else if is_template_reused {
        Severity::Medium
    } else {
        Severity::Low
    };

    let matching_blocks = matching_blocks(source, target, &best);

    debug!(
        percentage_similarity,
        matched_units,
        eligible_units,
        blocks = matching_blocks.len(),
        "Template reuse computed"
    );

    TemplateReuseReport {
        source_doc: source.document_id.clone(),
        target_doc: target.document_id.clone(),
        percentage_similarity,
        eligible_units,
        matched_units,
        is_template_reused,
        severity,
        matching_blocks,
        pairs: scan.pairs,
        units_scanned: scan.units_scanned,
        complete: scan.complete,
    }
}

/// For each matched source unit, its best target unit: (source idx, target idx, score)
fn best_matches(
    source: &SegmentedDocument,
    target: &SegmentedDocument,
    pairs: &[SimilarityPair],
) -> Vec<(usize, usize, f64)> {
    let index_of = |units: &[TextUnit], id: &str| units.iter().position(|u| u.id == id);
    let mut best: Vec<(usize, usize, f64)> = Vec::new();

    for pair in pairs {
        let (Some(i), Some(j)) = (
            index_of(&source.units, &pair.unit_a),
            index_of(&target.units, &pair.unit_b),
        ) else {
            continue;
        };
        match best.iter_mut().find(|(si, _, _)| *si == i) {
            Some(entry) if pair.score > entry.2 || (pair.score == entry.2 && j < entry.1) => {
                *entry = (i, j, pair.score)
            }
            Some(_) => {}
            None => best.push((i, j, pair.score)),
        }
    }

    best.sort_by_key(|(i, _, _)| *i);
    best
}

/// Merge runs of consecutive source units whose best matches are consecutive target units
fn matching_blocks(
    source: &SegmentedDocument,
    target: &SegmentedDocument,
    best: &[(usize, usize, f64)],
) -> Vec<MatchingBlock> {
    let mut runs: Vec<Vec<(usize, usize, f64)>> = Vec::new();
    for &entry in best {
        match runs.last_mut() {
            Some(run)
                if run
                    .last()
                    .map_or(false, |&(i, j, _)| entry.0 == i + 1 && entry.1 == j + 1) =>
            {
                run.push(entry)
            }
            _ => runs.push(vec![entry]),
        }
    }

    runs.into_iter()
        .map(|run| {
            let units_a: Vec<&TextUnit> = run.iter().map(|&(i, _, _)| &source.units[i]).collect();
            let units_b: Vec<&TextUnit> = run.iter().map(|&(_, j, _)| &target.units[j]).collect();
            let joined = units_a.iter().map(|u| u.trimmed()).collect::<Vec<_>>().join(" ");

            MatchingBlock {
                unit_ids_a: units_a.iter().map(|u| u.id.clone()).collect(),
                unit_ids_b: units_b.iter().map(|u| u.id.clone()).collect(),
                page_a: units_a[0].page_number,
                page_b: units_b[0].page_number,
                text: truncate_chars(&joined, BLOCK_EXCERPT_CHARS),
                length: units_a.iter().map(|u| u.char_len()).sum(),
                min_score: run.iter().map(|&(_, _, s)| s).fold(1.0, f64::min),
            }
        })
        .collect()
}
