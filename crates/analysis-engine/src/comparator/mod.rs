//! Cross-document comparator
//!
//! Units from two or more documents are grouped by topic. Inside every topic
//! that spans at least two documents, each pair of claims from different
//! documents is classified with a fixed priority: date mismatch, then severity
//! change, then direct contradiction. A topic/document pair with no such
//! conflict, where one side states a date, a severity level or a descriptor the
//! other side never gives, yields a single omission record.

pub mod topics;

pub use topics::{normalize_topic, CompositeTopicGrouper, LexiconTopicGrouper, TopicGrouper};

use crate::config::{check_unit_interval, ComparatorConfig};
use crate::error::ConfigurationError;
use crate::extractors::extract_dates;
use crate::patterns::{compile_terms, tokenize};
use crate::segmenter::SegmentedDocument;
use crate::similarity::jaccard;
use chrono::NaiveDate;
use regex::Regex;
use shared_types::{ClaimRef, ConflictType, ContradictionRecord, TextUnit, TopicConflictRow};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::{debug, instrument};

/// How many words before a descriptor are searched for a negator
const NEGATION_LOOKBEHIND: usize = 3;

#[derive(Debug, Clone)]
struct Descriptor {
    label: String,
    positive: Regex,
    negative: Regex,
}

#[derive(Debug, Clone)]
struct SeverityLevel {
    level: u8,
    regex: Regex,
}

/// Compiled comparator vocabulary
#[derive(Debug, Clone)]
pub struct ComparatorSettings {
    negation_overlap_threshold: f64,
    negators: HashSet<String>,
    descriptors: Vec<Descriptor>,
    severity_scale: Vec<SeverityLevel>,
    grouper: LexiconTopicGrouper,
}

impl ComparatorSettings {
    pub fn compile(config: &ComparatorConfig) -> Result<Self, ConfigurationError> {
        check_unit_interval(
            "comparator.negation_overlap_threshold",
            config.negation_overlap_threshold,
        )?;
        if config.negators.is_empty() {
            return Err(ConfigurationError::invalid("comparator.negators", "must not be empty"));
        }

        let descriptors = config
            .descriptors
            .iter()
            .map(|d| {
                let field = format!("comparator.descriptors.{}", d.positive);
                Ok(Descriptor {
                    label: d.positive.clone(),
                    positive: compile_terms(&field, std::slice::from_ref(&d.positive))?,
                    negative: compile_terms(&field, &d.negative)?,
                })
            })
            .collect::<Result<Vec<_>, ConfigurationError>>()?;

        let mut levels_seen = HashSet::new();
        let mut severity_scale = Vec::with_capacity(config.severity_scale.len());
        for level in &config.severity_scale {
            let field = format!("comparator.severity_scale.{}", level.level);
            if !levels_seen.insert(level.level) {
                return Err(ConfigurationError::invalid(field, "duplicate severity level"));
            }
            severity_scale.push(SeverityLevel {
                level: level.level,
                regex: compile_terms(&field, &level.terms)?,
            });
        }

        Ok(Self {
            negation_overlap_threshold: config.negation_overlap_threshold,
            negators: config.negators.iter().map(|n| n.to_lowercase()).collect(),
            descriptors,
            severity_scale,
            grouper: LexiconTopicGrouper::compile(&config.topics)?,
        })
    }

    /// The default topic grouper built from the configured lexicon
    pub fn grouper(&self) -> &LexiconTopicGrouper {
        &self.grouper
    }

    pub fn topic_count(&self) -> usize {
        self.grouper.topic_count()
    }

    fn is_negator(&self, token: &str) -> bool {
        self.negators.contains(token) || token.ends_with("n't")
    }

    /// Some(true) when the descriptor is asserted, Some(false) when its opposite is
    fn descriptor_polarity(&self, descriptor: &Descriptor, text: &str) -> Option<bool> {
        let negative_spans: Vec<(usize, usize)> = descriptor
            .negative
            .find_iter(text)
            .map(|m| (m.start(), m.end()))
            .collect();
        let mut positive = false;
        let mut negative = !negative_spans.is_empty();

        for m in descriptor.positive.find_iter(text) {
            if negative_spans.iter().any(|&(s, e)| m.start() < e && s < m.end()) {
                continue;
            }
            let negated = tokenize(&text[..m.start()])
                .iter()
                .rev()
                .take(NEGATION_LOOKBEHIND)
                .any(|t| self.is_negator(t));
            if negated {
                negative = true;
            } else {
                positive = true;
            }
        }

        match (positive, negative) {
            (true, false) => Some(true),
            (false, true) => Some(false),
            _ => None,
        }
    }

    fn signals(&self, unit: &TextUnit) -> UnitSignals {
        let text = unit.text.as_str();
        let tokens = tokenize(text);

        let mut levels = BTreeMap::new();
        for level in &self.severity_scale {
            if let Some(m) = level.regex.find(text) {
                levels.insert(level.level, m.as_str().to_lowercase());
            }
        }

        let descriptors = self
            .descriptors
            .iter()
            .enumerate()
            .filter_map(|(idx, d)| self.descriptor_polarity(d, text).map(|p| (idx, p)))
            .collect();

        UnitSignals {
            dates: extract_dates(text).into_iter().map(|m| m.date).collect(),
            levels,
            descriptors,
            negated: tokens.iter().any(|t| self.is_negator(t)),
            content: tokens.into_iter().filter(|t| !self.is_negator(t)).collect(),
        }
    }

    /// Pick exactly one conflict label for a claim pair, or none
    fn classify(&self, a: &UnitSignals, b: &UnitSignals) -> Option<(ConflictType, String)> {
        if !a.dates.is_empty() && !b.dates.is_empty() && a.dates.is_disjoint(&b.dates) {
            return Some((
                ConflictType::DateMismatch,
                format!(
                    "Dates differ: {} versus {}",
                    format_dates(&a.dates),
                    format_dates(&b.dates)
                ),
            ));
        }

        if !a.levels.is_empty()
            && !b.levels.is_empty()
            && a.levels.keys().all(|k| !b.levels.contains_key(k))
        {
            let wording = |levels: &BTreeMap<u8, String>| {
                levels.values().next_back().cloned().unwrap_or_default()
            };
            return Some((
                ConflictType::SeverityChange,
                format!(
                    "Severity described as '{}' versus '{}'",
                    wording(&a.levels),
                    wording(&b.levels)
                ),
            ));
        }

        for (idx, polarity) in &a.descriptors {
            if b.descriptors.get(idx) == Some(&!polarity) {
                let label = &self.descriptors[*idx].label;
                let (asserted, denied) = if *polarity { ("first", "second") } else { ("second", "first") };
                return Some((
                    ConflictType::DirectContradiction,
                    format!(
                        "'{}' is asserted in the {} claim and contradicted in the {}",
                        label, asserted, denied
                    ),
                ));
            }
        }

        if a.negated != b.negated
            && jaccard(&a.content, &b.content) >= self.negation_overlap_threshold
        {
            return Some((
                ConflictType::DirectContradiction,
                "The same statement is negated in only one document".to_string(),
            ));
        }

        None
    }
}

fn format_dates(dates: &BTreeSet<NaiveDate>) -> String {
    dates
        .iter()
        .map(|d| d.format("%Y-%m-%d").to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Comparable facts extracted from one unit
#[derive(Debug, Clone, Default)]
struct UnitSignals {
    dates: BTreeSet<NaiveDate>,
    /// Severity level -> wording used
    levels: BTreeMap<u8, String>,
    /// Descriptor index -> asserted (true) or denied (false)
    descriptors: BTreeMap<usize, bool>,
    negated: bool,
    content: HashSet<String>,
}

const STATED_KINDS: [&str; 3] = ["a date", "a severity level", "a descriptor"];

impl UnitSignals {
    /// Which of STATED_KINDS this unit gives
    fn stated_kinds(&self) -> [bool; 3] {
        [
            !self.dates.is_empty(),
            !self.levels.is_empty(),
            !self.descriptors.is_empty(),
        ]
    }
}

fn claim(unit: &TextUnit) -> ClaimRef {
    ClaimRef {
        document_id: unit.document_id.clone(),
        unit_id: unit.id.clone(),
        page_number: unit.page_number,
        text: unit.trimmed().to_string(),
    }
}

/// Topic key -> (document index, unit) in input order
type TopicGroups<'a> = BTreeMap<String, Vec<(usize, &'a TextUnit)>>;

fn group_units<'a>(documents: &'a [SegmentedDocument], grouper: &dyn TopicGrouper) -> TopicGroups<'a> {
    let mut groups: TopicGroups<'a> = BTreeMap::new();
    for (doc_idx, document) in documents.iter().enumerate() {
        for unit in &document.units {
            for topic in grouper.topics(unit) {
                groups.entry(topic).or_default().push((doc_idx, unit));
            }
        }
    }
    groups
}

/// Contradictions between every pair of documents, grouped by topic
#[instrument(skip_all, fields(documents = documents.len(), grouper = grouper.name()))]
pub fn compare_documents(
    documents: &[SegmentedDocument],
    settings: &ComparatorSettings,
    grouper: &dyn TopicGrouper,
) -> Vec<ContradictionRecord> {
    if documents.len() < 2 {
        return Vec::new();
    }

    let groups = group_units(documents, grouper);
    let mut signals: HashMap<&str, UnitSignals> = HashMap::new();
    let mut claimed: HashSet<(String, String)> = HashSet::new();
    let mut records = Vec::new();

    for (topic, members) in &groups {
        let doc_indices: BTreeSet<usize> = members.iter().map(|(d, _)| *d).collect();
        if doc_indices.len() < 2 {
            continue;
        }

        for &(_, unit) in members {
            signals
                .entry(unit.id.as_str())
                .or_insert_with(|| settings.signals(unit));
        }

        let doc_indices: Vec<usize> = doc_indices.into_iter().collect();
        for (pos, &doc_a) in doc_indices.iter().enumerate() {
            for &doc_b in &doc_indices[pos + 1..] {
                let side_a: Vec<&TextUnit> =
                    members.iter().filter(|(d, _)| *d == doc_a).map(|(_, u)| *u).collect();
                let side_b: Vec<&TextUnit> =
                    members.iter().filter(|(d, _)| *d == doc_b).map(|(_, u)| *u).collect();

                let before = records.len();
                for ua in &side_a {
                    for ub in &side_b {
                        let key = (ua.id.clone(), ub.id.clone());
                        if claimed.contains(&key) {
                            continue;
                        }
                        let (Some(sa), Some(sb)) =
                            (signals.get(ua.id.as_str()), signals.get(ub.id.as_str()))
                        else {
                            continue;
                        };
                        if let Some((conflict_type, explanation)) = settings.classify(sa, sb) {
                            claimed.insert(key);
                            records.push(ContradictionRecord {
                                topic: topic.clone(),
                                claim_a: claim(ua),
                                claim_b: claim(ub),
                                doc_label_a: documents[doc_a].label.clone(),
                                doc_label_b: documents[doc_b].label.clone(),
                                conflict_type,
                                severity: conflict_type.severity(),
                                explanation,
                            });
                        }
                    }
                }

                if records.len() == before {
                    if let Some(record) = omission(
                        topic,
                        (&documents[doc_a], side_a.as_slice()),
                        (&documents[doc_b], side_b.as_slice()),
                        &signals,
                    ) {
                        let key = (record.claim_a.unit_id.clone(), record.claim_b.unit_id.clone());
                        if claimed.insert(key) {
                            records.push(record);
                        }
                    }
                }
            }
        }
    }

    debug!(
        topics = groups.len(),
        records = records.len(),
        "Cross-document comparison finished"
    );
    records
}

/// One side states something about the topic that the other never does
fn omission(
    topic: &str,
    (doc_a, side_a): (&SegmentedDocument, &[&TextUnit]),
    (doc_b, side_b): (&SegmentedDocument, &[&TextUnit]),
    signals: &HashMap<&str, UnitSignals>,
) -> Option<ContradictionRecord> {
    let stated = |side: &[&TextUnit]| -> [bool; 3] {
        let mut found = [false; 3];
        for unit in side {
            if let Some(s) = signals.get(unit.id.as_str()) {
                for (slot, kind) in found.iter_mut().zip(s.stated_kinds()) {
                    *slot |= kind;
                }
            }
        }
        found
    };
    let (stated_a, stated_b) = (stated(side_a), stated(side_b));

    let (kind, a_states) = (0..STATED_KINDS.len()).find_map(|i| match (stated_a[i], stated_b[i]) {
        (true, false) => Some((i, true)),
        (false, true) => Some((i, false)),
        _ => None,
    })?;

    let (unit_a, unit_b) = if a_states {
        (first_stating(side_a, signals, kind)?, *side_b.first()?)
    } else {
        (*side_a.first()?, first_stating(side_b, signals, kind)?)
    };

    let (stating, silent) = if a_states { (doc_a, doc_b) } else { (doc_b, doc_a) };
    Some(ContradictionRecord {
        topic: topic.to_string(),
        claim_a: claim(unit_a),
        claim_b: claim(unit_b),
        doc_label_a: doc_a.label.clone(),
        doc_label_b: doc_b.label.clone(),
        conflict_type: ConflictType::Omission,
        severity: ConflictType::Omission.severity(),
        explanation: format!(
            "'{}' gives {} for this topic that '{}' omits",
            stating.label, STATED_KINDS[kind], silent.label
        ),
    })
}

fn first_stating<'u>(
    side: &[&'u TextUnit],
    signals: &HashMap<&str, UnitSignals>,
    kind: usize,
) -> Option<&'u TextUnit> {
    side.iter()
        .copied()
        .find(|u| signals.get(u.id.as_str()).map_or(false, |s| s.stated_kinds()[kind]))
}

/// Per-topic summary of contradiction records, ordered by topic
pub fn contradiction_matrix(records: &[ContradictionRecord]) -> Vec<TopicConflictRow> {
    let mut rows: BTreeMap<&str, TopicConflictRow> = BTreeMap::new();

    for record in records {
        let row = rows.entry(record.topic.as_str()).or_insert_with(|| TopicConflictRow {
            topic: record.topic.clone(),
            record_count: 0,
            conflict_types: Vec::new(),
            highest_severity: record.severity,
            documents: Vec::new(),
        });
        row.record_count += 1;
        if !row.conflict_types.contains(&record.conflict_type) {
            row.conflict_types.push(record.conflict_type);
        }
        row.highest_severity = row.highest_severity.max(record.severity);
        for label in [&record.doc_label_a, &record.doc_label_b] {
            if !row.documents.contains(label) {
                row.documents.push(label.clone());
            }
        }
    }

    rows.into_values()
        .map(|mut row| {
            row.documents.sort();
            row
        })
        .collect()
}
