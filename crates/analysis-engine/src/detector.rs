//! Pattern detector
//!
//! Every rule of every category is evaluated independently against every text
//! unit. Overlapping matches, within a category or across categories, are all
//! kept as separate findings; aggregation belongs to the consumer.

use crate::config::{check_unit_interval, check_weight, DetectorConfig};
use crate::deadline::Deadline;
use crate::error::ConfigurationError;
use crate::patterns::{char_offset, compile_pattern, context_bounds, extract_snippet};
use crate::segmenter::SegmentedDocument;
use regex::Regex;
use serde::{Deserialize, Serialize};
use shared_types::{Category, CategoryScore, Finding, MatchedSpan, Severity, TextUnit};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, instrument, warn};

/// A compiled detection rule
#[derive(Debug, Clone)]
pub struct PatternRule {
    pub id: String,
    pub category: Category,
    pub regex: Regex,
    pub weight: f64,
    pub severity: Severity,
    /// Context radius in chars, clamped to the unit
    pub context_window: usize,
    pub explanation: String,
    pub suppress_when_evidenced: bool,
}

/// Compiled rules grouped by category, plus scoring constants
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<PatternRule>,
    normalization: BTreeMap<Category, f64>,
    bias_detection_threshold: f64,
    evidence: Option<Regex>,
}

impl RuleSet {
    pub fn compile(config: &DetectorConfig) -> Result<Self, ConfigurationError> {
        check_unit_interval(
            "detector.bias_detection_threshold",
            config.bias_detection_threshold,
        )?;

        let mut normalization = BTreeMap::new();
        for (slug, &value) in &config.normalization {
            let field = format!("detector.normalization.{}", slug);
            let category = Category::from_slug(slug)
                .ok_or_else(|| ConfigurationError::invalid(&field, "unknown category"))?;
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigurationError::invalid(
                    field,
                    format!("normalization constant must be positive, got {}", value),
                ));
            }
            normalization.insert(category, value);
        }

        let mut seen = HashSet::new();
        let mut rules = Vec::with_capacity(config.rules.len());
        for rule in &config.rules {
            if !seen.insert(rule.id.as_str()) {
                return Err(ConfigurationError::invalid(
                    format!("detector.rules.{}", rule.id),
                    "duplicate rule id",
                ));
            }
            check_weight(&format!("detector.rules.{}.weight", rule.id), rule.weight)?;
            if !normalization.contains_key(&rule.category) {
                return Err(ConfigurationError::invalid(
                    format!("detector.normalization.{}", rule.category.slug()),
                    format!("required by rule '{}'", rule.id),
                ));
            }

            rules.push(PatternRule {
                id: rule.id.clone(),
                category: rule.category,
                regex: compile_pattern(&rule.id, &rule.pattern)?,
                weight: rule.weight,
                severity: rule.severity,
                context_window: rule.context_window.unwrap_or(config.default_context_window),
                explanation: rule.explanation.clone(),
                suppress_when_evidenced: rule.suppress_when_evidenced,
            });
        }

        let evidence = if config.evidence_markers.is_empty() {
            None
        } else {
            let joined = config
                .evidence_markers
                .iter()
                .map(|m| format!("(?:{})", m))
                .collect::<Vec<_>>()
                .join("|");
            Some(compile_pattern("detector.evidence_markers", &joined)?)
        };

        Ok(Self {
            rules,
            normalization,
            bias_detection_threshold: config.bias_detection_threshold,
            evidence,
        })
    }

    pub fn rules(&self) -> &[PatternRule] {
        &self.rules
    }

    pub fn bias_detection_threshold(&self) -> f64 {
        self.bias_detection_threshold
    }

    /// True when `text` carries a date, example or observation marker
    pub fn has_evidence(&self, text: &str) -> bool {
        self.evidence.as_ref().map_or(false, |re| re.is_match(text))
    }
}

/// Pattern detector output for one document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionReport {
    pub document_id: String,
    pub findings: Vec<Finding>,
    /// One entry per category, zero-scored when nothing matched
    pub category_scores: Vec<CategoryScore>,
    pub overall_severity: Severity,
    /// 10 when every claim is backed by evidence, lower as unsupported claims accumulate
    pub justification_score: f64,
    pub units_scanned: usize,
    pub complete: bool,
}

impl DetectionReport {
    pub fn findings_in(&self, category: Category) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(move |f| f.category == category)
    }

    pub fn score_for(&self, category: Category) -> Option<&CategoryScore> {
        self.category_scores.iter().find(|s| s.category == category)
    }
}

/// Run every rule against every unit of a document
#[instrument(skip_all, fields(document_id = %document.document_id))]
pub fn detect(document: &SegmentedDocument, rules: &RuleSet, deadline: Deadline) -> DetectionReport {
    let mut findings = Vec::new();
    let mut units_scanned = 0;
    let mut complete = true;

    for unit in &document.units {
        if deadline.is_expired() {
            warn!(
                units_scanned,
                total_units = document.units.len(),
                "Deadline exceeded, returning partial findings"
            );
            complete = false;
            break;
        }
        findings.extend(scan_unit(unit, rules));
        units_scanned += 1;
    }

    let category_scores = score_categories(&findings, rules);
    let overall_severity = overall_severity(&findings);
    let unsupported = findings
        .iter()
        .filter(|f| f.category == Category::UnsupportedClaim)
        .count();
    let justification_score = justification_score(unsupported, document.units.len());

    debug!(
        findings = findings.len(),
        units_scanned,
        ?overall_severity,
        "Pattern detection finished"
    );

    DetectionReport {
        document_id: document.document_id.clone(),
        findings,
        category_scores,
        overall_severity,
        justification_score,
        units_scanned,
        complete,
    }
}

/// Findings for a single unit, in rule order then match order
pub fn scan_unit(unit: &TextUnit, rules: &RuleSet) -> Vec<Finding> {
    let text = unit.text.as_str();
    let mut findings = Vec::new();

    for rule in &rules.rules {
        for m in rule.regex.find_iter(text) {
            if m.as_str().is_empty() {
                continue;
            }
            if rule.suppress_when_evidenced {
                let (start, end) = context_bounds(text, m.start(), m.end(), rule.context_window);
                if rules.has_evidence(&text[start..end]) {
                    continue;
                }
            }

            let start = char_offset(text, m.start());
            let end = start + m.as_str().chars().count();
            let explanation = if rule.explanation.is_empty() {
                format!("{} indicator: '{}'", rule.category.label(), m.as_str())
            } else {
                rule.explanation.clone()
            };

            findings.push(Finding {
                category: rule.category,
                rule_id: rule.id.clone(),
                unit_id: unit.id.clone(),
                document_id: unit.document_id.clone(),
                page_number: unit.page_number,
                matched_span: MatchedSpan {
                    text: m.as_str().to_string(),
                    start,
                    end,
                    doc_start: unit.char_start + start,
                    doc_end: unit.char_start + end,
                },
                weight: rule.weight,
                severity: rule.severity,
                context_snippet: extract_snippet(text, m.start(), m.end(), rule.context_window),
                explanation,
            });
        }
    }

    findings
}

/// Normalized weighted count per category, for every category
pub fn score_categories(findings: &[Finding], rules: &RuleSet) -> Vec<CategoryScore> {
    Category::ALL
        .iter()
        .map(|&category| {
            let (finding_count, total_weight) = findings
                .iter()
                .filter(|f| f.category == category)
                .fold((0usize, 0.0f64), |(count, weight), f| (count + 1, weight + f.weight));

            let score = match rules.normalization.get(&category) {
                Some(norm) => (10.0 * total_weight / norm).min(10.0),
                None => 0.0,
            };

            CategoryScore {
                category,
                score,
                finding_count,
                total_weight,
                confidence: (finding_count as f64 / 10.0).min(1.0),
                flagged: finding_count > 0 && score >= rules.bias_detection_threshold * 10.0,
            }
        })
        .collect()
}

/// Document-level severity from the severity mix of its findings
pub fn overall_severity(findings: &[Finding]) -> Severity {
    let count = |severity: Severity| findings.iter().filter(|f| f.severity == severity).count();

    if count(Severity::Critical) > 0 {
        Severity::Critical
    } else if count(Severity::High) > 3 {
        Severity::High
    } else if count(Severity::Medium) > 5 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// `max(0, 10 - unsupported / max(1, units / 10))`
pub fn justification_score(unsupported: usize, units: usize) -> f64 {
    let per_ten_units = (units as f64 / 10.0).max(1.0);
    (10.0 - unsupported as f64 / per_ten_units).max(0.0)
}
