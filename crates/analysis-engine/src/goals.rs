//! Goal alignment scorer
//!
//! Every unit that touches a goal's theme is evidence for that goal. Its
//! polarity toward the guardianship option under evaluation comes from the
//! goal's option-specific support and hinder patterns; theme units that no
//! pattern classifies are reported as coverage gaps rather than scored.
//!
//! ```text
//! score = 5 + 5 * (support - hinder) / (support + hinder + epsilon)
//! ```
//!
//! clamped to [0, 10], so a goal without polarised evidence sits at exactly 5.

use crate::config::{check_weight, GoalsConfig};
use crate::error::ConfigurationError;
use crate::patterns::{compile_pattern, compile_terms, truncate_chars};
use crate::segmenter::SegmentedDocument;
use regex::Regex;
use shared_types::{
    AlignmentSummary, ContradictionRecord, EvidenceRef, GoalConflict, GoalEvidence, GoalId,
    GoalScore, GuardianshipOption, Polarity, Recommendation, TextUnit,
};
use std::collections::HashSet;
use tracing::{debug, instrument};

const EXCERPT_CHARS: usize = 200;
const UNCLASSIFIED_THEME: &str = "unclassified";

#[derive(Debug, Clone)]
struct GoalPattern {
    option: GuardianshipOption,
    polarity: Polarity,
    theme: String,
    regex: Regex,
    weight: f64,
}

/// One compiled goal of the taxonomy
#[derive(Debug, Clone)]
pub struct Goal {
    pub id: GoalId,
    pub name: String,
    pub description: String,
    vocabulary: Regex,
    patterns: Vec<GoalPattern>,
}

impl Goal {
    /// True when the unit uses this goal's theme vocabulary; patterns only
    /// decide polarity for units that pass this gate
    pub fn is_relevant(&self, text: &str) -> bool {
        self.vocabulary.is_match(text)
    }
}

/// The fixed G1-G7 taxonomy with its scoring constants
#[derive(Debug, Clone)]
pub struct GoalTaxonomy {
    goals: Vec<Goal>,
    epsilon: f64,
    top_evidence: usize,
}

impl GoalTaxonomy {
    pub fn compile(config: &GoalsConfig) -> Result<Self, ConfigurationError> {
        if !(config.epsilon.is_finite() && config.epsilon > 0.0) {
            return Err(ConfigurationError::invalid("goals.epsilon", "must be positive"));
        }
        if config.top_evidence == 0 {
            return Err(ConfigurationError::invalid("goals.top_evidence", "must be at least 1"));
        }

        let ids: Vec<GoalId> = config.taxonomy.iter().map(|g| g.id).collect();
        let unique: HashSet<GoalId> = ids.iter().copied().collect();
        if unique.len() != ids.len() {
            return Err(ConfigurationError::Taxonomy("goal ids must be unique".to_string()));
        }
        if let Some(missing) = GoalId::ALL.iter().find(|id| !unique.contains(id)) {
            return Err(ConfigurationError::Taxonomy(format!("goal {} is missing", missing)));
        }

        let mut goals = Vec::with_capacity(config.taxonomy.len());
        for goal in &config.taxonomy {
            if goal.name.trim().is_empty() {
                return Err(ConfigurationError::Taxonomy(format!("goal {} has no name", goal.id)));
            }
            if goal.vocabulary.is_empty() {
                return Err(ConfigurationError::Taxonomy(format!(
                    "goal {} has no theme vocabulary",
                    goal.id
                )));
            }

            let mut patterns = Vec::with_capacity(goal.patterns.len());
            for (idx, pattern) in goal.patterns.iter().enumerate() {
                let field = format!("goals.{}.patterns[{}]", goal.id, idx);
                if pattern.polarity == Polarity::Neutral {
                    return Err(ConfigurationError::Taxonomy(format!(
                        "{}: pattern polarity must be support or hinder",
                        field
                    )));
                }
                check_weight(&format!("{}.weight", field), pattern.weight)?;
                patterns.push(GoalPattern {
                    option: pattern.option,
                    polarity: pattern.polarity,
                    theme: pattern.theme.clone(),
                    regex: compile_pattern(&field, &pattern.pattern)?,
                    weight: pattern.weight,
                });
            }

            goals.push(Goal {
                id: goal.id,
                name: goal.name.clone(),
                description: goal.description.clone(),
                vocabulary: compile_terms(&format!("goals.{}.vocabulary", goal.id), &goal.vocabulary)?,
                patterns,
            });
        }
        goals.sort_by_key(|g| g.id);

        Ok(Self {
            goals,
            epsilon: config.epsilon,
            top_evidence: config.top_evidence,
        })
    }

    pub fn goals(&self) -> &[Goal] {
        &self.goals
    }

    pub fn goal(&self, id: GoalId) -> Option<&Goal> {
        self.goals.iter().find(|g| g.id == id)
    }

    /// The midpoint-anchored balance score, clamped to [0, 10]
    pub fn balance(&self, support: f64, hinder: f64) -> f64 {
        (5.0 + 5.0 * (support - hinder) / (support + hinder + self.epsilon)).clamp(0.0, 10.0)
    }
}

fn evidence_ref(unit: &TextUnit, weight: f64) -> EvidenceRef {
    EvidenceRef {
        unit_id: unit.id.clone(),
        document_id: unit.document_id.clone(),
        page_number: unit.page_number,
        excerpt: truncate_chars(unit.trimmed(), EXCERPT_CHARS),
        weight,
    }
}

/// Score one goal for one option
pub fn score_goal(
    goal: &Goal,
    documents: &[SegmentedDocument],
    option: GuardianshipOption,
    contradictions: &[ContradictionRecord],
    taxonomy: &GoalTaxonomy,
) -> GoalScore {
    let mut support_weight = 0.0;
    let mut hinder_weight = 0.0;
    let mut supporting = Vec::new();
    let mut hindering = Vec::new();
    let mut omitted = Vec::new();
    let mut evidence: Vec<GoalEvidence> = Vec::new();
    let mut evidence_count = 0;

    for unit in documents.iter().flat_map(|d| d.units.iter()) {
        if !goal.is_relevant(&unit.text) {
            continue;
        }

        let mut unit_support = 0.0;
        let mut unit_hinder = 0.0;
        for pattern in goal.patterns.iter().filter(|p| p.option == option) {
            if !pattern.regex.is_match(&unit.text) {
                continue;
            }
            match pattern.polarity {
                Polarity::Support => unit_support += pattern.weight,
                Polarity::Hinder => unit_hinder += pattern.weight,
                Polarity::Neutral => continue,
            }
            record_evidence(&mut evidence, goal.id, &pattern.theme, pattern.polarity, &unit.id, pattern.weight);
        }

        if unit_support == 0.0 && unit_hinder == 0.0 {
            record_evidence(&mut evidence, goal.id, UNCLASSIFIED_THEME, Polarity::Neutral, &unit.id, 0.0);
            omitted.push(evidence_ref(unit, 0.0));
            continue;
        }

        evidence_count += 1;
        support_weight += unit_support;
        hinder_weight += unit_hinder;
        if unit_support > 0.0 {
            supporting.push(evidence_ref(unit, unit_support));
        }
        if unit_hinder > 0.0 {
            hindering.push(evidence_ref(unit, unit_hinder));
        }
    }

    // Strongest evidence first; ties keep reading order
    supporting.sort_by(|a, b| b.weight.total_cmp(&a.weight));
    hindering.sort_by(|a, b| b.weight.total_cmp(&a.weight));

    let conflicts = contested_evidence(&supporting, taxonomy.top_evidence, contradictions);

    GoalScore {
        goal_id: goal.id,
        goal_name: goal.name.clone(),
        option,
        score: taxonomy.balance(support_weight, hinder_weight),
        support_weight,
        hinder_weight,
        evidence_count,
        conflicts,
        supporting_evidence: supporting,
        hindering_evidence: hindering,
        omitted_evidence: omitted,
        evidence,
    }
}

/// Add a unit to the (theme, polarity) group, creating it on first use
fn record_evidence(
    evidence: &mut Vec<GoalEvidence>,
    goal_id: GoalId,
    theme: &str,
    polarity: Polarity,
    unit_id: &str,
    weight: f64,
) {
    let position = evidence
        .iter()
        .position(|e| e.theme == theme && e.polarity == polarity);
    let group = match position {
        Some(idx) => &mut evidence[idx],
        None => {
            evidence.push(GoalEvidence {
                goal_id,
                unit_ids: Vec::new(),
                polarity,
                theme: theme.to_string(),
                weight: 0.0,
            });
            let last = evidence.len() - 1;
            &mut evidence[last]
        }
    };
    if !group.unit_ids.iter().any(|id| id == unit_id) {
        group.unit_ids.push(unit_id.to_string());
    }
    group.weight += weight;
}

/// Conflict flags for top supporting units that a contradiction record involves
fn contested_evidence(
    supporting: &[EvidenceRef],
    top: usize,
    contradictions: &[ContradictionRecord],
) -> Vec<GoalConflict> {
    let mut seen = HashSet::new();
    let mut conflicts = Vec::new();
    for evidence in supporting.iter().take(top) {
        for record in contradictions.iter().filter(|r| r.involves_unit(&evidence.unit_id)) {
            if seen.insert((evidence.unit_id.clone(), record.topic.clone())) {
                conflicts.push(GoalConflict {
                    unit_id: evidence.unit_id.clone(),
                    topic: record.topic.clone(),
                    conflict_type: record.conflict_type,
                    explanation: record.explanation.clone(),
                });
            }
        }
    }
    conflicts
}

/// One score per goal, in G1-G7 order
#[instrument(skip_all, fields(documents = documents.len(), option = ?option))]
pub fn score_goals(
    documents: &[SegmentedDocument],
    option: GuardianshipOption,
    contradictions: &[ContradictionRecord],
    taxonomy: &GoalTaxonomy,
) -> Vec<GoalScore> {
    let scores: Vec<GoalScore> = taxonomy
        .goals
        .iter()
        .map(|goal| score_goal(goal, documents, option, contradictions, taxonomy))
        .collect();

    debug!(
        evidence = scores.iter().map(|s| s.evidence_count).sum::<usize>(),
        conflicts = scores.iter().map(|s| s.conflicts.len()).sum::<usize>(),
        "Goal alignment scored"
    );
    scores
}

fn mean_score(scores: &[GoalScore]) -> f64 {
    if scores.is_empty() {
        return 5.0;
    }
    scores.iter().map(|s| s.score).sum::<f64>() / scores.len() as f64
}

/// Both options scored, averaged and compared
pub fn alignment_summary(
    documents: &[SegmentedDocument],
    contradictions: &[ContradictionRecord],
    taxonomy: &GoalTaxonomy,
) -> AlignmentSummary {
    let family = score_goals(documents, GuardianshipOption::Family, contradictions, taxonomy);
    let public_guardian = score_goals(
        documents,
        GuardianshipOption::PublicGuardian,
        contradictions,
        taxonomy,
    );
    let overall_family = mean_score(&family);
    let overall_public_guardian = mean_score(&public_guardian);
    let differential = overall_family - overall_public_guardian;

    AlignmentSummary {
        family,
        public_guardian,
        overall_family,
        overall_public_guardian,
        differential,
        recommendation: Recommendation::from_differential(differential),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GoalConfig, GoalPatternConfig};
    use crate::segmenter::{segment, DocumentInput, SegmenterSettings};
    use pretty_assertions::assert_eq;
    use shared_types::{ClaimRef, ConflictType, Severity};

    fn pattern(option: GuardianshipOption, polarity: Polarity, theme: &str, re: &str, weight: f64) -> GoalPatternConfig {
        GoalPatternConfig {
            option,
            polarity,
            theme: theme.into(),
            pattern: re.into(),
            weight,
        }
    }

    pub(crate) fn test_goals() -> GoalsConfig {
        let taxonomy = GoalId::ALL
            .iter()
            .map(|&id| {
                if id == GoalId::G3 {
                    GoalConfig {
                        id,
                        name: "Family & Community Relationships".into(),
                        description: String::new(),
                        vocabulary: vec!["family".into(), "community".into()],
                        patterns: vec![
                            pattern(
                                GuardianshipOption::Family,
                                Polarity::Support,
                                "family support",
                                r"\bfamily\b.*\b(?:support|help|encourag)\w*",
                                1.0,
                            ),
                            pattern(
                                GuardianshipOption::Family,
                                Polarity::Hinder,
                                "family isolation",
                                r"\bfamily\b.*\b(?:isolat|restrict)\w*",
                                1.0,
                            ),
                            pattern(
                                GuardianshipOption::PublicGuardian,
                                Polarity::Hinder,
                                "guardian distance",
                                r"\bpublic guardian\b.*\b(?:no|limited)\s+contact\b",
                                1.5,
                            ),
                        ],
                    }
                } else {
                    GoalConfig {
                        id,
                        name: format!("Goal {}", id),
                        description: String::new(),
                        vocabulary: vec![format!("zzgoal{}", id.as_str().to_lowercase())],
                        patterns: Vec::new(),
                    }
                }
            })
            .collect();

        GoalsConfig {
            epsilon: 1e-9,
            top_evidence: 5,
            taxonomy,
        }
    }

    fn taxonomy() -> GoalTaxonomy {
        GoalTaxonomy::compile(&test_goals()).unwrap()
    }

    fn doc(id: &str, text: &str) -> SegmentedDocument {
        segment(&DocumentInput::new(id, text), &SegmenterSettings::default()).unwrap()
    }

    fn g3(scores: &[GoalScore]) -> &GoalScore {
        scores.iter().find(|s| s.goal_id == GoalId::G3).unwrap()
    }

    #[test]
    fn test_zero_evidence_scores_exactly_five() {
        let scores = score_goals(&[doc("d", "Nothing relevant.")], GuardianshipOption::Family, &[], &taxonomy());
        assert_eq!(scores.len(), 7);
        for score in &scores {
            assert_eq!(score.score, 5.0);
            assert!(!score.has_evidence());
            assert!(score.supporting_evidence.is_empty());
            assert!(score.omitted_evidence.is_empty());
        }
    }

    #[test]
    fn test_supporting_evidence_raises_score() {
        let d = doc(
            "d",
            "Her family supports her every week. The family helps with shopping. \
             Her family encourages outings.",
        );
        let score = g3(&score_goals(&[d], GuardianshipOption::Family, &[], &taxonomy())).clone();
        assert!(score.score > 5.0);
        assert_eq!(score.evidence_count, 3);
        assert_eq!(score.supporting_evidence.len(), 3);
        assert!(score.conflicts.is_empty());
        assert_eq!(score.evidence.len(), 1);
        assert_eq!(score.evidence[0].theme, "family support");
        assert_eq!(score.evidence[0].unit_ids, vec!["d:u0", "d:u1", "d:u2"]);
    }

    #[test]
    fn test_balance_formula() {
        let t = taxonomy();
        assert_eq!(t.balance(0.0, 0.0), 5.0);
        assert!((t.balance(3.0, 1.0) - 7.5).abs() < 1e-6);
        assert!((t.balance(0.0, 1.5) - 0.0).abs() < 1e-6);
        assert!(t.balance(1.0, 1.0) == 5.0);
    }

    #[test]
    fn test_option_specific_polarity() {
        let d = doc("d", "The public guardian has limited contact with the family.");
        let t = taxonomy();
        let family = g3(&score_goals(&[d.clone()], GuardianshipOption::Family, &[], &t)).clone();
        let pg = g3(&score_goals(&[d], GuardianshipOption::PublicGuardian, &[], &t)).clone();

        assert_eq!(family.score, 5.0);
        assert_eq!(family.omitted_evidence.len(), 1);
        assert_eq!(pg.hinder_weight, 1.5);
        assert!(pg.score < 1e-6);
    }

    #[test]
    fn test_pattern_without_theme_vocabulary_is_ignored() {
        let d = doc("d", "The public guardian has limited contact with him.");
        let score = g3(&score_goals(&[d], GuardianshipOption::PublicGuardian, &[], &taxonomy())).clone();
        assert_eq!(score.score, 5.0);
        assert!(!score.has_evidence());
        assert!(score.hindering_evidence.is_empty());
        assert!(score.omitted_evidence.is_empty());
        assert!(score.evidence.is_empty());
    }

    #[test]
    fn test_unclassified_theme_units_are_omitted_evidence() {
        let d = doc("d", "Community groups meet on Tuesdays. Family lives nearby.");
        let score = g3(&score_goals(&[d], GuardianshipOption::Family, &[], &taxonomy())).clone();
        assert_eq!(score.score, 5.0);
        assert!(!score.has_evidence());
        assert_eq!(score.omitted_evidence.len(), 2);
        assert_eq!(score.evidence[0].polarity, Polarity::Neutral);
    }

    #[test]
    fn test_contested_supporting_evidence_is_flagged() {
        let d = doc("d", "Her family supports her every week.");
        let record = ContradictionRecord {
            topic: "family contact".into(),
            claim_a: ClaimRef {
                document_id: "d".into(),
                unit_id: "d:u0".into(),
                page_number: 1,
                text: "Her family supports her every week.".into(),
            },
            claim_b: ClaimRef {
                document_id: "e".into(),
                unit_id: "e:u4".into(),
                page_number: 2,
                text: "Family contact is rare.".into(),
            },
            doc_label_a: "D".into(),
            doc_label_b: "E".into(),
            conflict_type: ConflictType::DirectContradiction,
            severity: Severity::High,
            explanation: "x".into(),
        };
        let score = g3(&score_goals(&[d], GuardianshipOption::Family, &[record], &taxonomy())).clone();
        assert_eq!(score.conflicts.len(), 1);
        assert_eq!(score.conflicts[0].unit_id, "d:u0");
        assert_eq!(score.conflicts[0].conflict_type, ConflictType::DirectContradiction);
    }

    #[test]
    fn test_alignment_summary_recommendation() {
        let d = doc(
            "d",
            "Her family supports her. The public guardian has limited contact with her family.",
        );
        let summary = alignment_summary(&[d], &[], &taxonomy());
        assert!(summary.overall_family > summary.overall_public_guardian);
        assert!(summary.differential > 0.0);
        assert_eq!(summary.family.len(), 7);
        assert_eq!(summary.public_guardian.len(), 7);
    }

    #[test]
    fn test_taxonomy_requires_all_goals() {
        let mut config = test_goals();
        config.taxonomy.retain(|g| g.id != GoalId::G5);
        assert!(matches!(
            GoalTaxonomy::compile(&config),
            Err(ConfigurationError::Taxonomy(_))
        ));

        let mut config = test_goals();
        let duplicate = config.taxonomy[0].clone();
        config.taxonomy[1] = duplicate;
        assert!(matches!(
            GoalTaxonomy::compile(&config),
            Err(ConfigurationError::Taxonomy(_))
        ));
    }

    #[test]
    fn test_neutral_pattern_rejected() {
        let mut config = test_goals();
        config.taxonomy[2].patterns[0].polarity = Polarity::Neutral;
        assert!(GoalTaxonomy::compile(&config).is_err());
    }
}

#[cfg(test)]
mod proptests {
    use super::tests::test_goals;
    use super::*;
    use crate::segmenter::{segment, DocumentInput, SegmenterSettings};
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn scores_stay_in_range(text in "(family|supports|isolates|community|public guardian|limited contact|[a-z]{1,6}| |\\.){1,40}") {
            prop_assume!(!text.trim().is_empty());
            let taxonomy = GoalTaxonomy::compile(&test_goals()).unwrap();
            let doc = segment(&DocumentInput::new("p", text), &SegmenterSettings::default()).unwrap();
            for option in [GuardianshipOption::Family, GuardianshipOption::PublicGuardian] {
                for score in score_goals(&[doc.clone()], option, &[], &taxonomy) {
                    prop_assert!((0.0..=10.0).contains(&score.score));
                    if !score.has_evidence() {
                        prop_assert_eq!(score.score, 5.0);
                    }
                }
            }
        }
    }
}
