//! End-to-end scenarios over the built-in rule set

use analysis_engine::{AnalysisEngine, AnalysisRequest, Deadline, DocumentInput, SegmentedDocument};
use pretty_assertions::assert_eq;
use shared_types::{
    Category, ConflictType, GoalId, GuardianshipOption, Recommendation, Severity,
};
use std::time::Duration;

const SHARED_PARAGRAPH: &str = "The support coordinator visited the residence and reviewed the \
    current support arrangements with staff members on duty. Several recommendations were made \
    regarding daily routines, meal preparation, medication prompts, community outings and the need \
    for consistent communication between the house manager and the wider team.";

fn engine() -> AnalysisEngine {
    AnalysisEngine::builtin().expect("built-in rules compile")
}

fn segmented(engine: &AnalysisEngine, id: &str, text: &str) -> SegmentedDocument {
    engine
        .segment(&DocumentInput::new(id, text))
        .expect("document segments")
}

#[test]
fn absolute_claim_is_flagged_once() {
    let engine = engine();
    let doc = segmented(&engine, "report", "The client is always aggressive and disruptive.");
    let analysis = engine.analyze_document(&doc, Deadline::none());

    let unsupported: Vec<_> = analysis
        .detection
        .findings_in(Category::UnsupportedClaim)
        .collect();
    assert_eq!(unsupported.len(), 1);
    assert_eq!(unsupported[0].matched_span.text, "always");
    assert_eq!(unsupported[0].unit_id, "report:u0");
    assert_eq!(unsupported[0].page_number, 1);
}

#[test]
fn findings_carry_page_numbers() {
    let engine = engine();
    let input = DocumentInput::from_pages(
        "paged",
        &["Summary of the visit.", "The client is always late to appointments."],
    );
    let doc = engine.segment(&input).unwrap();
    let analysis = engine.analyze_document(&doc, Deadline::none());

    let finding = analysis
        .detection
        .findings_in(Category::UnsupportedClaim)
        .next()
        .expect("absolute claim found");
    assert_eq!(finding.page_number, 2);
    assert_eq!(analysis.page_count, 2);
}

#[test]
fn severity_change_between_reports() {
    let engine = engine();
    let docs = vec![
        segmented(&engine, "a", "Risk assessment: moderate."),
        segmented(&engine, "b", "Risk assessment: high."),
    ];
    let records = engine.contradictions(&docs);

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].conflict_type, ConflictType::SeverityChange);
    assert_eq!(records[0].severity, Severity::High);
    assert_eq!(records[0].claim_a.document_id, "a");
    assert_eq!(records[0].claim_b.document_id, "b");
}

#[test]
fn shared_paragraph_is_reported_as_template_reuse() {
    let engine = engine();
    let outcome = engine.analyze(&AnalysisRequest::new(vec![
        DocumentInput::new("original", SHARED_PARAGRAPH),
        DocumentInput::new(
            "later",
            format!("Second report prepared for the tribunal.\n\n{}", SHARED_PARAGRAPH),
        ),
    ]));

    let comparison = outcome.comparison.expect("two documents compared");
    let report = comparison
        .template_reuse
        .iter()
        .find(|r| r.source_doc == "original" && r.target_doc == "later")
        .expect("original -> later report");

    assert!(report.is_template_reused);
    assert_eq!(report.percentage_similarity, 100.0);
    assert_eq!(report.severity, Severity::High);
    assert!(!report.matching_blocks.is_empty());
    assert!(report
        .pairs
        .iter()
        .all(|p| p.score >= engine.config().similarity.template_similarity_threshold));
    assert!(comparison.contradictions.is_empty());
}

#[test]
fn family_support_raises_relationship_goal() {
    let engine = engine();
    let doc = segmented(
        &engine,
        "notes",
        "His family visits him every weekend. His mother helps him cook on Sundays. \
         His sister encourages him to call his cousins.",
    );
    let scores = engine.score_goals(&[doc], GuardianshipOption::Family, &[]);
    let g3 = scores
        .iter()
        .find(|s| s.goal_id == GoalId::G3)
        .expect("G3 scored");

    assert!(g3.score > 5.0, "score was {}", g3.score);
    assert_eq!(g3.supporting_evidence.len(), 3);
    assert!(g3.hindering_evidence.is_empty());
    assert!(g3.conflicts.is_empty());
}

#[test]
fn unrelated_documents_do_not_conflict() {
    let engine = engine();
    let docs = vec![
        segmented(&engine, "a", "The garden was planted in spring."),
        segmented(&engine, "b", "She enjoys painting landscapes."),
    ];
    assert!(engine.contradictions(&docs).is_empty());
}

#[test]
fn no_evidence_scores_neutral() {
    let engine = engine();
    let doc = segmented(&engine, "d", "The weather was mild.");
    let summary = engine.alignment(&[doc], &[]);

    assert!(summary.family.iter().all(|s| s.score == 5.0 && !s.has_evidence()));
    assert!(summary.public_guardian.iter().all(|s| s.score == 5.0));
    assert_eq!(summary.differential, 0.0);
    assert_eq!(summary.recommendation, Recommendation::Neutral);
}

#[test]
fn option_pattern_needs_goal_vocabulary() {
    let engine = engine();
    let doc = segmented(&engine, "d", "He attends a day program on Mondays.");
    let scores = engine.score_goals(&[doc], GuardianshipOption::PublicGuardian, &[]);

    assert_eq!(scores.len(), 7);
    for score in &scores {
        assert_eq!(score.score, 5.0, "{:?} moved without theme vocabulary", score.goal_id);
        assert!(!score.has_evidence());
    }
}

#[test]
fn sentence_ending_in_no_splits() {
    let engine = engine();
    let doc = segmented(&engine, "d", "She said no. Staff left.");
    let texts: Vec<&str> = doc.units.iter().map(|u| u.text.trim()).collect();
    assert_eq!(texts, vec!["She said no.", "Staff left."]);
}

#[test]
fn expired_deadline_marks_results_incomplete() {
    let engine = engine();
    let doc = segmented(&engine, "d", "The client is always late. She is never on time.");
    let analysis = engine.analyze_document(&doc, Deadline::after(Duration::ZERO));

    assert!(!analysis.detection.complete);
    assert_eq!(analysis.detection.units_scanned, 0);
    assert!(!analysis.repeated_content_complete);
}

#[test]
fn analysis_is_deterministic() {
    let engine = engine();
    let request = AnalysisRequest::new(vec![
        DocumentInput::new(
            "a",
            "Risk assessment: moderate. His family visits every week. \
             The client was cooperative during the review on 3 March 2024.",
        ),
        DocumentInput::new(
            "b",
            "Risk assessment: high. Family contact was restricted. \
             The client was uncooperative during the review on 5 March 2024.",
        ),
    ]);

    let first = engine.analyze(&request);
    let second = engine.analyze(&request);
    assert_eq!(first, second);
    assert!(!first.comparison.expect("compared").contradictions.is_empty());
}
