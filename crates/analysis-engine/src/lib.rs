pub mod comparator;
pub mod config;
pub mod coverage;
pub mod deadline;
pub mod detector;
pub mod error;
pub mod extractors;
pub mod goals;
pub mod patterns;
pub mod segmenter;
pub mod similarity;
pub mod timeline;

pub use comparator::{contradiction_matrix, compare_documents, LexiconTopicGrouper, TopicGrouper};
pub use config::AnalysisConfig;
pub use coverage::CoverageReport;
pub use deadline::Deadline;
pub use detector::DetectionReport;
pub use error::{ConfigurationError, EngineError, SegmentationError};
pub use segmenter::{DocumentInput, PageMap, SegmentedDocument};

use serde::{Deserialize, Serialize};
use shared_types::{
    AlignmentSummary, ContradictionRecord, GoalScore, GuardianshipOption, SimilarityPair,
    TemplateReuseReport, TimelineEvent, TopicConflictRow,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Everything the engine derives from a single document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentAnalysis {
    pub document_id: String,
    pub label: String,
    pub unit_count: usize,
    pub page_count: usize,
    pub detection: DetectionReport,
    pub coverage: CoverageReport,
    /// Near-duplicate units within the document
    pub repeated_content: Vec<SimilarityPair>,
    pub repeated_content_complete: bool,
    pub timeline: Vec<TimelineEvent>,
}

/// Cross-document results for a set of segmented documents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonAnalysis {
    pub contradictions: Vec<ContradictionRecord>,
    pub matrix: Vec<TopicConflictRow>,
    /// One report per ordered document pair
    pub template_reuse: Vec<TemplateReuseReport>,
    pub timeline: Vec<TimelineEvent>,
}

/// A document that could not be analysed; the rest of the request is unaffected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentFailure {
    pub document_id: String,
    pub label: String,
    pub error: String,
}

/// A multi-document analysis request
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub documents: Vec<DocumentInput>,
    pub options: Vec<GuardianshipOption>,
    pub deadline: Deadline,
}

impl AnalysisRequest {
    /// Request scoring both guardianship options, without a deadline
    pub fn new(documents: Vec<DocumentInput>) -> Self {
        Self {
            documents,
            options: vec![GuardianshipOption::Family, GuardianshipOption::PublicGuardian],
            deadline: Deadline::none(),
        }
    }

    pub fn with_options(mut self, options: Vec<GuardianshipOption>) -> Self {
        self.options = options;
        self
    }

    pub fn with_deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = deadline;
        self
    }
}

/// Structured output handed to report assembly
///
/// When both guardianship options are requested the scores live in
/// `alignment`; otherwise `goal_scores` holds the scores of each requested option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOutcome {
    pub rules_version: String,
    pub documents: Vec<DocumentAnalysis>,
    pub failures: Vec<DocumentFailure>,
    pub comparison: Option<ComparisonAnalysis>,
    pub goal_scores: Vec<GoalScore>,
    pub alignment: Option<AlignmentSummary>,
}

/// AnalysisEngine entry point
///
/// Holds the compiled configuration behind an `Arc`, so one engine can be
/// cloned into as many concurrent requests as needed.
#[derive(Clone)]
pub struct AnalysisEngine {
    config: Arc<AnalysisConfig>,
    grouper: Arc<dyn TopicGrouper>,
}

impl AnalysisEngine {
    pub fn new(config: Arc<AnalysisConfig>) -> Self {
        let grouper: Arc<dyn TopicGrouper> = Arc::new(config.comparator.grouper().clone());
        Self { config, grouper }
    }

    /// Engine over the built-in rule set
    pub fn builtin() -> Result<Self, ConfigurationError> {
        Ok(Self::new(Arc::new(AnalysisConfig::builtin()?)))
    }

    /// Replace the default topic grouping strategy
    pub fn with_grouper(mut self, grouper: Arc<dyn TopicGrouper>) -> Self {
        self.grouper = grouper;
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn segment(&self, input: &DocumentInput) -> Result<SegmentedDocument, SegmentationError> {
        segmenter::segment(input, &self.config.segmentation)
    }

    /// Per-document stages: detection, coverage, repeated content and timeline
    #[instrument(skip_all, fields(document_id = %document.document_id))]
    pub fn analyze_document(&self, document: &SegmentedDocument, deadline: Deadline) -> DocumentAnalysis {
        let detection = detector::detect(document, &self.config.detector, deadline);
        let coverage = self.config.coverage.check(document);
        let repeated = similarity::self_similarity(document, &self.config.similarity, deadline);
        let timeline = timeline::extract_timeline(document);

        info!(
            units = document.units.len(),
            findings = detection.findings.len(),
            severity = ?detection.overall_severity,
            missing_context = coverage.missing.len(),
            "Document analysed"
        );

        DocumentAnalysis {
            document_id: document.document_id.clone(),
            label: document.label.clone(),
            unit_count: document.units.len(),
            page_count: document.page_count,
            detection,
            coverage,
            repeated_content: repeated.pairs,
            repeated_content_complete: repeated.complete,
            timeline,
        }
    }

    /// Segment and analyse one document in a single call
    pub fn analyze_input(
        &self,
        input: &DocumentInput,
        deadline: Deadline,
    ) -> Result<DocumentAnalysis, EngineError> {
        let document = self.segment(input)?;
        Ok(self.analyze_document(&document, deadline))
    }

    pub fn contradictions(&self, documents: &[SegmentedDocument]) -> Vec<ContradictionRecord> {
        compare_documents(documents, &self.config.comparator, self.grouper.as_ref())
    }

    /// Cross-document stages; requires at least two documents to find anything
    pub fn compare(&self, documents: &[SegmentedDocument], deadline: Deadline) -> ComparisonAnalysis {
        let contradictions = self.contradictions(documents);
        let matrix = contradiction_matrix(&contradictions);

        let mut template_reuse = Vec::new();
        for (i, source) in documents.iter().enumerate() {
            for (j, target) in documents.iter().enumerate() {
                if i != j {
                    template_reuse.push(similarity::template_reuse(
                        source,
                        target,
                        &self.config.similarity,
                        deadline,
                    ));
                }
            }
        }

        ComparisonAnalysis {
            contradictions,
            matrix,
            template_reuse,
            timeline: timeline::combined_timeline(documents),
        }
    }

    pub fn score_goals(
        &self,
        documents: &[SegmentedDocument],
        option: GuardianshipOption,
        contradictions: &[ContradictionRecord],
    ) -> Vec<GoalScore> {
        goals::score_goals(documents, option, contradictions, &self.config.goals)
    }

    pub fn alignment(
        &self,
        documents: &[SegmentedDocument],
        contradictions: &[ContradictionRecord],
    ) -> AlignmentSummary {
        goals::alignment_summary(documents, contradictions, &self.config.goals)
    }

    /// Run the whole pipeline over a batch of documents
    ///
    /// Each document is segmented on its own; one that fails is reported in
    /// `failures` and left out of comparison and scoring.
    #[instrument(skip_all, fields(documents = request.documents.len()))]
    pub fn analyze(&self, request: &AnalysisRequest) -> AnalysisOutcome {
        let mut segmented = Vec::with_capacity(request.documents.len());
        let mut failures = Vec::new();

        // Unit ids embed the document id, so ids must be unique within a request
        let mut seen_ids = HashSet::new();
        for input in &request.documents {
            let result = if seen_ids.insert(input.document_id.as_str()) {
                self.segment(input).map_err(EngineError::from)
            } else {
                Err(EngineError::DuplicateDocument(input.document_id.clone()))
            };
            match result {
                Ok(document) => segmented.push(document),
                Err(e) => {
                    warn!(document_id = %input.document_id, error = %e, "Document rejected");
                    failures.push(DocumentFailure {
                        document_id: input.document_id.clone(),
                        label: input.label.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        let documents: Vec<DocumentAnalysis> = segmented
            .iter()
            .map(|d| self.analyze_document(d, request.deadline))
            .collect();

        let comparison = (segmented.len() >= 2).then(|| self.compare(&segmented, request.deadline));
        let contradictions = comparison
            .as_ref()
            .map(|c| c.contradictions.as_slice())
            .unwrap_or_default();

        let both = request.options.contains(&GuardianshipOption::Family)
            && request.options.contains(&GuardianshipOption::PublicGuardian);
        let (goal_scores, alignment) = if segmented.is_empty() {
            (Vec::new(), None)
        } else if both {
            (Vec::new(), Some(self.alignment(&segmented, contradictions)))
        } else {
            let scores = request
                .options
                .iter()
                .flat_map(|&option| self.score_goals(&segmented, option, contradictions))
                .collect();
            (scores, None)
        };

        info!(
            analysed = documents.len(),
            failed = failures.len(),
            contradictions = contradictions.len(),
            "Analysis request complete"
        );

        AnalysisOutcome {
            rules_version: self.config.version.clone(),
            documents,
            failures,
            comparison,
            goal_scores,
            alignment,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{Category, ConflictType, GoalId};

    fn engine() -> AnalysisEngine {
        AnalysisEngine::builtin().unwrap()
    }

    #[test]
    fn test_engine_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AnalysisEngine>();
    }

    #[test]
    fn test_engine_analyzes_single_document() {
        let engine = engine();
        let document = engine
            .segment(&DocumentInput::new(
                "report",
                "The client is always aggressive and disruptive. She was seen on 04/03/2024.",
            ))
            .unwrap();
        let analysis = engine.analyze_document(&document, Deadline::none());

        assert_eq!(analysis.unit_count, 2);
        assert!(analysis.detection.complete);
        assert!(analysis
            .detection
            .findings
            .iter()
            .any(|f| f.category == Category::UnsupportedClaim));
        assert_eq!(analysis.timeline.len(), 1);
    }

    #[test]
    fn test_analyze_input_reports_segmentation_error() {
        let err = engine()
            .analyze_input(&DocumentInput::new("blank", "\n\n"), Deadline::none())
            .unwrap_err();
        match err {
            EngineError::Segmentation(e) => assert_eq!(e.document_id(), "blank"),
            other => panic!("Expected segmentation error, got {:?}", other),
        }
    }

    #[test]
    fn test_failing_document_is_isolated() {
        let outcome = engine().analyze(&AnalysisRequest::new(vec![
            DocumentInput::new("good", "Risk assessment: moderate."),
            DocumentInput::new("empty", "   "),
            DocumentInput::new("other", "Risk assessment: high."),
        ]));

        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].document_id, "empty");
        assert_eq!(outcome.documents.len(), 2);

        let comparison = outcome.comparison.unwrap();
        assert!(comparison
            .contradictions
            .iter()
            .any(|r| r.conflict_type == ConflictType::SeverityChange));
        assert_eq!(comparison.template_reuse.len(), 2);
        assert!(outcome.alignment.is_some());
        assert!(outcome.goal_scores.is_empty());
    }

    #[test]
    fn test_repeated_document_id_is_rejected() {
        let outcome = engine().analyze(&AnalysisRequest::new(vec![
            DocumentInput::new("report", "Risk assessment: moderate."),
            DocumentInput::new("report", "Risk assessment: high."),
            DocumentInput::new("other", "Risk assessment: high."),
        ]));

        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].document_id, "report");
        assert!(outcome.failures[0].error.contains("more than one document"));
        assert_eq!(outcome.documents.len(), 2);

        let comparison = outcome.comparison.unwrap();
        assert_eq!(comparison.contradictions.len(), 1);
        assert_eq!(comparison.contradictions[0].conflict_type, ConflictType::SeverityChange);
        assert_eq!(comparison.contradictions[0].claim_a.document_id, "report");
        assert_eq!(comparison.contradictions[0].claim_b.document_id, "other");
    }

    #[test]
    fn test_single_option_request() {
        let request = AnalysisRequest::new(vec![DocumentInput::new("d", "Nothing of note.")])
            .with_options(vec![GuardianshipOption::Family]);
        let outcome = engine().analyze(&request);

        assert!(outcome.comparison.is_none());
        assert!(outcome.alignment.is_none());
        assert_eq!(outcome.goal_scores.len(), 7);
        assert_eq!(outcome.goal_scores[0].goal_id, GoalId::G1);
        assert!(outcome.goal_scores.iter().all(|s| s.score == 5.0));
    }

    #[test]
    fn test_outcome_json_shape() {
        let outcome = engine().analyze(&AnalysisRequest::new(vec![
            DocumentInput::new("a", "Risk assessment: moderate."),
            DocumentInput::new("b", "Risk assessment: high."),
        ]));
        let json = serde_json::to_value(&outcome).unwrap();

        assert_eq!(json["rules_version"], outcome.rules_version.as_str());
        assert_eq!(
            json["comparison"]["contradictions"][0]["conflict_type"],
            "severity_change"
        );
        assert_eq!(json["alignment"]["family"][2]["goal_id"], "G3");
        assert_eq!(json["alignment"]["recommendation"], "neutral");
    }

    #[test]
    fn test_all_documents_failing_is_not_an_error() {
        let outcome = engine().analyze(&AnalysisRequest::new(vec![DocumentInput::new("x", "")]));
        assert_eq!(outcome.failures.len(), 1);
        assert!(outcome.documents.is_empty());
        assert!(outcome.comparison.is_none());
        assert!(outcome.alignment.is_none());
    }

    #[test]
    fn test_custom_grouper_is_used() {
        struct Everything;
        impl TopicGrouper for Everything {
            fn topics(&self, _unit: &shared_types::TextUnit) -> Vec<String> {
                vec!["everything".to_string()]
            }
            fn name(&self) -> &str {
                "everything"
            }
        }

        let engine = engine().with_grouper(Arc::new(Everything));
        let docs: Vec<SegmentedDocument> = ["She was cooperative.", "She was uncooperative."]
            .iter()
            .enumerate()
            .map(|(i, text)| engine.segment(&DocumentInput::new(format!("d{}", i), *text)).unwrap())
            .collect();
        let records = engine.contradictions(&docs);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].topic, "everything");
        assert_eq!(records[0].conflict_type, ConflictType::DirectContradiction);
    }
}
