//! Document-level context coverage
//!
//! A practitioner report that describes behaviour should also describe what
//! led up to it, what went well, and how the family and the client see it.
//! Each configured element is looked for anywhere in the document; the ones
//! never mentioned are reported as gaps.

use crate::config::ContextElementConfig;
use crate::error::ConfigurationError;
use crate::patterns::compile_pattern;
use crate::segmenter::SegmentedDocument;
use regex::Regex;
use serde::{Deserialize, Serialize};
use shared_types::{ContextGap, Severity};
use std::collections::HashSet;
use tracing::debug;

#[derive(Debug, Clone)]
struct ContextElement {
    name: String,
    regex: Regex,
    severity: Severity,
    description: String,
    impact: String,
}

#[derive(Debug, Clone, Default)]
pub struct ContextChecklist {
    elements: Vec<ContextElement>,
}

impl ContextChecklist {
    pub fn compile(configs: &[ContextElementConfig]) -> Result<Self, ConfigurationError> {
        let mut names = HashSet::new();
        let mut elements = Vec::with_capacity(configs.len());

        for config in configs {
            let field = format!("detector.context_elements.{}", config.name);
            if !names.insert(config.name.as_str()) {
                return Err(ConfigurationError::invalid(field, "duplicate context element"));
            }
            if config.patterns.is_empty() {
                return Err(ConfigurationError::invalid(field, "no patterns"));
            }
            let joined = config
                .patterns
                .iter()
                .map(|p| format!("(?:{})", p))
                .collect::<Vec<_>>()
                .join("|");

            elements.push(ContextElement {
                name: config.name.clone(),
                regex: compile_pattern(&field, &joined)?,
                severity: config.severity,
                description: config.description.clone(),
                impact: config.impact.clone(),
            });
        }

        Ok(Self { elements })
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn check(&self, document: &SegmentedDocument) -> CoverageReport {
        let mut present = Vec::new();
        let mut missing = Vec::new();

        for element in &self.elements {
            if document.units.iter().any(|u| element.regex.is_match(&u.text)) {
                present.push(element.name.clone());
            } else {
                missing.push(ContextGap {
                    element: element.name.clone(),
                    description: element.description.clone(),
                    impact: element.impact.clone(),
                    severity: element.severity,
                });
            }
        }

        let omission_severity_score = if self.elements.is_empty() {
            0.0
        } else {
            missing.len() as f64 / self.elements.len() as f64 * 10.0
        };

        debug!(
            document_id = %document.document_id,
            present = present.len(),
            missing = missing.len(),
            "Context coverage checked"
        );

        CoverageReport {
            document_id: document.document_id.clone(),
            present,
            missing,
            omission_severity_score,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageReport {
    pub document_id: String,
    pub present: Vec<String>,
    pub missing: Vec<ContextGap>,
    /// Share of elements missing, scaled to 0-10
    pub omission_severity_score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmenter::{segment, DocumentInput, SegmenterSettings};
    use pretty_assertions::assert_eq;

    fn checklist() -> ContextChecklist {
        ContextChecklist::compile(&[
            ContextElementConfig {
                name: "antecedents".into(),
                patterns: vec![r"\btriggered\s+by\b".into(), r"\bprior\s+to\b".into()],
                severity: Severity::High,
                description: "What preceded the behaviour".into(),
                impact: "Behaviour appears unprovoked".into(),
            },
            ContextElementConfig {
                name: "client_perspective".into(),
                patterns: vec![r"\b(?:client|he|she)\s+(?:said|stated|explained)\b".into()],
                severity: Severity::Critical,
                description: "The client's own account".into(),
                impact: "Client voice is absent".into(),
            },
        ])
        .unwrap()
    }

    fn doc(text: &str) -> SegmentedDocument {
        segment(&DocumentInput::new("doc", text), &SegmenterSettings::default()).unwrap()
    }

    #[test]
    fn test_reports_missing_elements() {
        let report = checklist().check(&doc("Prior to the visit he was upset. He shouted."));
        assert_eq!(report.present, vec!["antecedents".to_string()]);
        assert_eq!(report.missing.len(), 1);
        assert_eq!(report.missing[0].element, "client_perspective");
        assert_eq!(report.missing[0].severity, Severity::Critical);
        assert_eq!(report.omission_severity_score, 5.0);
    }

    #[test]
    fn test_full_coverage_scores_zero() {
        let report = checklist().check(&doc(
            "The outburst was triggered by noise. She explained she was tired.",
        ));
        assert!(report.missing.is_empty());
        assert_eq!(report.omission_severity_score, 0.0);
    }

    #[test]
    fn test_empty_checklist() {
        let report = ContextChecklist::default().check(&doc("Anything."));
        assert!(report.present.is_empty() && report.missing.is_empty());
        assert_eq!(report.omission_severity_score, 0.0);
    }

    #[test]
    fn test_duplicate_element_rejected() {
        let element = ContextElementConfig {
            name: "x".into(),
            patterns: vec!["a".into()],
            severity: Severity::Low,
            description: String::new(),
            impact: String::new(),
        };
        assert!(ContextChecklist::compile(&[element.clone(), element]).is_err());
    }
}
