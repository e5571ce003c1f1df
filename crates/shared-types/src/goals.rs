//! Goal taxonomy and alignment score types

use crate::types::ConflictType;
use serde::{Deserialize, Serialize};

/// Fixed client-objective taxonomy (G1-G7)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GoalId {
    G1,
    G2,
    G3,
    G4,
    G5,
    G6,
    G7,
}

impl GoalId {
    pub const ALL: [GoalId; 7] = [
        GoalId::G1,
        GoalId::G2,
        GoalId::G3,
        GoalId::G4,
        GoalId::G5,
        GoalId::G6,
        GoalId::G7,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GoalId::G1 => "G1",
            GoalId::G2 => "G2",
            GoalId::G3 => "G3",
            GoalId::G4 => "G4",
            GoalId::G5 => "G5",
            GoalId::G6 => "G6",
            GoalId::G7 => "G7",
        }
    }
}

impl std::fmt::Display for GoalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Guardianship arrangement under evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GuardianshipOption {
    Family,
    PublicGuardian,
}

impl GuardianshipOption {
    pub fn label(&self) -> &'static str {
        match self {
            GuardianshipOption::Family => "Family Guardianship",
            GuardianshipOption::PublicGuardian => "Public Guardian",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    Support,
    Hinder,
    Neutral,
}

/// Units sharing a goal, theme and polarity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalEvidence {
    pub goal_id: GoalId,
    pub unit_ids: Vec<String>,
    pub polarity: Polarity,
    pub theme: String,
    pub weight: f64,
}

/// A single unit cited as evidence for or against a goal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRef {
    pub unit_id: String,
    pub document_id: String,
    pub page_number: u32,
    pub excerpt: String,
    pub weight: f64,
}

/// Supporting evidence that is itself contested across documents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalConflict {
    pub unit_id: String,
    pub topic: String,
    pub conflict_type: ConflictType,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalScore {
    pub goal_id: GoalId,
    pub goal_name: String,
    pub option: GuardianshipOption,
    pub score: f64, // 0-10, 5 when there is no polarised evidence
    pub support_weight: f64,
    pub hinder_weight: f64,
    pub evidence_count: usize,
    pub conflicts: Vec<GoalConflict>,
    pub supporting_evidence: Vec<EvidenceRef>,
    pub hindering_evidence: Vec<EvidenceRef>,
    pub omitted_evidence: Vec<EvidenceRef>,
    pub evidence: Vec<GoalEvidence>,
}

impl GoalScore {
    /// Distinguishes "no evidence" from "balanced evidence", which share a score of 5
    pub fn has_evidence(&self) -> bool {
        self.evidence_count > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    StrongFamily,
    Family,
    Neutral,
    PublicGuardian,
    StrongPublicGuardian,
}

impl Recommendation {
    pub fn from_differential(differential: f64) -> Self {
        if differential >= 2.0 {
            Recommendation::StrongFamily
        } else if differential >= 0.5 {
            Recommendation::Family
        } else if differential <= -2.0 {
            Recommendation::StrongPublicGuardian
        } else if differential <= -0.5 {
            Recommendation::PublicGuardian
        } else {
            Recommendation::Neutral
        }
    }
}

/// Both guardianship options scored against every goal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentSummary {
    pub family: Vec<GoalScore>,
    pub public_guardian: Vec<GoalScore>,
    pub overall_family: f64,
    pub overall_public_guardian: f64,
    pub differential: f64,
    pub recommendation: Recommendation,
}
