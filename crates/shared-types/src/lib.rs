pub mod goals;
pub mod types;

pub use goals::{
    AlignmentSummary, EvidenceRef, GoalConflict, GoalEvidence, GoalId, GoalScore,
    GuardianshipOption, Polarity, Recommendation,
};
pub use types::{
    Category, CategoryScore, ClaimRef, ConflictType, ContextGap, ContradictionRecord,
    EventCategory, Finding, MatchedSpan, MatchingBlock, Severity, SimilarityPair,
    TemplateReuseReport, TextUnit, TimelineEvent, TopicConflictRow,
};
