//! Domain types for premortem reports
//!
//! The report aggregate and everything the pipeline stages produce.
//! Wire format is camelCase to match the documented API shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Ordinal risk level, usable both as a label and as a 1-4 numeric scale
/// for weighted aggregation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Moderate,
    Elevated,
    Critical,
}

impl RiskLevel {
    /// Numeric ordinal used for weighted scoring (LOW=1 .. CRITICAL=4).
    pub fn ordinal(self) -> f64 {
        match self {
            RiskLevel::Low => 1.0,
            RiskLevel::Moderate => 2.0,
            RiskLevel::Elevated => 3.0,
            RiskLevel::Critical => 4.0,
        }
    }

    /// Map a weighted ordinal sum back to a level.
    /// Thresholds at 3.5 / 2.5 / 1.5.
    pub fn from_ordinal(score: f64) -> Self {
        if score >= 3.5 {
            RiskLevel::Critical
        } else if score >= 2.5 {
            RiskLevel::Elevated
        } else if score >= 1.5 {
            RiskLevel::Moderate
        } else {
            RiskLevel::Low
        }
    }
}

/// Structured breakdown of a raw idea, produced once by stage 1 and
/// immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IdeaDecomposition {
    pub value_proposition: String,
    pub target_market: String,
    pub business_model: String,
    pub key_assumptions: Vec<String>,
    pub testable_hypotheses: Vec<String>,
}

/// A source reference accumulated across pipeline stages.
///
/// Deduplicated by (url or title) at the end of a run, earliest
/// occurrence wins.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Citation {
    pub id: String,
    /// Hostname of the source, or `"inline"` for bracketed references
    /// without a structured source entry.
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub title: String,
    pub snippet: String,
    pub retrieved_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<f64>,
}

/// A categorized risk with supporting evidence.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Risk {
    pub id: String,
    pub category: String,
    pub title: String,
    pub description: String,
    pub level: RiskLevel,
    pub evidence: Vec<String>,
    /// Citation ids.
    pub citations: Vec<String>,
    /// How common this pattern is historically, 0-100.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub historical_prevalence: Option<u8>,
}

/// A named, historically observed pattern by which ventures of this type
/// tend to fail. Name is the dedup key (case-insensitive).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FailureMode {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Historical probability, 0-100.
    pub probability: u8,
    /// Free-text range, e.g. "6-18 months".
    pub timeframe: String,
    pub triggers: Vec<String>,
    pub mitigations: Vec<String>,
    pub citations: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeKind {
    Regulatory,
    Distribution,
    Technical,
    Market,
    Operational,
}

/// A structural go-to-market or operational challenge.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ChallengeKind,
    pub title: String,
    pub description: String,
    pub severity: RiskLevel,
    pub citations: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ComparableOutcome {
    Failed,
    Pivoted,
    Survived,
    Acquired,
    Ipo,
}

/// A real company used as an analogy to the idea under analysis.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Comparable {
    pub id: String,
    pub name: String,
    pub description: String,
    pub outcome: ComparableOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year_founded: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year_outcome: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub funding_raised: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub money_burned: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub lessons_learned: Vec<String>,
    pub similarities: Vec<String>,
    pub differences: Vec<String>,
}

/// Per-category risk levels feeding the weighted overall score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
pub struct RiskBreakdown {
    pub market: RiskLevel,
    pub timing: RiskLevel,
    pub regulatory: RiskLevel,
    pub competition: RiskLevel,
    pub execution: RiskLevel,
}

/// Composite weighted risk score with confidence and non-deterministic
/// framing.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RiskScore {
    pub overall: RiskLevel,
    /// 0-100, derived from evidence volume (floor 40, cap 85).
    pub confidence: u8,
    pub breakdown: RiskBreakdown,
    pub disclaimer: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LeverWeight {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LeverCategory {
    Product,
    Market,
    BusinessModel,
    Team,
    Timing,
}

/// A concrete, actionable recommendation intended to reduce identified
/// risk.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Lever {
    pub id: String,
    pub title: String,
    pub description: String,
    pub impact: LeverWeight,
    pub effort: LeverWeight,
    pub category: LeverCategory,
    pub steps: Vec<String>,
}

/// An observable post-launch signal indicating a failure mode is
/// materializing.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Warning {
    pub id: String,
    pub signal: String,
    pub description: String,
    /// When to be concerned.
    pub threshold: String,
    pub monitoring_method: String,
    pub urgency: RiskLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Generating,
    Complete,
    Error,
}

/// Aggregate root for a single analysis run.
///
/// Created once per submission, mutated only by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PremortemReport {
    pub id: String,
    /// Incremented on each re-run.
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    pub original_idea: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub decomposition: Option<IdeaDecomposition>,

    pub failure_modes: Vec<FailureMode>,
    pub market_risks: Vec<Risk>,
    pub timing_risks: Vec<Risk>,
    pub regulatory_risks: Vec<Risk>,
    pub distribution_challenges: Vec<Challenge>,

    pub failed_startups: Vec<Comparable>,
    pub surviving_startups: Vec<Comparable>,

    pub improvement_levers: Vec<Lever>,
    pub early_warnings: Vec<Warning>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_score: Option<RiskScore>,

    pub citations: Vec<Citation>,

    pub status: ReportStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PremortemReport {
    /// Fresh report shell for a new analysis run.
    pub fn new(idea: &str) -> Self {
        let now = Utc::now();
        Self {
            id: format!("report-{}", uuid::Uuid::new_v4()),
            version: 1,
            created_at: now,
            updated_at: now,
            original_idea: idea.to_string(),
            decomposition: None,
            failure_modes: Vec::new(),
            market_risks: Vec::new(),
            timing_risks: Vec::new(),
            regulatory_risks: Vec::new(),
            distribution_challenges: Vec::new(),
            failed_startups: Vec::new(),
            surviving_startups: Vec::new(),
            improvement_levers: Vec::new(),
            early_warnings: Vec::new(),
            risk_score: None,
            citations: Vec::new(),
            status: ReportStatus::Generating,
            error: None,
        }
    }
}
