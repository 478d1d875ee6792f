//! Pipeline stage 3: failure-pattern synthesis
//!
//! Derives failure modes, categorized risks, distribution challenges and
//! comparable companies from the decomposition plus retrieved evidence.
//! The generation-service enrichment is wrapped individually; its failure
//! only skips that sub-source. The stage as a whole never fails.

use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

use crate::model::{
    Challenge, ChallengeKind, Citation, Comparable, ComparableOutcome, FailureMode,
    IdeaDecomposition, Risk, RiskLevel,
};
use crate::service::evidence::{EvidenceClient, QueryOptions};
use crate::service::pipeline::retrieve::{CompetitorStatus, RetrievalResult};
use crate::service::prompts::{build_failure_pattern_prompt, FAILURE_PATTERNS_PROMPT};

/// Merged failure-mode list cap.
const MAX_FAILURE_MODES: usize = 7;
/// Modes taken from one generation response before the merge.
const MAX_PARSED_MODES: usize = 5;
/// Comparables kept per outcome bucket.
const MAX_COMPARABLES: usize = 5;
/// Compliance cost above which a regulatory risk is elevated.
const ELEVATED_COMPLIANCE_COST: u64 = 50_000;

/// Everything stage 3 hands to scoring.
#[derive(Debug, Clone)]
pub struct SynthesisResult {
    pub failure_modes: Vec<FailureMode>,
    pub market_risks: Vec<Risk>,
    pub timing_risks: Vec<Risk>,
    pub regulatory_risks: Vec<Risk>,
    pub distribution_challenges: Vec<Challenge>,
    pub failed_comparables: Vec<Comparable>,
    pub surviving_comparables: Vec<Comparable>,
    pub citations: Vec<Citation>,
}

/// Synthesize failure patterns from retrieved evidence.
pub async fn synthesize(
    evidence: &EvidenceClient,
    decomposition: &IdeaDecomposition,
    retrieval: &RetrievalResult,
) -> SynthesisResult {
    let mut citations = retrieval.citations.clone();

    let failure_modes =
        identify_failure_modes(evidence, decomposition, retrieval, &mut citations).await;

    let market_risks = identify_market_risks(retrieval);
    let timing_risks = identify_timing_risks(decomposition, retrieval);
    let regulatory_risks = identify_regulatory_risks(retrieval);
    let distribution_challenges = identify_distribution_challenges(decomposition, retrieval);

    let (failed_comparables, surviving_comparables) = categorize_comparables(retrieval);

    tracing::debug!(
        failure_modes = failure_modes.len(),
        market_risks = market_risks.len(),
        timing_risks = timing_risks.len(),
        regulatory_risks = regulatory_risks.len(),
        challenges = distribution_challenges.len(),
        "Pattern synthesis complete"
    );

    SynthesisResult {
        failure_modes,
        market_risks,
        timing_risks,
        regulatory_risks,
        distribution_challenges,
        failed_comparables,
        surviving_comparables,
        citations,
    }
}

fn next_id(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4())
}

// ============================================================================
// Failure modes
// ============================================================================

/// Combine generation-parsed failure modes with the rule catalog.
/// Parsed modes come first, duplicates by case-insensitive name are
/// dropped keeping the first seen, and the merged list is capped at 7.
async fn identify_failure_modes(
    evidence: &EvidenceClient,
    decomposition: &IdeaDecomposition,
    retrieval: &RetrievalResult,
    citations: &mut Vec<Citation>,
) -> Vec<FailureMode> {
    let mut modes = Vec::new();

    let failed_names = retrieval
        .historical_failures
        .iter()
        .take(5)
        .map(|f| f.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    match evidence
        .query(
            FAILURE_PATTERNS_PROMPT,
            &build_failure_pattern_prompt(decomposition, &failed_names),
            QueryOptions::default(),
        )
        .await
    {
        Ok(response) => {
            citations.extend(response.citations);
            modes.extend(parse_failure_modes(&response.content));
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failure-pattern retrieval failed, using catalog only");
        }
    }

    modes.extend(catalog_failure_modes(&decomposition.business_model));

    merge_failure_modes(modes)
}

/// Dedup by case-insensitive name (first occurrence wins), cap at 7.
pub(crate) fn merge_failure_modes(modes: Vec<FailureMode>) -> Vec<FailureMode> {
    let mut seen = std::collections::HashSet::new();
    let mut merged: Vec<FailureMode> = modes
        .into_iter()
        .filter(|mode| seen.insert(mode.name.to_lowercase()))
        .collect();
    merged.truncate(MAX_FAILURE_MODES);
    merged
}

/// Fixed catalog keyed on business-model keywords. Probabilities and
/// timeframes are hand-tuned configuration data; reproduce them exactly.
pub(crate) fn catalog_failure_modes(business_model: &str) -> Vec<FailureMode> {
    let model = business_model.to_lowercase();
    let mut modes = Vec::new();

    if model.contains("marketplace") {
        modes.push(FailureMode {
            id: next_id("fm"),
            name: "Chicken-and-Egg Problem".to_string(),
            description:
                "Failure to achieve critical mass on both supply and demand sides simultaneously"
                    .to_string(),
            probability: 70,
            timeframe: "6-18 months".to_string(),
            triggers: vec![
                "Imbalanced growth between supply/demand".to_string(),
                "High churn on one side".to_string(),
                "Poor unit economics early on".to_string(),
            ],
            mitigations: vec![
                "Focus on one side first".to_string(),
                "Create artificial supply".to_string(),
                "Geographic concentration".to_string(),
            ],
            citations: vec![],
        });
    }

    if model.contains("saas") || model.contains("subscription") {
        modes.push(FailureMode {
            id: next_id("fm"),
            name: "Churn Death Spiral".to_string(),
            description:
                "Customer churn rate exceeds acquisition rate, leading to inevitable decline"
                    .to_string(),
            probability: 60,
            timeframe: "12-24 months".to_string(),
            triggers: vec![
                "Monthly churn > 5%".to_string(),
                "Declining engagement metrics".to_string(),
                "Feature requests not addressed".to_string(),
            ],
            mitigations: vec![
                "Focus on activation and onboarding".to_string(),
                "Build switching costs".to_string(),
                "Customer success program".to_string(),
            ],
            citations: vec![],
        });

        modes.push(FailureMode {
            id: next_id("fm"),
            name: "CAC Blowout".to_string(),
            description:
                "Customer acquisition costs exceed lifetime value, making growth unprofitable"
                    .to_string(),
            probability: 55,
            timeframe: "12-18 months".to_string(),
            triggers: vec![
                "Rising ad costs".to_string(),
                "Declining conversion rates".to_string(),
                "LTV < 3x CAC".to_string(),
            ],
            mitigations: vec![
                "Organic growth channels".to_string(),
                "Product-led growth".to_string(),
                "Referral programs".to_string(),
            ],
            citations: vec![],
        });
    }

    if model.contains("consumer") || model.contains("app") {
        modes.push(FailureMode {
            id: next_id("fm"),
            name: "Viral Loop Failure".to_string(),
            description:
                "Product fails to achieve organic viral growth, requiring unsustainable paid acquisition"
                    .to_string(),
            probability: 75,
            timeframe: "3-12 months".to_string(),
            triggers: vec![
                "K-factor < 1".to_string(),
                "Low sharing/invite rate".to_string(),
                "Poor retention D1/D7/D30".to_string(),
            ],
            mitigations: vec![
                "Build sharing into core loop".to_string(),
                "Incentivize referrals".to_string(),
                "Community building".to_string(),
            ],
            citations: vec![],
        });
    }

    if model.contains("ai") || model.contains("ml") {
        modes.push(FailureMode {
            id: next_id("fm"),
            name: "AI Commoditization".to_string(),
            description:
                "Large incumbents release similar AI features, eliminating startup advantage"
                    .to_string(),
            probability: 65,
            timeframe: "6-18 months".to_string(),
            triggers: vec![
                "Foundation model improvements".to_string(),
                "Big tech feature announcements".to_string(),
                "Open source alternatives".to_string(),
            ],
            mitigations: vec![
                "Proprietary data moat".to_string(),
                "Vertical specialization".to_string(),
                "Workflow integration".to_string(),
            ],
            citations: vec![],
        });
    }

    // Applies to every business model.
    modes.push(FailureMode {
        id: next_id("fm"),
        name: "Premature Scaling".to_string(),
        description:
            "Scaling operations before achieving product-market fit, burning capital inefficiently"
                .to_string(),
        probability: 50,
        timeframe: "12-24 months".to_string(),
        triggers: vec![
            "Hiring ahead of revenue".to_string(),
            "Multiple market expansion".to_string(),
            "Feature bloat".to_string(),
        ],
        mitigations: vec![
            "Focus on one market segment".to_string(),
            "Validate before scaling".to_string(),
            "Lean operations".to_string(),
        ],
        citations: vec![],
    });

    modes
}

static MODE_SECTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+\.|#{1,3}\s").unwrap());
static MODE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*\*([^*]+)\*\*|^([A-Z][^:\n]+)").unwrap());
static MODE_PROBABILITY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\s*%").unwrap());
static MODE_TIMEFRAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d+[-–]\d+\s*(?:months?|years?))").unwrap());

/// Parse failure modes out of generated text: sections split on
/// numbering/heading markers, requiring a bold-or-capitalized name token.
pub(crate) fn parse_failure_modes(content: &str) -> Vec<FailureMode> {
    let mut modes = Vec::new();

    for section in MODE_SECTION.split(content) {
        if section.len() < 50 {
            continue;
        }

        let name = match MODE_NAME.captures(section) {
            Some(captures) => captures
                .get(1)
                .or_else(|| captures.get(2))
                .map(|m| m.as_str().trim().to_string()),
            None => None,
        };
        let name = match name {
            Some(name) if name.len() >= 5 && name.len() <= 100 => name,
            _ => continue,
        };

        let probability = MODE_PROBABILITY
            .captures(section)
            .and_then(|c| c[1].parse::<u64>().ok())
            .map(|p| p.min(100) as u8)
            .unwrap_or(50);

        let timeframe = MODE_TIMEFRAME
            .captures(section)
            .map(|c| c[1].to_string())
            .unwrap_or_else(|| "12-24 months".to_string());

        let description = section
            .chars()
            .take(200)
            .collect::<String>()
            .replace("**", "")
            .trim()
            .to_string();

        modes.push(FailureMode {
            id: next_id("fm"),
            name,
            description,
            probability,
            timeframe,
            triggers: vec![],
            mitigations: vec![],
            citations: vec![],
        });
    }

    modes.truncate(MAX_PARSED_MODES);
    modes
}

// ============================================================================
// Risks and challenges
// ============================================================================

pub(crate) fn identify_market_risks(retrieval: &RetrievalResult) -> Vec<Risk> {
    let mut risks = Vec::new();

    let competitor_count = retrieval.competitors.len();
    if competitor_count > 5 {
        risks.push(Risk {
            id: next_id("mr"),
            category: "Competition".to_string(),
            title: "High Market Saturation".to_string(),
            description: format!(
                "{}+ competitors identified in this space, indicating potential commoditization",
                competitor_count
            ),
            level: if competitor_count > 10 {
                RiskLevel::Critical
            } else {
                RiskLevel::Elevated
            },
            evidence: vec![format!("{} competitors found", competitor_count)],
            citations: vec![],
            historical_prevalence: Some(70),
        });
    }

    let failed: Vec<_> = retrieval
        .competitors
        .iter()
        .filter(|c| c.status == CompetitorStatus::ShutDown)
        .collect();
    if !failed.is_empty() {
        risks.push(Risk {
            id: next_id("mr"),
            category: "Market Validation".to_string(),
            title: "Prior Market Failures".to_string(),
            description: format!(
                "{} similar companies have failed in this market",
                failed.len()
            ),
            level: if failed.len() > 2 {
                RiskLevel::Critical
            } else {
                RiskLevel::Elevated
            },
            evidence: failed
                .iter()
                .map(|c| format!("{} - {}", c.name, c.status))
                .collect(),
            citations: vec![],
            historical_prevalence: Some(60),
        });
    }

    let size = &retrieval.market_data.size;
    if size == "Unknown" || size.contains("million") {
        risks.push(Risk {
            id: next_id("mr"),
            category: "Market Size".to_string(),
            title: "Limited Market Size".to_string(),
            description: "Market may be too small to support a venture-scale outcome".to_string(),
            level: RiskLevel::Moderate,
            evidence: vec![format!("Market size: {}", size)],
            citations: vec![],
            historical_prevalence: Some(40),
        });
    }

    risks
}

pub(crate) fn identify_timing_risks(
    decomposition: &IdeaDecomposition,
    retrieval: &RetrievalResult,
) -> Vec<Risk> {
    let mut risks = Vec::new();
    let value_prop = decomposition.value_proposition.to_lowercase();

    if value_prop.contains("ai") || value_prop.contains("gpt") || value_prop.contains("llm") {
        risks.push(Risk {
            id: next_id("tr"),
            category: "Technology Timing".to_string(),
            title: "AI Hype Cycle Risk".to_string(),
            description:
                "Entering AI market during peak hype - high competition, inflated expectations, potential correction"
                    .to_string(),
            level: RiskLevel::Elevated,
            evidence: vec![
                "2023-2025 AI funding boom".to_string(),
                "Rapid model commoditization".to_string(),
            ],
            citations: vec![],
            historical_prevalence: Some(55),
        });
    }

    if !retrieval.market_data.trends.is_empty() {
        let trends_text = retrieval.market_data.trends.join(" ").to_lowercase();
        if trends_text.contains("declining") || trends_text.contains("mature") {
            risks.push(Risk {
                id: next_id("tr"),
                category: "Market Timing".to_string(),
                title: "Late Market Entry".to_string(),
                description: "Market shows signs of maturity or decline".to_string(),
                level: RiskLevel::Elevated,
                evidence: retrieval.market_data.trends.clone(),
                citations: vec![],
                historical_prevalence: Some(45),
            });
        }
    }

    risks
}

pub(crate) fn identify_regulatory_risks(retrieval: &RetrievalResult) -> Vec<Risk> {
    retrieval
        .regulations
        .iter()
        .map(|regulation| {
            let impact: String = regulation.impact.chars().take(150).collect();
            Risk {
                id: next_id("rr"),
                category: "Regulatory".to_string(),
                title: format!("{} Compliance Required", regulation.regulation),
                description: format!("{}: {}", regulation.jurisdiction, impact),
                level: regulatory_level(&regulation.compliance_cost),
                evidence: vec![format!("Compliance cost: {}", regulation.compliance_cost)],
                citations: vec![],
                historical_prevalence: Some(30),
            }
        })
        .collect()
}

/// Elevated when a dollar figure in the cost text exceeds the threshold.
fn regulatory_level(compliance_cost: &str) -> RiskLevel {
    if !compliance_cost.contains('$') {
        return RiskLevel::Moderate;
    }
    let digits: String = compliance_cost.chars().filter(char::is_ascii_digit).collect();
    let exceeds = digits
        .parse::<u64>()
        .map(|value| value > ELEVATED_COMPLIANCE_COST)
        // Overflowing digit strings are certainly above the threshold.
        .unwrap_or(!digits.is_empty());
    if exceeds {
        RiskLevel::Elevated
    } else {
        RiskLevel::Moderate
    }
}

pub(crate) fn identify_distribution_challenges(
    decomposition: &IdeaDecomposition,
    retrieval: &RetrievalResult,
) -> Vec<Challenge> {
    let mut challenges = Vec::new();
    let market = decomposition.target_market.to_lowercase();
    let model = decomposition.business_model.to_lowercase();

    if market.contains("enterprise") || market.contains("b2b") {
        challenges.push(Challenge {
            id: next_id("dc"),
            kind: ChallengeKind::Distribution,
            title: "Enterprise Sales Cycle".to_string(),
            description:
                "Long sales cycles (3-12 months), require dedicated sales team, high customer acquisition cost"
                    .to_string(),
            severity: RiskLevel::Elevated,
            citations: vec![],
        });
    }

    if model.contains("app") || model.contains("consumer") {
        challenges.push(Challenge {
            id: next_id("dc"),
            kind: ChallengeKind::Distribution,
            title: "App Store Discovery".to_string(),
            description:
                "Extremely competitive app stores, high CAC, algorithm dependency for visibility"
                    .to_string(),
            severity: RiskLevel::Critical,
            citations: vec![],
        });
    }

    if retrieval
        .competitors
        .iter()
        .any(|c| c.description.to_lowercase().contains("platform"))
    {
        challenges.push(Challenge {
            id: next_id("dc"),
            kind: ChallengeKind::Distribution,
            title: "Platform Dependency Risk".to_string(),
            description:
                "Reliance on third-party platforms (Google, Apple, Meta) creates existential risk from policy changes"
                    .to_string(),
            severity: RiskLevel::Elevated,
            citations: vec![],
        });
    }

    challenges
}

// ============================================================================
// Comparables
// ============================================================================

/// Historical failure records become failed comparables; competitors not
/// shut down become surviving or acquired ones. Both buckets cap at 5.
pub(crate) fn categorize_comparables(
    retrieval: &RetrievalResult,
) -> (Vec<Comparable>, Vec<Comparable>) {
    let failed: Vec<Comparable> = retrieval
        .historical_failures
        .iter()
        .take(MAX_COMPARABLES)
        .map(|f| Comparable {
            id: f.id.clone(),
            name: f.name.clone(),
            description: f.description.clone(),
            outcome: ComparableOutcome::Failed,
            year_founded: None,
            year_outcome: f.year_died,
            funding_raised: None,
            money_burned: f.money_burned.clone(),
            failure_reason: f.failure_reason.clone(),
            lessons_learned: f.failure_reason.clone().into_iter().collect(),
            similarities: [Some(f.category.clone()), f.sector.clone()]
                .into_iter()
                .flatten()
                .filter(|s| !s.is_empty())
                .collect(),
            differences: vec![],
        })
        .collect();

    let surviving: Vec<Comparable> = retrieval
        .competitors
        .iter()
        .filter(|c| c.status != CompetitorStatus::ShutDown)
        .take(MAX_COMPARABLES)
        .map(|c| Comparable {
            id: next_id("comp"),
            name: c.name.clone(),
            description: c.description.clone(),
            outcome: if c.status == CompetitorStatus::Acquired {
                ComparableOutcome::Acquired
            } else {
                ComparableOutcome::Survived
            },
            year_founded: None,
            year_outcome: None,
            funding_raised: c.funding.clone(),
            money_burned: None,
            failure_reason: None,
            lessons_learned: vec![],
            similarities: vec![],
            differences: vec![],
        })
        .collect();

    (failed, surviving)
}
