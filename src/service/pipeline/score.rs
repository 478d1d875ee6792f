//! Pipeline stage 4: risk scoring
//!
//! Pure function of the decomposition and synthesis results: composite
//! weighted risk score, improvement levers and early-warning signals.
//! No I/O.

use uuid::Uuid;

use crate::model::{
    FailureMode, IdeaDecomposition, Lever, LeverCategory, LeverWeight, Risk, RiskBreakdown,
    RiskLevel, RiskScore, Warning,
};
use crate::service::pipeline::synthesize::SynthesisResult;

/// Category weights for the overall score: market, timing, regulatory,
/// competition, execution. Hand-tuned configuration data.
const WEIGHT_MARKET: f64 = 0.25;
const WEIGHT_TIMING: f64 = 0.15;
const WEIGHT_REGULATORY: f64 = 0.15;
const WEIGHT_COMPETITION: f64 = 0.25;
const WEIGHT_EXECUTION: f64 = 0.20;

/// Confidence is 40 plus 3 per evidence item, capped at 85.
const CONFIDENCE_FLOOR: u32 = 40;
const CONFIDENCE_CAP: u32 = 85;
const CONFIDENCE_PER_EVIDENCE: u32 = 3;

const MAX_LEVERS: usize = 6;
const MAX_WARNINGS: usize = 8;
/// The two universal warnings are always present; derived warnings
/// truncate first.
const FIXED_WARNINGS: usize = 2;

/// Everything stage 4 contributes to the report.
#[derive(Debug, Clone)]
pub struct ScoringResult {
    pub risk_score: RiskScore,
    pub improvement_levers: Vec<Lever>,
    pub early_warnings: Vec<Warning>,
}

/// Generate risk score and actionables from synthesis.
pub fn score(decomposition: &IdeaDecomposition, synthesis: &SynthesisResult) -> ScoringResult {
    ScoringResult {
        risk_score: calculate_risk_score(synthesis),
        improvement_levers: generate_levers(decomposition, synthesis),
        early_warnings: generate_warnings(synthesis),
    }
}

fn next_id(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4())
}

// ============================================================================
// Risk score
// ============================================================================

fn calculate_risk_score(synthesis: &SynthesisResult) -> RiskScore {
    let breakdown = RiskBreakdown {
        market: category_score(&synthesis.market_risks),
        timing: category_score(&synthesis.timing_risks),
        regulatory: category_score(&synthesis.regulatory_risks),
        competition: competition_score(
            synthesis.failed_comparables.len(),
            synthesis.surviving_comparables.len(),
        ),
        execution: execution_score(&synthesis.failure_modes),
    };

    let weighted_sum = breakdown.market.ordinal() * WEIGHT_MARKET
        + breakdown.timing.ordinal() * WEIGHT_TIMING
        + breakdown.regulatory.ordinal() * WEIGHT_REGULATORY
        + breakdown.competition.ordinal() * WEIGHT_COMPETITION
        + breakdown.execution.ordinal() * WEIGHT_EXECUTION;
    let overall = RiskLevel::from_ordinal(weighted_sum);

    let evidence_count = synthesis.market_risks.len()
        + synthesis.timing_risks.len()
        + synthesis.regulatory_risks.len()
        + synthesis.failed_comparables.len()
        + synthesis.citations.len();
    let confidence = confidence_for(evidence_count);

    RiskScore {
        overall,
        confidence,
        breakdown,
        disclaimer: disclaimer_for(overall, confidence),
    }
}

/// Score one risk category by its level counts. Empty defaults to LOW.
fn category_score(risks: &[Risk]) -> RiskLevel {
    if risks.is_empty() {
        return RiskLevel::Low;
    }

    let critical = risks.iter().filter(|r| r.level == RiskLevel::Critical).count();
    let elevated = risks.iter().filter(|r| r.level == RiskLevel::Elevated).count();

    if critical >= 2 {
        RiskLevel::Critical
    } else if critical >= 1 || elevated >= 2 {
        RiskLevel::Elevated
    } else if elevated >= 1 {
        RiskLevel::Moderate
    } else {
        RiskLevel::Low
    }
}

/// Score competition by the failed-to-surviving comparable ratio.
fn competition_score(failed_count: usize, surviving_count: usize) -> RiskLevel {
    let ratio = if surviving_count > 0 {
        failed_count as f64 / surviving_count as f64
    } else {
        failed_count as f64
    };

    if ratio >= 3.0 || (failed_count >= 5 && surviving_count <= 1) {
        RiskLevel::Critical
    } else if ratio >= 2.0 || failed_count >= 3 {
        RiskLevel::Elevated
    } else if ratio >= 1.0 || failed_count >= 2 {
        RiskLevel::Moderate
    } else {
        RiskLevel::Low
    }
}

/// Score execution by average failure-mode probability (default 50 when
/// no modes exist).
fn execution_score(failure_modes: &[FailureMode]) -> RiskLevel {
    let average = if failure_modes.is_empty() {
        50.0
    } else {
        failure_modes
            .iter()
            .map(|m| m.probability as f64)
            .sum::<f64>()
            / failure_modes.len() as f64
    };

    if average >= 70.0 {
        RiskLevel::Critical
    } else if average >= 55.0 {
        RiskLevel::Elevated
    } else if average >= 40.0 {
        RiskLevel::Moderate
    } else {
        RiskLevel::Low
    }
}

fn confidence_for(evidence_count: usize) -> u8 {
    (CONFIDENCE_FLOOR + CONFIDENCE_PER_EVIDENCE * evidence_count as u32).min(CONFIDENCE_CAP) as u8
}

/// Fixed disclaimer wording per overall level, interpolating the
/// confidence value.
fn disclaimer_for(overall: RiskLevel, confidence: u8) -> String {
    match overall {
        RiskLevel::Critical => format!(
            "This assessment reflects historical patterns suggesting elevated risk factors. \
{}% of similar ventures have encountered significant challenges. This is not a prediction \
of failure, but an indicator of areas requiring careful attention.",
            confidence
        ),
        RiskLevel::Elevated => format!(
            "Historical data indicates several risk factors common in this space. With {}% \
evidence coverage, we recommend addressing the highlighted concerns while recognizing that \
many successful startups have navigated similar challenges.",
            confidence
        ),
        RiskLevel::Moderate => format!(
            "The risk profile shows a mix of historical patterns. At {}% confidence, some \
challenges are common while others are less prevalent. Success depends heavily on execution \
and market timing.",
            confidence
        ),
        RiskLevel::Low => format!(
            "Fewer common failure patterns are present based on {}% of available evidence. \
However, this does not guarantee success—novel challenges may emerge that aren't reflected \
in historical data.",
            confidence
        ),
    }
}

// ============================================================================
// Improvement levers
// ============================================================================

/// Generate actionable levers in fixed priority order, capped at 6.
/// Later categories drop first when over the cap.
fn generate_levers(decomposition: &IdeaDecomposition, synthesis: &SynthesisResult) -> Vec<Lever> {
    let mut levers = Vec::new();

    for mode in synthesis.failure_modes.iter().take(3) {
        if mode.mitigations.is_empty() {
            continue;
        }
        levers.push(Lever {
            id: next_id("lever"),
            title: format!("Mitigate: {}", mode.name),
            description: mode.mitigations[0].clone(),
            impact: if mode.probability >= 60 {
                LeverWeight::High
            } else {
                LeverWeight::Medium
            },
            effort: LeverWeight::Medium,
            category: LeverCategory::Product,
            steps: mode.mitigations.clone(),
        });
    }

    if synthesis
        .market_risks
        .iter()
        .any(|r| r.category == "Competition")
    {
        levers.push(Lever {
            id: next_id("lever"),
            title: "Differentiation Strategy".to_string(),
            description: "Develop unique positioning against identified competitors".to_string(),
            impact: LeverWeight::High,
            effort: LeverWeight::High,
            category: LeverCategory::Market,
            steps: vec![
                "Identify underserved segments competitors ignore".to_string(),
                "Build proprietary data or technology moat".to_string(),
                "Focus on specific vertical before expanding".to_string(),
                "Create switching costs through integrations".to_string(),
            ],
        });
    }

    if !decomposition.key_assumptions.is_empty() {
        levers.push(Lever {
            id: next_id("lever"),
            title: "Assumption Validation Sprint".to_string(),
            description: "Systematically test critical assumptions before full commitment"
                .to_string(),
            impact: LeverWeight::High,
            effort: LeverWeight::Low,
            category: LeverCategory::Product,
            steps: decomposition
                .key_assumptions
                .iter()
                .map(|a| format!("Validate: {}", a))
                .collect(),
        });
    }

    if !decomposition.testable_hypotheses.is_empty() {
        levers.push(Lever {
            id: next_id("lever"),
            title: "Hypothesis Testing Plan".to_string(),
            description: "Run experiments to validate or invalidate core hypotheses".to_string(),
            impact: LeverWeight::High,
            effort: LeverWeight::Medium,
            category: LeverCategory::Product,
            steps: decomposition
                .testable_hypotheses
                .iter()
                .map(|h| format!("Test: {}", h))
                .collect(),
        });
    }

    if !synthesis.distribution_challenges.is_empty() {
        levers.push(Lever {
            id: next_id("lever"),
            title: "Distribution Strategy".to_string(),
            description: "Develop alternative channels to reduce distribution risk".to_string(),
            impact: LeverWeight::High,
            effort: LeverWeight::High,
            category: LeverCategory::Market,
            steps: vec![
                "Identify organic/viral growth mechanisms".to_string(),
                "Build partnership distribution channels".to_string(),
                "Create content marketing engine".to_string(),
                "Develop referral incentive programs".to_string(),
            ],
        });
    }

    if !synthesis.surviving_comparables.is_empty() {
        levers.push(Lever {
            id: next_id("lever"),
            title: "Competitive Intelligence".to_string(),
            description: "Study successful competitors for strategic insights".to_string(),
            impact: LeverWeight::Medium,
            effort: LeverWeight::Low,
            category: LeverCategory::Market,
            steps: synthesis
                .surviving_comparables
                .iter()
                .take(4)
                .map(|c| {
                    format!(
                        "Analyze {}: {}",
                        c.name,
                        c.differences
                            .first()
                            .map(String::as_str)
                            .unwrap_or("strategy and positioning")
                    )
                })
                .collect(),
        });
    }

    levers.truncate(MAX_LEVERS);
    levers
}

// ============================================================================
// Early warnings
// ============================================================================

/// Derive warnings from top failure modes and market risks, then append
/// the two universal warnings. The universal pair is always included;
/// the cap truncates derived warnings first.
fn generate_warnings(synthesis: &SynthesisResult) -> Vec<Warning> {
    let mut warnings = Vec::new();

    for mode in synthesis.failure_modes.iter().take(4) {
        let name_lower = mode.name.to_lowercase();
        warnings.push(Warning {
            id: next_id("warn"),
            signal: mode
                .triggers
                .first()
                .cloned()
                .unwrap_or_else(|| format!("Signs of {}", mode.name)),
            description: format!("Early indicator of {}", name_lower),
            threshold: mode
                .triggers
                .get(1)
                .cloned()
                .unwrap_or_else(|| "When pattern becomes consistent".to_string()),
            monitoring_method: format!(
                "Track metrics related to {}",
                name_lower.split(' ').next().unwrap_or_default()
            ),
            urgency: if mode.probability >= 60 {
                RiskLevel::Elevated
            } else {
                RiskLevel::Moderate
            },
        });
    }

    for risk in synthesis.market_risks.iter().take(2) {
        warnings.push(Warning {
            id: next_id("warn"),
            signal: format!("{} deterioration", risk.category),
            description: risk.description.chars().take(100).collect(),
            threshold: risk
                .evidence
                .first()
                .cloned()
                .unwrap_or_else(|| "Significant change in market conditions".to_string()),
            monitoring_method: "Monthly market analysis and competitor tracking".to_string(),
            urgency: risk.level,
        });
    }

    warnings.truncate(MAX_WARNINGS - FIXED_WARNINGS);

    warnings.push(Warning {
        id: next_id("warn"),
        signal: "Runway dropping below 6 months".to_string(),
        description: "Cash runway insufficient for next fundraise or pivot".to_string(),
        threshold: "Less than 6 months of operating capital".to_string(),
        monitoring_method: "Weekly cash flow monitoring".to_string(),
        urgency: RiskLevel::Critical,
    });

    warnings.push(Warning {
        id: next_id("warn"),
        signal: "Retention rate decline".to_string(),
        description: "User/customer retention dropping below industry benchmarks".to_string(),
        threshold: "Month-over-month retention drops below 80%".to_string(),
        monitoring_method: "Cohort analysis dashboard".to_string(),
        urgency: RiskLevel::Elevated,
    });

    warnings.truncate(MAX_WARNINGS);
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Citation;
    use chrono::Utc;

    fn risk(level: RiskLevel, category: &str) -> Risk {
        Risk {
            id: "r".to_string(),
            category: category.to_string(),
            title: "t".to_string(),
            description: "a sufficiently long description of a market risk factor".to_string(),
            level,
            evidence: vec!["evidence item".to_string()],
            citations: vec![],
            historical_prevalence: None,
        }
    }

    fn mode(name: &str, probability: u8, mitigations: &[&str], triggers: &[&str]) -> FailureMode {
        FailureMode {
            id: "fm".to_string(),
            name: name.to_string(),
            description: String::new(),
            probability,
            timeframe: String::new(),
            triggers: triggers.iter().map(|t| t.to_string()).collect(),
            mitigations: mitigations.iter().map(|m| m.to_string()).collect(),
            citations: vec![],
        }
    }

    fn comparable(name: &str) -> crate::model::Comparable {
        crate::model::Comparable {
            id: "c".to_string(),
            name: name.to_string(),
            description: String::new(),
            outcome: crate::model::ComparableOutcome::Survived,
            year_founded: None,
            year_outcome: None,
            funding_raised: None,
            money_burned: None,
            failure_reason: None,
            lessons_learned: vec![],
            similarities: vec![],
            differences: vec![],
        }
    }

    fn citation(id: &str) -> Citation {
        Citation {
            id: id.to_string(),
            source: "example.com".to_string(),
            url: Some(format!("https://example.com/{}", id)),
            title: id.to_string(),
            snippet: String::new(),
            retrieved_at: Utc::now(),
            relevance_score: None,
        }
    }

    fn synthesis() -> SynthesisResult {
        SynthesisResult {
            failure_modes: vec![],
            market_risks: vec![],
            timing_risks: vec![],
            regulatory_risks: vec![],
            distribution_challenges: vec![],
            failed_comparables: vec![],
            surviving_comparables: vec![],
            citations: vec![],
        }
    }

    fn decomposition() -> IdeaDecomposition {
        IdeaDecomposition {
            value_proposition: "v".to_string(),
            target_market: "m".to_string(),
            business_model: "b".to_string(),
            key_assumptions: vec![],
            testable_hypotheses: vec![],
        }
    }

    #[test]
    fn test_category_score_thresholds() {
        assert_eq!(category_score(&[]), RiskLevel::Low);
        assert_eq!(
            category_score(&[risk(RiskLevel::Low, "c")]),
            RiskLevel::Low
        );
        assert_eq!(
            category_score(&[risk(RiskLevel::Elevated, "c")]),
            RiskLevel::Moderate
        );
        assert_eq!(
            category_score(&[
                risk(RiskLevel::Elevated, "c"),
                risk(RiskLevel::Elevated, "c")
            ]),
            RiskLevel::Elevated
        );
        assert_eq!(
            category_score(&[risk(RiskLevel::Critical, "c")]),
            RiskLevel::Elevated
        );
        assert_eq!(
            category_score(&[
                risk(RiskLevel::Critical, "c"),
                risk(RiskLevel::Critical, "c")
            ]),
            RiskLevel::Critical
        );
    }

    #[test]
    fn test_competition_score_thresholds() {
        assert_eq!(competition_score(0, 0), RiskLevel::Low);
        assert_eq!(competition_score(0, 5), RiskLevel::Low);
        assert_eq!(competition_score(1, 1), RiskLevel::Moderate);
        assert_eq!(competition_score(2, 5), RiskLevel::Moderate);
        assert_eq!(competition_score(3, 5), RiskLevel::Elevated);
        assert_eq!(competition_score(4, 2), RiskLevel::Elevated);
        assert_eq!(competition_score(3, 1), RiskLevel::Critical);
        assert_eq!(competition_score(5, 1), RiskLevel::Critical);
        // 5 failed with 2 surviving: ratio 2.5, not the special case.
        assert_eq!(competition_score(5, 2), RiskLevel::Elevated);
    }

    #[test]
    fn test_execution_score_average() {
        assert_eq!(execution_score(&[]), RiskLevel::Moderate); // default 50
        assert_eq!(
            execution_score(&[mode("a", 75, &[], &[]), mode("b", 70, &[], &[])]),
            RiskLevel::Critical
        );
        assert_eq!(execution_score(&[mode("a", 55, &[], &[])]), RiskLevel::Elevated);
        assert_eq!(execution_score(&[mode("a", 30, &[], &[])]), RiskLevel::Low);
    }

    #[test]
    fn test_overall_boundary_vectors() {
        // All categories CRITICAL: weighted sum 4.0 -> CRITICAL.
        let mut s = synthesis();
        s.market_risks = vec![risk(RiskLevel::Critical, "c"), risk(RiskLevel::Critical, "c")];
        s.timing_risks = s.market_risks.clone();
        s.regulatory_risks = s.market_risks.clone();
        s.failed_comparables = (0..5).map(|i| comparable(&format!("f{}", i))).collect();
        s.failure_modes = vec![mode("a", 90, &[], &[])];
        let result = score(&decomposition(), &s);
        assert_eq!(result.risk_score.overall, RiskLevel::Critical);
        assert_eq!(result.risk_score.breakdown.competition, RiskLevel::Critical);

        // All categories LOW: weighted sum 1.0 -> LOW.
        let mut s = synthesis();
        s.failure_modes = vec![mode("a", 10, &[], &[])];
        let result = score(&decomposition(), &s);
        assert_eq!(result.risk_score.overall, RiskLevel::Low);
    }

    #[test]
    fn test_confidence_bounds_and_monotonicity() {
        let empty = synthesis();
        let base = score(&decomposition(), &empty).risk_score.confidence;
        assert_eq!(base, 40);

        let mut previous = base;
        for citations in 1..40 {
            let mut s = synthesis();
            s.citations = (0..citations).map(|i| citation(&format!("c{}", i))).collect();
            let confidence = score(&decomposition(), &s).risk_score.confidence;
            assert!(confidence >= previous);
            assert!((40..=85).contains(&confidence));
            previous = confidence;
        }
        assert_eq!(previous, 85);
    }

    #[test]
    fn test_disclaimer_interpolates_confidence() {
        let mut s = synthesis();
        s.citations = vec![citation("c1")];
        let risk_score = score(&decomposition(), &s).risk_score;
        assert!(risk_score.disclaimer.contains("43%"));
    }

    #[test]
    fn test_levers_priority_and_cap() {
        let mut s = synthesis();
        s.failure_modes = vec![
            mode("Churn Death Spiral", 60, &["Fix onboarding", "Build moats"], &[]),
            mode("No Mitigations", 80, &[], &[]),
            mode("CAC Blowout", 55, &["Organic growth"], &[]),
        ];
        s.market_risks = vec![risk(RiskLevel::Elevated, "Competition")];
        s.distribution_challenges = vec![crate::model::Challenge {
            id: "dc".to_string(),
            kind: crate::model::ChallengeKind::Distribution,
            title: "t".to_string(),
            description: "d".to_string(),
            severity: RiskLevel::Elevated,
            citations: vec![],
        }];
        s.surviving_comparables = vec![comparable("Rival")];
        let decomposition = IdeaDecomposition {
            key_assumptions: vec!["people pay".to_string()],
            testable_hypotheses: vec!["retention > 80%".to_string()],
            ..decomposition()
        };

        let levers = generate_levers(&decomposition, &s);
        assert_eq!(levers.len(), 6);
        let titles: Vec<&str> = levers.iter().map(|l| l.title.as_str()).collect();
        assert_eq!(
            titles,
            vec![
                "Mitigate: Churn Death Spiral",
                "Mitigate: CAC Blowout",
                "Differentiation Strategy",
                "Assumption Validation Sprint",
                "Hypothesis Testing Plan",
                "Distribution Strategy",
            ]
        );
        // Competitive Intelligence dropped by the cap.
        assert_eq!(levers[0].impact, LeverWeight::High);
        assert_eq!(levers[1].impact, LeverWeight::Medium);
        assert_eq!(levers[0].description, "Fix onboarding");
        assert_eq!(levers[3].steps, vec!["Validate: people pay"]);
    }

    #[test]
    fn test_warnings_include_fixed_pair_and_cap() {
        let mut s = synthesis();
        s.failure_modes = (0..6)
            .map(|i| {
                mode(
                    &format!("Mode {}", i),
                    65,
                    &[],
                    &["first trigger", "second trigger"],
                )
            })
            .collect();
        s.market_risks = vec![
            risk(RiskLevel::Critical, "Competition"),
            risk(RiskLevel::Moderate, "Market Size"),
            risk(RiskLevel::Low, "Other"),
        ];

        let warnings = generate_warnings(&s);
        assert_eq!(warnings.len(), 8);
        // Universal warnings survive the cap.
        assert!(warnings.iter().any(|w| w.signal.contains("Runway")));
        assert!(warnings.iter().any(|w| w.signal == "Retention rate decline"));
        // Failure-mode warnings carry trigger-derived fields.
        assert_eq!(warnings[0].signal, "first trigger");
        assert_eq!(warnings[0].threshold, "second trigger");
        assert_eq!(warnings[0].urgency, RiskLevel::Elevated);
        // Market-risk warnings take the risk's own level.
        assert!(warnings.iter().any(|w| w.signal == "Competition deterioration"
            && w.urgency == RiskLevel::Critical));
    }

    #[test]
    fn test_warning_urgency_below_sixty_is_moderate() {
        let mut s = synthesis();
        s.failure_modes = vec![mode("Slow Burn", 50, &[], &[])];
        let warnings = generate_warnings(&s);
        assert_eq!(warnings[0].urgency, RiskLevel::Moderate);
        assert_eq!(warnings[0].signal, "Signs of Slow Burn");
        assert_eq!(warnings[0].monitoring_method, "Track metrics related to slow");
    }
}
