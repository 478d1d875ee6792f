//! Pipeline stage 1: idea decomposition
//!
//! Breaks a raw idea into value proposition, target market, business
//! model, assumptions and hypotheses. The generation-service path is
//! best-effort; a deterministic keyword heuristic covers every failure,
//! so this stage never fails.

use serde_json::Value;

use crate::model::IdeaDecomposition;
use crate::service::evidence::{EvidenceClient, QueryOptions};
use crate::service::prompts::DECOMPOSITION_PROMPT;

/// Target-market classification table, scanned in order; first match wins.
const MARKET_KEYWORDS: &[(&[&str], &str)] = &[
    (&["b2b", "enterprise", "business"], "B2B / Enterprise customers"),
    (&["developer", "engineer"], "Software developers and engineers"),
    (&["startup", "founder"], "Startups and founders"),
    (&["small business", "smb"], "Small and medium businesses"),
    (&["student", "education"], "Students and educational institutions"),
    (&["health", "patient"], "Healthcare consumers and patients"),
];

const DEFAULT_MARKET: &str = "General consumers";

/// Business-model classification table, scanned in order; first match wins.
const MODEL_KEYWORDS: &[(&[&str], &str)] = &[
    (&["subscription", "monthly"], "Subscription-based SaaS"),
    (&["marketplace", "commission"], "Marketplace with transaction fees"),
    (&["api", "platform"], "API/Platform with usage-based pricing"),
    (&["advertising", "ad-supported"], "Advertising-supported free product"),
    (&["hardware", "device"], "Hardware sales with software services"),
    (&["consulting", "service"], "Professional services / Consulting"),
];

const DEFAULT_MODEL: &str = "Freemium SaaS";

/// Each list in the heuristic output is capped at five entries.
const MAX_LIST_ITEMS: usize = 5;

/// Decompose an idea, preferring the generation service and falling back
/// to the heuristic on any failure or unparseable output.
pub async fn decompose(
    evidence: &EvidenceClient,
    idea_text: &str,
    max_tokens: u32,
) -> IdeaDecomposition {
    let options = QueryOptions {
        max_tokens,
        ..QueryOptions::default()
    };

    match evidence.query(DECOMPOSITION_PROMPT, idea_text, options).await {
        Ok(response) => match parse_decomposition_json(&response.content) {
            Some(decomposition) => decomposition,
            None => {
                tracing::warn!("Unparseable decomposition response, using heuristic analysis");
                decompose_heuristic(idea_text)
            }
        },
        Err(e) => {
            tracing::warn!(error = %e, "Decomposition call failed, using heuristic analysis");
            decompose_heuristic(idea_text)
        }
    }
}

/// Extract the first JSON object substring from generated text and read
/// the five decomposition fields out of it.
///
/// The shape is untrusted: any missing or mistyped field defaults to an
/// empty string or list rather than failing the stage.
pub fn parse_decomposition_json(content: &str) -> Option<IdeaDecomposition> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    if end <= start {
        return None;
    }

    let parsed: Value = serde_json::from_str(&content[start..=end]).ok()?;

    Some(IdeaDecomposition {
        value_proposition: string_field(&parsed, "valueProposition"),
        target_market: string_field(&parsed, "targetMarket"),
        business_model: string_field(&parsed, "businessModel"),
        key_assumptions: list_field(&parsed, "keyAssumptions"),
        testable_hypotheses: list_field(&parsed, "testableHypotheses"),
    })
}

fn string_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn list_field(value: &Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Deterministic rule-based decomposition. Pure function of the input
/// text; no network access.
pub fn decompose_heuristic(idea_text: &str) -> IdeaDecomposition {
    let lower = idea_text.to_lowercase();

    // Value proposition: first sentence of the input.
    let value_proposition = idea_text
        .split(['.', '!', '?'])
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| idea_text.chars().take(200).collect());

    let target_market = classify(&lower, MARKET_KEYWORDS, DEFAULT_MARKET);
    let business_model = classify(&lower, MODEL_KEYWORDS, DEFAULT_MODEL);

    let key_assumptions = generate_assumptions(&lower, target_market, business_model);
    let testable_hypotheses = generate_hypotheses(&lower, target_market, business_model);

    IdeaDecomposition {
        value_proposition,
        target_market: target_market.to_string(),
        business_model: business_model.to_string(),
        key_assumptions,
        testable_hypotheses,
    }
}

fn classify<'a>(lower: &str, table: &[(&[&str], &'a str)], default: &'a str) -> &'a str {
    table
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(_, label)| *label)
        .unwrap_or(default)
}

/// Condition-triggered assumptions appended to a universal base set, in
/// fixed priority order, capped at five.
fn generate_assumptions(idea: &str, market: &str, model: &str) -> Vec<String> {
    let mut assumptions = vec![
        format!("{} actively seeks solutions in this problem space", market),
        "The target market has budget and willingness to pay for this solution".to_string(),
    ];

    if idea.contains("ai") || idea.contains("machine learning") {
        assumptions.push(
            "AI/ML technology can deliver meaningfully better results than existing solutions"
                .to_string(),
        );
        assumptions.push("Users trust AI-generated outputs for this use case".to_string());
    }

    if idea.contains("data") || idea.contains("analytics") {
        assumptions.push("Users have access to or can provide the required data".to_string());
        assumptions.push("Data quality is sufficient for meaningful insights".to_string());
    }

    if model.contains("SaaS") || model.contains("Subscription") {
        assumptions.push(
            "Users will pay recurring fees rather than seeking one-time alternatives".to_string(),
        );
        assumptions
            .push("Unit economics work at projected customer acquisition costs".to_string());
    }

    if model.contains("Marketplace") {
        assumptions
            .push("Can achieve critical mass on both sides of the marketplace".to_string());
        assumptions.push("Transaction value justifies the platform fee".to_string());
    }

    assumptions.push("Incumbents will not quickly replicate core features".to_string());

    assumptions.truncate(MAX_LIST_ITEMS);
    assumptions
}

/// Condition-triggered hypotheses, same structure as the assumptions.
fn generate_hypotheses(idea: &str, market: &str, model: &str) -> Vec<String> {
    let mut hypotheses = vec![
        format!(
            "At least 40% of interviewed {} express strong interest",
            market.to_lowercase()
        ),
        "10+ potential customers commit to paying before product launch".to_string(),
    ];

    if idea.contains("ai") || idea.contains("automat") {
        hypotheses.push("Automation reduces task completion time by at least 50%".to_string());
    }

    hypotheses.push("Customer acquisition cost can be kept under $50 per user".to_string());
    hypotheses.push("Monthly retention rate exceeds 80% after first 90 days".to_string());

    if model.contains("SaaS") {
        hypotheses.push("Customers convert from free to paid at 5%+ rate".to_string());
    }

    if model.contains("Marketplace") {
        hypotheses
            .push("Supply-side users can be acquired at <$20 per active participant".to_string());
    }

    hypotheses.push("Net Promoter Score exceeds 40 within first 100 users".to_string());

    hypotheses.truncate(MAX_LIST_ITEMS);
    hypotheses
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heuristic_is_deterministic() {
        let idea = "An AI-powered marketplace for used lab equipment. Sellers pay a commission.";
        let first = decompose_heuristic(idea);
        let second = decompose_heuristic(idea);
        assert_eq!(first, second);
    }

    #[test]
    fn test_saas_idea_classification() {
        let decomposition =
            decompose_heuristic("A monthly subscription tool for freelancers to send invoices");

        assert_eq!(decomposition.business_model, "Subscription-based SaaS");
        assert_eq!(decomposition.target_market, "General consumers");
        assert_eq!(
            decomposition.value_proposition,
            "A monthly subscription tool for freelancers to send invoices"
        );
    }

    #[test]
    fn test_marketplace_idea_classification() {
        let decomposition = decompose_heuristic(
            "A marketplace connecting chefs and diners, taking a commission per booking",
        );
        assert_eq!(
            decomposition.business_model,
            "Marketplace with transaction fees"
        );
        assert!(decomposition
            .key_assumptions
            .iter()
            .any(|a| a.contains("both sides of the marketplace")));
    }

    #[test]
    fn test_first_market_match_wins() {
        // "enterprise" appears before "developer" in the scan order.
        let decomposition =
            decompose_heuristic("An enterprise tool for developer productivity tracking");
        assert_eq!(decomposition.target_market, "B2B / Enterprise customers");
    }

    #[test]
    fn test_lists_are_capped_at_five() {
        // AI + data + subscription triggers more than five candidates.
        let decomposition = decompose_heuristic(
            "An AI analytics subscription using machine learning on customer data",
        );
        assert_eq!(decomposition.key_assumptions.len(), 5);
        assert_eq!(decomposition.testable_hypotheses.len(), 5);
    }

    #[test]
    fn test_value_proposition_is_first_sentence() {
        let decomposition =
            decompose_heuristic("Send invoices fast. Also track expenses! And more?");
        assert_eq!(decomposition.value_proposition, "Send invoices fast");
    }

    #[test]
    fn test_parse_json_with_surrounding_text() {
        let content = r#"Here is the breakdown:
{"valueProposition": "Fast invoicing", "targetMarket": "Freelancers",
 "businessModel": "SaaS", "keyAssumptions": ["a1"], "testableHypotheses": ["h1", "h2"]}
Hope this helps."#;

        let decomposition = parse_decomposition_json(content).unwrap();
        assert_eq!(decomposition.value_proposition, "Fast invoicing");
        assert_eq!(decomposition.key_assumptions, vec!["a1"]);
        assert_eq!(decomposition.testable_hypotheses.len(), 2);
    }

    #[test]
    fn test_parse_json_defaults_missing_fields() {
        let decomposition = parse_decomposition_json(r#"{"valueProposition": "X"}"#).unwrap();
        assert_eq!(decomposition.value_proposition, "X");
        assert_eq!(decomposition.target_market, "");
        assert!(decomposition.key_assumptions.is_empty());
    }

    #[test]
    fn test_parse_json_rejects_garbage() {
        assert!(parse_decomposition_json("no json here").is_none());
        assert!(parse_decomposition_json("{not valid json}").is_none());
    }

    #[test]
    fn test_mistyped_list_field_defaults_to_empty() {
        let decomposition =
            parse_decomposition_json(r#"{"keyAssumptions": "not a list"}"#).unwrap();
        assert!(decomposition.key_assumptions.is_empty());
    }
}
