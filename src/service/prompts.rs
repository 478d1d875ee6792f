//! Fixed prompts for the analysis pipeline stages
//!
//! System prompts are configuration data: the parsers in the retrieval
//! and synthesis stages are tuned to the output these instructions elicit.

use crate::model::IdeaDecomposition;

/// System prompt for evidence retrieval (market data).
pub const EVIDENCE_RETRIEVAL_PROMPT: &str = r#"You are a research analyst gathering evidence about startup ideas and markets.
Your task is to find SPECIFIC, CURRENT data about:
1. Market size and trends
2. Existing competitors and their status
3. Regulatory landscape
4. Recent news and developments
5. Similar startups that failed or succeeded

Always cite your sources. Be factual and specific."#;

/// System prompt for failure-pattern analysis.
pub const FAILURE_PATTERNS_PROMPT: &str = r#"You are a startup failure analyst studying historical patterns.
Your task is to identify:
1. Common failure modes for this type of startup
2. Specific companies that failed with similar models
3. The reasons they failed
4. Timeline patterns (when failures typically occur)
5. Warning signs that preceded failure

Frame findings as historical patterns, not predictions. Always cite sources."#;

/// System prompt for competitor mapping.
pub const COMPETITIVE_LANDSCAPE_PROMPT: &str = r#"You are a competitive intelligence analyst.
Your task is to map:
1. Direct competitors with funding and status
2. Indirect competitors and alternatives
3. Market positioning of each player
4. Their strengths and weaknesses
5. Recent strategic moves

Provide specific company names, funding amounts, and website URLs where possible."#;

/// System prompt for regulatory research.
pub const REGULATORY_CHECK_PROMPT: &str = r#"You are a regulatory compliance researcher.
Your task is to identify:
1. Relevant regulations for this business type
2. Compliance requirements
3. Recent regulatory changes
4. Enforcement actions in this space
5. Geographic variations in regulation

Be specific about jurisdictions and citation of regulatory sources."#;

/// System prompt for idea decomposition. The response must be a single
/// JSON object; the decomposition stage extracts and validates it field
/// by field.
pub const DECOMPOSITION_PROMPT: &str = r#"You are a startup analyst specializing in deconstructing business ideas.

Given a startup idea, extract and return a JSON object with these fields:

{
  "valueProposition": "The core value being offered to customers (1-2 sentences)",
  "targetMarket": "The specific customer segment being targeted",
  "businessModel": "How the company intends to make money",
  "keyAssumptions": ["List of 3-5 critical assumptions the idea relies on"],
  "testableHypotheses": ["List of 3-5 specific hypotheses that can be validated"]
}

Be specific and concrete. Extract implicit assumptions that the founder may not have stated.

IMPORTANT: Return ONLY the JSON object, no other text."#;

/// Build the market-sizing query for a decomposed idea.
pub fn build_market_prompt(decomposition: &IdeaDecomposition) -> String {
    format!(
        r#"Research the market for: {}

Target market: {}

Find and report:
1. Total addressable market size
2. Market growth rate
3. Key trends in this space
4. Recent news and developments

Provide specific numbers and cite sources."#,
        decomposition.value_proposition, decomposition.target_market
    )
}

/// Build the competitor-landscape query.
pub fn build_competitor_prompt(decomposition: &IdeaDecomposition) -> String {
    format!(
        r#"Find competitors for this startup concept:

Value proposition: {}
Target market: {}
Business model: {}

List the top 5-10 competitors with:
- Company name
- What they do
- Funding raised
- Current status (active, acquired, struggling, shut down)
- Website URL
- Their key strengths
- Their key weaknesses"#,
        decomposition.value_proposition,
        decomposition.target_market,
        decomposition.business_model
    )
}

/// Build the regulatory-landscape query.
pub fn build_regulatory_prompt(decomposition: &IdeaDecomposition) -> String {
    format!(
        r#"What regulations apply to this business:

Business: {}
Market: {}

Identify:
1. Relevant regulations (GDPR, HIPAA, SEC, etc.)
2. Which jurisdictions they apply in
3. Impact on business operations
4. Estimated compliance costs"#,
        decomposition.value_proposition, decomposition.target_market
    )
}

/// Build the failure-pattern query, naming retrieved historical failures
/// for grounding.
pub fn build_failure_pattern_prompt(
    decomposition: &IdeaDecomposition,
    failed_names: &str,
) -> String {
    format!(
        r#"Analyze failure patterns for startups similar to:

Value proposition: {}
Business model: {}

Similar failed startups: {}

Identify the top 3-5 most common failure modes with:
- Name of the failure pattern
- Description
- How often it occurs
- Warning signs
- Mitigation strategies"#,
        decomposition.value_proposition, decomposition.business_model, failed_names
    )
}
