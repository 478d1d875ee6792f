//! Pipeline stage 2: evidence retrieval
//!
//! Fans out four concurrent queries (market sizing, competitor
//! landscape, regulatory landscape, historical-failure matching) and
//! parses the unstructured responses into records. Each sub-query
//! degrades to an empty/default result on failure; the stage as a whole
//! never fails.
//!
//! The parsers are pure functions over generated text, best-effort and
//! order-sensitive by nature, kept independently testable.

use std::collections::HashSet;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::{Citation, FailedStartup, IdeaDecomposition};
use crate::service::evidence::{EvidenceClient, QueryOptions};
use crate::service::graveyard::GraveyardClient;
use crate::service::prompts::{
    build_competitor_prompt, build_market_prompt, build_regulatory_prompt,
    COMPETITIVE_LANDSCAPE_PROMPT, EVIDENCE_RETRIEVAL_PROMPT, REGULATORY_CHECK_PROMPT,
};

/// How many failure records to pull from the store before ranking.
const HISTORICAL_FETCH_LIMIT: u32 = 100;
/// Relevance-ranked failures kept for synthesis.
const MAX_RELEVANT_FAILURES: usize = 10;
const MAX_COMPETITORS: usize = 10;
const MAX_TRENDS: usize = 5;
const MAX_RECENT_NEWS: usize = 3;

/// Everything stage 2 hands to synthesis.
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    pub market_data: MarketData,
    pub competitors: Vec<CompetitorData>,
    pub regulations: Vec<RegulatoryData>,
    pub historical_failures: Vec<FailedStartup>,
    pub citations: Vec<Citation>,
}

#[derive(Debug, Clone)]
pub struct MarketData {
    pub size: String,
    pub growth_rate: String,
    pub trends: Vec<String>,
    pub recent_news: Vec<String>,
}

impl MarketData {
    /// Sub-query failure default, distinct from the parse-miss value
    /// "Not determined".
    fn unknown() -> Self {
        Self {
            size: "Unknown".to_string(),
            growth_rate: "Unknown".to_string(),
            trends: Vec::new(),
            recent_news: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompetitorStatus {
    ShutDown,
    Acquired,
    Struggling,
    Active,
}

impl fmt::Display for CompetitorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CompetitorStatus::ShutDown => "Shut down",
            CompetitorStatus::Acquired => "Acquired",
            CompetitorStatus::Struggling => "Struggling",
            CompetitorStatus::Active => "Active",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone)]
pub struct CompetitorData {
    pub name: String,
    pub description: String,
    pub funding: Option<String>,
    pub status: CompetitorStatus,
    pub website: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RegulatoryData {
    pub regulation: String,
    pub jurisdiction: String,
    pub impact: String,
    pub compliance_cost: String,
}

/// Retrieve evidence for a decomposed idea. The four sub-queries run
/// concurrently and settle independently.
pub async fn retrieve(
    evidence: &EvidenceClient,
    graveyard: &GraveyardClient,
    decomposition: &IdeaDecomposition,
) -> RetrievalResult {
    let (market, competitors, regulations, historical_failures) = tokio::join!(
        retrieve_market_data(evidence, decomposition),
        retrieve_competitors(evidence, decomposition),
        retrieve_regulations(evidence, decomposition),
        retrieve_historical_failures(graveyard, decomposition),
    );

    let mut citations = Vec::new();
    let (market_data, market_citations) = market;
    let (competitors, competitor_citations) = competitors;
    let (regulations, regulatory_citations) = regulations;
    citations.extend(market_citations);
    citations.extend(competitor_citations);
    citations.extend(regulatory_citations);

    tracing::debug!(
        competitors = competitors.len(),
        regulations = regulations.len(),
        historical = historical_failures.len(),
        citations = citations.len(),
        "Evidence retrieval complete"
    );

    RetrievalResult {
        market_data,
        competitors,
        regulations,
        historical_failures,
        citations,
    }
}

async fn retrieve_market_data(
    evidence: &EvidenceClient,
    decomposition: &IdeaDecomposition,
) -> (MarketData, Vec<Citation>) {
    match evidence
        .query(
            EVIDENCE_RETRIEVAL_PROMPT,
            &build_market_prompt(decomposition),
            QueryOptions::default(),
        )
        .await
    {
        Ok(response) => (parse_market_data(&response.content), response.citations),
        Err(e) => {
            tracing::warn!(error = %e, "Market data retrieval failed");
            (MarketData::unknown(), Vec::new())
        }
    }
}

async fn retrieve_competitors(
    evidence: &EvidenceClient,
    decomposition: &IdeaDecomposition,
) -> (Vec<CompetitorData>, Vec<Citation>) {
    match evidence
        .query(
            COMPETITIVE_LANDSCAPE_PROMPT,
            &build_competitor_prompt(decomposition),
            QueryOptions::default(),
        )
        .await
    {
        Ok(response) => (parse_competitors(&response.content), response.citations),
        Err(e) => {
            tracing::warn!(error = %e, "Competitor retrieval failed");
            (Vec::new(), Vec::new())
        }
    }
}

async fn retrieve_regulations(
    evidence: &EvidenceClient,
    decomposition: &IdeaDecomposition,
) -> (Vec<RegulatoryData>, Vec<Citation>) {
    match evidence
        .query(
            REGULATORY_CHECK_PROMPT,
            &build_regulatory_prompt(decomposition),
            QueryOptions::default(),
        )
        .await
    {
        Ok(response) => (parse_regulations(&response.content), response.citations),
        Err(e) => {
            tracing::warn!(error = %e, "Regulatory retrieval failed");
            (Vec::new(), Vec::new())
        }
    }
}

/// Fetch failure records and keep the ones keyword-related to the idea,
/// most relevant first. Empty on store failure.
async fn retrieve_historical_failures(
    graveyard: &GraveyardClient,
    decomposition: &IdeaDecomposition,
) -> Vec<FailedStartup> {
    let all = graveyard.list(HISTORICAL_FETCH_LIMIT, 0, None).await;
    rank_relevant_failures(decomposition, all)
}

// ============================================================================
// Market data parser
// ============================================================================

static MARKET_SIZE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\$[\d.]+\s*(?:billion|million|B|M)").unwrap());
static GROWTH_RATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*%\s*(?:CAGR|growth|annually)").unwrap());
static TREND: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:trend|development|shift)s?[:\s]+([^\n]+)").unwrap());
static RECENT_NEWS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:recent|2024|2025|January|February)[^\n.]+\.").unwrap());

/// Extract market size, growth rate, trend sentences and recency-flagged
/// news from generated text.
pub fn parse_market_data(content: &str) -> MarketData {
    let size = MARKET_SIZE
        .find(content)
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| "Not determined".to_string());

    let growth_rate = GROWTH_RATE
        .captures(content)
        .map(|c| format!("{}% annually", &c[1]))
        .unwrap_or_else(|| "Not determined".to_string());

    let trends: Vec<String> = TREND
        .captures_iter(content)
        .take(MAX_TRENDS)
        .map(|c| c[1].trim().to_string())
        .filter(|t| t.len() > 10)
        .collect();

    let recent_news: Vec<String> = RECENT_NEWS
        .find_iter(content)
        .take(MAX_RECENT_NEWS)
        .map(|m| m.as_str())
        .filter(|m| m.len() > 20)
        .map(|m| m.trim().to_string())
        .collect();

    MarketData {
        size,
        growth_rate,
        trends,
        recent_news,
    }
}

// ============================================================================
// Competitor parser
// ============================================================================

static COMPETITOR_SECTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+\.|#{1,3}|\*\*[^*]+\*\*").unwrap());
static COMPETITOR_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([A-Z][a-zA-Z0-9\s&.]+?)(?:\s*[-–:(\[]|raised|\s+is)").unwrap()
});
static FUNDING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\$[\d.]+\s*(?:billion|million|B|M)").unwrap());
static WEBSITE: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://[^\s)]+").unwrap());
static STATUS_SHUT_DOWN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)shut\s*down|failed|defunct|closed").unwrap());
static STATUS_ACQUIRED: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)acquired|bought").unwrap());
static STATUS_STRUGGLING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)struggling|pivot|layoff").unwrap());
static COMPETITOR_DESC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:is|provides|offers|builds)\s+([^.]+)").unwrap());

/// Split generated text on numbering/heading/bold markers and accept
/// sections that open with a capitalized name-like token. Capped at 10
/// competitors.
pub fn parse_competitors(content: &str) -> Vec<CompetitorData> {
    let mut competitors = Vec::new();

    for section in COMPETITOR_SECTION.split(content) {
        if section.len() < 30 {
            continue;
        }

        let name = match COMPETITOR_NAME.captures(section) {
            Some(captures) => captures[1].trim().to_string(),
            None => continue,
        };
        if name.len() < 2 || name.len() > 50 {
            continue;
        }

        let funding = FUNDING.find(section).map(|m| m.as_str().to_string());
        let website = WEBSITE.find(section).map(|m| m.as_str().to_string());

        // First matching keyword pattern wins, in priority order.
        let status = if STATUS_SHUT_DOWN.is_match(section) {
            CompetitorStatus::ShutDown
        } else if STATUS_ACQUIRED.is_match(section) {
            CompetitorStatus::Acquired
        } else if STATUS_STRUGGLING.is_match(section) {
            CompetitorStatus::Struggling
        } else {
            CompetitorStatus::Active
        };

        let description = COMPETITOR_DESC
            .captures(section)
            .map(|c| c[1].trim().to_string())
            .unwrap_or_else(|| section.chars().take(150).collect::<String>().trim().to_string());

        competitors.push(CompetitorData {
            name,
            description,
            funding,
            status,
            website,
        });
    }

    competitors.truncate(MAX_COMPETITORS);
    competitors
}

// ============================================================================
// Regulation parser
// ============================================================================

/// Known regulation patterns with their jurisdictions. The context regex
/// captures roughly 300 characters around each mention.
static REGULATION_PATTERNS: Lazy<Vec<(&'static str, &'static str, Regex)>> = Lazy::new(|| {
    [
        ("GDPR", "European Union", "GDPR"),
        ("HIPAA", "United States (Healthcare)", "HIPAA"),
        ("SOC 2", "United States", r"SOC\s*2"),
        ("PCI-DSS", "Global (Payment Cards)", r"PCI[\s-]*DSS"),
        ("CCPA", "California, USA", "CCPA"),
        ("SEC Regulations", "United States (Finance)", "SEC"),
        ("FTC Guidelines", "United States", "FTC"),
        ("FDA Regulations", "United States (Health/Food)", "FDA"),
    ]
    .into_iter()
    .map(|(name, jurisdiction, pattern)| {
        let context = Regex::new(&format!(r"(?i).{{0,100}}(?:{}).{{0,200}}", pattern)).unwrap();
        (name, jurisdiction, context)
    })
    .collect()
});

static COMPLIANCE_COST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\$[\d,]+(?:\s*-\s*\$[\d,]+)?|\d+(?:,\d+)?\s*(?:dollar|per|annually)").unwrap()
});

/// Scan for known regulation mentions and capture their surrounding
/// context plus an optional cost token.
pub fn parse_regulations(content: &str) -> Vec<RegulatoryData> {
    let mut regulations = Vec::new();

    for (name, jurisdiction, context_regex) in REGULATION_PATTERNS.iter() {
        let context = match context_regex.find(content) {
            Some(m) => m.as_str(),
            None => continue,
        };

        let compliance_cost = COMPLIANCE_COST
            .find(context)
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| "Variable".to_string());

        regulations.push(RegulatoryData {
            regulation: name.to_string(),
            jurisdiction: jurisdiction.to_string(),
            impact: context.chars().take(150).collect::<String>().trim().to_string(),
            compliance_cost,
        });
    }

    regulations
}

// ============================================================================
// Historical-failure relevance
// ============================================================================

static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").unwrap());

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "from", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had", "do", "does",
    "did", "will", "would", "could", "should", "may", "might", "must", "that", "which", "who",
    "whom", "this", "these", "those", "it", "its", "they", "their", "them",
];

/// Lowercase, stop-word-filtered keywords for relevance matching.
pub fn extract_keywords(text: &str) -> Vec<String> {
    let stop_words: HashSet<&str> = STOP_WORDS.iter().copied().collect();
    NON_WORD
        .replace_all(&text.to_lowercase(), "")
        .split_whitespace()
        .filter(|word| word.len() > 2 && !stop_words.contains(word))
        .map(str::to_string)
        .collect()
}

/// Score each record by the count of idea keywords substring-related
/// (either direction) to any record keyword; keep positives, sorted by
/// descending score. Ties preserve the store's return order.
pub fn rank_relevant_failures(
    decomposition: &IdeaDecomposition,
    startups: Vec<FailedStartup>,
) -> Vec<FailedStartup> {
    let idea_keywords = extract_keywords(&format!(
        "{} {} {}",
        decomposition.value_proposition, decomposition.target_market, decomposition.business_model
    ));

    let mut scored: Vec<(usize, FailedStartup)> = startups
        .into_iter()
        .map(|startup| {
            let startup_keywords = extract_keywords(&startup.match_text());
            let score = idea_keywords
                .iter()
                .filter(|keyword| {
                    startup_keywords
                        .iter()
                        .any(|sk| sk.contains(keyword.as_str()) || keyword.contains(sk.as_str()))
                })
                .count();
            (score, startup)
        })
        .filter(|(score, _)| *score > 0)
        .collect();

    // sort_by is stable, so equal scores keep store order.
    scored.sort_by(|a, b| b.0.cmp(&a.0));

    scored
        .into_iter()
        .take(MAX_RELEVANT_FAILURES)
        .map(|(_, startup)| startup)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_market_data_full_sample() {
        let content = "The invoicing software market is valued at $4.2 billion globally, \
with 12.5% CAGR through 2030.\n\
Key trends: consolidation around all-in-one platforms for freelancers\n\
Recent funding in 2024 raised concerns about saturation in this space.";

        let market = parse_market_data(content);
        assert_eq!(market.size, "$4.2 billion");
        assert_eq!(market.growth_rate, "12.5% annually");
        assert_eq!(market.trends.len(), 1);
        assert!(market.trends[0].contains("consolidation"));
        assert_eq!(market.recent_news.len(), 1);
    }

    #[test]
    fn test_parse_market_data_empty_content() {
        let market = parse_market_data("Nothing useful here");
        assert_eq!(market.size, "Not determined");
        assert_eq!(market.growth_rate, "Not determined");
        assert!(market.trends.is_empty());
        assert!(market.recent_news.is_empty());
    }

    #[test]
    fn test_parse_market_data_short_trends_dropped() {
        let market = parse_market_data("trend: short\ntrend: this one is long enough to keep");
        assert_eq!(market.trends.len(), 1);
    }

    #[test]
    fn test_parse_competitors_sample() {
        let content = "1. FreshBooks - is a cloud accounting platform for small owners. \
Raised $100 million. Status: active. https://freshbooks.com\n\
2. Billably - provides invoicing for freelancers but shut down in 2022 after burning capital.\n\
3. x - too short";

        let competitors = parse_competitors(content);
        assert_eq!(competitors.len(), 2);

        assert_eq!(competitors[0].name, "FreshBooks");
        assert_eq!(competitors[0].status, CompetitorStatus::Active);
        assert_eq!(competitors[0].funding.as_deref(), Some("$100 million"));
        assert_eq!(
            competitors[0].website.as_deref(),
            Some("https://freshbooks.com")
        );
        assert!(competitors[0].description.contains("cloud accounting"));

        assert_eq!(competitors[1].name, "Billably");
        assert_eq!(competitors[1].status, CompetitorStatus::ShutDown);
    }

    #[test]
    fn test_parse_competitors_status_priority() {
        // "shut down" outranks "acquired" when both appear.
        let content =
            "Vendora - a marketplace tool that was acquired and later shut down by the buyer.";
        let competitors = parse_competitors(content);
        assert_eq!(competitors.len(), 1);
        assert_eq!(competitors[0].status, CompetitorStatus::ShutDown);
    }

    #[test]
    fn test_parse_competitors_caps_at_ten() {
        let content = (1..=15)
            .map(|i| {
                format!(
                    "{}. Company{} is a vendor of invoicing software for small teams everywhere.",
                    i, i
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        assert_eq!(parse_competitors(&content).len(), 10);
    }

    #[test]
    fn test_parse_regulations_sample() {
        let content = "Handling payment data requires PCI-DSS certification, which can cost \
$50,000 annually for small providers. Personal data of EU users falls under GDPR.";

        let regulations = parse_regulations(content);
        assert_eq!(regulations.len(), 2);

        let gdpr = regulations.iter().find(|r| r.regulation == "GDPR").unwrap();
        assert_eq!(gdpr.jurisdiction, "European Union");

        let pci = regulations
            .iter()
            .find(|r| r.regulation == "PCI-DSS")
            .unwrap();
        assert_eq!(pci.compliance_cost, "$50,000");
    }

    #[test]
    fn test_parse_regulations_cost_defaults_to_variable() {
        let regulations = parse_regulations("You will need HIPAA compliance for patient data.");
        assert_eq!(regulations.len(), 1);
        assert_eq!(regulations[0].compliance_cost, "Variable");
    }

    #[test]
    fn test_extract_keywords_filters_stop_words() {
        let keywords = extract_keywords("The tool for freelancers, with AI-powered invoicing!");
        assert!(keywords.contains(&"tool".to_string()));
        assert!(keywords.contains(&"freelancers".to_string()));
        assert!(keywords.contains(&"aipowered".to_string()));
        assert!(!keywords.contains(&"the".to_string()));
        assert!(!keywords.contains(&"for".to_string()));
        // Two-letter words are dropped.
        assert!(!keywords.iter().any(|k| k.len() <= 2));
    }

    fn startup(id: &str, description: &str) -> FailedStartup {
        FailedStartup {
            id: id.to_string(),
            name: id.to_string(),
            description: description.to_string(),
            category: String::new(),
            year_died: None,
            money_burned: None,
            money_burned_raw: None,
            failure_reason: None,
            sector: None,
            market: None,
            tags: None,
            city: None,
        }
    }

    fn invoicing_decomposition() -> IdeaDecomposition {
        IdeaDecomposition {
            value_proposition: "invoicing tool for freelancers".to_string(),
            target_market: "freelancers".to_string(),
            business_model: "subscription".to_string(),
            key_assumptions: vec![],
            testable_hypotheses: vec![],
        }
    }

    #[test]
    fn test_rank_drops_unrelated_and_sorts_by_score() {
        let startups = vec![
            startup("pets", "social network about dogs"),
            startup("billfast", "invoicing subscription product for freelancers"),
            startup("invoicely", "invoicing tool"),
        ];

        let ranked = rank_relevant_failures(&invoicing_decomposition(), startups);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].id, "billfast");
        assert_eq!(ranked[1].id, "invoicely");
    }

    #[test]
    fn test_rank_ties_preserve_store_order() {
        let startups = vec![
            startup("first", "invoicing platform"),
            startup("second", "invoicing platform"),
        ];
        let ranked = rank_relevant_failures(&invoicing_decomposition(), startups);
        assert_eq!(ranked[0].id, "first");
        assert_eq!(ranked[1].id, "second");
    }

    #[test]
    fn test_rank_caps_at_ten() {
        let startups: Vec<FailedStartup> = (0..25)
            .map(|i| startup(&format!("s{}", i), "invoicing tool for freelancers"))
            .collect();
        let ranked = rank_relevant_failures(&invoicing_decomposition(), startups);
        assert_eq!(ranked.len(), 10);
    }
}
