//! Generation-service client with credential rotation and response caching
//!
//! Single point of contact with the external text-generation service.
//! Owns its credential pool, round-robin rotation counter and in-process
//! response cache so instances can be constructed fresh for test isolation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use url::Url;

use crate::model::{Citation, EvidenceConfig};

/// Cached responses are served for one hour.
const CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// Cache keys use the model plus the first 500 characters of the prompt.
const CACHE_KEY_PROMPT_CHARS: usize = 500;

const DEFAULT_TEMPERATURE: f32 = 0.2;
const DEFAULT_MAX_TOKENS: u32 = 4000;

static INLINE_CITATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[(\d+)\]").unwrap());

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum EvidenceError {
    /// No credentials configured; raised at first use, not at startup.
    #[error("No generation-service credentials configured")]
    NoCredentials,

    /// All credentials in the pool were rate limited.
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Non-rate-limit API error; surfaced immediately without retry.
    #[error("Generation service error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to parse response: {0}")]
    Parse(String),
}

/// Per-call options for a generation request.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// Model override; the client default is used when unset.
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub use_cache: bool,
    pub search_domain_filter: Option<Vec<String>>,
    pub return_citations: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            model: None,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            use_cache: true,
            search_domain_filter: None,
            return_citations: true,
        }
    }
}

/// Token usage reported by the generation service.
#[derive(Debug, Clone, Default)]
pub struct GenerationUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// A generation-service response with extracted citations.
#[derive(Debug, Clone)]
pub struct GenerationResponse {
    pub content: String,
    pub citations: Vec<Citation>,
    pub model: String,
    pub usage: GenerationUsage,
}

/// Cache introspection snapshot.
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub size: usize,
    pub keys: Vec<String>,
}

struct CacheEntry {
    response: GenerationResponse,
    cached_at: Instant,
}

/// Client for the external text-generation service.
///
/// Credentials rotate round-robin on every call; a rate-limited call
/// advances to the next credential, any other error is surfaced
/// immediately.
pub struct EvidenceClient {
    http: Client,
    base_url: String,
    default_model: String,
    keys: Vec<String>,
    rotation: AtomicUsize,
    cache: Mutex<HashMap<String, CacheEntry>>,
}

impl EvidenceClient {
    pub fn new(config: EvidenceConfig) -> Self {
        if config.api_keys.is_empty() {
            tracing::warn!("No generation-service credentials configured; calls will fail");
        } else {
            tracing::info!(
                pool_size = config.api_keys.len(),
                model = %config.model(),
                "Evidence client initialized"
            );
        }

        Self {
            http: Client::new(),
            base_url: config.base_url().to_string(),
            default_model: config.model().to_string(),
            keys: config.api_keys.clone(),
            rotation: AtomicUsize::new(0),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Issue a generation request combining a system and a user
    /// instruction into one multi-turn call.
    ///
    /// A cache hit younger than one hour is returned without any network
    /// call. On a rate-limit response the next credential is tried, one
    /// attempt per credential; if the whole pool is exhausted the last
    /// rate-limit error is raised.
    pub async fn query(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        options: QueryOptions,
    ) -> Result<GenerationResponse, EvidenceError> {
        if self.keys.is_empty() {
            return Err(EvidenceError::NoCredentials);
        }

        let model = options
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());
        let full_prompt = format!("{}\n\n{}", system_prompt, user_prompt);
        let key = cache_key(&model, &full_prompt);

        if options.use_cache {
            if let Some(hit) = self.cache_lookup(&key) {
                tracing::debug!(cache_key = %key, "Generation cache hit");
                return Ok(hit);
            }
        }

        let mut body = serde_json::json!({
            "model": model,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_prompt },
            ],
            "temperature": options.temperature,
            "max_tokens": options.max_tokens,
            "return_citations": options.return_citations,
        });
        if let Some(domains) = &options.search_domain_filter {
            if !domains.is_empty() {
                body["search_domain_filter"] = serde_json::json!(domains);
            }
        }

        let mut last_rate_limit: Option<EvidenceError> = None;

        for attempt in 0..self.keys.len() {
            let key_index = self.next_key_index();
            let api_key = &self.keys[key_index];
            let started = Instant::now();

            let response = self
                .http
                .post(&self.base_url)
                .bearer_auth(api_key)
                .json(&body)
                .send()
                .await?;

            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                let text = response.text().await.unwrap_or_default();
                tracing::warn!(
                    key_index = key_index,
                    attempt = attempt,
                    "Generation service rate limited, rotating credential"
                );
                last_rate_limit = Some(EvidenceError::RateLimited(text));
                continue;
            }

            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(EvidenceError::Api {
                    status: status.as_u16(),
                    body: text,
                });
            }

            let api: ApiResponse = response
                .json()
                .await
                .map_err(|e| EvidenceError::Parse(format!("Malformed generation response: {}", e)))?;

            let content = api
                .choices
                .first()
                .map(|c| c.message.content.clone())
                .unwrap_or_default();
            let citations = parse_citations(&content, api.citations.as_deref().unwrap_or(&[]));

            let result = GenerationResponse {
                content,
                citations,
                model: api.model.unwrap_or(model),
                usage: GenerationUsage {
                    prompt_tokens: api.usage.as_ref().map(|u| u.prompt_tokens).unwrap_or(0),
                    completion_tokens: api
                        .usage
                        .as_ref()
                        .map(|u| u.completion_tokens)
                        .unwrap_or(0),
                },
            };

            tracing::debug!(
                key_index = key_index,
                elapsed_ms = started.elapsed().as_millis(),
                prompt_tokens = result.usage.prompt_tokens,
                completion_tokens = result.usage.completion_tokens,
                citations = result.citations.len(),
                "Generation call complete"
            );

            if options.use_cache {
                self.cache.lock().insert(
                    key,
                    CacheEntry {
                        response: result.clone(),
                        cached_at: Instant::now(),
                    },
                );
            }

            return Ok(result);
        }

        Err(last_rate_limit.unwrap_or(EvidenceError::NoCredentials))
    }

    /// Current cache size and key listing, for operational introspection.
    pub fn cache_stats(&self) -> CacheStats {
        let cache = self.cache.lock();
        CacheStats {
            size: cache.len(),
            keys: cache.keys().cloned().collect(),
        }
    }

    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }

    fn next_key_index(&self) -> usize {
        self.rotation.fetch_add(1, Ordering::Relaxed) % self.keys.len()
    }

    fn cache_lookup(&self, key: &str) -> Option<GenerationResponse> {
        let cache = self.cache.lock();
        cache
            .get(key)
            .filter(|entry| entry.cached_at.elapsed() < CACHE_TTL)
            .map(|entry| entry.response.clone())
    }
}

/// Cache key: model plus the first 500 characters of the combined prompt.
fn cache_key(model: &str, full_prompt: &str) -> String {
    let prefix: String = full_prompt.chars().take(CACHE_KEY_PROMPT_CHARS).collect();
    format!("{}:{}", model, prefix)
}

/// Build the citation list from the structured source list plus any
/// inline bracketed references (`[1]`, `[2]`, ...) in the generated text
/// that are not already covered by a structured source.
pub fn parse_citations(content: &str, sources: &[SourceRef]) -> Vec<Citation> {
    let now = Utc::now();
    let mut citations: Vec<Citation> = sources
        .iter()
        .enumerate()
        .map(|(index, source)| Citation {
            id: format!("citation-{}", index + 1),
            source: hostname_of(&source.url),
            url: Some(source.url.clone()),
            title: source.title.clone().unwrap_or_else(|| source.url.clone()),
            snippet: String::new(),
            retrieved_at: now,
            relevance_score: None,
        })
        .collect();

    for capture in INLINE_CITATION.captures_iter(content) {
        let number = &capture[1];
        let id = format!("citation-{}", number);
        if !citations.iter().any(|c| c.id == id) {
            citations.push(Citation {
                id,
                source: "inline".to_string(),
                url: None,
                title: format!("Reference {}", number),
                snippet: String::new(),
                retrieved_at: now,
                relevance_score: None,
            });
        }
    }

    citations
}

/// Human-readable source name derived from a URL's hostname.
fn hostname_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Structured source entry returned by the generation service.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceRef {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    choices: Vec<ApiChoice>,
    #[serde(default)]
    citations: Option<Vec<SourceRef>>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_with_keys(keys: &[&str]) -> EvidenceClient {
        EvidenceClient::new(EvidenceConfig {
            api_keys: keys.iter().map(|k| k.to_string()).collect(),
            base_url: Some("http://127.0.0.1:1/chat/completions".to_string()),
            model: None,
        })
    }

    #[test]
    fn test_cache_key_truncates_at_500_chars() {
        let long_prompt = "x".repeat(2000);
        let key = cache_key("sonar-pro", &long_prompt);
        assert_eq!(key.len(), "sonar-pro:".len() + 500);
    }

    #[test]
    fn test_cache_key_handles_multibyte_prompt() {
        let prompt = "é".repeat(600);
        let key = cache_key("sonar-pro", &prompt);
        assert_eq!(key.chars().count(), "sonar-pro:".chars().count() + 500);
    }

    #[test]
    fn test_rotation_is_round_robin() {
        let client = client_with_keys(&["a", "b", "c"]);
        let indices: Vec<usize> = (0..7).map(|_| client.next_key_index()).collect();
        assert_eq!(indices, vec![0, 1, 2, 0, 1, 2, 0]);
    }

    #[tokio::test]
    async fn test_no_credentials_is_fatal_at_first_call() {
        let client = client_with_keys(&[]);
        let result = client.query("system", "user", QueryOptions::default()).await;
        assert!(matches!(result, Err(EvidenceError::NoCredentials)));
    }

    #[test]
    fn test_parse_citations_structured_sources() {
        let sources = vec![
            SourceRef {
                url: "https://www.example.com/report".to_string(),
                title: Some("Market Report".to_string()),
            },
            SourceRef {
                url: "https://data.io/stats".to_string(),
                title: None,
            },
        ];
        let citations = parse_citations("Market is growing [1][2].", &sources);

        assert_eq!(citations.len(), 2);
        assert_eq!(citations[0].id, "citation-1");
        assert_eq!(citations[0].source, "example.com");
        assert_eq!(citations[0].title, "Market Report");
        assert_eq!(citations[1].source, "data.io");
        assert_eq!(citations[1].title, "https://data.io/stats");
    }

    #[test]
    fn test_parse_citations_inline_only() {
        let citations = parse_citations("Growth is strong [1], churn is high [3].", &[]);

        assert_eq!(citations.len(), 2);
        assert_eq!(citations[0].id, "citation-1");
        assert_eq!(citations[0].source, "inline");
        assert_eq!(citations[0].title, "Reference 1");
        assert_eq!(citations[1].id, "citation-3");
    }

    #[test]
    fn test_inline_citations_do_not_duplicate_structured() {
        let sources = vec![SourceRef {
            url: "https://example.com".to_string(),
            title: None,
        }];
        let citations = parse_citations("Covered [1], extra [2].", &sources);

        assert_eq!(citations.len(), 2);
        assert_eq!(citations[0].source, "example.com");
        assert_eq!(citations[1].source, "inline");
    }

    #[test]
    fn test_cache_clear_and_stats() {
        let client = client_with_keys(&["a"]);
        assert_eq!(client.cache_stats().size, 0);
        client.cache.lock().insert(
            "k".to_string(),
            CacheEntry {
                response: GenerationResponse {
                    content: String::new(),
                    citations: vec![],
                    model: "m".to_string(),
                    usage: GenerationUsage::default(),
                },
                cached_at: Instant::now(),
            },
        );
        assert_eq!(client.cache_stats().size, 1);
        assert_eq!(client.cache_stats().keys, vec!["k".to_string()]);
        client.clear_cache();
        assert_eq!(client.cache_stats().size, 0);
    }

    #[tokio::test]
    #[ignore] // Requires a live generation-service endpoint
    async fn test_live_query() {
        let config = EvidenceConfig {
            api_keys: vec![std::env::var("PREMORTEM_EVIDENCE_KEY_1").unwrap()],
            base_url: None,
            model: None,
        };
        let client = EvidenceClient::new(config);
        let result = client
            .query("You are a test assistant.", "Say hello.", QueryOptions::default())
            .await;
        assert!(result.is_ok());
    }
}
