use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

const ENV_CONFIG_PATH: &str = "PREMORTEM_CONFIG_PATH";
const DEFAULT_CONFIG_PATH: &str = "config.yaml";

const ENV_EVIDENCE_KEY_PREFIX: &str = "PREMORTEM_EVIDENCE_KEY_";
const ENV_EVIDENCE_URL: &str = "PREMORTEM_EVIDENCE_URL";
const ENV_EVIDENCE_MODEL: &str = "PREMORTEM_EVIDENCE_MODEL";
const ENV_GRAVEYARD_URL: &str = "PREMORTEM_GRAVEYARD_URL";
const ENV_GRAVEYARD_KEY: &str = "PREMORTEM_GRAVEYARD_KEY";

const DEFAULT_EVIDENCE_URL: &str = "https://api.perplexity.ai/chat/completions";
const DEFAULT_EVIDENCE_MODEL: &str = "sonar-pro";
const DEFAULT_GRAVEYARD_URL: &str = "https://lentxykytbylpxytluic.supabase.co";

/// Generation-service client configuration.
///
/// An empty key pool is not rejected here; the evidence client raises a
/// configuration error on first use instead.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EvidenceConfig {
    #[serde(default)]
    pub api_keys: Vec<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

impl EvidenceConfig {
    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_EVIDENCE_URL)
    }

    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_EVIDENCE_MODEL)
    }
}

/// Failed-startups data store configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GraveyardConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl GraveyardConfig {
    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_GRAVEYARD_URL)
    }
}

/// YAML configuration file structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub evidence: EvidenceConfig,
    #[serde(default)]
    pub graveyard: GraveyardConfig,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub evidence: EvidenceConfig,
    pub graveyard: GraveyardConfig,
    pub port: u16,
    pub host: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            evidence: EvidenceConfig::default(),
            graveyard: GraveyardConfig::default(),
            port: 8080,
            host: "127.0.0.1".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment and config file.
    ///
    /// File values fill in anything the environment does not set.
    pub fn from_env() -> Self {
        let port = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let config_path =
            env::var(ENV_CONFIG_PATH).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let file = Self::load_config_file(&config_path).unwrap_or_default();

        let mut evidence = file.evidence;
        let env_keys = Self::collect_evidence_keys();
        if !env_keys.is_empty() {
            evidence.api_keys = env_keys;
        }
        if let Ok(url) = env::var(ENV_EVIDENCE_URL) {
            evidence.base_url = Some(url);
        }
        if let Ok(model) = env::var(ENV_EVIDENCE_MODEL) {
            evidence.model = Some(model);
        }

        let mut graveyard = file.graveyard;
        if let Ok(url) = env::var(ENV_GRAVEYARD_URL) {
            graveyard.base_url = Some(url);
        }
        if let Ok(key) = env::var(ENV_GRAVEYARD_KEY) {
            graveyard.api_key = Some(key);
        }

        Self {
            evidence,
            graveyard,
            port,
            host,
        }
    }

    /// Gather numbered credentials (`PREMORTEM_EVIDENCE_KEY_1`,
    /// `PREMORTEM_EVIDENCE_KEY_2`, ...) until the first gap.
    fn collect_evidence_keys() -> Vec<String> {
        let mut keys = Vec::new();
        for i in 1u32.. {
            match env::var(format!("{}{}", ENV_EVIDENCE_KEY_PREFIX, i)) {
                Ok(key) if !key.trim().is_empty() => keys.push(key),
                _ => break,
            }
        }
        keys
    }

    /// Load configuration from YAML file
    fn load_config_file(path: &str) -> Option<ConfigFile> {
        let path = Path::new(path);

        if !path.exists() {
            tracing::debug!(path = %path.display(), "Config file not found, using defaults");
            return None;
        }

        match fs::read_to_string(path) {
            Ok(contents) => {
                let contents = contents.trim();
                if contents.is_empty() {
                    tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
                    return Some(ConfigFile::default());
                }

                match serde_yaml::from_str(contents) {
                    Ok(config) => {
                        tracing::info!(path = %path.display(), "Loaded configuration from file");
                        Some(config)
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "Failed to parse config file, using defaults");
                        None
                    }
                }
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read config file, using defaults");
                None
            }
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
