//! Failed-startups data store client
//!
//! Read-only access to the historical-failures database via its paginated
//! RPC endpoint. Transport errors degrade to an empty result; callers
//! never see a failure from this boundary.

use reqwest::Client;
use serde_json::json;

use crate::model::{FailedStartup, GraveyardConfig};

const RPC_PATH: &str = "/rest/v1/rpc/get_startups_list";

/// Client for the historical-failures store.
pub struct GraveyardClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl GraveyardClient {
    pub fn new(config: GraveyardConfig) -> Self {
        Self {
            http: Client::new(),
            base_url: config.base_url().trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }

    /// Fetch a page of failure records, optionally filtered by sector.
    ///
    /// Returns an empty list on any transport or decode error.
    pub async fn list(&self, limit: u32, offset: u32, sector: Option<&str>) -> Vec<FailedStartup> {
        let url = format!("{}{}", self.base_url, RPC_PATH);

        let mut request = self
            .http
            .post(&url)
            .header("Content-Profile", "public")
            .json(&json!({
                "p_limit": limit,
                "p_offset": offset,
                "p_sector": sector,
            }));

        if let Some(key) = &self.api_key {
            request = request.header("apikey", key).bearer_auth(key);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "Failed-startups store unreachable");
                return Vec::new();
            }
        };

        if !response.status().is_success() {
            tracing::warn!(
                status = response.status().as_u16(),
                "Failed-startups store returned an error"
            );
            return Vec::new();
        }

        match response.json::<Vec<FailedStartup>>().await {
            Ok(startups) => {
                tracing::debug!(count = startups.len(), "Fetched failure records");
                startups
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to decode failure records");
                Vec::new()
            }
        }
    }
}
