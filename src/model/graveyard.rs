//! Records returned by the failed-startups data store

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A historically failed company as stored in the graveyard database.
///
/// Field names mirror the store's RPC response; several are optional
/// because coverage varies across entries.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FailedStartup {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub year_died: Option<i32>,
    /// Display string, e.g. "$125M".
    #[serde(default)]
    pub money_burned: Option<String>,
    /// Numeric amount backing `money_burned`.
    #[serde(default)]
    pub money_burned_raw: Option<f64>,
    #[serde(default)]
    pub failure_reason: Option<String>,
    #[serde(default)]
    pub sector: Option<String>,
    #[serde(default)]
    pub market: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub city: Option<String>,
}

impl FailedStartup {
    /// Combined text used for keyword relevance matching.
    pub fn match_text(&self) -> String {
        format!(
            "{} {} {} {}",
            self.name,
            self.description,
            self.category,
            self.sector.as_deref().unwrap_or("")
        )
    }
}
