pub mod config;
pub mod graveyard;
pub mod report;

pub use config::{Config, EvidenceConfig, GraveyardConfig};
pub use graveyard::FailedStartup;
pub use report::*;
