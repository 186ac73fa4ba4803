//! Harvest pipeline: scroll convergence, dual-channel extraction,
//! reconciliation, deduplication and the category crawl controller.

pub mod api;
pub mod controller;
pub mod dedup;
pub mod dom;
pub mod heuristics;
pub mod reconcile;
pub mod scroll;

pub use api::extract_api;
pub use controller::{CategoryOutcome, CrawlPhase, HarvestReport, HarvestRequest, Harvester};
pub use dedup::{dedup_key, deduplicate};
pub use dom::extract_dom;
pub use heuristics::CompiledRules;
pub use reconcile::reconcile;
pub use scroll::{converge, ScrollState, ScrollSummary};
