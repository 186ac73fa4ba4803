//! Catalog harvester.
//!
//! Crawls a grocery storefront's category pages in a headless browser and
//! produces a deduplicated list of product records, combining what the
//! rendered markup shows with what the page's own API calls return.

pub mod browser;
pub mod cli;
pub mod config;
pub mod error;
pub mod harvest;
pub mod models;

pub use browser::{ChromiumSession, LazyLoadPage, RenderSession};
pub use config::HarvestConfig;
pub use error::{HarvestError, Result};
pub use harvest::{HarvestReport, HarvestRequest, Harvester};
pub use models::{CategoryDescriptor, ProductRecord, RecordSource};
