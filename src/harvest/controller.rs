//! Category crawl controller.
//!
//! Drives one [`RenderSession`] through the configured categories in order:
//! navigate, scroll until the page converges, extract from the DOM and the
//! captured API traffic, reconcile. Records from every category are then
//! deduplicated, filtered by the request and truncated to its limit.
//!
//! A failing category is logged and skipped. Only session-level errors end
//! the harvest, and the session is closed exactly once either way.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use url::Url;

use super::api::extract_api;
use super::dedup::deduplicate;
use super::dom::extract_dom;
use super::heuristics::CompiledRules;
use super::reconcile::reconcile;
use super::scroll::{converge, ScrollSummary};
use crate::browser::{ChromiumSession, RenderSession};
use crate::config::HarvestConfig;
use crate::error::{HarvestError, Result};
use crate::models::{select_categories, CategoryDescriptor, ProductRecord, RecordSource};

/// Where the controller is in a harvest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlPhase {
    Idle,
    NavigatingCategory,
    ScrollLoading,
    Extracting,
    Reconciling,
    GlobalDedup,
    Done,
}

impl CrawlPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::NavigatingCategory => "navigating_category",
            Self::ScrollLoading => "scroll_loading",
            Self::Extracting => "extracting",
            Self::Reconciling => "reconciling",
            Self::GlobalDedup => "global_dedup",
            Self::Done => "done",
        }
    }
}

impl std::fmt::Display for CrawlPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs of one harvest. The output is a pure function of these plus the
/// site's state, so callers may cache on [`HarvestRequest::cache_key`].
#[derive(Debug, Clone, PartialEq)]
pub struct HarvestRequest {
    /// Case-insensitive name substring, or exact barcode.
    pub query: Option<String>,
    pub limit: Option<usize>,
    /// Total scroll iterations; falls back to the configured budget.
    pub max_scroll_budget: Option<u32>,
    /// Drop records without a finite positive price.
    pub require_price: bool,
}

impl Default for HarvestRequest {
    fn default() -> Self {
        Self {
            query: None,
            limit: None,
            max_scroll_budget: None,
            require_price: true,
        }
    }
}

impl HarvestRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        let query = query.into();
        self.query = (!query.trim().is_empty()).then_some(query);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_scroll_budget(mut self, budget: u32) -> Self {
        self.max_scroll_budget = Some(budget);
        self
    }

    pub fn with_require_price(mut self, require_price: bool) -> Self {
        self.require_price = require_price;
        self
    }

    /// Stable cache key: `<store>-scrape-<query>-<limit>-<budget>-<require_price>`.
    pub fn cache_key(&self, store_slug: &str) -> String {
        format!(
            "{}-scrape-{}-{}-{}-{}",
            store_slug,
            self.query.as_deref().unwrap_or("all"),
            self.limit
                .map(|l| l.to_string())
                .unwrap_or_else(|| "all".to_string()),
            self.max_scroll_budget
                .map(|b| b.to_string())
                .unwrap_or_else(|| "default".to_string()),
            self.require_price
        )
    }
}

/// What happened during one category visit.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryOutcome {
    pub category: CategoryDescriptor,
    pub dom_records: usize,
    pub api_records: usize,
    /// DOM records enriched by a matching API record.
    pub merged_records: usize,
    /// Records handed to global dedup.
    pub records: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scrolls: Option<u32>,
    /// Why the category was skipped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CategoryOutcome {
    fn skipped(category: &CategoryDescriptor, error: &HarvestError) -> Self {
        Self {
            category: category.clone(),
            dom_records: 0,
            api_records: 0,
            merged_records: 0,
            records: 0,
            scrolls: None,
            error: Some(error.to_string()),
        }
    }

    pub fn visited(&self) -> bool {
        self.error.is_none()
    }
}

/// Full result of a harvest.
#[derive(Debug, Clone, Serialize)]
pub struct HarvestReport {
    pub records: Vec<ProductRecord>,
    pub categories: Vec<CategoryOutcome>,
    /// Records across all categories before deduplication.
    pub total_before_dedup: usize,
    /// Records after deduplication, before query/limit filtering.
    pub total_after_dedup: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl HarvestReport {
    pub fn categories_visited(&self) -> usize {
        self.categories.iter().filter(|c| c.visited()).count()
    }
}

/// Crawls a store's categories through a rendering session.
pub struct Harvester<S: RenderSession> {
    config: HarvestConfig,
    session: S,
    rules: CompiledRules,
    phase: CrawlPhase,
}

impl Harvester<ChromiumSession> {
    /// Harvester backed by a Chromium session built from `config`.
    pub fn from_config(config: HarvestConfig) -> Result<Self> {
        let session = ChromiumSession::new(&config);
        Self::new(config, session)
    }
}

impl<S: RenderSession> Harvester<S> {
    /// Fails with `InvalidSelector` when a configured selector does not parse.
    pub fn new(config: HarvestConfig, session: S) -> Result<Self> {
        let rules = CompiledRules::compile(&config.extraction)?;
        Ok(Self {
            config,
            session,
            rules,
            phase: CrawlPhase::Idle,
        })
    }

    pub fn phase(&self) -> CrawlPhase {
        self.phase
    }

    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    /// Key under which a caller may cache the result of `request`.
    pub fn cache_key(&self, request: &HarvestRequest) -> String {
        request.cache_key(&self.config.store.slug())
    }

    /// Harvest and return only the final record list.
    pub async fn harvest(&mut self, request: &HarvestRequest) -> Result<Vec<ProductRecord>> {
        Ok(self.harvest_report(request).await?.records)
    }

    /// Harvest and return records plus per-category outcomes.
    pub async fn harvest_report(&mut self, request: &HarvestRequest) -> Result<HarvestReport> {
        let started_at = Utc::now();
        self.transition(CrawlPhase::Idle);

        let categories =
            select_categories(&self.config.store.categories, self.config.store.max_categories)
                .to_vec();
        if categories.is_empty() {
            return Err(HarvestError::NoCategoriesConfigured);
        }

        let total_budget = request
            .max_scroll_budget
            .unwrap_or(self.config.crawl.max_scroll_budget);
        let per_category = self
            .config
            .crawl
            .scrolls_per_category(total_budget, self.config.store.categories.len());

        info!(
            "Harvesting {} ({} of {} categories, {} scrolls each)",
            self.config.store.name,
            categories.len(),
            self.config.store.categories.len(),
            per_category
        );

        if let Err(e) = self.session.open().await {
            self.session.close().await;
            self.transition(CrawlPhase::Done);
            return Err(e);
        }

        let crawled = self.crawl(&categories, per_category).await;
        self.session.close().await;

        let (raw, outcomes) = match crawled {
            Ok(result) => result,
            Err(e) => {
                self.transition(CrawlPhase::Done);
                return Err(e);
            }
        };

        self.transition(CrawlPhase::GlobalDedup);
        let total_before_dedup = raw.len();
        let unique = deduplicate(raw, self.config.crawl.dedup_policy);
        let total_after_dedup = unique.len();
        let records = apply_request(unique, request);

        info!(
            "Harvest complete: {} raw, {} unique, {} returned",
            total_before_dedup,
            total_after_dedup,
            records.len()
        );
        self.transition(CrawlPhase::Done);

        Ok(HarvestReport {
            records,
            categories: outcomes,
            total_before_dedup,
            total_after_dedup,
            started_at,
            finished_at: Utc::now(),
        })
    }

    async fn crawl(
        &mut self,
        categories: &[CategoryDescriptor],
        scroll_budget: u32,
    ) -> Result<(Vec<ProductRecord>, Vec<CategoryOutcome>)> {
        let mut records = Vec::new();
        let mut outcomes = Vec::with_capacity(categories.len());

        for (i, category) in categories.iter().enumerate() {
            info!(
                "Category {}/{}: {}",
                i + 1,
                categories.len(),
                category.name
            );
            match self.visit(category, scroll_budget).await {
                Ok((mut visited, outcome)) => {
                    info!("  {} records from {}", visited.len(), category.name);
                    records.append(&mut visited);
                    outcomes.push(outcome);
                }
                Err(e) if e.is_fatal() => {
                    warn!("Aborting harvest at {}: {}", category.name, e);
                    return Err(e);
                }
                Err(e) => {
                    warn!("Skipping category {}: {}", category.name, e);
                    outcomes.push(CategoryOutcome::skipped(category, &e));
                }
            }
        }

        Ok((records, outcomes))
    }

    async fn visit(
        &mut self,
        category: &CategoryDescriptor,
        scroll_budget: u32,
    ) -> Result<(Vec<ProductRecord>, CategoryOutcome)> {
        self.transition(CrawlPhase::NavigatingCategory);
        self.session.clear_captures();
        self.session.navigate(&category.url).await?;
        let settle = self.config.crawl.post_navigation_settle();
        if !settle.is_zero() {
            tokio::time::sleep(settle).await;
        }

        self.transition(CrawlPhase::ScrollLoading);
        let scroll: ScrollSummary = converge(
            &mut self.session,
            scroll_budget,
            self.config.crawl.stability_threshold,
            self.config.crawl.scroll_settle(),
        )
        .await?;
        debug!(
            "Scrolled {} times ({} measurements, converged={})",
            scroll.scrolls, scroll.measurements, scroll.converged
        );

        self.transition(CrawlPhase::Extracting);
        let html = self.session.content().await?;
        let base_url = Url::parse(&category.url).ok();
        let dom = extract_dom(&html, base_url.as_ref(), &self.rules);
        let captures = self.session.drain_captures();
        let api = extract_api(&captures);
        let (dom_records, api_records) = (dom.len(), api.len());

        self.transition(CrawlPhase::Reconciling);
        let mut records = reconcile(dom, api);
        let scraped_at = Utc::now();
        for record in &mut records {
            record.attach_category(category, scraped_at);
        }

        let outcome = CategoryOutcome {
            category: category.clone(),
            dom_records,
            api_records,
            merged_records: records
                .iter()
                .filter(|r| r.source == RecordSource::Merged)
                .count(),
            records: records.len(),
            scrolls: Some(scroll.scrolls),
            error: None,
        };
        Ok((records, outcome))
    }

    fn transition(&mut self, next: CrawlPhase) {
        if self.phase != next {
            debug!("Crawl phase: {} -> {}", self.phase, next);
            self.phase = next;
        }
    }
}

/// Query filter, price guard, then limit.
fn apply_request(records: Vec<ProductRecord>, request: &HarvestRequest) -> Vec<ProductRecord> {
    let query = request.query.as_deref().unwrap_or("");
    let filtered = records
        .into_iter()
        .filter(|r| r.matches_query(query))
        .filter(|r| !request.require_price || r.is_valid());
    match request.limit {
        Some(limit) => filtered.take(limit).collect(),
        None => filtered.collect(),
    }
}
