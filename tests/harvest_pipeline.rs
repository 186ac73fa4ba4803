//! End-to-end harvest tests against an in-memory rendering session.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::json;

use catalog_harvester::browser::{CapturedResponse, LazyLoadPage, RenderSession};
use catalog_harvester::harvest::{CrawlPhase, HarvestRequest, Harvester};
use catalog_harvester::{CategoryDescriptor, HarvestConfig, HarvestError, RecordSource};

/// How a fake page misbehaves.
#[derive(Clone, Copy, PartialEq)]
enum Fault {
    None,
    NavigationTimeout,
    ContentError,
    PageGone,
}

#[derive(Clone)]
struct FakePage {
    html: String,
    /// Measurements replayed by the scroll loop; the last one repeats.
    measurements: Vec<u64>,
    captures: Vec<CapturedResponse>,
    /// Responses that arrive after the category was drained.
    late_captures: Vec<CapturedResponse>,
    fault: Fault,
}

impl FakePage {
    fn new(html: String) -> Self {
        Self {
            html,
            measurements: vec![10],
            captures: Vec::new(),
            late_captures: Vec::new(),
            fault: Fault::None,
        }
    }
}

#[derive(Default)]
struct FakeSession {
    pages: HashMap<String, FakePage>,
    fail_open: bool,
    current: Option<FakePage>,
    measured: usize,
    buffer: Vec<CapturedResponse>,
    opens: usize,
    closes: usize,
    grows: u32,
    navigations: Vec<String>,
}

impl FakeSession {
    fn with_pages(pages: Vec<(&str, FakePage)>) -> Self {
        Self {
            pages: pages
                .into_iter()
                .map(|(url, page)| (url.to_string(), page))
                .collect(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl LazyLoadPage for FakeSession {
    async fn measure(&mut self) -> catalog_harvester::Result<u64> {
        let page = self.current.as_ref().ok_or(HarvestError::SessionClosed)?;
        let idx = self.measured.min(page.measurements.len() - 1);
        self.measured += 1;
        Ok(page.measurements[idx])
    }

    async fn grow(&mut self) -> catalog_harvester::Result<()> {
        self.grows += 1;
        Ok(())
    }
}

#[async_trait]
impl RenderSession for FakeSession {
    async fn open(&mut self) -> catalog_harvester::Result<()> {
        self.opens += 1;
        if self.fail_open {
            return Err(HarvestError::SessionInit("no chrome in test".into()));
        }
        Ok(())
    }

    async fn navigate(&mut self, url: &str) -> catalog_harvester::Result<()> {
        self.navigations.push(url.to_string());
        let page = self
            .pages
            .get(url)
            .cloned()
            .unwrap_or_else(|| FakePage::new(String::new()));
        if page.fault == Fault::NavigationTimeout {
            return Err(HarvestError::NavigationTimeout {
                url: url.to_string(),
                seconds: 30,
            });
        }
        self.buffer.extend(page.captures.iter().cloned());
        self.measured = 0;
        self.current = Some(page);
        Ok(())
    }

    async fn content(&mut self) -> catalog_harvester::Result<String> {
        let page = self.current.as_ref().ok_or(HarvestError::SessionClosed)?;
        match page.fault {
            Fault::ContentError => Err(HarvestError::Browser("evaluate threw".into())),
            Fault::PageGone => Err(HarvestError::SessionClosed),
            _ => Ok(page.html.clone()),
        }
    }

    fn drain_captures(&mut self) -> Vec<CapturedResponse> {
        let drained = std::mem::take(&mut self.buffer);
        if let Some(page) = &self.current {
            self.buffer.extend(page.late_captures.iter().cloned());
        }
        drained
    }

    fn clear_captures(&mut self) {
        self.buffer.clear();
    }

    async fn close(&mut self) {
        self.closes += 1;
        self.current = None;
    }
}

fn tile(name: &str, price: &str, barcode: Option<&str>, id: &str) -> String {
    match barcode {
        Some(code) => format!(
            r#"<div class="product-tile"><div role="button" id="product-{code}"></div><img src="/img/{id}.png"><h3>{name}</h3><span class="price">{price} ₪</span></div>"#
        ),
        None => format!(
            r#"<div class="product-tile" data-id="{id}"><img src="/img/{id}.png"><h3>{name}</h3><span class="price">{price} ₪</span></div>"#
        ),
    }
}

fn page(tiles: &[String]) -> String {
    format!("<html><body><main>{}</main></body></html>", tiles.join("\n"))
}

fn config(urls: &[&str]) -> HarvestConfig {
    let mut config = HarvestConfig::default();
    config.store.categories = urls
        .iter()
        .enumerate()
        .map(|(i, url)| CategoryDescriptor::new(format!("cat-{}", i + 1), *url))
        .collect();
    config.store.max_categories = 0;
    config.crawl = config.crawl.without_delays();
    config
}

const DAIRY: &str = "https://shop.example/market/dairy";
const BAKERY: &str = "https://shop.example/market/bakery";
const DRINKS: &str = "https://shop.example/market/drinks";

#[tokio::test]
async fn test_records_carry_category_and_valid_fields() {
    let session = FakeSession::with_pages(vec![(
        DAIRY,
        FakePage::new(page(&[
            tile("Milk 3%", "5.90", Some("7290000066318"), "m"),
            tile("Butter", "9,90", None, "b"),
        ])),
    )]);
    let mut harvester = Harvester::new(config(&[DAIRY]), session).unwrap();

    let records = harvester.harvest(&HarvestRequest::new()).await.unwrap();
    assert_eq!(records.len(), 2);
    for record in &records {
        assert!(!record.name.is_empty());
        assert!(record.price.is_finite() && record.price > 0.0);
        assert_eq!(record.category.as_deref(), Some("cat-1"));
        assert_eq!(record.category_url.as_deref(), Some(DAIRY));
        assert!(record.scraped_at.is_some());
    }
    assert_eq!(records[1].image_url.as_deref(), Some("https://shop.example/img/b.png"));
    assert_eq!(harvester.phase(), CrawlPhase::Done);
    assert_eq!(harvester.session().closes, 1);
}

#[tokio::test]
async fn test_same_barcode_across_categories_keeps_first() {
    let session = FakeSession::with_pages(vec![
        (
            DAIRY,
            FakePage::new(page(&[tile("Chocolate Milk", "7.50", Some("7290000011111"), "a")])),
        ),
        (
            BAKERY,
            FakePage::new(page(&[tile("Choco Drink 1L", "7.90", Some("7290000011111"), "b")])),
        ),
    ]);
    let mut harvester = Harvester::new(config(&[DAIRY, BAKERY]), session).unwrap();

    let report = harvester.harvest_report(&HarvestRequest::new()).await.unwrap();
    assert_eq!(report.total_before_dedup, 2);
    assert_eq!(report.records.len(), 1);
    assert_eq!(report.records[0].name, "Chocolate Milk");
    assert_eq!(report.records[0].category.as_deref(), Some("cat-1"));
}

#[tokio::test]
async fn test_navigation_timeout_skips_category() {
    let mut broken = FakePage::new(String::new());
    broken.fault = Fault::NavigationTimeout;
    let session = FakeSession::with_pages(vec![
        (DAIRY, FakePage::new(page(&[tile("Yogurt Plain", "4.20", None, "y")]))),
        (BAKERY, broken),
        (DRINKS, FakePage::new(page(&[tile("Orange Juice", "11.90", None, "o")]))),
    ]);
    let mut harvester = Harvester::new(config(&[DAIRY, BAKERY, DRINKS]), session).unwrap();

    let report = harvester.harvest_report(&HarvestRequest::new()).await.unwrap();
    let names: Vec<_> = report.records.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["Yogurt Plain", "Orange Juice"]);
    assert_eq!(report.categories.len(), 3);
    assert!(!report.categories[1].visited());
    assert!(report.categories[1]
        .error
        .as_deref()
        .unwrap()
        .contains("timed out"));
    assert_eq!(report.categories_visited(), 2);
    assert_eq!(harvester.session().navigations.len(), 3);
    assert_eq!(harvester.session().closes, 1);
}

#[tokio::test]
async fn test_extraction_error_still_closes_once() {
    let mut failing = FakePage::new(String::new());
    failing.fault = Fault::ContentError;
    let session = FakeSession::with_pages(vec![
        (DAIRY, failing),
        (BAKERY, FakePage::new(page(&[tile("Rye Bread", "14.00", None, "r")]))),
    ]);
    let mut harvester = Harvester::new(config(&[DAIRY, BAKERY]), session).unwrap();

    let records = harvester.harvest(&HarvestRequest::new()).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(harvester.session().closes, 1);
}

#[tokio::test]
async fn test_fatal_session_error_propagates_after_teardown() {
    let mut gone = FakePage::new(String::new());
    gone.fault = Fault::PageGone;
    let session = FakeSession::with_pages(vec![
        (DAIRY, gone),
        (BAKERY, FakePage::new(page(&[tile("Rye Bread", "14.00", None, "r")]))),
    ]);
    let mut harvester = Harvester::new(config(&[DAIRY, BAKERY]), session).unwrap();

    let err = harvester.harvest(&HarvestRequest::new()).await.unwrap_err();
    assert!(matches!(err, HarvestError::SessionClosed));
    assert_eq!(harvester.session().navigations, vec![DAIRY.to_string()]);
    assert_eq!(harvester.session().closes, 1);
    assert_eq!(harvester.phase(), CrawlPhase::Done);
}

#[tokio::test]
async fn test_session_init_failure_closes_once() {
    let mut session = FakeSession::default();
    session.fail_open = true;
    let mut harvester = Harvester::new(config(&[DAIRY]), session).unwrap();

    let err = harvester.harvest(&HarvestRequest::new()).await.unwrap_err();
    assert!(matches!(err, HarvestError::SessionInit(_)));
    assert!(err.is_fatal());
    assert_eq!(harvester.session().closes, 1);
    assert!(harvester.session().navigations.is_empty());
}

#[tokio::test]
async fn test_no_categories_is_fatal() {
    let mut harvester = Harvester::new(config(&[]), FakeSession::default()).unwrap();

    let err = harvester.harvest(&HarvestRequest::new()).await.unwrap_err();
    assert!(matches!(err, HarvestError::NoCategoriesConfigured));
    assert_eq!(harvester.session().opens, 0);
}

#[tokio::test]
async fn test_query_and_limit() {
    let mut tiles: Vec<String> = (0..8)
        .map(|i| tile(&format!("Sourdough Bread {i}"), "12.00", None, &format!("b{i}")))
        .collect();
    tiles.push(tile("Goat Milk", "8.00", None, "g"));
    tiles.push(tile("Bread Crumbs", "6.50", None, "c"));
    let session = FakeSession::with_pages(vec![(BAKERY, FakePage::new(page(&tiles)))]);
    let mut harvester = Harvester::new(config(&[BAKERY]), session).unwrap();

    let request = HarvestRequest::new().with_query("bread").with_limit(5);
    let records = harvester.harvest(&request).await.unwrap();
    assert_eq!(records.len(), 5);
    assert!(records
        .iter()
        .all(|r| r.name.to_lowercase().contains("bread")));
}

#[tokio::test]
async fn test_api_capture_enriches_dom_record() {
    let mut dairy = FakePage::new(page(&[tile("Milk 1L", "5.90", None, "7")]));
    dairy.captures.push(CapturedResponse {
        url: "https://shop.example/api/products?cat=dairy".into(),
        status: 200,
        body: json!({"data": {"products": [
            {"id": "7", "name": "Milk", "price": 6.1, "barcode": "729000001"},
            {"id": "8", "name": "Cream 32%", "price": "6.40"}
        ]}}),
    });
    let session = FakeSession::with_pages(vec![(DAIRY, dairy)]);
    let mut harvester = Harvester::new(config(&[DAIRY]), session).unwrap();

    let report = harvester.harvest_report(&HarvestRequest::new()).await.unwrap();
    assert_eq!(report.records.len(), 2);

    let milk = &report.records[0];
    assert_eq!(milk.id, "7");
    assert_eq!(milk.barcode.as_deref(), Some("729000001"));
    assert_eq!(milk.name, "Milk 1L");
    assert_eq!(milk.price, 5.9);
    assert_eq!(milk.source, RecordSource::Merged);

    let cream = &report.records[1];
    assert_eq!(cream.source, RecordSource::Api);
    assert_eq!(cream.category.as_deref(), Some("cat-1"));

    let outcome = &report.categories[0];
    assert_eq!(outcome.dom_records, 1);
    assert_eq!(outcome.api_records, 2);
    assert_eq!(outcome.merged_records, 1);
}

#[tokio::test]
async fn test_late_captures_do_not_leak_into_next_category() {
    let mut dairy = FakePage::new(page(&[tile("Kefir", "7.20", None, "k")]));
    dairy.late_captures.push(CapturedResponse {
        url: "https://shop.example/api/search?q=dairy".into(),
        status: 200,
        body: json!([{"id": "late", "name": "Stale Dairy Item", "price": 3.0}]),
    });
    let session = FakeSession::with_pages(vec![
        (DAIRY, dairy),
        (BAKERY, FakePage::new(page(&[tile("Pita Pack", "5.00", None, "p")]))),
    ]);
    let mut harvester = Harvester::new(config(&[DAIRY, BAKERY]), session).unwrap();

    let records = harvester.harvest(&HarvestRequest::new()).await.unwrap();
    let names: Vec<_> = records.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["Kefir", "Pita Pack"]);
}

#[tokio::test]
async fn test_scroll_budget_split_across_catalog() {
    let mut growing = FakePage::new(page(&[tile("Granola Mix", "19.90", None, "g")]));
    growing.measurements = (1..=100).collect();
    let session = FakeSession::with_pages(vec![(DAIRY, growing.clone()), (BAKERY, growing)]);
    let mut harvester = Harvester::new(config(&[DAIRY, BAKERY]), session).unwrap();

    let request = HarvestRequest::new().with_scroll_budget(20);
    let report = harvester.harvest_report(&request).await.unwrap();
    assert_eq!(report.categories[0].scrolls, Some(10));
    assert_eq!(report.categories[1].scrolls, Some(10));
    assert_eq!(harvester.session().grows, 20);
}

#[tokio::test]
async fn test_max_categories_takes_first_n() {
    let mut cfg = config(&[DAIRY, BAKERY, DRINKS]);
    cfg.store.max_categories = 2;
    let mut harvester = Harvester::new(cfg, FakeSession::default()).unwrap();

    let report = harvester.harvest_report(&HarvestRequest::new()).await.unwrap();
    assert!(report.records.is_empty());
    assert_eq!(
        harvester.session().navigations,
        vec![DAIRY.to_string(), BAKERY.to_string()]
    );
}

#[tokio::test]
async fn test_invalid_selector_rejected_at_construction() {
    let mut cfg = config(&[DAIRY]);
    cfg.extraction.price_selectors = vec!["span[".to_string()];
    let err = Harvester::new(cfg, FakeSession::default()).err().unwrap();
    assert!(matches!(err, HarvestError::InvalidSelector { .. }));
    assert!(err.is_fatal());
}
