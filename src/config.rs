//! Configuration management for the harvester using the prefer crate.
//!
//! Files are discovered by `prefer` under the name `catalog-harvester` and
//! parsed with serde according to their extension. Every section has
//! defaults, so an empty file (or no file at all) yields a working setup for
//! the built-in store catalog.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::CategoryDescriptor;

/// Name used for config file discovery.
pub const CONFIG_NAME: &str = "catalog-harvester";

/// Default user agent for the rendering session.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Top-level harvester configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarvestConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub browser: BrowserEngineConfig,
    #[serde(default)]
    pub crawl: CrawlConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    /// File this config was loaded from, if any.
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl HarvestConfig {
    /// Load configuration using prefer for discovery.
    /// Falls back to defaults (with env overrides) when no file is found.
    pub async fn load() -> Self {
        match prefer::load(CONFIG_NAME).await {
            Ok(pref_config) => {
                if let Some(path) = pref_config.source_path() {
                    match Self::load_from_path(path).await {
                        Ok(config) => config,
                        Err(e) => {
                            tracing::warn!("Ignoring config at {}: {}", path.display(), e);
                            Self::default_with_env()
                        }
                    }
                } else {
                    Self::default_with_env()
                }
            }
            Err(_) => Self::default_with_env(),
        }
    }

    /// Default config with environment overrides applied.
    pub fn default_with_env() -> Self {
        let mut config = Self::default();
        config.browser = config.browser.with_env_overrides();
        config
    }

    /// Load configuration from a specific file path.
    /// Supports JSON, TOML and YAML based on file extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, String> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let mut config = Self::parse(&contents, ext)?;
        config.source_path = Some(path.to_path_buf());
        if let Some(chrome) = config.browser.chrome_path.take() {
            config.browser.chrome_path = Some(config.resolve_path(&chrome.to_string_lossy()));
        }
        config.browser = config.browser.with_env_overrides();
        Ok(config)
    }

    /// Parse config text in the given format (`toml`, `yaml`/`yml`, otherwise JSON).
    pub fn parse(contents: &str, ext: &str) -> Result<Self, String> {
        match ext {
            "toml" => toml::from_str(contents)
                .map_err(|e| format!("Failed to parse TOML config: {}", e)),
            "yaml" | "yml" => serde_yaml::from_str(contents)
                .map_err(|e| format!("Failed to parse YAML config: {}", e)),
            _ => serde_json::from_str(contents)
                .map_err(|e| format!("Failed to parse JSON config: {}", e)),
        }
    }

    /// Resolve a possibly relative, possibly `~`-prefixed path against the
    /// config file's directory (or CWD when loaded from defaults).
    pub fn resolve_path(&self, path_str: &str) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());
        if path.is_absolute() {
            return path.to_path_buf();
        }
        match self.source_path.as_ref().and_then(|p| p.parent()) {
            Some(base) => base.join(path),
            None => path.to_path_buf(),
        }
    }
}

/// Store identity and its category catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_name")]
    pub name: String,
    #[serde(default = "default_store_url")]
    pub base_url: String,
    /// Categories in crawl order.
    #[serde(default = "default_categories")]
    pub categories: Vec<CategoryDescriptor>,
    /// Visit at most this many categories (first N). 0 visits all.
    #[serde(default = "default_max_categories")]
    pub max_categories: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: default_store_name(),
            base_url: default_store_url(),
            categories: default_categories(),
            max_categories: default_max_categories(),
        }
    }
}

impl StoreConfig {
    /// Lowercase, dash-separated store name for keys and file names.
    pub fn slug(&self) -> String {
        self.name
            .split_whitespace()
            .map(|part| part.to_lowercase())
            .collect::<Vec<_>>()
            .join("-")
    }
}

fn default_store_name() -> String {
    "Rami Levy".to_string()
}

fn default_store_url() -> String {
    "https://www.rami-levy.co.il/he/online/market".to_string()
}

fn default_max_categories() -> usize {
    6
}

/// The Rami Levy online market departments.
pub fn default_categories() -> Vec<CategoryDescriptor> {
    const MARKET: &str = "https://www.rami-levy.co.il/he/online/market/";
    [
        ("פירות וירקות", "%D7%A4%D7%99%D7%A8%D7%95%D7%AA-%D7%95%D7%99%D7%A8%D7%A7%D7%95%D7%AA"),
        ("חלב ביצים וסלטים", "%D7%97%D7%9C%D7%91-%D7%91%D7%99%D7%A6%D7%99%D7%9D-%D7%95%D7%A1%D7%9C%D7%98%D7%99%D7%9D"),
        ("בשר ודגים", "%D7%91%D7%A9%D7%A8-%D7%95%D7%93%D7%92%D7%99%D7%9D"),
        ("משקאות", "%D7%9E%D7%A9%D7%A7%D7%90%D7%95%D7%AA"),
        ("אורגני ובריאות", "%D7%90%D7%95%D7%A8%D7%92%D7%A0%D7%99-%D7%95%D7%91%D7%A8%D7%99%D7%90%D7%95%D7%AA"),
        ("קפואים", "%D7%A7%D7%A4%D7%95%D7%90%D7%99%D7%9D"),
        ("שימורים בישול ואפיה", "%D7%A9%D7%99%D7%9E%D7%95%D7%A8%D7%99%D7%9D-%D7%91%D7%99%D7%A9%D7%95%D7%9C-%D7%95%D7%90%D7%A4%D7%99%D7%94"),
        ("קטניות ודגנים", "%D7%A7%D7%98%D7%A0%D7%99%D7%95%D7%AA-%D7%95%D7%93%D7%92%D7%A0%D7%99%D7%9D"),
        ("חטיפים ומתוקים", "%D7%97%D7%98%D7%99%D7%A4%D7%99%D7%9D-%D7%95%D7%9E%D7%AA%D7%95%D7%A7%D7%99%D7%9D"),
        ("אחזקת הבית ובעלי חיים", "%D7%90%D7%97%D7%96%D7%A7%D7%AA-%D7%94%D7%91%D7%99%D7%AA-%D7%95%D7%91%D7%A2-%D7%97"),
        ("חד פעמי ומתכלה", "%D7%97%D7%93-%D7%A4%D7%A2%D7%9E%D7%99-%D7%95%D7%9E%D7%AA%D7%9B%D7%9C%D7%94"),
        ("פארם ותינוקות", "%D7%A4%D7%90%D7%A8%D7%9D-%D7%95%D7%AA%D7%99%D7%A0%D7%95%D7%A7%D7%95%D7%AA"),
        ("לחם מאפים והמאפייה הטרייה", "%D7%9C%D7%97%D7%9D-%D7%9E%D7%90%D7%A4%D7%99%D7%9D-%D7%95%D7%94%D7%9E%D7%90%D7%A4%D7%99%D7%99%D7%94-%D7%94%D7%98%D7%A8%D7%99%D7%94"),
    ]
    .into_iter()
    .map(|(name, path)| CategoryDescriptor::new(name, format!("{MARKET}{path}")))
    .collect()
}

/// Browser engine types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BrowserEngineType {
    /// Chromium with stealth patches (default).
    #[default]
    Stealth,
    /// No stealth patches (for debugging).
    Standard,
}

/// Page viewport size.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ViewportConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

/// Browser engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrowserEngineConfig {
    #[serde(default)]
    pub engine: BrowserEngineType,

    /// Run in headless mode (default: true).
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Navigation timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default)]
    pub viewport: ViewportConfig,

    /// Proxy server URL (e.g., "socks5://127.0.0.1:1080").
    #[serde(default)]
    pub proxy: Option<String>,

    /// Additional Chrome arguments.
    #[serde(default)]
    pub chrome_args: Vec<String>,

    /// Explicit Chrome/Chromium executable.
    #[serde(default)]
    pub chrome_path: Option<PathBuf>,

    /// Remote Chrome DevTools URL (e.g., "ws://localhost:9222").
    /// If set, connects to an existing browser instead of launching one.
    #[serde(default)]
    pub remote_url: Option<String>,
}

impl Default for BrowserEngineConfig {
    fn default() -> Self {
        Self {
            engine: BrowserEngineType::default(),
            headless: default_headless(),
            timeout: default_timeout(),
            user_agent: default_user_agent(),
            viewport: ViewportConfig::default(),
            proxy: None,
            chrome_args: Vec::new(),
            chrome_path: None,
            remote_url: None,
        }
    }
}

impl BrowserEngineConfig {
    /// Apply environment variable overrides.
    ///
    /// - `BROWSER_URL` - Remote Chrome DevTools URL
    /// - `CHROME_PATH` - Chrome executable
    /// - `SOCKS_PROXY` - Proxy for browser traffic, if none configured
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("BROWSER_URL") {
            if !val.is_empty() {
                self.remote_url = Some(val);
            }
        }

        if let Ok(val) = std::env::var("CHROME_PATH") {
            if !val.is_empty() {
                self.chrome_path = Some(PathBuf::from(val));
            }
        }

        if self.proxy.is_none() {
            if let Ok(val) = std::env::var("SOCKS_PROXY") {
                if !val.is_empty() {
                    self.proxy = Some(val);
                }
            }
        }

        self
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

pub fn default_headless() -> bool {
    true
}

pub fn default_timeout() -> u64 {
    30
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

/// How records sharing a dedup key are resolved.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DedupPolicy {
    /// Keep the first record seen for a key; later ones are dropped.
    #[default]
    FirstSeen,
    /// Keep whichever record has the most populated optional fields.
    MostComplete,
}

/// Crawl pacing and budgets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CrawlConfig {
    /// Total scroll iterations shared across the whole catalog.
    #[serde(default = "default_max_scroll_budget")]
    pub max_scroll_budget: u32,
    /// Floor for each category's share of the scroll budget.
    #[serde(default = "default_min_scrolls")]
    pub min_scrolls_per_category: u32,
    /// Consecutive identical measurements that count as converged.
    #[serde(default = "default_stability_threshold")]
    pub stability_threshold: u32,
    #[serde(default = "default_scroll_settle_ms")]
    pub scroll_settle_ms: u64,
    #[serde(default = "default_post_navigation_settle_ms")]
    pub post_navigation_settle_ms: u64,
    /// Bound on buffered network captures per category visit.
    #[serde(default = "default_capture_capacity")]
    pub capture_capacity: usize,
    #[serde(default)]
    pub dedup_policy: DedupPolicy,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_scroll_budget: default_max_scroll_budget(),
            min_scrolls_per_category: default_min_scrolls(),
            stability_threshold: default_stability_threshold(),
            scroll_settle_ms: default_scroll_settle_ms(),
            post_navigation_settle_ms: default_post_navigation_settle_ms(),
            capture_capacity: default_capture_capacity(),
            dedup_policy: DedupPolicy::default(),
        }
    }
}

impl CrawlConfig {
    pub fn scroll_settle(&self) -> Duration {
        Duration::from_millis(self.scroll_settle_ms)
    }

    pub fn post_navigation_settle(&self) -> Duration {
        Duration::from_millis(self.post_navigation_settle_ms)
    }

    /// Each category's share of `total_budget`, floored at
    /// `min_scrolls_per_category`. The share is computed over the whole
    /// configured catalog, not just the categories that will be visited.
    pub fn scrolls_per_category(&self, total_budget: u32, catalog_len: usize) -> u32 {
        let catalog_len = catalog_len.max(1) as u32;
        (total_budget / catalog_len).max(self.min_scrolls_per_category)
    }

    /// Test-friendly pacing with no settle delays.
    pub fn without_delays(mut self) -> Self {
        self.scroll_settle_ms = 0;
        self.post_navigation_settle_ms = 0;
        self
    }
}

fn default_max_scroll_budget() -> u32 {
    50
}

fn default_min_scrolls() -> u32 {
    3
}

fn default_stability_threshold() -> u32 {
    3
}

fn default_scroll_settle_ms() -> u64 {
    2000
}

fn default_post_navigation_settle_ms() -> u64 {
    3000
}

fn default_capture_capacity() -> usize {
    256
}

/// Which network responses are captured as product data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CaptureConfig {
    /// At least one must appear in the URL.
    #[serde(default = "default_api_markers")]
    pub api_markers: Vec<String>,
    /// At least one must also appear in the URL.
    #[serde(default = "default_resource_markers")]
    pub resource_markers: Vec<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            api_markers: default_api_markers(),
            resource_markers: default_resource_markers(),
        }
    }
}

fn default_api_markers() -> Vec<String> {
    vec!["/api/".to_string()]
}

fn default_resource_markers() -> Vec<String> {
    strings(&["product", "item", "search"])
}

/// Selector tables for the DOM heuristics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtractionConfig {
    /// Broad candidate-container selectors, tried in order.
    #[serde(default = "default_container_selectors")]
    pub container_selectors: Vec<String>,
    /// Structured button whose id encodes the product barcode.
    #[serde(default = "default_barcode_button_selector")]
    pub barcode_button_selector: String,
    /// Prefix stripped from the barcode button id.
    #[serde(default = "default_barcode_id_prefix")]
    pub barcode_id_prefix: String,
    #[serde(default = "default_name_selectors")]
    pub name_selectors: Vec<String>,
    #[serde(default = "default_price_selectors")]
    pub price_selectors: Vec<String>,
    #[serde(default = "default_image_wrapper_selectors")]
    pub image_wrapper_selectors: Vec<String>,
    /// Counted in the page to measure lazy-load growth.
    #[serde(default = "default_growth_probe_selector")]
    pub growth_probe_selector: String,
    /// Maximum length of a normalized product name, in characters.
    #[serde(default = "default_max_name_chars")]
    pub max_name_chars: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            container_selectors: default_container_selectors(),
            barcode_button_selector: default_barcode_button_selector(),
            barcode_id_prefix: default_barcode_id_prefix(),
            name_selectors: default_name_selectors(),
            price_selectors: default_price_selectors(),
            image_wrapper_selectors: default_image_wrapper_selectors(),
            growth_probe_selector: default_growth_probe_selector(),
            max_name_chars: default_max_name_chars(),
        }
    }
}

fn default_container_selectors() -> Vec<String> {
    strings(&[
        ".swiper-slide",
        "[class*=\"product\"]",
        "[class*=\"item\"]",
        ".card",
        "[class*=\"card\"]",
    ])
}

fn default_barcode_button_selector() -> String {
    "div[role=\"button\"][id^=\"product-\"]".to_string()
}

fn default_barcode_id_prefix() -> String {
    "product-".to_string()
}

fn default_name_selectors() -> Vec<String> {
    strings(&[
        "h1, h2, h3, h4, h5, h6",
        "[class*=\"name\"]",
        "[class*=\"title\"]",
        "[data-testid*=\"name\"]",
    ])
}

fn default_price_selectors() -> Vec<String> {
    strings(&[
        "[class*=\"price\"]",
        "[data-testid*=\"price\"]",
        "[class*=\"cost\"]",
        "[class*=\"amount\"]",
    ])
}

fn default_image_wrapper_selectors() -> Vec<String> {
    strings(&[
        ".product-img-wrap img",
        "[class*=\"image\"] img",
        "[class*=\"img\"] img",
        "[class*=\"picture\"] img",
        "div[class*=\"product\"] img",
    ])
}

fn default_growth_probe_selector() -> String {
    "[data-testid*=\"product\"], .product, [class*=\"product\"], [id*=\"product\"]".to_string()
}

fn default_max_name_chars() -> usize {
    100
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}
