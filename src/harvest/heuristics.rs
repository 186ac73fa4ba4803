//! Field heuristics for DOM extraction.
//!
//! Each product field is resolved by an ordered table of [`Heuristic`]
//! entries, tried in sequence until one yields a value. Selector strings
//! come from [`ExtractionConfig`]; adding a new strategy means adding a
//! function and a table row, with no change to the extractor's control flow.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Selector};
use url::Url;

use crate::config::ExtractionConfig;
use crate::error::{HarvestError, Result};
use crate::models::has_positive_price;

/// Price text: a numeric token directly before or after a currency marker.
static PRICE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d[\d.,]*)\s*[₪$€£]|[₪$€£]\s*(\d[\d.,]*)").unwrap()
});

/// A value consisting only of 8 or more digits.
static BARCODE_VALUE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{8,}$").unwrap());

/// Any run of 8 or more digits.
static DIGIT_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d{8,})").unwrap());

/// Barcode patterns in product links, most specific first.
static LINK_BARCODE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"/product/(\d{8,})",
        r"/item/(\d{8,})",
        r"[?&]id=(\d{8,})",
        r"[?&]product=(\d{8,})",
        r"[?&]sku=(\d{8,})",
        r"product-(\d{8,})",
        r"-(\d{8,})",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static CHILD_ID_BARCODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"product-(\d{8,})").unwrap());

const EXPLICIT_BARCODE_ATTRS: &[&str] = &["data-barcode", "data-ean", "data-gtin", "barcode"];
const ELEMENT_ID_ATTRS: &[&str] = &["id", "data-id", "data-product-id"];
const EVENT_ATTRS: &[&str] = &["onclick", "onmousedown", "data-onclick"];
const IMAGE_ATTRS: &[&str] = &["src", "data-src", "data-lazy", "data-original"];

/// Extraction selectors compiled once per harvest.
#[derive(Debug, Clone)]
pub struct CompiledRules {
    pub containers: Vec<Selector>,
    pub barcode_button: Selector,
    pub barcode_id_prefix: String,
    pub names: Vec<Selector>,
    pub prices: Vec<Selector>,
    pub image_wrappers: Vec<Selector>,
    pub max_name_chars: usize,
    img: Selector,
    link: Selector,
    with_id: Selector,
    price_hint: Selector,
    microdata_price: Selector,
}

impl CompiledRules {
    pub fn compile(config: &ExtractionConfig) -> Result<Self> {
        Ok(Self {
            containers: parse_all(&config.container_selectors)?,
            barcode_button: parse_selector(&config.barcode_button_selector)?,
            barcode_id_prefix: config.barcode_id_prefix.clone(),
            names: parse_all(&config.name_selectors)?,
            prices: parse_all(&config.price_selectors)?,
            image_wrappers: parse_all(&config.image_wrapper_selectors)?,
            max_name_chars: config.max_name_chars,
            img: parse_selector("img")?,
            link: parse_selector("a[href]")?,
            with_id: parse_selector("[id]")?,
            price_hint: parse_selector("[class*=\"price\"]")?,
            microdata_price: parse_selector("[itemprop=\"price\"]")?,
        })
    }

    /// Whether an element matched by a container selector looks like a
    /// product: it holds a barcode button, or has meaningful text plus an
    /// image or a price-like child.
    pub fn is_product_container(&self, element: &ElementRef<'_>) -> bool {
        if element.select(&self.barcode_button).next().is_some() {
            return true;
        }
        let text_len = element_text(element).trim().chars().count();
        text_len > 10
            && (element.select(&self.img).next().is_some()
                || element.select(&self.price_hint).next().is_some())
    }
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| HarvestError::InvalidSelector {
        selector: selector.to_string(),
        reason: format!("{:?}", e),
    })
}

fn parse_all(selectors: &[String]) -> Result<Vec<Selector>> {
    selectors.iter().map(|s| parse_selector(s)).collect()
}

/// A candidate element plus what its heuristics need.
pub struct Candidate<'a> {
    pub element: ElementRef<'a>,
    pub index: usize,
    pub rules: &'a CompiledRules,
    pub base_url: Option<&'a Url>,
}

impl Candidate<'_> {
    fn resolve(&self, reference: &str) -> String {
        match self.base_url {
            Some(base) => base
                .join(reference)
                .map(|u| u.to_string())
                .unwrap_or_else(|_| reference.to_string()),
            None => reference.to_string(),
        }
    }

    fn barcode_button_id(&self) -> Option<String> {
        self.element
            .select(&self.rules.barcode_button)
            .next()
            .and_then(|button| button.value().attr("id"))
            .filter(|id| id.starts_with(self.rules.barcode_id_prefix.as_str()))
            .map(str::to_string)
    }
}

/// One named strategy for resolving a field.
pub struct Heuristic<T> {
    pub name: &'static str,
    pub extract: fn(&Candidate<'_>) -> Option<T>,
}

/// Run a heuristic table in order; the first hit wins.
pub fn first_match<T>(table: &[Heuristic<T>], candidate: &Candidate<'_>) -> Option<(T, &'static str)> {
    table
        .iter()
        .find_map(|h| (h.extract)(candidate).map(|value| (value, h.name)))
}

pub const NAME_HEURISTICS: &[Heuristic<String>] = &[
    Heuristic {
        name: "name-selector",
        extract: name_from_selectors,
    },
    Heuristic {
        name: "first-text-line",
        extract: name_from_text,
    },
];

pub const PRICE_HEURISTICS: &[Heuristic<f64>] = &[
    Heuristic {
        name: "price-selector",
        extract: price_from_selectors,
    },
    Heuristic {
        name: "microdata",
        extract: price_from_microdata,
    },
];

pub const IMAGE_HEURISTICS: &[Heuristic<String>] = &[
    Heuristic {
        name: "first-img",
        extract: image_from_first_img,
    },
    Heuristic {
        name: "image-wrapper",
        extract: image_from_wrappers,
    },
];

pub const ID_HEURISTICS: &[Heuristic<String>] = &[
    Heuristic {
        name: "barcode-button",
        extract: id_from_barcode_button,
    },
    Heuristic {
        name: "element-attribute",
        extract: id_from_attributes,
    },
    Heuristic {
        name: "synthetic",
        extract: id_synthetic,
    },
];

pub const BARCODE_HEURISTICS: &[Heuristic<String>] = &[
    Heuristic {
        name: "barcode-button",
        extract: barcode_from_button,
    },
    Heuristic {
        name: "explicit-attribute",
        extract: barcode_from_explicit_attrs,
    },
    Heuristic {
        name: "digit-attribute",
        extract: barcode_from_any_attr,
    },
    Heuristic {
        name: "link",
        extract: barcode_from_link,
    },
    Heuristic {
        name: "child-id",
        extract: barcode_from_child_ids,
    },
    Heuristic {
        name: "event-handler",
        extract: barcode_from_event_attrs,
    },
];

fn name_from_selectors(c: &Candidate<'_>) -> Option<String> {
    c.rules.names.iter().find_map(|selector| {
        c.element
            .select(selector)
            .next()
            .and_then(|el| normalize_name(&element_text(&el), c.rules.max_name_chars))
    })
}

fn name_from_text(c: &Candidate<'_>) -> Option<String> {
    let text = element_text(&c.element);
    let trimmed = text.trim();
    let len = trimmed.chars().count();
    if len <= 3 || len >= 100 {
        return None;
    }
    let first_line = trimmed.lines().find(|line| !line.trim().is_empty())?;
    normalize_name(first_line, c.rules.max_name_chars)
}

fn price_from_selectors(c: &Candidate<'_>) -> Option<f64> {
    c.rules.prices.iter().find_map(|selector| {
        c.element
            .select(selector)
            .find_map(|el| parse_price(&element_text(&el)))
    })
}

fn price_from_microdata(c: &Candidate<'_>) -> Option<f64> {
    let el = c.element.select(&c.rules.microdata_price).next()?;
    let raw = el
        .value()
        .attr("content")
        .map(str::to_string)
        .unwrap_or_else(|| element_text(&el));
    parse_number(raw.trim())
}

fn image_from_first_img(c: &Candidate<'_>) -> Option<String> {
    let img = c.element.select(&c.rules.img).next()?;
    image_reference(&img).map(|src| c.resolve(src))
}

fn image_from_wrappers(c: &Candidate<'_>) -> Option<String> {
    c.rules.image_wrappers.iter().find_map(|selector| {
        c.element
            .select(selector)
            .find_map(|img| image_reference(&img).map(|src| c.resolve(src)))
    })
}

fn image_reference<'a>(img: &ElementRef<'a>) -> Option<&'a str> {
    IMAGE_ATTRS
        .iter()
        .filter_map(|attr| img.value().attr(attr))
        .map(str::trim)
        .find(|value| !value.is_empty() && !value.starts_with("data:"))
}

fn id_from_barcode_button(c: &Candidate<'_>) -> Option<String> {
    c.barcode_button_id()
}

fn id_from_attributes(c: &Candidate<'_>) -> Option<String> {
    ELEMENT_ID_ATTRS
        .iter()
        .filter_map(|attr| c.element.value().attr(attr))
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

fn id_synthetic(c: &Candidate<'_>) -> Option<String> {
    Some(format!("product_{}", c.index))
}

fn barcode_from_button(c: &Candidate<'_>) -> Option<String> {
    let id = c.barcode_button_id()?;
    let suffix = &id[c.rules.barcode_id_prefix.len()..];
    is_barcode(suffix).then(|| suffix.to_string())
}

fn barcode_from_explicit_attrs(c: &Candidate<'_>) -> Option<String> {
    EXPLICIT_BARCODE_ATTRS
        .iter()
        .filter_map(|attr| c.element.value().attr(attr))
        .map(str::trim)
        .find(|value| is_barcode(value))
        .map(str::to_string)
}

fn barcode_from_any_attr(c: &Candidate<'_>) -> Option<String> {
    c.element
        .value()
        .attrs()
        .map(|(_, value)| value.trim())
        .find(|value| is_barcode(value))
        .map(str::to_string)
}

fn barcode_from_link(c: &Candidate<'_>) -> Option<String> {
    let href = c.element.select(&c.rules.link).next()?.value().attr("href")?;
    LINK_BARCODE_PATTERNS
        .iter()
        .find_map(|pattern| pattern.captures(href))
        .map(|caps| caps[1].to_string())
}

fn barcode_from_child_ids(c: &Candidate<'_>) -> Option<String> {
    c.element.select(&c.rules.with_id).find_map(|child| {
        child
            .value()
            .attr("id")
            .and_then(|id| CHILD_ID_BARCODE.captures(id))
            .map(|caps| caps[1].to_string())
    })
}

fn barcode_from_event_attrs(c: &Candidate<'_>) -> Option<String> {
    EVENT_ATTRS
        .iter()
        .filter_map(|attr| c.element.value().attr(attr))
        .find_map(|value| DIGIT_RUN.captures(value))
        .map(|caps| caps[1].to_string())
}

/// First product link, resolved against the page URL.
pub fn product_url(c: &Candidate<'_>) -> Option<String> {
    let href = c.element.select(&c.rules.link).next()?.value().attr("href")?.trim();
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
        return None;
    }
    Some(c.resolve(href))
}

/// Concatenated text content of an element.
pub fn element_text(element: &ElementRef<'_>) -> String {
    element.text().collect::<String>()
}

/// Collapse whitespace, drop trailing dots/commas, cap the length.
pub fn normalize_name(text: &str, max_chars: usize) -> Option<String> {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let stripped = collapsed.trim_end_matches(['.', ',']).trim_end();
    let capped: String = stripped.chars().take(max_chars).collect();
    let capped = capped.trim();
    (!capped.is_empty()).then(|| capped.to_string())
}

/// Parse a displayed price such as `12.90 ₪`, `₪ 5,90` or `$1,299.00`.
///
/// Only text with a currency marker counts; the result must be a finite
/// positive number.
pub fn parse_price(text: &str) -> Option<f64> {
    PRICE_PATTERN.captures_iter(text).find_map(|caps| {
        caps.get(1)
            .or_else(|| caps.get(2))
            .and_then(|m| parse_number(m.as_str()))
    })
}

/// Parse a number with either `.` or `,` as decimal separator.
///
/// When both appear, the later one is the decimal separator and the other
/// groups thousands.
pub fn parse_number(raw: &str) -> Option<f64> {
    let token = raw.trim().trim_end_matches(['.', ',']);
    let normalized = match (token.rfind('.'), token.rfind(',')) {
        (Some(dot), Some(comma)) if dot > comma => token.replace(',', ""),
        (Some(_), Some(_)) => token.replace('.', "").replace(',', "."),
        (None, Some(_)) => token.replace(',', "."),
        _ => token.to_string(),
    };
    normalized
        .parse::<f64>()
        .ok()
        .filter(|price| has_positive_price(*price))
}

/// 8 or more digits and nothing else.
pub fn is_barcode(value: &str) -> bool {
    BARCODE_VALUE.is_match(value)
}
