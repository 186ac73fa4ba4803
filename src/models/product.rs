//! Canonical product record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::CategoryDescriptor;

/// Which extraction channel produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecordSource {
    #[default]
    Dom,
    Api,
    /// A DOM record enriched with a matching API record.
    Merged,
}

impl RecordSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dom => "dom",
            Self::Api => "api",
            Self::Merged => "merged",
        }
    }
}

impl std::fmt::Display for RecordSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One catalog item after extraction.
///
/// Records are plain values: they hold no reference back to the session or
/// category visit that produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    /// Best available identifier: markup attribute, API id, or a synthetic index.
    pub id: String,
    pub name: String,
    pub price: f64,
    /// Numeric string of at least 8 digits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub barcode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Link to the product's own page, when the markup exposes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_url: Option<String>,
    #[serde(default = "default_in_stock")]
    pub in_stock: bool,
    #[serde(default)]
    pub source: RecordSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scraped_at: Option<DateTime<Utc>>,
}

fn default_in_stock() -> bool {
    true
}

impl ProductRecord {
    /// Create a record with the required fields; everything else is empty.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        price: f64,
        source: RecordSource,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            price,
            barcode: None,
            image_url: None,
            product_url: None,
            category: None,
            category_url: None,
            in_stock: true,
            source,
            scraped_at: None,
        }
    }

    pub fn with_barcode(mut self, barcode: impl Into<String>) -> Self {
        self.barcode = Some(barcode.into());
        self
    }

    /// Check the output invariant: non-empty name and a finite positive price.
    pub fn is_valid(&self) -> bool {
        !self.name.trim().is_empty() && has_positive_price(self.price)
    }

    /// Attach category metadata and the scrape timestamp.
    pub fn attach_category(&mut self, category: &CategoryDescriptor, scraped_at: DateTime<Utc>) {
        self.category = Some(category.name.clone());
        self.category_url = Some(category.url.clone());
        self.scraped_at = Some(scraped_at);
    }

    /// Number of populated optional fields.
    pub fn completeness(&self) -> usize {
        [
            self.barcode.is_some(),
            self.image_url.is_some(),
            self.product_url.is_some(),
            self.category.is_some(),
            self.category_url.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count()
    }

    /// Case-insensitive name substring match, or exact barcode match.
    pub fn matches_query(&self, query: &str) -> bool {
        let query = query.trim();
        if query.is_empty() {
            return true;
        }
        if self.barcode.as_deref() == Some(query) {
            return true;
        }
        self.name.to_lowercase().contains(&query.to_lowercase())
    }
}

pub fn has_positive_price(price: f64) -> bool {
    price.is_finite() && price > 0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validity_requires_name_and_positive_price() {
        assert!(ProductRecord::new("1", "Milk 3%", 5.9, RecordSource::Dom).is_valid());
        assert!(!ProductRecord::new("1", "  ", 5.9, RecordSource::Dom).is_valid());
        assert!(!ProductRecord::new("1", "Milk", 0.0, RecordSource::Dom).is_valid());
        assert!(!ProductRecord::new("1", "Milk", f64::NAN, RecordSource::Dom).is_valid());
        assert!(!ProductRecord::new("1", "Milk", f64::INFINITY, RecordSource::Api).is_valid());
    }

    #[test]
    fn query_matches_name_case_insensitively() {
        let record = ProductRecord::new("1", "Whole Wheat BREAD", 8.5, RecordSource::Dom);
        assert!(record.matches_query("bread"));
        assert!(record.matches_query("Wheat"));
        assert!(!record.matches_query("milk"));
        assert!(record.matches_query(""));
    }

    #[test]
    fn query_matches_barcode_exactly() {
        let record =
            ProductRecord::new("1", "Cola", 6.9, RecordSource::Dom).with_barcode("7290011194246");
        assert!(record.matches_query("7290011194246"));
        assert!(!record.matches_query("729001119"));
    }

    #[test]
    fn serializes_source_as_snake_case() {
        let record = ProductRecord::new("7", "Milk", 5.9, RecordSource::Merged);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["source"], "merged");
        assert_eq!(json["in_stock"], true);
        assert!(json.get("barcode").is_none());
    }

    #[test]
    fn in_stock_defaults_true_when_missing() {
        let record: ProductRecord =
            serde_json::from_str(r#"{"id":"1","name":"Eggs","price":12.9}"#).unwrap();
        assert!(record.in_stock);
        assert_eq!(record.source, RecordSource::Dom);
    }
}
