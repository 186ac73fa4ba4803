//! API extractor: maps captured JSON bodies onto product records.

use serde_json::Value;
use tracing::debug;

use super::heuristics::is_barcode;
use crate::browser::CapturedResponse;
use crate::models::{has_positive_price, ProductRecord, RecordSource};

const ID_KEYS: &[&str] = &["id", "productId", "product_id", "itemId", "item_id"];
const NAME_KEYS: &[&str] = &["name", "title", "productName", "product_name"];
const PRICE_KEYS: &[&str] = &["price", "cost", "amount"];
const IMAGE_KEYS: &[&str] = &["image", "imageUrl", "image_url", "img"];
const BARCODE_KEYS: &[&str] = &["barcode", "ean", "gtin"];
const CATEGORY_KEYS: &[&str] = &["category", "categoryName"];
const STOCK_KEYS: &[&str] = &["inStock", "in_stock", "available"];

/// Keys that may hold the item list in an object-shaped body.
const LIST_KEYS: &[&str] = &["products", "items", "data", "results"];
/// Keys tried one level down under `data`.
const NESTED_LIST_KEYS: &[&str] = &["products", "items", "results"];

/// Extract records from every captured body, in capture order.
pub fn extract_api(captures: &[CapturedResponse]) -> Vec<ProductRecord> {
    let mut records = Vec::new();
    let mut synthetic = 0usize;

    for capture in captures {
        let items = item_list(&capture.body);
        debug!("API response {}: {} items", capture.url, items.len());
        for item in items {
            if let Some(record) = map_item(item, &mut synthetic) {
                records.push(record);
            }
        }
    }

    debug!("API extraction: {} records", records.len());
    records
}

/// Flatten a body into its item list, trying the known response shapes.
pub fn item_list(body: &Value) -> &[Value] {
    if let Some(items) = body.as_array() {
        return items;
    }
    for key in LIST_KEYS {
        if let Some(items) = body.get(key).and_then(Value::as_array) {
            return items;
        }
    }
    if let Some(data) = body.get("data") {
        for key in NESTED_LIST_KEYS {
            if let Some(items) = data.get(key).and_then(Value::as_array) {
                return items;
            }
        }
    }
    &[]
}

fn map_item(item: &Value, synthetic: &mut usize) -> Option<ProductRecord> {
    if !item.is_object() {
        return None;
    }
    let name = first_string(item, NAME_KEYS)?;
    let price = first_number(item, PRICE_KEYS)?;

    let id = first_string(item, ID_KEYS).unwrap_or_else(|| {
        let id = format!("api_{}", *synthetic);
        *synthetic += 1;
        id
    });

    let mut record = ProductRecord::new(id, name, price, RecordSource::Api);
    record.barcode = first_barcode(item);
    record.image_url = first_string(item, IMAGE_KEYS);
    record.category = first_string(item, CATEGORY_KEYS);
    if let Some(in_stock) = first_bool(item, STOCK_KEYS) {
        record.in_stock = in_stock;
    }
    Some(record)
}

/// First alias holding a non-empty string or a number.
fn first_string(item: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match item.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// First alias holding a barcode-shaped value (8+ digits).
fn first_barcode(item: &Value) -> Option<String> {
    BARCODE_KEYS
        .iter()
        .find_map(|key| first_string(item, &[*key]).filter(|code| is_barcode(code)))
}

/// First alias holding a positive number or numeric string. A zero or
/// unparseable value falls through to the next alias.
fn first_number(item: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| {
        match item.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
        .filter(|price| has_positive_price(*price))
    })
}

fn first_bool(item: &Value, keys: &[&str]) -> Option<bool> {
    keys.iter().find_map(|key| match item.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|v| v != 0),
        _ => None,
    })
}
