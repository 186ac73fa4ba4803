//! Merges DOM and API records for one category visit.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::models::{ProductRecord, RecordSource};

/// Merge `api` into `dom` by identifier.
///
/// A matched DOM record keeps its name and price (the values shown to the
/// shopper) and takes every other field from the API record when the API
/// has it. API records with no DOM counterpart are appended in order, once
/// per id. When several API records share an id, the last one is used for
/// matching.
pub fn reconcile(dom: Vec<ProductRecord>, api: Vec<ProductRecord>) -> Vec<ProductRecord> {
    let by_id: HashMap<&str, &ProductRecord> =
        api.iter().map(|record| (record.id.as_str(), record)).collect();

    let mut merged_count = 0;
    let mut output: Vec<ProductRecord> = dom
        .into_iter()
        .map(|record| match by_id.get(record.id.as_str()) {
            Some(api_record) => {
                merged_count += 1;
                merge(record, api_record)
            }
            None => record,
        })
        .collect();

    let mut present: HashSet<String> = output.iter().map(|r| r.id.clone()).collect();
    let mut appended = 0;
    for record in api.iter() {
        if present.insert(record.id.clone()) {
            output.push(record.clone());
            appended += 1;
        }
    }

    debug!(
        "Reconciled: {} merged, {} API-only, {} total",
        merged_count,
        appended,
        output.len()
    );
    output
}

fn merge(dom: ProductRecord, api: &ProductRecord) -> ProductRecord {
    ProductRecord {
        id: dom.id,
        name: dom.name,
        price: dom.price,
        barcode: api.barcode.clone().or(dom.barcode),
        image_url: api.image_url.clone().or(dom.image_url),
        product_url: api.product_url.clone().or(dom.product_url),
        category: api.category.clone().or(dom.category),
        category_url: api.category_url.clone().or(dom.category_url),
        in_stock: api.in_stock,
        source: RecordSource::Merged,
        scraped_at: dom.scraped_at.or(api.scraped_at),
    }
}
