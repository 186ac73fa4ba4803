//! Global deduplication across category visits.

use std::collections::HashMap;

use tracing::debug;

use crate::config::DedupPolicy;
use crate::models::ProductRecord;

/// Composite identity key for a record.
///
/// A barcode identifies the item on its own, so records sharing one collapse
/// even when names differ. Without a barcode the key joins the non-empty
/// identifier, name and product URL, in that order.
pub fn dedup_key(record: &ProductRecord) -> String {
    if let Some(barcode) = record.barcode.as_deref().filter(|b| !b.is_empty()) {
        return barcode.to_string();
    }
    [
        Some(record.id.as_str()),
        Some(record.name.as_str()),
        record.product_url.as_deref(),
    ]
    .into_iter()
    .flatten()
    .filter(|part| !part.is_empty())
    .collect::<Vec<_>>()
    .join("|")
}

/// Collapse records sharing a key, keeping first-seen order.
pub fn deduplicate(records: Vec<ProductRecord>, policy: DedupPolicy) -> Vec<ProductRecord> {
    let before = records.len();
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut kept: Vec<ProductRecord> = Vec::with_capacity(records.len());

    for record in records {
        let key = dedup_key(&record);
        match positions.get(&key) {
            None => {
                positions.insert(key, kept.len());
                kept.push(record);
            }
            Some(&idx) => {
                if policy == DedupPolicy::MostComplete
                    && record.completeness() > kept[idx].completeness()
                {
                    kept[idx] = record;
                }
            }
        }
    }

    debug!(
        "Deduplicated {} records into {} ({:?})",
        before,
        kept.len(),
        policy
    );
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecordSource;

    fn record(id: &str, name: &str) -> ProductRecord {
        ProductRecord::new(id, name, 9.9, RecordSource::Dom)
    }

    #[test]
    fn test_key_prefers_barcode() {
        let r = record("product_3", "Hummus").with_barcode("7290000000011");
        assert_eq!(dedup_key(&r), "7290000000011");
    }

    #[test]
    fn test_key_joins_available_parts() {
        let mut r = record("sku-1", "Hummus");
        assert_eq!(dedup_key(&r), "sku-1|Hummus");
        r.product_url = Some("https://shop.example/p/1".into());
        assert_eq!(dedup_key(&r), "sku-1|Hummus|https://shop.example/p/1");
    }

    #[test]
    fn test_same_barcode_first_wins() {
        let first = record("a", "Hummus Classic").with_barcode("7290000000011");
        let second = record("b", "Hummus 400g").with_barcode("7290000000011");
        let out = deduplicate(vec![first, second], DedupPolicy::FirstSeen);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name, "Hummus Classic");
    }

    #[test]
    fn test_synthetic_ids_do_not_collide_across_names() {
        let out = deduplicate(
            vec![record("product_0", "Milk"), record("product_0", "Bread")],
            DedupPolicy::FirstSeen,
        );
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_most_complete_replaces_in_place() {
        let sparse = record("x", "Tahini");
        let mut rich = record("x", "Tahini");
        rich.image_url = Some("https://cdn.example/t.png".into());
        rich.category = Some("Spreads".into());
        let other = record("y", "Honey");

        let out = deduplicate(
            vec![sparse.clone(), other, rich.clone()],
            DedupPolicy::MostComplete,
        );
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], rich);
        assert_eq!(out[1].name, "Honey");

        let out = deduplicate(vec![sparse.clone(), rich], DedupPolicy::FirstSeen);
        assert_eq!(out, vec![sparse]);
    }

    #[test]
    fn test_empty_input() {
        assert!(deduplicate(Vec::new(), DedupPolicy::FirstSeen).is_empty());
    }
}
