//! DOM extractor.
//!
//! Parses the serialized page and resolves every product field
//! independently through the heuristic tables. A candidate missing its
//! name or price is dropped on its own; the rest of the page still counts.

use std::collections::HashSet;

use scraper::{ElementRef, Html};
use tracing::debug;
use url::Url;

use super::heuristics::{
    first_match, product_url, Candidate, CompiledRules, BARCODE_HEURISTICS, ID_HEURISTICS,
    IMAGE_HEURISTICS, NAME_HEURISTICS, PRICE_HEURISTICS,
};
use crate::error::HarvestError;
use crate::models::{ProductRecord, RecordSource};

/// Extract product records from rendered HTML.
pub fn extract_dom(html: &str, base_url: Option<&Url>, rules: &CompiledRules) -> Vec<ProductRecord> {
    let document = Html::parse_document(html);
    let candidates = collect_candidates(&document, rules);
    debug!("DOM extraction: {} candidate containers", candidates.len());

    let mut records = Vec::new();
    for (index, element) in candidates.into_iter().enumerate() {
        let candidate = Candidate {
            element,
            index,
            rules,
            base_url,
        };
        match extract_candidate(&candidate) {
            Ok(record) => records.push(record),
            Err(e) => debug!("Skipping candidate: {}", e),
        }
    }

    debug!("DOM extraction: {} records", records.len());
    records
}

/// Run the container cascade, keeping each element once.
///
/// When matches nest, the innermost container holding a barcode button owns
/// that product and any matches inside it are dropped as fragments. Of the
/// rest, a container enclosing another candidate (a grid or list) is dropped.
fn collect_candidates<'a>(document: &'a Html, rules: &CompiledRules) -> Vec<ElementRef<'a>> {
    let mut seen = HashSet::new();
    let mut matched = Vec::new();

    for selector in &rules.containers {
        for element in document.select(selector) {
            if seen.insert(element.id()) && rules.is_product_container(&element) {
                matched.push(element);
            }
        }
    }

    let matched_ids: HashSet<_> = matched.iter().map(|element| element.id()).collect();
    let owners: HashSet<_> = document
        .select(&rules.barcode_button)
        .filter_map(|button| {
            button
                .ancestors()
                .map(|node| node.id())
                .find(|id| matched_ids.contains(id))
        })
        .collect();

    let whole: Vec<ElementRef<'a>> = matched
        .into_iter()
        .filter(|element| !element.ancestors().any(|node| owners.contains(&node.id())))
        .collect();

    let enclosing: HashSet<_> = whole
        .iter()
        .flat_map(|element| element.ancestors().map(|node| node.id()))
        .collect();

    whole
        .into_iter()
        .filter(|element| !enclosing.contains(&element.id()))
        .collect()
}

fn extract_candidate(candidate: &Candidate<'_>) -> Result<ProductRecord, HarvestError> {
    let missing = |field| HarvestError::ExtractionField {
        index: candidate.index,
        field,
    };

    let (name, _) = first_match(NAME_HEURISTICS, candidate).ok_or_else(|| missing("name"))?;
    let (price, _) = first_match(PRICE_HEURISTICS, candidate).ok_or_else(|| missing("price"))?;
    let (id, _) = first_match(ID_HEURISTICS, candidate).ok_or_else(|| missing("id"))?;

    let mut record = ProductRecord::new(id, name, price, RecordSource::Dom);
    record.barcode = first_match(BARCODE_HEURISTICS, candidate).map(|(barcode, via)| {
        debug!("Candidate {} barcode via {}", candidate.index, via);
        barcode
    });
    record.image_url = first_match(IMAGE_HEURISTICS, candidate).map(|(src, _)| src);
    record.product_url = product_url(candidate);
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractionConfig;

    fn rules() -> CompiledRules {
        CompiledRules::compile(&ExtractionConfig::default()).unwrap()
    }

    fn base() -> Url {
        Url::parse("https://www.rami-levy.co.il/he/online/market/dairy").unwrap()
    }

    const GRID: &str = r#"
        <html><body>
          <div class="products-grid">
            <div class="product-tile" data-product-id="sku-1">
              <div role="button" id="product-7290000066318"></div>
              <div class="product-img-wrap"><img src="/img/milk.jpg"></div>
              <h3>Milk 3% 1L</h3>
              <span class="price">5.90 ₪</span>
              <a href="/he/online/p/7290000066318">details</a>
            </div>
            <div class="product-tile">
              <img data-src="https://cdn.example/bread.jpg">
              <div class="product-name">Whole Wheat Bread</div>
              <span class="price">₪ 12,50</span>
            </div>
            <div class="product-tile">
              <img src="/img/broken.jpg">
              <h3>Mystery item without price</h3>
            </div>
          </div>
        </body></html>
    "#;

    #[test]
    fn extracts_records_with_name_and_price() {
        let records = extract_dom(GRID, Some(&base()), &rules());
        assert_eq!(records.len(), 2);

        let milk = &records[0];
        assert_eq!(milk.name, "Milk 3% 1L");
        assert_eq!(milk.price, 5.9);
        assert_eq!(milk.id, "product-7290000066318");
        assert_eq!(milk.barcode.as_deref(), Some("7290000066318"));
        assert_eq!(
            milk.image_url.as_deref(),
            Some("https://www.rami-levy.co.il/img/milk.jpg")
        );
        assert_eq!(
            milk.product_url.as_deref(),
            Some("https://www.rami-levy.co.il/he/online/p/7290000066318")
        );
        assert_eq!(milk.source, RecordSource::Dom);

        let bread = &records[1];
        assert_eq!(bread.name, "Whole Wheat Bread");
        assert_eq!(bread.price, 12.5);
        assert_eq!(bread.barcode, None);
        assert_eq!(bread.image_url.as_deref(), Some("https://cdn.example/bread.jpg"));
    }

    #[test]
    fn every_record_satisfies_output_invariant() {
        for record in extract_dom(GRID, Some(&base()), &rules()) {
            assert!(record.is_valid(), "invalid record: {:?}", record);
        }
    }

    #[test]
    fn enclosing_grid_is_not_a_candidate() {
        let records = extract_dom(GRID, Some(&base()), &rules());
        assert!(records.iter().all(|r| r.name != "products-grid"));
        assert_eq!(records.iter().filter(|r| r.name == "Milk 3% 1L").count(), 1);
    }

    #[test]
    fn barcode_card_wins_over_nested_details_block() {
        let html = r#"
            <div class="product-card">
              <div role="button" id="product-7290000066318"></div>
              <img src="/img/milk.jpg">
              <div class="product-details">
                <h3>Milk 3% 1L</h3>
                <span class="price">5.90 ₪</span>
              </div>
            </div>
        "#;
        let records = extract_dom(html, Some(&base()), &rules());
        assert_eq!(records.len(), 1);
        let milk = &records[0];
        assert_eq!(milk.id, "product-7290000066318");
        assert_eq!(milk.name, "Milk 3% 1L");
        assert_eq!(milk.barcode.as_deref(), Some("7290000066318"));
        assert_eq!(
            milk.image_url.as_deref(),
            Some("https://www.rami-levy.co.il/img/milk.jpg")
        );
    }

    #[test]
    fn barcode_cards_inside_a_grid() {
        let card = |code: &str, name: &str| {
            format!(
                r#"<div class="product-card"><div role="button" id="product-{code}"></div><img src="/i/{code}.png"><div class="product-details"><h3>{name}</h3><span class="price">4.50 ₪</span></div></div>"#
            )
        };
        let html = format!(
            r#"<div class="products-list">{}{}</div>"#,
            card("72900000001", "Hummus Classic"),
            card("72900000002", "Hummus Spicy")
        );
        let records = extract_dom(&html, None, &rules());
        let barcodes: Vec<_> = records.iter().filter_map(|r| r.barcode.as_deref()).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(barcodes, vec!["72900000001", "72900000002"]);
    }

    #[test]
    fn element_matched_by_two_selectors_is_processed_once() {
        let html = r#"
            <div class="card product-card">
              <img src="a.png">
              <h4>Olive Oil Extra Virgin</h4>
              <span class="price">39.90₪</span>
            </div>
        "#;
        let records = extract_dom(html, None, &rules());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].image_url.as_deref(), Some("a.png"));
    }

    #[test]
    fn short_text_containers_are_ignored() {
        let html = r#"<div class="item"><span class="price">1₪</span></div>"#;
        assert!(extract_dom(html, None, &rules()).is_empty());
    }

    #[test]
    fn empty_page_yields_nothing() {
        assert!(extract_dom("<html><body></body></html>", None, &rules()).is_empty());
    }

    #[test]
    fn custom_container_selector() {
        let config = ExtractionConfig {
            container_selectors: vec!["li.sku".to_string()],
            ..Default::default()
        };
        let rules = CompiledRules::compile(&config).unwrap();
        let html = r#"
            <ul>
              <li class="sku" data-id="42"><img src="x.png"><h2>Tahini Paste 500g</h2><b class="price">17.90 ₪</b></li>
            </ul>
        "#;
        let records = extract_dom(html, None, &rules);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "42");
    }
}
