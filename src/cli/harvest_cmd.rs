//! The `run` command: harvest and emit records.

use std::path::PathBuf;

use anyhow::Context;
use console::style;

use super::icons::{dim_arrow, success, warn};
use super::OutputFormat;
use crate::config::HarvestConfig;
use crate::harvest::{HarvestReport, HarvestRequest, Harvester};

pub struct RunArgs {
    pub query: Option<String>,
    pub limit: Option<usize>,
    pub max_scrolls: Option<u32>,
    pub require_price: bool,
    pub output: Option<PathBuf>,
    pub format: OutputFormat,
}

impl RunArgs {
    fn request(&self) -> HarvestRequest {
        let mut request = HarvestRequest::new().with_require_price(self.require_price);
        if let Some(ref query) = self.query {
            request = request.with_query(query.clone());
        }
        if let Some(limit) = self.limit {
            request = request.with_limit(limit);
        }
        if let Some(budget) = self.max_scrolls {
            request = request.with_scroll_budget(budget);
        }
        request
    }
}

pub async fn cmd_run(config: HarvestConfig, args: RunArgs) -> anyhow::Result<()> {
    let request = args.request();
    let store_name = config.store.name.clone();
    let mut harvester = Harvester::from_config(config)?;

    eprintln!(
        "{} Harvesting {} {}",
        style("→").cyan(),
        style(&store_name).bold(),
        style(format!("({})", harvester.cache_key(&request))).dim()
    );

    let report = harvester
        .harvest_report(&request)
        .await
        .with_context(|| format!("Harvest of {} failed", store_name))?;

    print_summary(&report);

    let rendered = render(&report, args.format)?;
    match args.output {
        Some(path) => {
            tokio::fs::write(&path, rendered)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!(
                "{} Wrote {} products to {}",
                success(),
                report.records.len(),
                path.display()
            );
        }
        None => println!("{}", rendered),
    }

    Ok(())
}

fn print_summary(report: &HarvestReport) {
    for outcome in &report.categories {
        match outcome.error {
            None => eprintln!(
                "  {} {:<24} {:>4} products ({} dom, {} api, {} merged)",
                dim_arrow(),
                outcome.category.name,
                outcome.records,
                outcome.dom_records,
                outcome.api_records,
                outcome.merged_records
            ),
            Some(ref error) => eprintln!(
                "  {} {:<24} skipped: {}",
                warn(),
                outcome.category.name,
                error
            ),
        }
    }
    eprintln!(
        "{} {} of {} categories, {} unique of {} scraped, {} returned",
        success(),
        report.categories_visited(),
        report.categories.len(),
        report.total_after_dedup,
        report.total_before_dedup,
        report.records.len()
    );
}

fn render(report: &HarvestReport, format: OutputFormat) -> anyhow::Result<String> {
    let text = match format {
        OutputFormat::Json => serde_json::to_string_pretty(&report.records)?,
        OutputFormat::Report => serde_json::to_string_pretty(report)?,
        OutputFormat::Ndjson => report
            .records
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()?
            .join("\n"),
    };
    Ok(text)
}
