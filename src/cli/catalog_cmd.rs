//! Catalog and configuration inspection commands.

use console::style;

use super::icons::warn;
use crate::config::HarvestConfig;

/// List configured categories, marking the ones a run will visit.
pub fn cmd_categories(config: &HarvestConfig) -> anyhow::Result<()> {
    let store = &config.store;
    if store.categories.is_empty() {
        println!("{} No categories configured for {}", warn(), store.name);
        return Ok(());
    }

    let visited = match store.max_categories {
        0 => store.categories.len(),
        max => max.min(store.categories.len()),
    };

    println!("\n{}", style(format!("{} Categories", store.name)).bold());
    println!("{}", "-".repeat(72));
    for (i, category) in store.categories.iter().enumerate() {
        let marker = if i < visited {
            style("●").green()
        } else {
            style("○").dim()
        };
        println!("{} {:<20} {}", marker, category.name, style(&category.url).dim());
    }
    println!("{}", "-".repeat(72));
    println!(
        "{} of {} categories visited per run (max_categories = {})",
        visited,
        store.categories.len(),
        store.max_categories
    );

    Ok(())
}

/// Print the effective configuration.
pub fn cmd_config(config: &HarvestConfig) -> anyhow::Result<()> {
    let source = config
        .source_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "built-in defaults".to_string());
    eprintln!("{} {}", style("Config from").dim(), source);
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}
