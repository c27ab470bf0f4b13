use anyhow::Result;

use crate::config::Config;
use crate::models::Category;
use crate::store::open_store;

/// Per-category roots with a count of the ones that exist.
pub fn source_status(config: &Config, category: Category) -> (usize, usize) {
    let source = config.sources.resolve(category);
    let present = source.roots.iter().filter(|root| root.exists()).count();
    (present, source.roots.len())
}

pub async fn list_sources(config: &Config) -> Result<()> {
    println!("{:<10} {:<8} {:<8} ROOTS", "SOURCE", "STATUS", "PRESENT");
    for category in Category::ALL {
        let (present, total) = source_status(config, category);
        let status = if present > 0 { "OK" } else { "MISSING" };
        let roots: Vec<String> = config
            .sources
            .resolve(category)
            .roots
            .iter()
            .map(|root| root.display().to_string())
            .collect();
        println!(
            "{:<10} {:<8} {:<8} {}",
            category,
            status,
            format!("{}/{}", present, total),
            roots.join(", ")
        );
    }

    println!();
    match open_store(&config.store).await {
        Ok(store) => match store.count().await {
            Ok(count) => println!("store {}  OK  {} records", store.name(), count),
            Err(e) => println!("store {}  ERROR  {}", store.name(), e),
        },
        Err(e) => println!("store  UNAVAILABLE  {:#}", e),
    }

    Ok(())
}
