//! Model cache command handlers.

use anyhow::{Context, Result};

use arkmesh::{Config, ModelCache};

use super::CacheAction;

/// Handle `arkmesh cache` subcommands.
pub(crate) fn cmd_cache(config: &Config, action: CacheAction) -> Result<()> {
    let cache =
        ModelCache::from_config(&config.cache).with_context(|| "Failed to open model cache")?;

    match action {
        CacheAction::List => {
            let records = cache.records()?;
            if records.is_empty() {
                println!("No cached models.");
                return Ok(());
            }

            println!("{:<72} {:<20} {}", "Key", "Cached", "Source URL");
            println!("{}", "-".repeat(120));
            for record in &records {
                println!(
                    "{:<72} {:<20} {}",
                    record.cache_key,
                    format_timestamp(record.timestamp),
                    record.url
                );
            }

            let stats = cache.stats()?;
            println!();
            println!(
                "{} model(s), {} expired or missing, {} on disk",
                stats.entries,
                stats.expired,
                format_bytes(stats.total_bytes)
            );
        }
        CacheAction::Remove { key } => {
            if cache.remove(key.trim())? {
                println!("Removed cached model: {}", key.trim());
            } else {
                println!("No cached model with key: {}", key.trim());
            }
        }
        CacheAction::Clear => match cache.clear() {
            Ok(()) => println!("Model cache cleared."),
            Err(e) => anyhow::bail!("Failed to clear model cache: {}", e),
        },
        CacheAction::Path => {
            println!("{}", cache.dir().display());
        }
    }

    Ok(())
}

fn format_timestamp(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|t| {
            t.with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M")
                .to_string()
        })
        .unwrap_or_else(|| "-".to_string())
}

fn format_bytes(bytes: u64) -> String {
    const MIB: f64 = 1024.0 * 1024.0;
    if bytes as f64 >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB)
    } else {
        format!("{:.1} KiB", bytes as f64 / 1024.0)
    }
}
