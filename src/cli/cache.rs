//! `tandem cache`: list or purge cached responses.

use anyhow::Result;
use owo_colors::OwoColorize;
use tandem::cache::{Freshness, ResponseCache};
use tandem::config::cfg;
use tandem::core::unix_now;
use tandem::log;

use super::CacheAction;

pub fn cache(action: CacheAction) -> Result<()> {
    // Opening evicts broken and expired entries first.
    let mut cache = ResponseCache::open(&cfg().cache.dir)?;
    match action {
        CacheAction::List => {
            if cache.is_empty() {
                log!("cache"; "empty");
                return Ok(());
            }
            let now = unix_now();
            for entry in cache.entries() {
                let state = match entry.freshness(now) {
                    Freshness::Fresh => "fresh".green().to_string(),
                    Freshness::Stale => "stale".yellow().to_string(),
                    Freshness::Expired => "expired".red().to_string(),
                };
                let ttl = entry.expires_at.saturating_sub(now);
                println!("{:<8} {:>8} B  {:>6}s  {}", state, entry.len, ttl, entry.url);
            }
        }
        CacheAction::Purge => {
            let removed = cache.purge()?;
            log!("cache"; "removed {} entr{}", removed, if removed == 1 { "y" } else { "ies" });
        }
    }
    Ok(())
}
