//! Inspect command implementation.

use super::{open_dir, scan_log, CliResult};
use notesync_core::{DomainStats, EntityStore};
use std::path::Path;
use tracing::info;

/// Rebuilds the stats of every owner by replaying their logs.
pub fn collect(path: &Path) -> CliResult<Vec<DomainStats>> {
    let dir = open_dir(path)?;
    let mut stats = Vec::new();
    for owner in dir.list_owners()? {
        let scan = scan_log(&dir, &owner)?;
        let store = EntityStore::new(owner.clone());
        for entry in &scan.entries {
            store.replay(entry)?;
        }
        let deleted = store.all().iter().filter(|e| e.deleted).count();
        stats.push(DomainStats {
            owner,
            head_sequence: scan.entries.last().map_or(0, |e| e.sequence),
            live: store.live_counts(),
            deleted,
            log_bytes: scan.valid_len,
        });
    }
    Ok(stats)
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> CliResult<()> {
    info!(path = %path.display(), "inspecting data directory");
    let stats = collect(path)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&stats)?),
        _ => print_text(path, &stats),
    }
    Ok(())
}

fn print_text(path: &Path, stats: &[DomainStats]) {
    println!("NoteSync data directory: {}", path.display());
    println!("Owners: {}", stats.len());
    for owner in stats {
        println!();
        println!("Owner {}", owner.owner);
        println!("  Head sequence: {}", owner.head_sequence);
        println!("  Log size:      {} bytes", owner.log_bytes);
        for (kind, count) in &owner.live {
            println!("  {:<14} {}", format!("{kind}s:"), count);
        }
        println!("  {:<14} {}", "deleted:", owner.deleted);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::seed;
    use notesync_core::EntityKind;
    use tempfile::TempDir;

    #[test]
    fn collects_stats_per_owner() {
        let dir = TempDir::new().unwrap();
        seed(dir.path());

        let stats = collect(dir.path()).unwrap();
        assert_eq!(stats.len(), 2);
        let alice = &stats[0];
        assert_eq!(alice.owner.as_str(), "alice");
        assert_eq!(alice.head_sequence, 5);
        assert_eq!(alice.live.get(&EntityKind::Note), Some(&2));
        assert_eq!(alice.live.get(&EntityKind::Tag), Some(&0));
        assert_eq!(alice.deleted, 1);
        assert!(alice.log_bytes > 0);
        assert_eq!(stats[1].head_sequence, 1);
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(collect(&dir.path().join("absent")).is_err());
    }
}
