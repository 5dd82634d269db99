//! Dump-log command implementation.

use super::{open_dir, scan_log, CliResult};
use notesync_core::{ChangeLogEntry, OwnerId};
use std::path::Path;

/// Entries of `owner` after sequence `after`, at most `limit` of them.
pub fn collect(
    path: &Path,
    owner: &str,
    after: u64,
    limit: Option<usize>,
) -> CliResult<Vec<ChangeLogEntry>> {
    let dir = open_dir(path)?;
    let scan = scan_log(&dir, &OwnerId::new(owner))?;
    Ok(scan
        .entries
        .into_iter()
        .filter(|e| e.sequence > after)
        .take(limit.unwrap_or(usize::MAX))
        .collect())
}

/// Runs the dump-log command.
pub fn run(
    path: &Path,
    owner: &str,
    after: u64,
    limit: Option<usize>,
    format: &str,
) -> CliResult<()> {
    let entries = collect(path, owner, after, limit)?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&entries)?),
        _ => print_text(&entries),
    }
    Ok(())
}

fn print_text(entries: &[ChangeLogEntry]) {
    println!(
        "{:>8}  {:<8} {:<24} {:<7} {:>4}  {:<12} title",
        "seq", "kind", "id", "op", "ver", "origin"
    );
    for entry in entries {
        let label = entry
            .after
            .as_ref()
            .or(entry.before.as_ref())
            .map_or("", |p| p.label());
        println!(
            "{:>8}  {:<8} {:<24} {:<7} {:>4}  {:<12} {}",
            entry.sequence,
            entry.kind.as_str(),
            entry.entity_id.as_str(),
            entry.operation.as_str(),
            entry.resulting_version,
            entry.origin.as_str(),
            label
        );
    }
    println!();
    println!("{} entries", entries.len());
}
