use std::collections::{HashMap, HashSet};

use chrono::Utc;
use humansize::{format_size, BINARY};
use log::{debug, info, warn};

use crate::config::ConvertConfig;
use crate::ffprobe;
use crate::record::FileRecord;
use crate::scan::{self, ScannedFile};
use crate::store::{CatalogStore, StoreResult};

/// Counters from one reconciliation pass, for the summary log line.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub scanned: usize,
    pub renamed: usize,
    pub deleted: usize,
    pub probed: usize,
    pub probe_failures: usize,
    pub stale_released: usize,
}

/// One full reconciliation pass: scan the library, resolve renames and
/// deletions by inode, release stale claims, probe newly discovered files,
/// and log catalog statistics.
///
/// Per-record failures are logged and skipped so one bad file or one store
/// hiccup never blocks the rest of the pass; only the initial store queries
/// propagate (the scheduler logs those and retries next interval).
pub async fn run_reconcile_pass(
    store: &dyn CatalogStore,
    config: &ConvertConfig,
) -> StoreResult<ReconcileSummary> {
    let mut summary = ReconcileSummary::default();

    let scanned = scan::scan(&config.folders.include, &config.folders.exclude);
    summary.scanned = scanned.len();

    let scanned_by_path: HashMap<String, &ScannedFile> = scanned
        .iter()
        .map(|f| (f.path.to_string_lossy().to_string(), f))
        .collect();
    let scanned_by_inode: HashMap<u64, &ScannedFile> =
        scanned.iter().map(|f| (f.inode, f)).collect();

    let db_paths = store.active_paths()?;
    let mut known: HashSet<String> = db_paths.iter().cloned().collect();

    // Paths the store knows but the scan did not find: a missing path whose
    // inode survives elsewhere was renamed; otherwise the file is gone.
    for db_path in &db_paths {
        if scanned_by_path.contains_key(db_path) {
            continue;
        }

        let record = match store.get(db_path) {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!("Record vanished during reconciliation: {db_path}");
                continue;
            }
            Err(e) => {
                warn!("Failed to load record for {db_path}: {e}");
                continue;
            }
        };

        match scanned_by_inode.get(&record.inode) {
            Some(moved) if record.inode != 0 => {
                let new_path = moved.path.to_string_lossy().to_string();
                info!("Detected rename: {db_path} -> {new_path}");
                match store.rename(db_path, &new_path) {
                    Ok(()) => {
                        known.insert(new_path);
                        summary.renamed += 1;
                    }
                    Err(e) => warn!("Failed to record rename of {db_path}: {e}"),
                }
            }
            _ => {
                info!("File deleted from disk: {db_path}");
                match store.mark_deleted(db_path) {
                    Ok(()) => summary.deleted += 1,
                    Err(e) => warn!("Failed to mark {db_path} deleted: {e}"),
                }
            }
        }
    }

    // Claims abandoned by a worker that died without cleanup go back to the
    // backlog once they exceed the staleness cutoff.
    let cutoff = Utc::now() - chrono::Duration::hours(config.policy.stale_claim_hours as i64);
    match store.release_stale_claims(cutoff) {
        Ok(0) => {}
        Ok(released) => {
            warn!("Released {released} stale claim(s) older than {cutoff}");
            summary.stale_released = released;
        }
        Err(e) => warn!("Stale claim release skipped: {e}"),
    }

    // Probe files the catalog has never seen. A probe failure skips the file;
    // it will be retried on the next pass.
    for file in &scanned {
        let path = file.path.to_string_lossy().to_string();
        if known.contains(&path) {
            continue;
        }

        match ffprobe::probe_file(&config.ffprobe_bin, &file.path).await {
            Ok(probe) => {
                let record = FileRecord::new(path.clone(), file.inode, file.size_bytes, probe);
                debug!(
                    "Cataloged {path} (conversion required: {})",
                    record.conversion_required
                );
                match store.upsert(&record) {
                    Ok(()) => summary.probed += 1,
                    Err(e) => warn!("Failed to upsert record for {path}: {e}"),
                }
            }
            Err(e) => {
                warn!("Probe failed: {e}");
                summary.probe_failures += 1;
            }
        }
    }

    match store.stats() {
        Ok(stats) => info!(
            "Catalog: {} tracked, {} pending, {} converted, {} errored, {} saved",
            stats.tracked,
            stats.pending,
            stats.converted,
            stats.errored,
            format_size(stats.bytes_saved, BINARY)
        ),
        Err(e) => debug!("Catalog statistics unavailable: {e}"),
    }

    Ok(summary)
}
