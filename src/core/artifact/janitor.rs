//! 过期产物清理

use crate::core::artifact::writer::ARTIFACT_EXTENSION;
use crate::core::error::Result;
use log::{debug, info, warn};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::{Duration, SystemTime};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub removed: usize,
    pub failed: usize,
}

/// Remove artifacts in `dir` older than `max_age`.
pub fn sweep(dir: &Path, max_age: Duration) -> Result<SweepReport> {
    sweep_at(dir, max_age, SystemTime::now())
}

/// [`sweep`] with an explicit clock. Non-recursive; only regular files with
/// the artifact extension are considered. Per-file failures are counted
/// and skipped.
pub fn sweep_at(dir: &Path, max_age: Duration, now: SystemTime) -> Result<SweepReport> {
    let mut report = SweepReport::default();

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("🧹 Artifact dir {} does not exist yet", dir.display());
            return Ok(report);
        }
        Err(e) => return Err(e.into()),
    };

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("⚠️ Unreadable entry in {}: {}", dir.display(), e);
                report.failed += 1;
                continue;
            }
        };
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(ARTIFACT_EXTENSION) {
            continue;
        }

        let meta = match entry.metadata() {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => continue,
            Err(e) => {
                // removed concurrently
                debug!("skip {}: {}", path.display(), e);
                continue;
            }
        };
        report.scanned += 1;

        let born = match meta.created().or_else(|_| meta.modified()) {
            Ok(t) => t,
            Err(e) => {
                warn!("⚠️ No timestamp for {}: {}", path.display(), e);
                report.failed += 1;
                continue;
            }
        };
        // future timestamps count as age zero
        let age = now.duration_since(born).unwrap_or(Duration::ZERO);
        if age <= max_age {
            continue;
        }

        match fs::remove_file(&path) {
            Ok(()) => report.removed += 1,
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                warn!("⚠️ Failed to remove {}: {}", path.display(), e);
                report.failed += 1;
            }
        }
    }

    if report.removed > 0 || report.failed > 0 {
        info!(
            "🧹 Sweep of {}: scanned {}, removed {}, failed {}",
            dir.display(),
            report.scanned,
            report.removed,
            report.failed
        );
    }
    Ok(report)
}
