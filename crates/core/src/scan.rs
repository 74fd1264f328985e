use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Instant;

use anyhow::{anyhow, Result};
use chrono::{SecondsFormat, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::info;
use uuid::Uuid;
use walkdir::WalkDir;

use crate::cluster::{self, ClusterConfig};
use crate::dedupe::{self, DedupeConfig};
use crate::model::{
    FileItem, ProjectCluster, Report, Rule, ScanMetadata, ScanMetrics, ScanPhase, ScanPhaseCount,
    ScanProgressEvent, ScanProgressSummary, REPORT_VERSION,
};
use crate::rules::{plan_actions, OrganizePlan};

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub paths: Vec<PathBuf>,
    pub max_depth: Option<usize>,
    pub excludes: Vec<String>,
    pub dedupe: bool,
    pub dedupe_min_size: u64,
    pub detect_clusters: bool,
    pub progress: bool,
    pub scan_id: Option<String>,
    pub emit_progress_events: bool,
    pub cancel_flag: Option<Arc<AtomicBool>>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            paths: Vec::new(),
            max_depth: None,
            excludes: Vec::new(),
            dedupe: true,
            dedupe_min_size: 1,
            detect_clusters: true,
            progress: false,
            scan_id: None,
            emit_progress_events: false,
            cancel_flag: None,
        }
    }
}

pub struct ScanRunOutput {
    pub report: Report,
    pub events: Vec<ScanProgressEvent>,
}

pub fn run_scan(
    options: &ScanOptions,
    rules: &[Rule],
    known_clusters: &[ProjectCluster],
) -> Result<Report> {
    run_scan_with_callback(options, rules, known_clusters, |_| {})
}

pub fn run_scan_with_events(
    options: &ScanOptions,
    rules: &[Rule],
    known_clusters: &[ProjectCluster],
) -> Result<ScanRunOutput> {
    let mut events = Vec::new();
    let report =
        run_scan_with_callback(options, rules, known_clusters, |event| events.push(event))?;
    Ok(ScanRunOutput { report, events })
}

/// Runs the full pipeline: walk, match, dedupe, cluster. Per-file failures
/// become warnings; only an empty root set is fatal. Cancellation keeps the
/// completed phases and marks the report partial via a warning.
pub fn run_scan_with_callback<F>(
    options: &ScanOptions,
    rules: &[Rule],
    known_clusters: &[ProjectCluster],
    mut on_event: F,
) -> Result<Report>
where
    F: FnMut(ScanProgressEvent),
{
    let started = Instant::now();
    let scan_id = options
        .scan_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let mut warnings = Vec::new();
    let mut total_events = 0_u64;
    let mut phase_counts: HashMap<ScanPhase, u64> = HashMap::new();

    let roots = resolve_roots(options, &mut warnings)?;
    let excludes = ExcludeMatcher::new(&options.excludes, &mut warnings);

    emit_scan_event(
        options,
        &mut on_event,
        &scan_id,
        &mut total_events,
        &mut phase_counts,
        ScanPhase::WalkingFiles,
        None,
        0,
        0,
        warnings.len() as u64,
    );

    let mut files: Vec<FileItem> = Vec::new();
    let mut scanned_directories = 0_u64;
    let mut scanned_bytes = 0_u64;
    let mut cancelled = false;

    for (index, root) in roots.iter().enumerate() {
        if is_cancelled(options) {
            cancelled = true;
            break;
        }

        walk_root(
            root,
            options,
            &excludes,
            &mut files,
            &mut scanned_directories,
            &mut scanned_bytes,
            &mut warnings,
            &mut cancelled,
        );

        emit_scan_event(
            options,
            &mut on_event,
            &scan_id,
            &mut total_events,
            &mut phase_counts,
            ScanPhase::WalkingFiles,
            Some(root.to_string_lossy().to_string()),
            files.len() as u64,
            scanned_bytes,
            warnings.len() as u64,
        );

        if options.progress {
            info!(
                "scan progress: root {}/{} complete ({})",
                index + 1,
                roots.len(),
                root.display()
            );
        }
    }

    if cancelled {
        warnings.push("scan canceled by caller; report contains partial data".to_string());
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));

    emit_scan_event(
        options,
        &mut on_event,
        &scan_id,
        &mut total_events,
        &mut phase_counts,
        ScanPhase::Matching,
        None,
        files.len() as u64,
        scanned_bytes,
        warnings.len() as u64,
    );

    let plan = if cancelled {
        OrganizePlan::default()
    } else {
        plan_actions(&files, rules, Utc::now())
    };

    emit_scan_event(
        options,
        &mut on_event,
        &scan_id,
        &mut total_events,
        &mut phase_counts,
        ScanPhase::Dedupe,
        None,
        files.len() as u64,
        scanned_bytes,
        warnings.len() as u64,
    );

    let duplicates = if options.dedupe && !cancelled {
        let config = DedupeConfig {
            min_size_bytes: options.dedupe_min_size,
            ..DedupeConfig::default()
        };
        dedupe::detect(&files, &config, &mut warnings)
    } else {
        Vec::new()
    };

    emit_scan_event(
        options,
        &mut on_event,
        &scan_id,
        &mut total_events,
        &mut phase_counts,
        ScanPhase::Clustering,
        None,
        files.len() as u64,
        scanned_bytes,
        warnings.len() as u64,
    );

    let clusters = if options.detect_clusters && !cancelled {
        cluster::detect(&files, known_clusters, &ClusterConfig::default())
    } else {
        Vec::new()
    };

    let scan = ScanMetadata {
        roots: roots
            .iter()
            .map(|path| path.to_string_lossy().to_string())
            .collect(),
        max_depth: options.max_depth,
        excludes: options.excludes.clone(),
        dedupe: options.dedupe,
        dedupe_min_size: options.dedupe_min_size,
        detect_clusters: options.detect_clusters,
        rule_count: rules.len(),
        emit_progress_events: options.emit_progress_events,
    };

    let permission_denied_warnings = warnings
        .iter()
        .filter(|warning| warning.to_lowercase().contains("permission"))
        .count() as u64;

    let mut report = Report {
        report_version: REPORT_VERSION.to_string(),
        generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        scan_id: scan_id.clone(),
        scan,
        scan_metrics: ScanMetrics {
            elapsed_ms: started.elapsed().as_millis().try_into().unwrap_or(u64::MAX),
            scanned_roots: roots.len() as u64,
            scanned_files: files.len() as u64,
            scanned_directories,
            scanned_bytes,
            matched_files: plan.planned.len() as u64,
            unmatched_files: plan.unmatched_files,
            permission_denied_warnings,
        },
        scan_progress_summary: ScanProgressSummary::default(),
        files,
        planned: plan.planned,
        duplicates,
        clusters,
        warnings,
    };

    emit_scan_event(
        options,
        &mut on_event,
        &scan_id,
        &mut total_events,
        &mut phase_counts,
        ScanPhase::Done,
        None,
        report.scan_metrics.scanned_files,
        report.scan_metrics.scanned_bytes,
        report.warnings.len() as u64,
    );

    report.scan_progress_summary = ScanProgressSummary {
        total_events,
        phase_counts: phase_counts
            .iter()
            .map(|(phase, events)| ScanPhaseCount {
                phase: phase.clone(),
                events: *events,
            })
            .collect(),
        completed: !cancelled,
    };

    Ok(report)
}

#[allow(clippy::too_many_arguments)]
fn emit_scan_event<F>(
    options: &ScanOptions,
    on_event: &mut F,
    scan_id: &str,
    total_events: &mut u64,
    phase_counts: &mut HashMap<ScanPhase, u64>,
    phase: ScanPhase,
    current_path: Option<String>,
    scanned_files: u64,
    scanned_bytes: u64,
    errors: u64,
) where
    F: FnMut(ScanProgressEvent),
{
    *total_events = total_events.saturating_add(1);
    *phase_counts.entry(phase.clone()).or_insert(0) += 1;

    if options.emit_progress_events {
        on_event(ScanProgressEvent {
            seq: *total_events,
            scan_id: scan_id.to_string(),
            phase,
            current_path,
            scanned_files,
            scanned_bytes,
            errors,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        });
    }
}

#[allow(clippy::too_many_arguments)]
fn walk_root(
    root: &Path,
    options: &ScanOptions,
    excludes: &ExcludeMatcher,
    files: &mut Vec<FileItem>,
    scanned_directories: &mut u64,
    scanned_bytes: &mut u64,
    warnings: &mut Vec<String>,
    cancelled: &mut bool,
) {
    let mut walker = WalkDir::new(root).follow_links(false);
    if let Some(depth) = options.max_depth {
        walker = walker.max_depth(depth);
    }
    let iter = walker.into_iter().filter_entry(|entry| {
        if entry.depth() == 0 {
            return true;
        }
        !excludes.is_excluded(entry.path())
    });

    for item in iter {
        if is_cancelled(options) {
            *cancelled = true;
            break;
        }

        let entry = match item {
            Ok(entry) => entry,
            Err(err) => {
                warnings.push(format!("walk error under {}: {}", root.display(), err));
                continue;
            }
        };
        if entry.depth() == 0 {
            continue;
        }
        if entry.file_type().is_dir() {
            *scanned_directories += 1;
            continue;
        }
        if !entry.file_type().is_file() {
            continue;
        }

        match FileItem::from_path(entry.path()) {
            Ok(file) => {
                *scanned_bytes = scanned_bytes.saturating_add(file.size_bytes);
                files.push(file);
            }
            Err(err) => warnings.push(format!(
                "snapshot failed for {}: {}",
                entry.path().display(),
                err
            )),
        }
    }
}

fn resolve_roots(options: &ScanOptions, warnings: &mut Vec<String>) -> Result<Vec<PathBuf>> {
    let mut roots = Vec::new();
    let mut seen = HashSet::new();
    for root in &options.paths {
        let key = root.to_string_lossy().to_lowercase();
        if !seen.insert(key) {
            continue;
        }
        if !root.exists() {
            warnings.push(format!("scan root not found: {}", root.display()));
            continue;
        }
        roots.push(root.clone());
    }

    if roots.is_empty() {
        return Err(anyhow!("no valid scan roots were resolved. Provide paths."));
    }
    Ok(roots)
}

fn is_cancelled(options: &ScanOptions) -> bool {
    options
        .cancel_flag
        .as_ref()
        .is_some_and(|flag| flag.load(Ordering::Relaxed))
}

struct ExcludeMatcher {
    globset: Option<GlobSet>,
    substrings: Vec<String>,
}

impl ExcludeMatcher {
    fn new(patterns: &[String], warnings: &mut Vec<String>) -> Self {
        if patterns.is_empty() {
            return Self {
                globset: None,
                substrings: Vec::new(),
            };
        }

        let mut builder = GlobSetBuilder::new();
        let mut substrings = Vec::new();
        for pattern in patterns {
            let pattern = pattern.trim();
            if pattern.is_empty() {
                continue;
            }

            if is_plain_substring_pattern(pattern) {
                substrings.push(pattern.to_lowercase());
                continue;
            }

            match Glob::new(pattern) {
                Ok(glob) => {
                    builder.add(glob);
                }
                Err(err) => {
                    warnings.push(format!(
                        "invalid exclude glob '{pattern}': {err}; using substring fallback."
                    ));
                    substrings.push(pattern.to_lowercase());
                }
            }
        }

        let globset = match builder.build() {
            Ok(set) => Some(set),
            Err(err) => {
                warnings.push(format!(
                    "failed to compile exclude glob set: {err}; glob excludes disabled."
                ));
                None
            }
        };

        Self {
            globset,
            substrings,
        }
    }

    fn is_excluded(&self, path: &Path) -> bool {
        if let Some(globset) = &self.globset {
            if globset.is_match(path) {
                return true;
            }
        }

        if self.substrings.is_empty() {
            return false;
        }

        let lowered = path.to_string_lossy().to_lowercase();
        self.substrings
            .iter()
            .any(|pattern| lowered.contains(pattern))
    }
}

fn is_plain_substring_pattern(pattern: &str) -> bool {
    !pattern
        .chars()
        .any(|ch| matches!(ch, '*' | '?' | '[' | ']' | '{' | '}'))
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::{resolve_roots, ExcludeMatcher, ScanOptions};

    #[test]
    fn exclude_matcher_matches_glob_and_substring() {
        let mut warnings = Vec::new();
        let matcher = ExcludeMatcher::new(
            &[
                "**/*.tmp".to_string(),
                "[".to_string(),
                "node_modules".to_string(),
            ],
            &mut warnings,
        );

        assert!(matcher.is_excluded(Path::new("/repo/a.tmp")));
        assert!(matcher.is_excluded(Path::new("/repo/node_modules/pkg/index.js")));
        assert!(!matcher.is_excluded(Path::new("/repo/src/main.rs")));
        assert!(!warnings.is_empty());
    }

    #[test]
    fn empty_root_set_is_fatal() {
        let options = ScanOptions::default();
        let mut warnings = Vec::new();
        assert!(resolve_roots(&options, &mut warnings).is_err());
    }

    #[test]
    fn missing_roots_degrade_to_warnings() {
        let temp = tempfile::TempDir::new().expect("tempdir");
        let options = ScanOptions {
            paths: vec![temp.path().to_path_buf(), "/definitely/not/here".into()],
            ..ScanOptions::default()
        };
        let mut warnings = Vec::new();
        let roots = resolve_roots(&options, &mut warnings).expect("roots");
        assert_eq!(roots.len(), 1);
        assert_eq!(warnings.len(), 1);
    }
}
