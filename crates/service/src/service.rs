use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::thread;

use anyhow::{anyhow, Context, Result};
use forma_core::{
    nlparse, run_scan_with_callback, ParsedRule, ProjectCluster, Report, Rule, ScanOptions,
    ScanProgressEvent,
};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRequest {
    #[serde(default)]
    pub scan_id: Option<String>,
    #[serde(default)]
    pub paths: Vec<PathBuf>,
    #[serde(default)]
    pub output: Option<PathBuf>,
    #[serde(default)]
    pub max_depth: Option<usize>,
    #[serde(default)]
    pub excludes: Vec<String>,
    #[serde(default = "default_true")]
    pub dedupe: bool,
    #[serde(default = "default_dedupe_min_size")]
    pub dedupe_min_size: u64,
    #[serde(default = "default_true")]
    pub detect_clusters: bool,
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub known_clusters: Vec<ProjectCluster>,
    #[serde(default)]
    pub emit_progress_events: bool,
}

fn default_dedupe_min_size() -> u64 {
    1
}

fn default_true() -> bool {
    true
}

impl Default for ScanRequest {
    fn default() -> Self {
        Self {
            scan_id: None,
            paths: Vec::new(),
            output: None,
            max_depth: None,
            excludes: Vec::new(),
            dedupe: true,
            dedupe_min_size: default_dedupe_min_size(),
            detect_clusters: true,
            rules: Vec::new(),
            known_clusters: Vec::new(),
            emit_progress_events: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScanSessionStatus {
    Running,
    Completed,
    Cancelled,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSessionSnapshot {
    pub scan_id: String,
    pub status: ScanSessionStatus,
    pub report_path: Option<PathBuf>,
    pub error: Option<String>,
    pub total_events: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelScanResponse {
    pub scan_id: String,
    pub status: ScanSessionStatus,
}

#[derive(Debug, Clone)]
struct ScanSession {
    status: ScanSessionStatus,
    report_path: Option<PathBuf>,
    report: Option<Report>,
    error: Option<String>,
    events: Vec<ScanProgressEvent>,
    cancel_flag: Arc<AtomicBool>,
}

static SESSIONS: Lazy<Mutex<HashMap<String, ScanSession>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

pub fn start_scan(request: ScanRequest) -> Result<String> {
    let scan_id = request
        .scan_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let cancel_flag = Arc::new(AtomicBool::new(false));

    {
        let mut sessions = lock_sessions()?;
        sessions.insert(
            scan_id.clone(),
            ScanSession {
                status: ScanSessionStatus::Running,
                report_path: request.output.clone(),
                report: None,
                error: None,
                events: Vec::new(),
                cancel_flag: Arc::clone(&cancel_flag),
            },
        );
    }

    let thread_scan_id = scan_id.clone();
    thread::spawn(move || {
        let options = ScanOptions {
            paths: request.paths,
            max_depth: request.max_depth,
            excludes: request.excludes,
            dedupe: request.dedupe,
            dedupe_min_size: request.dedupe_min_size,
            detect_clusters: request.detect_clusters,
            scan_id: Some(thread_scan_id.clone()),
            emit_progress_events: request.emit_progress_events,
            cancel_flag: Some(Arc::clone(&cancel_flag)),
            ..ScanOptions::default()
        };

        let run_result = run_scan_with_callback(
            &options,
            &request.rules,
            &request.known_clusters,
            |event| {
                if let Ok(mut sessions) = lock_sessions() {
                    if let Some(session) = sessions.get_mut(&thread_scan_id) {
                        session.events.push(event);
                    }
                }
            },
        );

        match run_result {
            Ok(report) => {
                if let Some(path) = &request.output {
                    let write_result = serde_json::to_string_pretty(&report)
                        .context("failed to serialize report payload")
                        .and_then(|payload| {
                            fs::write(path, payload).with_context(|| {
                                format!("failed to write report to {}", path.display())
                            })
                        });

                    if let Err(err) = write_result {
                        if let Ok(mut sessions) = lock_sessions() {
                            if let Some(session) = sessions.get_mut(&thread_scan_id) {
                                session.status = ScanSessionStatus::Failed;
                                session.error = Some(err.to_string());
                            }
                        }
                        return;
                    }
                }

                if let Ok(mut sessions) = lock_sessions() {
                    if let Some(session) = sessions.get_mut(&thread_scan_id) {
                        session.report = Some(report);
                        session.status = if cancel_flag.load(Ordering::Relaxed) {
                            ScanSessionStatus::Cancelled
                        } else {
                            ScanSessionStatus::Completed
                        };
                        session.error = None;
                    }
                }
            }
            Err(err) => {
                if let Ok(mut sessions) = lock_sessions() {
                    if let Some(session) = sessions.get_mut(&thread_scan_id) {
                        session.status = ScanSessionStatus::Failed;
                        session.error = Some(err.to_string());
                    }
                }
            }
        }
    });

    Ok(scan_id)
}

pub fn poll_scan_events(scan_id: &str, from_seq: u64) -> Result<Vec<ScanProgressEvent>> {
    let sessions = lock_sessions()?;
    let session = sessions
        .get(scan_id)
        .ok_or_else(|| anyhow!("scan session not found: {scan_id}"))?;

    Ok(session
        .events
        .iter()
        .filter(|event| event.seq > from_seq)
        .cloned()
        .collect())
}

pub fn cancel_scan(scan_id: &str) -> Result<CancelScanResponse> {
    let mut sessions = lock_sessions()?;
    let session = sessions
        .get_mut(scan_id)
        .ok_or_else(|| anyhow!("scan session not found: {scan_id}"))?;

    session.cancel_flag.store(true, Ordering::Relaxed);
    if session.status == ScanSessionStatus::Running {
        session.status = ScanSessionStatus::Cancelled;
    }

    Ok(CancelScanResponse {
        scan_id: scan_id.to_string(),
        status: session.status.clone(),
    })
}

pub fn get_scan_session(scan_id: &str) -> Result<ScanSessionSnapshot> {
    let sessions = lock_sessions()?;
    let session = sessions
        .get(scan_id)
        .ok_or_else(|| anyhow!("scan session not found: {scan_id}"))?;

    Ok(ScanSessionSnapshot {
        scan_id: scan_id.to_string(),
        status: session.status.clone(),
        report_path: session.report_path.clone(),
        error: session.error.clone(),
        total_events: session.events.len() as u64,
    })
}

pub fn load_report(path: impl AsRef<Path>) -> Result<Report> {
    let path = path.as_ref();
    let data = fs::read_to_string(path)
        .with_context(|| format!("failed to read report {}", path.display()))?;
    let report: Report = serde_json::from_str(&data)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(report)
}

/// Latest accepted parse for one input field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseSnapshot {
    pub field: String,
    pub revision: u64,
    pub parsed: ParsedRule,
}

static PARSES: Lazy<Mutex<HashMap<String, ParseSnapshot>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Parses one revision of an input field's text. The caller bumps `revision`
/// on every edit; a result only publishes when no newer revision has landed,
/// so a slow parse of stale text can never clobber a fresh one.
pub fn submit_parse(field: &str, revision: u64, text: &str) -> Result<Option<ParseSnapshot>> {
    let parsed = nlparse::parse(text);

    let mut parses = lock_parses()?;
    if let Some(existing) = parses.get(field) {
        if existing.revision >= revision {
            return Ok(None);
        }
    }
    let snapshot = ParseSnapshot {
        field: field.to_string(),
        revision,
        parsed,
    };
    parses.insert(field.to_string(), snapshot.clone());
    Ok(Some(snapshot))
}

pub fn latest_parse(field: &str) -> Result<Option<ParseSnapshot>> {
    let parses = lock_parses()?;
    Ok(parses.get(field).cloned())
}

fn lock_sessions() -> Result<std::sync::MutexGuard<'static, HashMap<String, ScanSession>>> {
    SESSIONS
        .lock()
        .map_err(|_| anyhow!("scan session registry lock poisoned"))
}

fn lock_parses() -> Result<std::sync::MutexGuard<'static, HashMap<String, ParseSnapshot>>> {
    PARSES
        .lock()
        .map_err(|_| anyhow!("parse registry lock poisoned"))
}
