use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const REPORT_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Report {
    pub report_version: String,
    pub generated_at: String,
    #[serde(default = "default_scan_id")]
    pub scan_id: String,
    pub scan: ScanMetadata,
    #[serde(default)]
    pub scan_metrics: ScanMetrics,
    #[serde(default)]
    pub scan_progress_summary: ScanProgressSummary,
    pub files: Vec<FileItem>,
    pub planned: Vec<PlannedAction>,
    pub duplicates: Vec<DuplicateGroup>,
    pub clusters: Vec<ProjectCluster>,
    pub warnings: Vec<String>,
}

fn default_scan_id() -> String {
    "unknown".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanMetadata {
    pub roots: Vec<String>,
    pub max_depth: Option<usize>,
    pub excludes: Vec<String>,
    pub dedupe: bool,
    pub dedupe_min_size: u64,
    pub detect_clusters: bool,
    pub rule_count: usize,
    #[serde(default)]
    pub emit_progress_events: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ScanMetrics {
    #[serde(default)]
    pub elapsed_ms: u64,
    #[serde(default)]
    pub scanned_roots: u64,
    #[serde(default)]
    pub scanned_files: u64,
    #[serde(default)]
    pub scanned_directories: u64,
    #[serde(default)]
    pub scanned_bytes: u64,
    #[serde(default)]
    pub matched_files: u64,
    #[serde(default)]
    pub unmatched_files: u64,
    #[serde(default)]
    pub permission_denied_warnings: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ScanProgressSummary {
    #[serde(default)]
    pub total_events: u64,
    #[serde(default)]
    pub phase_counts: Vec<ScanPhaseCount>,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanPhaseCount {
    pub phase: ScanPhase,
    pub events: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanProgressEvent {
    pub seq: u64,
    pub scan_id: String,
    pub phase: ScanPhase,
    pub current_path: Option<String>,
    pub scanned_files: u64,
    pub scanned_bytes: u64,
    pub errors: u64,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ScanPhase {
    WalkingFiles,
    Matching,
    Dedupe,
    Clustering,
    Done,
}

/// Immutable snapshot of one scanned file. A rescan produces a fresh
/// snapshot rather than mutating an existing one; `path` is the identity
/// key within a scan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileItem {
    pub path: String,
    pub name: String,
    pub extension: String,
    pub size_bytes: u64,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
    pub kind: FileKind,
}

impl FileItem {
    pub fn from_path(path: &Path) -> Result<Self> {
        let metadata = std::fs::metadata(path)
            .with_context(|| format!("failed to read metadata for {}", path.display()))?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase())
            .unwrap_or_default();
        let kind = FileKind::from_extension(&extension);

        Ok(Self {
            path: path.to_string_lossy().to_string(),
            name,
            extension,
            size_bytes: metadata.len(),
            created: metadata.created().ok().map(DateTime::<Utc>::from),
            modified: metadata.modified().ok().map(DateTime::<Utc>::from),
            kind,
        })
    }

    /// Basename without its final extension.
    pub fn stem(&self) -> &str {
        match self.name.rfind('.') {
            Some(index) if index > 0 => &self.name[..index],
            _ => &self.name,
        }
    }

    pub fn parent(&self) -> String {
        Path::new(&self.path)
            .parent()
            .map(|parent| parent.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Document,
    Image,
    Video,
    Audio,
    Archive,
    Code,
    Other,
}

impl FileKind {
    pub fn from_extension(ext: &str) -> Self {
        match ext {
            "doc" | "docx" | "xls" | "xlsx" | "ppt" | "pptx" | "pdf" | "md" | "txt" | "rtf"
            | "pages" | "numbers" | "key" | "csv" => FileKind::Document,
            "jpg" | "jpeg" | "png" | "heic" | "gif" | "bmp" | "tiff" | "webp" | "svg" => {
                FileKind::Image
            }
            "mp4" | "mov" | "mkv" | "avi" | "webm" | "m4v" => FileKind::Video,
            "mp3" | "flac" | "wav" | "aac" | "m4a" | "ogg" => FileKind::Audio,
            "zip" | "7z" | "rar" | "tar" | "gz" | "bz2" | "xz" | "dmg" | "bak" => FileKind::Archive,
            "rs" | "py" | "ts" | "js" | "java" | "c" | "cpp" | "h" | "swift" | "go" | "rb"
            | "sh" | "html" | "css" | "json" | "yaml" | "toml" => FileKind::Code,
            _ => FileKind::Other,
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "document" => Some(FileKind::Document),
            "image" => Some(FileKind::Image),
            "video" => Some(FileKind::Video),
            "audio" => Some(FileKind::Audio),
            "archive" => Some(FileKind::Archive),
            "code" => Some(FileKind::Code),
            "other" => Some(FileKind::Other),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FileKind::Document => "document",
            FileKind::Image => "image",
            FileKind::Video => "video",
            FileKind::Audio => "audio",
            FileKind::Archive => "archive",
            FileKind::Code => "code",
            FileKind::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Move,
    Copy,
    Delete,
}

/// Opaque reference to a destination folder. The bookmark token is produced
/// and resolved by an external collaborator (a serialized security-scoped
/// handle on macOS); the engine only carries it around.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Destination {
    pub display_name: String,
    #[serde(default)]
    pub bookmark: Option<String>,
}

impl Destination {
    pub fn named(display_name: &str) -> Self {
        Self {
            display_name: display_name.to_string(),
            bookmark: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.display_name.is_empty() && self.bookmark.is_none()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogicalOperator {
    #[default]
    All,
    Any,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleCondition {
    ExtensionIs {
        extension: String,
    },
    KindIs {
        kind: FileKind,
    },
    OlderThanDays {
        days: i64,
        #[serde(default)]
        extension: Option<String>,
    },
    NameContains {
        substring: String,
    },
    LargerThan {
        bytes: u64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Rule {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub conditions: Vec<RuleCondition>,
    #[serde(default)]
    pub operator: LogicalOperator,
    pub action: ActionType,
    #[serde(default)]
    pub destination: Destination,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchResult {
    pub rule_id: String,
    pub rule_name: String,
    pub action: ActionType,
    pub destination: Destination,
    pub reasoning: String,
}

/// One unit of the organize plan, handed to an `ActionApplier`. The engine
/// never performs the move/copy/delete itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlannedAction {
    pub path: String,
    pub rule_id: String,
    pub rule_name: String,
    pub action: ActionType,
    pub destination: Destination,
    pub reasoning: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateGroupType {
    ExactDuplicate,
    VersionSeries,
    NearDuplicate,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    KeepFirst,
    KeepLatest,
    Review,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DuplicateGroup {
    pub id: String,
    pub group_type: DuplicateGroupType,
    pub description: String,
    /// Members with the recommended keeper first.
    pub files: Vec<FileItem>,
    pub potential_savings_bytes: u64,
    pub suggested_action: SuggestedAction,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClusterType {
    TemporalBurst,
    CompanionFiles,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClusterState {
    Pending,
    Organized,
    Dismissed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectCluster {
    pub id: String,
    /// Sorted member file paths, resolved against the current snapshot by
    /// the caller rather than held as live references.
    pub member_paths: Vec<String>,
    pub cluster_type: ClusterType,
    pub suggested_folder_name: String,
    pub description: String,
    pub state: ClusterState,
}

impl ProjectCluster {
    /// Stable key over the membership set. Organize/dismiss decisions are
    /// keyed by membership, so a changed member list yields a new key and
    /// the set gets re-evaluated on the next scan.
    pub fn membership_key(&self) -> String {
        membership_key(&self.member_paths)
    }

    pub fn mark_organized(&mut self) {
        self.state = ClusterState::Organized;
    }

    pub fn dismiss(&mut self) {
        self.state = ClusterState::Dismissed;
    }
}

pub fn membership_key(paths: &[String]) -> String {
    let mut sorted = paths
        .iter()
        .map(|path| path.to_lowercase())
        .collect::<Vec<_>>();
    sorted.sort();
    blake3::hash(sorted.join("\n").as_bytes())
        .to_hex()
        .to_string()
}

pub fn format_bytes(value: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    if value == 0 {
        return "0 B".to_string();
    }
    let mut size = value as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{value} B")
    } else {
        format!("{size:.1} {}", UNITS[unit])
    }
}
