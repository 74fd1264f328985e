use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::PersistenceError;
use crate::model::{membership_key, ClusterState, ClusterType, FileItem, ProjectCluster};
use crate::persist::{load_json, save_json};

#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub burst_window_minutes: i64,
    pub burst_min_files: usize,
    pub min_members: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            burst_window_minutes: 10,
            burst_min_files: 3,
            min_members: 2,
        }
    }
}

/// Proposes new pending clusters for the given files. A candidate whose
/// membership matches any previously seen cluster is suppressed, which keeps
/// re-scans from resurrecting suggestions the user already organized or
/// dismissed.
pub fn detect(
    files: &[FileItem],
    existing: &[ProjectCluster],
    config: &ClusterConfig,
) -> Vec<ProjectCluster> {
    let known_keys: HashSet<String> = existing
        .iter()
        .map(|cluster| membership_key(&cluster.member_paths))
        .collect();
    let settled_paths: HashSet<&str> = existing
        .iter()
        .filter(|cluster| cluster.state != ClusterState::Pending)
        .flat_map(|cluster| cluster.member_paths.iter().map(String::as_str))
        .collect();

    let mut ordered: Vec<&FileItem> = files
        .iter()
        .filter(|file| !settled_paths.contains(file.path.as_str()))
        .collect();
    ordered.sort_by(|a, b| a.path.cmp(&b.path));

    let mut consumed: HashSet<String> = HashSet::new();
    let mut clusters = Vec::new();

    detect_temporal_bursts(&ordered, config, &mut consumed, &mut clusters);
    detect_companions(&ordered, config, &mut consumed, &mut clusters);

    clusters.retain(|cluster| !known_keys.contains(&membership_key(&cluster.member_paths)));
    clusters
}

/// Files created in the same directory within a short window, like a photo
/// shoot or an export batch.
fn detect_temporal_bursts(
    ordered: &[&FileItem],
    config: &ClusterConfig,
    consumed: &mut HashSet<String>,
    clusters: &mut Vec<ProjectCluster>,
) {
    let mut by_parent: BTreeMap<String, Vec<&FileItem>> = BTreeMap::new();
    for file in ordered {
        if file.created.is_some() {
            by_parent.entry(file.parent()).or_default().push(file);
        }
    }

    for (parent, mut members) in by_parent {
        members.sort_by_key(|file| file.created);

        let mut index = 0;
        while index < members.len() {
            let mut burst = vec![members[index]];
            let mut cursor = index + 1;
            while cursor < members.len() {
                // The window is absolute, anchored at the first member; a
                // chain of small gaps does not stretch a burst past it.
                let elapsed = match (members[cursor].created, burst[0].created) {
                    (Some(next), Some(first)) => next - first,
                    _ => break,
                };
                if elapsed.num_minutes() > config.burst_window_minutes {
                    break;
                }
                burst.push(members[cursor]);
                cursor += 1;
            }

            if burst.len() >= config.burst_min_files {
                let day = burst[0]
                    .created
                    .map(|ts| ts.format("%Y-%m-%d").to_string())
                    .unwrap_or_default();
                let dirname = Path::new(&parent)
                    .file_name()
                    .map(|name| name.to_string_lossy().to_string())
                    .unwrap_or_else(|| parent.clone());
                let mut paths: Vec<String> =
                    burst.iter().map(|file| file.path.clone()).collect();
                paths.sort();
                for path in &paths {
                    consumed.insert(path.clone());
                }
                clusters.push(ProjectCluster {
                    id: Uuid::new_v4().to_string(),
                    cluster_type: ClusterType::TemporalBurst,
                    suggested_folder_name: format!("{dirname} {day}"),
                    description: format!(
                        "{} files created together within {} minute(s)",
                        paths.len(),
                        config.burst_window_minutes
                    ),
                    member_paths: paths,
                    state: ClusterState::Pending,
                });
            }
            index = cursor.max(index + 1);
        }
    }
}

/// Same stem, several extensions, one directory: a source file and its
/// derived outputs travelling together.
fn detect_companions(
    ordered: &[&FileItem],
    config: &ClusterConfig,
    consumed: &mut HashSet<String>,
    clusters: &mut Vec<ProjectCluster>,
) {
    let mut by_stem: BTreeMap<(String, String), Vec<&FileItem>> = BTreeMap::new();
    for file in ordered {
        if consumed.contains(&file.path) {
            continue;
        }
        let key = (file.parent(), file.stem().to_lowercase());
        by_stem.entry(key).or_default().push(file);
    }

    for ((_, stem), members) in by_stem {
        if members.len() < config.min_members {
            continue;
        }
        let distinct_extensions: HashSet<&str> = members
            .iter()
            .map(|file| file.extension.as_str())
            .collect();
        if distinct_extensions.len() < 2 {
            continue;
        }

        let mut paths: Vec<String> = members.iter().map(|file| file.path.clone()).collect();
        paths.sort();
        for path in &paths {
            consumed.insert(path.clone());
        }
        clusters.push(ProjectCluster {
            id: Uuid::new_v4().to_string(),
            cluster_type: ClusterType::CompanionFiles,
            suggested_folder_name: stem.clone(),
            description: format!(
                "{} companion files sharing the name '{}'",
                paths.len(),
                stem
            ),
            member_paths: paths,
            state: ClusterState::Pending,
        });
    }
}

/// Durable record of every cluster ever suggested, including organized and
/// dismissed ones. State transitions commit before they are acknowledged.
#[derive(Debug)]
pub struct ClusterStore {
    path: PathBuf,
    clusters: Vec<ProjectCluster>,
}

impl ClusterStore {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let path = path.into();
        let clusters: Vec<ProjectCluster> = load_json(&path)?.unwrap_or_default();
        Ok(Self { path, clusters })
    }

    pub fn clusters(&self) -> &[ProjectCluster] {
        &self.clusters
    }

    pub fn pending(&self) -> impl Iterator<Item = &ProjectCluster> {
        self.clusters
            .iter()
            .filter(|cluster| cluster.state == ClusterState::Pending)
    }

    /// Adds freshly detected clusters, skipping any membership the store has
    /// already seen in any state.
    pub fn absorb(&mut self, detected: Vec<ProjectCluster>) -> Result<usize, PersistenceError> {
        let known: HashSet<String> = self
            .clusters
            .iter()
            .map(|cluster| membership_key(&cluster.member_paths))
            .collect();
        let mut added = 0;
        for cluster in detected {
            if known.contains(&membership_key(&cluster.member_paths)) {
                continue;
            }
            self.clusters.push(cluster);
            added += 1;
        }
        if added > 0 {
            self.save()?;
        }
        Ok(added)
    }

    pub fn mark_organized(&mut self, id: &str) -> Result<(), PersistenceError> {
        self.transition(id, ProjectCluster::mark_organized)
    }

    pub fn dismiss(&mut self, id: &str) -> Result<(), PersistenceError> {
        self.transition(id, ProjectCluster::dismiss)
    }

    fn transition(
        &mut self,
        id: &str,
        change: fn(&mut ProjectCluster),
    ) -> Result<(), PersistenceError> {
        let cluster = self
            .clusters
            .iter_mut()
            .find(|cluster| cluster.id == id)
            .ok_or_else(|| PersistenceError::UnknownCluster(id.to_string()))?;
        change(cluster);
        self.save()
    }

    fn save(&self) -> Result<(), PersistenceError> {
        save_json(&self.path, &self.clusters)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use tempfile::TempDir;

    use super::{detect, ClusterConfig, ClusterStore};
    use crate::model::{ClusterState, ClusterType, FileItem, FileKind};

    fn file_at(parent: &str, name: &str, ext: &str, created_offset_minutes: i64) -> FileItem {
        let created = Utc::now() - Duration::minutes(1_000) + Duration::minutes(created_offset_minutes);
        FileItem {
            path: format!("{parent}/{name}"),
            name: name.to_string(),
            extension: ext.to_string(),
            size_bytes: 100,
            created: Some(created),
            modified: Some(created),
            kind: FileKind::from_extension(ext),
        }
    }

    #[test]
    fn burst_of_screenshots_clusters_by_creation_time() {
        let files = vec![
            file_at("/shots", "one.png", "png", 0),
            file_at("/shots", "two.png", "png", 3),
            file_at("/shots", "three.png", "png", 6),
            file_at("/shots", "later.png", "png", 600),
        ];

        let clusters = detect(&files, &[], &ClusterConfig::default());
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].cluster_type, ClusterType::TemporalBurst);
        assert_eq!(clusters[0].member_paths.len(), 3);
        assert_eq!(clusters[0].state, ClusterState::Pending);
        assert!(clusters[0].suggested_folder_name.starts_with("shots "));
    }

    #[test]
    fn small_gaps_do_not_stretch_a_burst_past_the_window() {
        // Gaps of 6 minutes each, but 12 minutes end to end exceeds the
        // 10-minute window, so no group reaches three members.
        let files = vec![
            file_at("/shots", "one.png", "png", 0),
            file_at("/shots", "two.png", "png", 6),
            file_at("/shots", "three.png", "png", 12),
        ];

        let clusters = detect(&files, &[], &ClusterConfig::default());
        assert!(clusters.is_empty());
    }

    #[test]
    fn companion_files_share_a_stem_across_extensions() {
        let files = vec![
            file_at("/work", "invoice.tex", "tex", 0),
            file_at("/work", "invoice.pdf", "pdf", 100),
            file_at("/work", "unrelated.txt", "txt", 200),
        ];

        let clusters = detect(&files, &[], &ClusterConfig::default());
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].cluster_type, ClusterType::CompanionFiles);
        assert_eq!(clusters[0].suggested_folder_name, "invoice");
    }

    #[test]
    fn dismissed_membership_is_never_suggested_again() {
        let files = vec![
            file_at("/work", "invoice.tex", "tex", 0),
            file_at("/work", "invoice.pdf", "pdf", 100),
        ];

        let first = detect(&files, &[], &ClusterConfig::default());
        assert_eq!(first.len(), 1);

        let mut dismissed = first[0].clone();
        dismissed.dismiss();
        let again = detect(&files, &[dismissed], &ClusterConfig::default());
        assert!(again.is_empty());
    }

    #[test]
    fn store_transitions_persist_across_reloads() {
        let temp = TempDir::new().expect("tempdir");
        let state_path = temp.path().join("clusters.json");

        let files = vec![
            file_at("/work", "demo.mov", "mov", 0),
            file_at("/work", "demo.srt", "srt", 5),
        ];
        let detected = detect(&files, &[], &ClusterConfig::default());
        let id = detected[0].id.clone();

        let mut store = ClusterStore::load(&state_path).expect("load");
        assert_eq!(store.absorb(detected).expect("absorb"), 1);
        store.mark_organized(&id).expect("organize");

        let reloaded = ClusterStore::load(&state_path).expect("reload");
        assert_eq!(reloaded.clusters().len(), 1);
        assert_eq!(reloaded.clusters()[0].state, ClusterState::Organized);
        assert_eq!(reloaded.pending().count(), 0);
    }

    #[test]
    fn unknown_cluster_id_is_an_error() {
        let temp = TempDir::new().expect("tempdir");
        let mut store = ClusterStore::load(temp.path().join("clusters.json")).expect("load");
        assert!(store.dismiss("missing").is_err());
    }
}
