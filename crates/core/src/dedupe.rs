use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

use crate::model::{
    format_bytes, DuplicateGroup, DuplicateGroupType, FileItem, SuggestedAction,
};

/// Tunables for the grouping heuristics. The version-series and
/// near-duplicate ratios are estimates, not measurements, so they are
/// configuration rather than constants.
#[derive(Debug, Clone)]
pub struct DedupeConfig {
    pub min_size_bytes: u64,
    pub version_savings_ratio: f32,
    pub near_savings_ratio: f32,
    pub near_similarity_threshold: f32,
    pub fingerprint_bytes: usize,
    pub near_bucket_limit: usize,
}

impl Default for DedupeConfig {
    fn default() -> Self {
        Self {
            min_size_bytes: 1,
            version_savings_ratio: 0.5,
            near_savings_ratio: 0.25,
            near_similarity_threshold: 0.85,
            fingerprint_bytes: 64 * 1024,
            near_bucket_limit: 64,
        }
    }
}

static VERSION_SUFFIXES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\s*\(\d+\)$",
        r"[-_\s]v\d+$",
        r"[-_\s]copy(\s*\d+)?$",
        r"[-_\s]final(\s*\d+)?$",
        r"[-_\s]draft(\s*\d+)?$",
    ]
    .iter()
    .map(|pattern| Regex::new(&format!("(?i){pattern}")).expect("valid version suffix regex"))
    .collect()
});

/// Groups files into typed duplicate sets. Precedence is exact > version >
/// near; a file joins at most one group. Detection never fails: unreadable
/// files degrade to warnings and drop out of content-based checks.
pub fn detect(
    files: &[FileItem],
    config: &DedupeConfig,
    warnings: &mut Vec<String>,
) -> Vec<DuplicateGroup> {
    let mut ordered = files
        .iter()
        .filter(|file| file.size_bytes >= config.min_size_bytes)
        .collect::<Vec<_>>();
    ordered.sort_by(|a, b| a.path.cmp(&b.path));

    let mut groups = Vec::new();
    let mut grouped_paths: HashSet<String> = HashSet::new();

    detect_exact(&ordered, &mut groups, &mut grouped_paths, warnings);
    detect_version_series(&ordered, config, &mut groups, &mut grouped_paths);
    detect_near(&ordered, config, &mut groups, &mut grouped_paths, warnings);

    groups.sort_by(|a, b| {
        b.potential_savings_bytes
            .cmp(&a.potential_savings_bytes)
            .then_with(|| a.files[0].path.cmp(&b.files[0].path))
    });
    groups
}

pub fn total_potential_savings(groups: &[DuplicateGroup]) -> u64 {
    groups
        .iter()
        .map(|group| group.potential_savings_bytes)
        .fold(0_u64, u64::saturating_add)
}

fn detect_exact(
    ordered: &[&FileItem],
    groups: &mut Vec<DuplicateGroup>,
    grouped_paths: &mut HashSet<String>,
    warnings: &mut Vec<String>,
) {
    let mut by_size: HashMap<u64, Vec<&FileItem>> = HashMap::new();
    for file in ordered {
        by_size.entry(file.size_bytes).or_default().push(file);
    }

    let mut size_keys: Vec<u64> = by_size.keys().copied().collect();
    size_keys.sort_unstable_by(|a, b| b.cmp(a));

    for size in size_keys {
        let candidates = by_size.remove(&size).unwrap_or_default();
        if candidates.len() < 2 {
            continue;
        }

        let mut by_hash: HashMap<String, Vec<&FileItem>> = HashMap::new();
        for candidate in candidates {
            match hash_file(Path::new(&candidate.path)) {
                Ok(hash) => by_hash.entry(hash).or_default().push(candidate),
                Err(err) => warnings.push(format!(
                    "dedupe hash skipped for {}: {}",
                    candidate.path, err
                )),
            }
        }

        let mut hash_keys: Vec<String> = by_hash.keys().cloned().collect();
        hash_keys.sort();
        for hash in hash_keys {
            let mut members = by_hash.remove(&hash).unwrap_or_default();
            if members.len() < 2 {
                continue;
            }
            // Canonical keeper for byte-identical copies: shortest path,
            // then lexicographic.
            members.sort_by(|a, b| {
                a.path
                    .len()
                    .cmp(&b.path.len())
                    .then_with(|| a.path.cmp(&b.path))
            });

            for member in &members {
                grouped_paths.insert(member.path.clone());
            }
            let savings = size.saturating_mul(members.len() as u64 - 1);
            groups.push(DuplicateGroup {
                id: Uuid::new_v4().to_string(),
                group_type: DuplicateGroupType::ExactDuplicate,
                description: format!(
                    "{} byte-identical copies, {} each",
                    members.len(),
                    format_bytes(size)
                ),
                files: members.into_iter().cloned().collect(),
                potential_savings_bytes: savings,
                suggested_action: SuggestedAction::KeepFirst,
            });
        }
    }
}

fn detect_version_series(
    ordered: &[&FileItem],
    config: &DedupeConfig,
    groups: &mut Vec<DuplicateGroup>,
    grouped_paths: &mut HashSet<String>,
) {
    let mut by_stem: HashMap<(String, String, String), Vec<&FileItem>> = HashMap::new();
    for file in ordered {
        if grouped_paths.contains(&file.path) {
            continue;
        }
        let key = (
            file.parent().to_lowercase(),
            normalize_stem(file.stem()),
            file.extension.clone(),
        );
        by_stem.entry(key).or_default().push(file);
    }

    let mut keys: Vec<(String, String, String)> = by_stem.keys().cloned().collect();
    keys.sort();
    for key in keys {
        let mut members = by_stem.remove(&key).unwrap_or_default();
        if members.len() < 2 {
            continue;
        }
        // At least one member must actually carry a version suffix;
        // otherwise the shared stem is a coincidence, not a series.
        let has_suffix = members
            .iter()
            .any(|file| normalize_stem(file.stem()) != file.stem().to_lowercase());
        if !has_suffix {
            continue;
        }

        // Keeper is the most recently modified revision.
        members.sort_by(|a, b| {
            b.modified
                .cmp(&a.modified)
                .then_with(|| a.path.len().cmp(&b.path.len()))
                .then_with(|| a.path.cmp(&b.path))
        });

        for member in &members {
            grouped_paths.insert(member.path.clone());
        }
        let redundant: u64 = members[1..]
            .iter()
            .map(|file| file.size_bytes)
            .fold(0, u64::saturating_add);
        let savings = (redundant as f64 * config.version_savings_ratio as f64) as u64;
        groups.push(DuplicateGroup {
            id: Uuid::new_v4().to_string(),
            group_type: DuplicateGroupType::VersionSeries,
            description: format!("Version series '{}' with {} revisions", key.1, members.len()),
            files: members.into_iter().cloned().collect(),
            potential_savings_bytes: savings,
            suggested_action: SuggestedAction::KeepLatest,
        });
    }
}

fn detect_near(
    ordered: &[&FileItem],
    config: &DedupeConfig,
    groups: &mut Vec<DuplicateGroup>,
    grouped_paths: &mut HashSet<String>,
    warnings: &mut Vec<String>,
) {
    let mut by_extension: HashMap<String, Vec<&FileItem>> = HashMap::new();
    for file in ordered {
        if grouped_paths.contains(&file.path) {
            continue;
        }
        by_extension
            .entry(file.extension.clone())
            .or_default()
            .push(file);
    }

    let mut ext_keys: Vec<String> = by_extension.keys().cloned().collect();
    ext_keys.sort();
    for ext in ext_keys {
        let bucket = by_extension.remove(&ext).unwrap_or_default();
        if bucket.len() < 2 || bucket.len() > config.near_bucket_limit {
            continue;
        }

        let mut fingerprints: Vec<(&FileItem, BTreeSet<u64>)> = Vec::new();
        for file in bucket {
            match fingerprint(Path::new(&file.path), config.fingerprint_bytes) {
                Ok(Some(shingles)) => fingerprints.push((file, shingles)),
                Ok(None) => {}
                Err(err) => {
                    warnings.push(format!("fingerprint skipped for {}: {}", file.path, err))
                }
            }
        }

        let mut used = vec![false; fingerprints.len()];
        for seed in 0..fingerprints.len() {
            if used[seed] {
                continue;
            }
            let mut members = vec![fingerprints[seed].0];
            for other in seed + 1..fingerprints.len() {
                if used[other] {
                    continue;
                }
                let similarity = jaccard(&fingerprints[seed].1, &fingerprints[other].1);
                if similarity >= config.near_similarity_threshold {
                    used[other] = true;
                    members.push(fingerprints[other].0);
                }
            }
            if members.len() < 2 {
                continue;
            }
            used[seed] = true;

            members.sort_by(|a, b| {
                a.path
                    .len()
                    .cmp(&b.path.len())
                    .then_with(|| a.path.cmp(&b.path))
            });
            for member in &members {
                grouped_paths.insert(member.path.clone());
            }
            let redundant: u64 = members[1..]
                .iter()
                .map(|file| file.size_bytes)
                .fold(0, u64::saturating_add);
            let savings = (redundant as f64 * config.near_savings_ratio as f64) as u64;
            groups.push(DuplicateGroup {
                id: Uuid::new_v4().to_string(),
                group_type: DuplicateGroupType::NearDuplicate,
                description: format!("{} files with similar content (.{})", members.len(), ext),
                files: members.into_iter().cloned().collect(),
                potential_savings_bytes: savings,
                // Never auto-recommend deletion for an uncertain match.
                suggested_action: SuggestedAction::Review,
            });
        }
    }
}

/// Strips trailing version markers like " (1)", "_v2", "-copy", "_final 3"
/// until the stem is stable, then lowercases it.
pub fn normalize_stem(stem: &str) -> String {
    let mut current = stem.trim().to_string();
    loop {
        let mut next = current.clone();
        for suffix in VERSION_SUFFIXES.iter() {
            next = suffix.replace(&next, "").to_string();
        }
        let next = next.trim_end_matches(['-', '_', ' ']).to_string();
        if next == current {
            break;
        }
        current = next;
    }
    current.to_lowercase()
}

fn hash_file(path: &Path) -> Result<String> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut hasher = blake3::Hasher::new();
    let mut buffer = [0_u8; 64 * 1024];

    loop {
        let bytes_read = reader
            .read(&mut buffer)
            .with_context(|| format!("failed to read {}", path.display()))?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher.finalize().to_hex().to_string())
}

/// Byte-shingle fingerprint over the head of the file: the set of 8-byte
/// windows at a 4-byte stride. Returns `None` for files too small to shingle.
fn fingerprint(path: &Path, limit: usize) -> Result<Option<BTreeSet<u64>>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut reader = BufReader::new(file).take(limit as u64);
    let mut bytes = Vec::with_capacity(limit.min(64 * 1024));
    reader
        .read_to_end(&mut bytes)
        .with_context(|| format!("failed to read {}", path.display()))?;

    if bytes.len() < 8 {
        return Ok(None);
    }

    let mut shingles = BTreeSet::new();
    let mut offset = 0;
    while offset + 8 <= bytes.len() {
        let mut window = 0_u64;
        for &byte in &bytes[offset..offset + 8] {
            window = (window << 8) | u64::from(byte);
        }
        shingles.insert(window);
        offset += 4;
    }
    Ok(Some(shingles))
}

fn jaccard(a: &BTreeSet<u64>, b: &BTreeSet<u64>) -> f32 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    intersection as f32 / union as f32
}
