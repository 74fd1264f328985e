use std::fs;
use std::path::Path;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::PersistenceError;
use crate::learn::LearnedPattern;
use crate::model::{ProjectCluster, Rule};

/// Everything the engine keeps between runs: the rule list, the full cluster
/// history, and learned patterns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineState {
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub clusters: Vec<ProjectCluster>,
    #[serde(default)]
    pub patterns: Vec<LearnedPattern>,
}

/// Missing file means a fresh install, not an error.
pub fn load_state(path: &Path) -> Result<EngineState, PersistenceError> {
    Ok(load_json(path)?.unwrap_or_default())
}

pub fn save_state(path: &Path, state: &EngineState) -> Result<(), PersistenceError> {
    save_json(path, state)
}

pub(crate) fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, PersistenceError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|source| PersistenceError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let value = serde_json::from_str(&raw).map_err(|source| PersistenceError::Parse {
        path: path.display().to_string(),
        source,
    })?;
    Ok(Some(value))
}

pub(crate) fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<(), PersistenceError> {
    let raw =
        serde_json::to_string_pretty(value).map_err(|source| PersistenceError::Serialize {
            path: path.display().to_string(),
            source,
        })?;
    fs::write(path, raw).map_err(|source| PersistenceError::Write {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::{load_state, save_state, EngineState};
    use crate::model::{ActionType, Destination, LogicalOperator, Rule, RuleCondition};

    #[test]
    fn missing_state_file_yields_defaults() {
        let temp = TempDir::new().expect("tempdir");
        let state = load_state(&temp.path().join("absent.json")).expect("load");
        assert!(state.rules.is_empty());
        assert!(state.clusters.is_empty());
        assert!(state.patterns.is_empty());
    }

    #[test]
    fn state_round_trips_through_disk() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("state.json");

        let mut state = EngineState::default();
        state.rules.push(Rule {
            id: "r1".to_string(),
            name: "PDFs".to_string(),
            enabled: true,
            conditions: vec![RuleCondition::ExtensionIs {
                extension: "pdf".to_string(),
            }],
            operator: LogicalOperator::All,
            action: ActionType::Move,
            destination: Destination::named("Documents"),
        });

        save_state(&path, &state).expect("save");
        let loaded = load_state(&path).expect("reload");
        assert_eq!(loaded.rules.len(), 1);
        assert_eq!(loaded.rules[0].name, "PDFs");
    }

    #[test]
    fn garbage_on_disk_is_a_parse_error() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("state.json");
        std::fs::write(&path, "not json at all").expect("write");
        assert!(load_state(&path).is_err());
    }
}
