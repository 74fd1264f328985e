use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::model::{ActionType, Destination, LogicalOperator, Rule, RuleCondition};

#[derive(Debug, Clone)]
pub struct LearnConfig {
    pub min_occurrences: u32,
    pub min_confidence: f32,
    /// Scans a pattern sits out after a rejection.
    pub cooldown_scans: u32,
    pub max_rejections: u32,
}

impl Default for LearnConfig {
    fn default() -> Self {
        Self {
            min_occurrences: 3,
            min_confidence: 0.7,
            cooldown_scans: 3,
            max_rejections: 3,
        }
    }
}

/// One observed habit: files with this extension keep landing in this
/// destination. Keyed by (extension, destination_path).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnedPattern {
    pub id: String,
    pub extension: String,
    pub destination_path: String,
    pub occurrence_count: u32,
    pub confidence: f32,
    pub description: String,
    #[serde(default)]
    pub rejection_count: u32,
    #[serde(default)]
    pub cooldown_scans_remaining: u32,
    #[serde(default)]
    pub retired: bool,
}

/// Tracks manual filing habits and promotes the consistent ones to rule
/// suggestions. Rejections decay a pattern instead of deleting it, so a
/// habit the user resumes later can recover.
#[derive(Debug, Default)]
pub struct PatternLearner {
    pub patterns: Vec<LearnedPattern>,
    pub config: LearnConfig,
}

impl PatternLearner {
    pub fn new(patterns: Vec<LearnedPattern>, config: LearnConfig) -> Self {
        Self { patterns, config }
    }

    /// The user manually filed a file of this extension into this folder.
    pub fn record_acceptance(&mut self, extension: &str, destination_path: &str) {
        let ext = extension.trim_start_matches('.').to_lowercase();
        if let Some(pattern) = self.find_mut(&ext, destination_path) {
            pattern.occurrence_count += 1;
            pattern.confidence += (1.0 - pattern.confidence) * 0.25;
            debug!(
                extension = %pattern.extension,
                occurrences = pattern.occurrence_count,
                confidence = pattern.confidence,
                "pattern reinforced"
            );
            return;
        }
        self.patterns.push(LearnedPattern {
            id: Uuid::new_v4().to_string(),
            description: format!("You usually move .{ext} files to {destination_path}"),
            extension: ext,
            destination_path: destination_path.to_string(),
            occurrence_count: 1,
            confidence: 0.25,
            rejection_count: 0,
            cooldown_scans_remaining: 0,
            retired: false,
        });
    }

    /// The user declined a suggestion built from this pattern. Confidence
    /// halves, a cooldown starts, and repeated rejections retire it.
    pub fn record_rejection(&mut self, extension: &str, destination_path: &str) {
        let max_rejections = self.config.max_rejections;
        let cooldown = self.config.cooldown_scans;
        let ext = extension.trim_start_matches('.').to_lowercase();
        if let Some(pattern) = self.find_mut(&ext, destination_path) {
            pattern.confidence *= 0.5;
            pattern.rejection_count += 1;
            pattern.cooldown_scans_remaining = cooldown;
            if pattern.rejection_count >= max_rejections {
                pattern.retired = true;
            }
        }
    }

    /// Called once per scan to tick cooldowns down.
    pub fn begin_scan(&mut self) {
        for pattern in &mut self.patterns {
            if pattern.cooldown_scans_remaining > 0 {
                pattern.cooldown_scans_remaining -= 1;
            }
        }
    }

    /// Patterns strong enough to show the user, strongest first.
    pub fn suggestable_patterns(&self) -> Vec<&LearnedPattern> {
        let mut eligible: Vec<&LearnedPattern> = self
            .patterns
            .iter()
            .filter(|pattern| {
                !pattern.retired
                    && pattern.cooldown_scans_remaining == 0
                    && pattern.occurrence_count >= self.config.min_occurrences
                    && pattern.confidence >= self.config.min_confidence
            })
            .collect();
        eligible.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| b.occurrence_count.cmp(&a.occurrence_count))
                .then_with(|| a.extension.cmp(&b.extension))
        });
        eligible
    }

    /// Builds a rule from an accepted suggestion and retires the pattern so
    /// it stops competing with the rule it produced.
    pub fn promote(
        &mut self,
        extension: &str,
        destination_path: &str,
        destination: Destination,
    ) -> Option<Rule> {
        let ext = extension.trim_start_matches('.').to_lowercase();
        let pattern = self.find_mut(&ext, destination_path)?;
        pattern.retired = true;
        Some(Rule {
            id: Uuid::new_v4().to_string(),
            name: format!("Move .{ext} files to {}", destination.display_name),
            enabled: true,
            conditions: vec![RuleCondition::ExtensionIs { extension: ext }],
            operator: LogicalOperator::All,
            action: ActionType::Move,
            destination,
        })
    }

    fn find_mut(&mut self, extension: &str, destination_path: &str) -> Option<&mut LearnedPattern> {
        self.patterns.iter_mut().find(|pattern| {
            pattern.extension == extension && pattern.destination_path == destination_path
        })
    }
}
