use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{AccessError, ValidationError};
use crate::model::{
    ActionType, Destination, FileItem, LogicalOperator, MatchResult, PlannedAction, Rule,
    RuleCondition,
};

/// Resolves an opaque destination bookmark to a real path. Implemented by an
/// external collaborator; the engine never touches bookmark internals.
pub trait DestinationResolver {
    fn resolve(&self, destination: &Destination) -> Result<PathBuf, AccessError>;
}

/// Resolver for plain named folders rooted at a base directory. Destinations
/// backed by an opaque bookmark need a platform resolver and are rejected.
#[derive(Debug, Clone)]
pub struct NamedFolderResolver {
    pub base: PathBuf,
}

impl DestinationResolver for NamedFolderResolver {
    fn resolve(&self, destination: &Destination) -> Result<PathBuf, AccessError> {
        if destination.bookmark.is_some() {
            return Err(AccessError::Unresolvable(format!(
                "bookmark-backed destination '{}'",
                destination.display_name
            )));
        }
        let name = destination.display_name.trim();
        if name.is_empty() {
            return Err(AccessError::Unresolvable(
                "destination has no name".to_string(),
            ));
        }
        if Path::new(name).is_absolute() {
            Ok(PathBuf::from(name))
        } else {
            Ok(self.base.join(name))
        }
    }
}

/// Performs the actual move/copy/delete for one planned action. The engine
/// only builds plans; side effects live behind this seam. `target` is the
/// resolved destination path; delete actions carry none.
pub trait ActionApplier {
    fn apply(&mut self, action: &PlannedAction, target: Option<&Path>) -> Result<(), AccessError>;
}

/// Applier that records what would happen without touching the file system.
#[derive(Debug, Default)]
pub struct DryRunApplier {
    pub applied: Vec<(PlannedAction, Option<PathBuf>)>,
}

impl ActionApplier for DryRunApplier {
    fn apply(&mut self, action: &PlannedAction, target: Option<&Path>) -> Result<(), AccessError> {
        self.applied
            .push((action.clone(), target.map(Path::to_path_buf)));
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrganizePlan {
    pub planned: Vec<PlannedAction>,
    pub unmatched_files: u64,
}

/// Evaluates `rules` in list order against one file; the first enabled rule
/// whose combinator-composed condition set holds wins. Pure over its inputs:
/// `now` is injected so date conditions are reproducible.
pub fn evaluate(file: &FileItem, rules: &[Rule], now: DateTime<Utc>) -> Option<MatchResult> {
    for rule in rules {
        if !rule.enabled || rule.conditions.is_empty() {
            continue;
        }

        let mut matched_reasons = Vec::new();
        let mut all_hold = true;
        for condition in &rule.conditions {
            match condition_reason(condition, file, now) {
                Some(reason) => matched_reasons.push(reason),
                None => all_hold = false,
            }
        }

        let satisfied = match rule.operator {
            LogicalOperator::All => all_hold,
            LogicalOperator::Any => !matched_reasons.is_empty(),
        };
        if !satisfied {
            continue;
        }

        debug!(rule = %rule.name, file = %file.path, "rule matched");
        return Some(MatchResult {
            rule_id: rule.id.clone(),
            rule_name: rule.name.clone(),
            action: rule.action,
            destination: rule.destination.clone(),
            reasoning: format!(
                "Matched rule '{}' because {}",
                rule.name,
                matched_reasons.join(" and ")
            ),
        });
    }
    None
}

/// Returns a human-readable reason when the condition holds, `None` when it
/// does not. Date conditions compare at day granularity; a file without a
/// modification timestamp never satisfies an age condition.
fn condition_reason(
    condition: &RuleCondition,
    file: &FileItem,
    now: DateTime<Utc>,
) -> Option<String> {
    match condition {
        RuleCondition::ExtensionIs { extension } => {
            if file.extension.eq_ignore_ascii_case(extension.trim_start_matches('.')) {
                Some(format!("extension is .{}", file.extension))
            } else {
                None
            }
        }
        RuleCondition::KindIs { kind } => {
            if file.kind == *kind {
                Some(format!("file kind is {}", kind.label()))
            } else {
                None
            }
        }
        RuleCondition::OlderThanDays { days, extension } => {
            // A non-positive threshold (possible in hand-edited state files)
            // never matches.
            if *days <= 0 {
                return None;
            }
            if let Some(filter) = extension {
                if !file
                    .extension
                    .eq_ignore_ascii_case(filter.trim_start_matches('.'))
                {
                    return None;
                }
            }
            let age = age_in_days(now, file.modified?);
            if age >= *days {
                Some(format!("last modified {age} day(s) ago (threshold {days})"))
            } else {
                None
            }
        }
        RuleCondition::NameContains { substring } => {
            if file.name.to_lowercase().contains(&substring.to_lowercase()) {
                Some(format!("name contains '{substring}'"))
            } else {
                None
            }
        }
        RuleCondition::LargerThan { bytes } => {
            if file.size_bytes > *bytes {
                Some(format!("size {} exceeds {} bytes", file.size_bytes, bytes))
            } else {
                None
            }
        }
    }
}

/// Whole days elapsed, truncated to calendar-day granularity so an 11:59pm
/// edit and a 00:01am edit on the same day age identically.
fn age_in_days(now: DateTime<Utc>, modified: DateTime<Utc>) -> i64 {
    (now.date_naive() - modified.date_naive()).num_days()
}

pub fn validate_rule(rule: &Rule) -> Result<(), ValidationError> {
    if rule.name.trim().is_empty() {
        return Err(ValidationError::EmptyRuleName);
    }
    if rule.conditions.is_empty() {
        return Err(ValidationError::NoConditions);
    }
    for condition in &rule.conditions {
        if let RuleCondition::OlderThanDays { days, .. } = condition {
            if *days <= 0 {
                return Err(ValidationError::NonPositiveDays(*days));
            }
        }
    }
    if matches!(rule.action, ActionType::Move | ActionType::Copy) && rule.destination.is_empty() {
        return Err(ValidationError::MissingDestination(rule.action));
    }
    Ok(())
}

/// Evaluates every file and collects planned actions for matched ones.
pub fn plan_actions(files: &[FileItem], rules: &[Rule], now: DateTime<Utc>) -> OrganizePlan {
    let mut plan = OrganizePlan::default();
    for file in files {
        match evaluate(file, rules, now) {
            Some(result) => plan.planned.push(PlannedAction {
                path: file.path.clone(),
                rule_id: result.rule_id,
                rule_name: result.rule_name,
                action: result.action,
                destination: result.destination,
                reasoning: result.reasoning,
            }),
            None => plan.unmatched_files += 1,
        }
    }
    plan
}

/// Resolves each destination, then feeds the action through an applier.
/// Failures accumulate as warnings so one revoked destination does not abort
/// the rest of the plan.
pub fn apply_plan(
    plan: &OrganizePlan,
    resolver: &dyn DestinationResolver,
    applier: &mut dyn ActionApplier,
) -> Vec<String> {
    let mut warnings = Vec::new();
    for action in &plan.planned {
        let target = match action.action {
            ActionType::Delete => None,
            ActionType::Move | ActionType::Copy => {
                match resolver.resolve(&action.destination) {
                    Ok(path) => Some(path),
                    Err(err) => {
                        warnings.push(format!(
                            "cannot resolve destination '{}' for {}: {}",
                            action.destination.display_name, action.path, err
                        ));
                        continue;
                    }
                }
            }
        };
        if let Err(err) = applier.apply(action, target.as_deref()) {
            warnings.push(format!("apply failed for {}: {}", action.path, err));
        }
    }
    warnings
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use std::path::PathBuf;

    use super::{
        apply_plan, evaluate, plan_actions, validate_rule, DryRunApplier, NamedFolderResolver,
    };
    use crate::error::ValidationError;
    use crate::model::{
        ActionType, Destination, FileItem, FileKind, LogicalOperator, Rule, RuleCondition,
    };

    fn file(name: &str, ext: &str, age_days: i64) -> FileItem {
        FileItem {
            path: format!("/scan/{name}"),
            name: name.to_string(),
            extension: ext.to_string(),
            size_bytes: 2048,
            created: Some(Utc::now() - Duration::days(age_days)),
            modified: Some(Utc::now() - Duration::days(age_days)),
            kind: FileKind::from_extension(ext),
        }
    }

    fn rule(id: &str, name: &str, enabled: bool, conditions: Vec<RuleCondition>) -> Rule {
        Rule {
            id: id.to_string(),
            name: name.to_string(),
            enabled,
            conditions,
            operator: LogicalOperator::All,
            action: ActionType::Move,
            destination: Destination::named("Documents"),
        }
    }

    #[test]
    fn first_enabled_matching_rule_wins() {
        let pdf = file("report.pdf", "pdf", 1);
        let rules = vec![
            rule(
                "r1",
                "PDFs first",
                true,
                vec![RuleCondition::ExtensionIs {
                    extension: "pdf".to_string(),
                }],
            ),
            rule(
                "r2",
                "Documents later",
                true,
                vec![RuleCondition::KindIs {
                    kind: FileKind::Document,
                }],
            ),
        ];

        let result = evaluate(&pdf, &rules, Utc::now()).expect("match");
        assert_eq!(result.rule_id, "r1");
        assert!(result.reasoning.contains("extension is .pdf"));
    }

    #[test]
    fn disabling_the_winner_promotes_the_next_satisfying_rule() {
        let pdf = file("report.pdf", "pdf", 1);
        let rules = vec![
            rule(
                "r1",
                "PDFs first",
                false,
                vec![RuleCondition::ExtensionIs {
                    extension: "pdf".to_string(),
                }],
            ),
            rule(
                "r2",
                "Documents later",
                true,
                vec![RuleCondition::KindIs {
                    kind: FileKind::Document,
                }],
            ),
        ];

        let result = evaluate(&pdf, &rules, Utc::now()).expect("match");
        assert_eq!(result.rule_id, "r2");
    }

    #[test]
    fn all_operator_requires_every_condition() {
        let fresh_pdf = file("notes.pdf", "pdf", 2);
        let rules = vec![rule(
            "r1",
            "Old PDFs",
            true,
            vec![
                RuleCondition::ExtensionIs {
                    extension: "pdf".to_string(),
                },
                RuleCondition::OlderThanDays {
                    days: 30,
                    extension: None,
                },
            ],
        )];

        assert!(evaluate(&fresh_pdf, &rules, Utc::now()).is_none());

        let stale_pdf = file("archive.pdf", "pdf", 45);
        let result = evaluate(&stale_pdf, &rules, Utc::now()).expect("match");
        assert!(result.reasoning.contains("threshold 30"));
    }

    #[test]
    fn any_operator_matches_on_a_single_condition() {
        let image = file("photo.jpg", "jpg", 1);
        let mut any_rule = rule(
            "r1",
            "Images or giants",
            true,
            vec![
                RuleCondition::KindIs {
                    kind: FileKind::Image,
                },
                RuleCondition::LargerThan {
                    bytes: 1024 * 1024 * 1024,
                },
            ],
        );
        any_rule.operator = LogicalOperator::Any;

        let result = evaluate(&image, &[any_rule], Utc::now()).expect("match");
        assert!(result.reasoning.contains("file kind is image"));
        assert!(!result.reasoning.contains("exceeds"));
    }

    #[test]
    fn missing_modified_timestamp_fails_age_conditions() {
        let mut orphan = file("old.log", "log", 400);
        orphan.modified = None;
        let rules = vec![rule(
            "r1",
            "Stale logs",
            true,
            vec![RuleCondition::OlderThanDays {
                days: 30,
                extension: None,
            }],
        )];
        assert!(evaluate(&orphan, &rules, Utc::now()).is_none());
    }

    #[test]
    fn validation_rejects_malformed_rules() {
        let mut bad = rule("r1", "", true, Vec::new());
        assert_eq!(validate_rule(&bad), Err(ValidationError::EmptyRuleName));

        bad.name = "named".to_string();
        assert_eq!(validate_rule(&bad), Err(ValidationError::NoConditions));

        bad.conditions = vec![RuleCondition::OlderThanDays {
            days: 0,
            extension: None,
        }];
        assert_eq!(validate_rule(&bad), Err(ValidationError::NonPositiveDays(0)));

        bad.conditions = vec![RuleCondition::ExtensionIs {
            extension: "pdf".to_string(),
        }];
        bad.destination = Destination::default();
        assert_eq!(
            validate_rule(&bad),
            Err(ValidationError::MissingDestination(ActionType::Move))
        );
    }

    #[test]
    fn non_positive_day_thresholds_never_match() {
        let ancient = file("old.log", "log", 4000);
        for days in [0, -5] {
            let rules = vec![rule(
                "r1",
                "Everything ever",
                true,
                vec![RuleCondition::OlderThanDays {
                    days,
                    extension: None,
                }],
            )];
            assert!(evaluate(&ancient, &rules, Utc::now()).is_none());
        }
    }

    #[test]
    fn plan_counts_unmatched_and_dry_run_applies_everything() {
        let files = vec![file("a.pdf", "pdf", 1), file("b.xyz", "xyz", 1)];
        let rules = vec![rule(
            "r1",
            "PDFs",
            true,
            vec![RuleCondition::ExtensionIs {
                extension: "pdf".to_string(),
            }],
        )];

        let plan = plan_actions(&files, &rules, Utc::now());
        assert_eq!(plan.planned.len(), 1);
        assert_eq!(plan.unmatched_files, 1);

        let resolver = NamedFolderResolver {
            base: PathBuf::from("/organized"),
        };
        let mut applier = DryRunApplier::default();
        let warnings = apply_plan(&plan, &resolver, &mut applier);
        assert!(warnings.is_empty());
        assert_eq!(applier.applied.len(), 1);

        let (action, target) = &applier.applied[0];
        assert_eq!(action.destination.display_name, "Documents");
        assert_eq!(target.as_deref(), Some(PathBuf::from("/organized/Documents").as_path()));
    }

    #[test]
    fn unresolvable_destinations_degrade_to_warnings() {
        let files = vec![file("a.pdf", "pdf", 1)];
        let mut vault_rule = rule(
            "r1",
            "PDFs",
            true,
            vec![RuleCondition::ExtensionIs {
                extension: "pdf".to_string(),
            }],
        );
        vault_rule.destination = Destination {
            display_name: "Vault".to_string(),
            bookmark: Some("b64-opaque".to_string()),
        };

        let plan = plan_actions(&files, &[vault_rule], Utc::now());
        let resolver = NamedFolderResolver {
            base: PathBuf::from("/organized"),
        };
        let mut applier = DryRunApplier::default();
        let warnings = apply_plan(&plan, &resolver, &mut applier);

        assert!(applier.applied.is_empty());
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("Vault"));
    }
}
