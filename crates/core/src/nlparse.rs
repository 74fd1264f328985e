//! Deterministic parser for plain-English organizing requests. Parsing is
//! total: any input produces a `ParsedRule`, with gaps reported as issues and
//! uncertain readings tagged for follow-up rather than guessed silently.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::model::{ActionType, Destination, FileKind, LogicalOperator, Rule, RuleCondition};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClauseKind {
    Action,
    FileType,
    Extension,
    TimePhrase,
    Destination,
    Grouping,
}

/// A reading the parser refuses to finalize on its own. Each tag maps to one
/// clarification question and one resolution transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguityTag {
    AmbiguousTimePhrase,
    AmbiguousGrouping,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedClause {
    pub kind: ClauseKind,
    /// The input fragment this clause was read from.
    pub text: String,
    pub value: String,
    pub confidence: f32,
    #[serde(default)]
    pub ambiguities: BTreeSet<AmbiguityTag>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeConstraint {
    pub days: i64,
    pub source_text: String,
    /// True while the day count is a placeholder pending clarification.
    pub provisional: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupingStrategy {
    CreatedMonth,
    ModifiedMonth,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedRule {
    pub text: String,
    pub clauses: Vec<ParsedClause>,
    pub time_constraints: Vec<TimeConstraint>,
    pub candidate_conditions: Vec<RuleCondition>,
    pub primary_action: Option<ActionType>,
    pub destination_path: Option<String>,
    pub logical_operator: LogicalOperator,
    pub grouping: Option<GroupingStrategy>,
    /// Minimum clause confidence; 0.0 when nothing was recognized.
    pub overall_confidence: f32,
    pub issues: Vec<String>,
}

impl ParsedRule {
    pub fn outstanding_ambiguities(&self) -> BTreeSet<AmbiguityTag> {
        self.clauses
            .iter()
            .flat_map(|clause| clause.ambiguities.iter().copied())
            .collect()
    }
}

static ACTION_STRONG: Lazy<Vec<(Regex, ActionType)>> = Lazy::new(|| {
    vec![
        (action_regex(r"move|put|file away"), ActionType::Move),
        (action_regex(r"copy|duplicate"), ActionType::Copy),
        (action_regex(r"delete|remove|trash"), ActionType::Delete),
    ]
});
static ACTION_SOFT: Lazy<Regex> = Lazy::new(|| action_regex(r"organize|organise|clean up|tidy"));
static EXTENSION_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\.([a-z0-9]{1,8})\b").expect("extension token regex"));
static OLDER_THAN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"older than (\d+) (day|week|month|year)s?").expect("older-than regex")
});
static LAST_PERIOD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:from )?last (week|month|year)").expect("last-period regex"));
static DESTINATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:to|into)\s+([^\s,]+)").expect("destination regex"));
static GROUPING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bby (month|date|year)\b").expect("grouping regex"));
static PDF_NOUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bpdfs?\b").expect("pdf noun regex"));

fn action_regex(verbs: &str) -> Regex {
    Regex::new(&format!(r"\b(?:{verbs})\b")).expect("action verb regex")
}

const FILE_TYPE_NOUNS: &[(&str, FileKind)] = &[
    ("documents", FileKind::Document),
    ("docs", FileKind::Document),
    ("images", FileKind::Image),
    ("photos", FileKind::Image),
    ("pictures", FileKind::Image),
    ("screenshots", FileKind::Image),
    ("videos", FileKind::Video),
    ("movies", FileKind::Video),
    ("music", FileKind::Audio),
    ("songs", FileKind::Audio),
    ("archives", FileKind::Archive),
];

pub fn parse(text: &str) -> ParsedRule {
    let normalized = text.trim().to_lowercase();
    let mut clauses = Vec::new();
    let mut issues = Vec::new();

    // The destination span is masked out before token scanning; a path like
    // "/backup/archive.zip" names where files go, not a .zip condition.
    let mut scannable = normalized.clone();
    if let Some(found) = DESTINATION.find(&normalized) {
        scannable.replace_range(found.range(), &" ".repeat(found.as_str().len()));
    }

    let primary_action = parse_action(&normalized, &mut clauses);
    parse_extensions(&scannable, &mut clauses);
    parse_file_types(&scannable, &mut clauses);
    parse_time_phrases(&scannable, &mut clauses);
    let destination_path = parse_destination(&normalized, &mut clauses);
    let grouping = parse_grouping(&normalized, &mut clauses);

    if clauses.is_empty() {
        issues.push("no recognizable clauses in the request".to_string());
    }
    if primary_action.is_none() && !clauses.is_empty() {
        issues.push("no action verb recognized; defaulting to nothing".to_string());
    }
    if matches!(primary_action, Some(ActionType::Move | ActionType::Copy))
        && destination_path.is_none()
    {
        issues.push("no destination recognized for a move/copy request".to_string());
    }

    let mut parsed = ParsedRule {
        text: text.to_string(),
        clauses,
        time_constraints: Vec::new(),
        candidate_conditions: Vec::new(),
        primary_action,
        destination_path,
        // Spoken constraints stack ("old AND large AND pdf"), so the default
        // combinator is conjunction.
        logical_operator: LogicalOperator::All,
        grouping,
        overall_confidence: 0.0,
        issues,
    };
    refresh_derived(&mut parsed);
    parsed
}

fn parse_action(text: &str, clauses: &mut Vec<ParsedClause>) -> Option<ActionType> {
    for (pattern, action) in ACTION_STRONG.iter() {
        if let Some(found) = pattern.find(text) {
            clauses.push(ParsedClause {
                kind: ClauseKind::Action,
                text: found.as_str().to_string(),
                value: action_label(*action).to_string(),
                confidence: 0.95,
                ambiguities: BTreeSet::new(),
            });
            return Some(*action);
        }
    }
    if let Some(found) = ACTION_SOFT.find(text) {
        clauses.push(ParsedClause {
            kind: ClauseKind::Action,
            text: found.as_str().to_string(),
            value: action_label(ActionType::Move).to_string(),
            confidence: 0.6,
            ambiguities: BTreeSet::new(),
        });
        return Some(ActionType::Move);
    }
    None
}

fn parse_extensions(text: &str, clauses: &mut Vec<ParsedClause>) {
    let mut seen = BTreeSet::new();
    for captures in EXTENSION_TOKEN.captures_iter(text) {
        let ext = captures[1].to_string();
        if seen.insert(ext.clone()) {
            clauses.push(ParsedClause {
                kind: ClauseKind::Extension,
                text: captures[0].to_string(),
                value: ext,
                confidence: 0.95,
                ambiguities: BTreeSet::new(),
            });
        }
    }
    // "pdfs" reads as an extension even without the dot.
    if !seen.contains("pdf") && PDF_NOUN.is_match(text) {
        clauses.push(ParsedClause {
            kind: ClauseKind::Extension,
            text: "pdf".to_string(),
            value: "pdf".to_string(),
            confidence: 0.9,
            ambiguities: BTreeSet::new(),
        });
    }
}

fn parse_file_types(text: &str, clauses: &mut Vec<ParsedClause>) {
    let mut seen: Vec<FileKind> = Vec::new();
    for (noun, kind) in FILE_TYPE_NOUNS {
        if text.contains(noun) && !seen.contains(kind) {
            seen.push(*kind);
            clauses.push(ParsedClause {
                kind: ClauseKind::FileType,
                text: (*noun).to_string(),
                value: kind.label().to_string(),
                confidence: if *noun == "documents" { 0.8 } else { 0.85 },
                ambiguities: BTreeSet::new(),
            });
        }
    }
}

fn parse_time_phrases(text: &str, clauses: &mut Vec<ParsedClause>) {
    for captures in OLDER_THAN.captures_iter(text) {
        let count: i64 = captures[1].parse().unwrap_or(0);
        let (days, confidence, ambiguous) = match &captures[2] {
            "day" => (count, 0.9, false),
            "week" => (count * 7, 0.9, false),
            // Calendar units have no fixed day length; the conversion is a
            // placeholder until the user confirms a threshold.
            "month" => (count * 30, 0.6, true),
            _ => (count * 365, 0.6, true),
        };
        let mut ambiguities = BTreeSet::new();
        if ambiguous {
            ambiguities.insert(AmbiguityTag::AmbiguousTimePhrase);
        }
        clauses.push(ParsedClause {
            kind: ClauseKind::TimePhrase,
            text: captures[0].to_string(),
            value: days.to_string(),
            confidence,
            ambiguities,
        });
    }

    for captures in LAST_PERIOD.captures_iter(text) {
        let days = match &captures[1] {
            "week" => 7,
            "month" => 30,
            _ => 365,
        };
        let mut ambiguities = BTreeSet::new();
        // "from last month" could mean created then or older than that.
        ambiguities.insert(AmbiguityTag::AmbiguousTimePhrase);
        clauses.push(ParsedClause {
            kind: ClauseKind::TimePhrase,
            text: captures[0].to_string(),
            value: days.to_string(),
            confidence: 0.6,
            ambiguities,
        });
    }
}

fn parse_destination(text: &str, clauses: &mut Vec<ParsedClause>) -> Option<String> {
    let captures = DESTINATION.captures(text)?;
    let raw = captures[1].trim_end_matches(['.', '!', '?']).to_string();
    let confidence = if raw.starts_with('/') || raw.starts_with('~') {
        0.9
    } else {
        0.7
    };
    clauses.push(ParsedClause {
        kind: ClauseKind::Destination,
        text: captures[0].to_string(),
        value: raw.clone(),
        confidence,
        ambiguities: BTreeSet::new(),
    });
    Some(raw)
}

fn parse_grouping(text: &str, clauses: &mut Vec<ParsedClause>) -> Option<GroupingStrategy> {
    let captures = GROUPING.captures(text)?;
    let mut ambiguities = BTreeSet::new();
    ambiguities.insert(AmbiguityTag::AmbiguousGrouping);
    clauses.push(ParsedClause {
        kind: ClauseKind::Grouping,
        text: captures[0].to_string(),
        value: "modified_month".to_string(),
        confidence: 0.5,
        ambiguities,
    });
    // Provisional reading until the user picks created vs modified.
    Some(GroupingStrategy::ModifiedMonth)
}

/// Rebuilds everything derived from the clause list so resolution transforms
/// only need to edit clauses.
fn refresh_derived(parsed: &mut ParsedRule) {
    parsed.time_constraints = parsed
        .clauses
        .iter()
        .filter(|clause| clause.kind == ClauseKind::TimePhrase)
        .map(|clause| TimeConstraint {
            days: clause.value.parse().unwrap_or(0),
            source_text: clause.text.clone(),
            provisional: clause.ambiguities.contains(&AmbiguityTag::AmbiguousTimePhrase),
        })
        .collect();

    let mut conditions = Vec::new();
    for clause in &parsed.clauses {
        match clause.kind {
            ClauseKind::Extension => conditions.push(RuleCondition::ExtensionIs {
                extension: clause.value.clone(),
            }),
            ClauseKind::FileType => {
                if let Some(kind) = FileKind::from_label(&clause.value) {
                    conditions.push(RuleCondition::KindIs { kind });
                }
            }
            ClauseKind::TimePhrase => {
                if let Ok(days) = clause.value.parse::<i64>() {
                    if days > 0 {
                        conditions.push(RuleCondition::OlderThanDays {
                            days,
                            extension: None,
                        });
                    }
                }
            }
            _ => {}
        }
    }
    parsed.candidate_conditions = conditions;

    parsed.overall_confidence = parsed
        .clauses
        .iter()
        .map(|clause| clause.confidence)
        .fold(f32::INFINITY, f32::min);
    if !parsed.overall_confidence.is_finite() {
        parsed.overall_confidence = 0.0;
    }
}

/// Finalizes every tagged time phrase with a user-confirmed day count. Pure:
/// clauses without the tag, the action, the destination, and any other
/// ambiguity pass through untouched.
pub fn resolve_time_phrase(parsed: &ParsedRule, days: i64) -> ParsedRule {
    let mut resolved = parsed.clone();
    for clause in &mut resolved.clauses {
        if clause.ambiguities.remove(&AmbiguityTag::AmbiguousTimePhrase) {
            clause.value = days.to_string();
            clause.confidence = 0.95;
        }
    }
    refresh_derived(&mut resolved);
    resolved
}

/// Finalizes a tagged grouping clause with the user's chosen strategy.
pub fn resolve_grouping(parsed: &ParsedRule, strategy: GroupingStrategy) -> ParsedRule {
    let mut resolved = parsed.clone();
    for clause in &mut resolved.clauses {
        if clause.ambiguities.remove(&AmbiguityTag::AmbiguousGrouping) {
            clause.value = match strategy {
                GroupingStrategy::CreatedMonth => "created_month".to_string(),
                GroupingStrategy::ModifiedMonth => "modified_month".to_string(),
            };
            clause.confidence = 0.95;
        }
    }
    resolved.grouping = Some(strategy);
    refresh_derived(&mut resolved);
    resolved
}

/// Converts a fully resolved parse into an executable rule. Refuses while any
/// ambiguity tag is outstanding.
pub fn to_rule(
    parsed: &ParsedRule,
    name: &str,
    fallback_destination: Option<Destination>,
) -> Result<Rule, ValidationError> {
    let outstanding = parsed.outstanding_ambiguities();
    if let Some(tag) = outstanding.iter().next() {
        return Err(ValidationError::UnresolvedAmbiguity(format!("{tag:?}")));
    }
    if name.trim().is_empty() {
        return Err(ValidationError::EmptyRuleName);
    }
    if parsed.candidate_conditions.is_empty() {
        return Err(ValidationError::NoConditions);
    }

    let action = parsed.primary_action.unwrap_or(ActionType::Move);
    let destination = match (&parsed.destination_path, fallback_destination) {
        (Some(path), _) => Destination::named(path),
        (None, Some(fallback)) => fallback,
        (None, None) => Destination::default(),
    };
    if matches!(action, ActionType::Move | ActionType::Copy) && destination.is_empty() {
        return Err(ValidationError::MissingDestination(action));
    }

    Ok(Rule {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        enabled: true,
        conditions: parsed.candidate_conditions.clone(),
        operator: parsed.logical_operator,
        action,
        destination,
    })
}

fn action_label(action: ActionType) -> &'static str {
    match action {
        ActionType::Move => "move",
        ActionType::Copy => "copy",
        ActionType::Delete => "delete",
    }
}

#[cfg(test)]
mod tests {
    use super::{
        parse, resolve_grouping, resolve_time_phrase, to_rule, AmbiguityTag, ClauseKind,
        GroupingStrategy,
    };
    use crate::model::{ActionType, RuleCondition};

    #[test]
    fn clear_request_parses_without_ambiguity() {
        let parsed = parse("Move .pdf files older than 30 days to /archive");

        assert_eq!(parsed.primary_action, Some(ActionType::Move));
        assert_eq!(parsed.destination_path.as_deref(), Some("/archive"));
        assert!(parsed.outstanding_ambiguities().is_empty());
        assert!(parsed.issues.is_empty());
        assert!(parsed.overall_confidence >= 0.9);
        assert!(parsed
            .candidate_conditions
            .contains(&RuleCondition::ExtensionIs {
                extension: "pdf".to_string()
            }));
        assert!(parsed
            .candidate_conditions
            .contains(&RuleCondition::OlderThanDays {
                days: 30,
                extension: None
            }));
    }

    #[test]
    fn destination_paths_never_become_extension_conditions() {
        let parsed = parse("move my files to /backup/archive.zip");

        assert_eq!(
            parsed.destination_path.as_deref(),
            Some("/backup/archive.zip")
        );
        assert!(parsed.candidate_conditions.is_empty());
        assert!(!parsed
            .clauses
            .iter()
            .any(|clause| clause.kind == ClauseKind::Extension));
    }

    #[test]
    fn month_thresholds_are_tagged_as_ambiguous() {
        let parsed = parse("delete downloads older than 2 months");
        assert!(parsed
            .outstanding_ambiguities()
            .contains(&AmbiguityTag::AmbiguousTimePhrase));
        // Provisional 30-day conversion until confirmed.
        assert_eq!(parsed.time_constraints[0].days, 60);
        assert!(parsed.time_constraints[0].provisional);
    }

    #[test]
    fn resolution_touches_only_the_tagged_clause() {
        let parsed = parse("move screenshots from last month to /shots by month");
        let before_action = parsed.primary_action;
        let before_destination = parsed.destination_path.clone();

        let resolved = resolve_time_phrase(&parsed, 45);

        assert_eq!(resolved.primary_action, before_action);
        assert_eq!(resolved.destination_path, before_destination);
        assert_eq!(resolved.time_constraints[0].days, 45);
        assert!(!resolved.time_constraints[0].provisional);
        // The grouping ambiguity is untouched by time resolution.
        assert!(resolved
            .outstanding_ambiguities()
            .contains(&AmbiguityTag::AmbiguousGrouping));

        let fully = resolve_grouping(&resolved, GroupingStrategy::CreatedMonth);
        assert!(fully.outstanding_ambiguities().is_empty());
        assert_eq!(fully.grouping, Some(GroupingStrategy::CreatedMonth));
    }

    #[test]
    fn empty_input_reports_issues_instead_of_failing() {
        let parsed = parse("");
        assert!(parsed.clauses.is_empty());
        assert!(!parsed.issues.is_empty());
        assert_eq!(parsed.overall_confidence, 0.0);
    }

    #[test]
    fn parsing_is_deterministic() {
        let a = parse("organize my photos by month");
        let b = parse("organize my photos by month");
        assert_eq!(a, b);
    }

    #[test]
    fn to_rule_refuses_unresolved_ambiguity() {
        let parsed = parse("move photos from last week to /old");
        assert!(to_rule(&parsed, "Old photos", None).is_err());

        let resolved = resolve_time_phrase(&parsed, 7);
        let rule = to_rule(&resolved, "Old photos", None).expect("rule");
        assert_eq!(rule.action, ActionType::Move);
        assert_eq!(rule.destination.display_name, "/old");
        assert_eq!(rule.conditions.len(), 2);
    }

    #[test]
    fn soft_verbs_lower_the_overall_confidence() {
        let tidy = parse("tidy up my documents");
        let explicit = parse("move my documents to /docs");
        assert!(tidy.overall_confidence < explicit.overall_confidence);
    }
}
