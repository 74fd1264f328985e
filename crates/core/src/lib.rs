pub mod cluster;
pub mod dedupe;
pub mod error;
pub mod learn;
pub mod markdown;
pub mod model;
pub mod nlparse;
pub mod persist;
pub mod rules;
pub mod scan;

pub use cluster::{ClusterConfig, ClusterStore};
pub use dedupe::{total_potential_savings, DedupeConfig};
pub use error::{AccessError, PersistenceError, ValidationError};
pub use learn::{LearnConfig, LearnedPattern, PatternLearner};
pub use markdown::render_markdown_summary;
pub use model::{
    format_bytes, membership_key, ActionType, ClusterState, ClusterType, Destination,
    DuplicateGroup, DuplicateGroupType, FileItem, FileKind, LogicalOperator, MatchResult,
    PlannedAction, ProjectCluster, Report, Rule, RuleCondition, ScanMetadata, ScanMetrics,
    ScanPhase, ScanPhaseCount, ScanProgressEvent, ScanProgressSummary, SuggestedAction,
    REPORT_VERSION,
};
pub use nlparse::{
    parse, resolve_grouping, resolve_time_phrase, to_rule, AmbiguityTag, ClauseKind,
    GroupingStrategy, ParsedClause, ParsedRule, TimeConstraint,
};
pub use persist::{load_state, save_state, EngineState};
pub use rules::{
    apply_plan, evaluate, plan_actions, validate_rule, ActionApplier, DestinationResolver,
    DryRunApplier, NamedFolderResolver, OrganizePlan,
};
pub use scan::{
    run_scan, run_scan_with_callback, run_scan_with_events, ScanOptions, ScanRunOutput,
};
