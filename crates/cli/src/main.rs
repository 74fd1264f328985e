use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::ArgAction;
use clap::{Args, Parser, Subcommand, ValueEnum};
use forma_core::{
    apply_plan, format_bytes, load_state, nlparse, render_markdown_summary, run_scan, save_state,
    total_potential_savings, validate_rule, ClusterState, ClusterStore, Destination, DryRunApplier,
    GroupingStrategy, LearnConfig, NamedFolderResolver, OrganizePlan, PatternLearner, Report,
    ScanOptions,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "forma",
    version,
    about = "Plan file organization: rules, duplicates, clusters, and learned habits."
)]
struct Cli {
    /// Engine state file (rules and learned patterns).
    #[arg(long, global = true, default_value = "forma-state.json", value_name = "FILE")]
    state: PathBuf,

    /// Cluster history file.
    #[arg(
        long,
        global = true,
        default_value = "forma-clusters.json",
        value_name = "FILE"
    )]
    clusters: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Scan paths and emit a JSON report with planned actions.
    Scan(ScanArgs),
    /// Show the planned actions from an existing report (dry-run apply).
    Organize(OrganizeArgs),
    /// List duplicate groups from an existing report.
    Duplicates(DuplicatesArgs),
    /// List and resolve project cluster suggestions.
    Clusters(ClustersArgs),
    /// Parse a natural-language organizing request.
    Parse(ParseArgs),
    /// Show learned-pattern rule suggestions.
    Suggest(SuggestArgs),
    /// Record accept/reject feedback on a suggestion.
    Feedback(FeedbackArgs),
}

#[derive(Debug, Args)]
struct ScanArgs {
    /// One or more root paths to scan.
    #[arg(long = "paths", value_name = "PATH", num_args = 1.., action = ArgAction::Append)]
    paths: Vec<PathBuf>,

    /// Output report path.
    #[arg(long, default_value = "forma-report.json", value_name = "FILE")]
    output: PathBuf,

    /// Maximum traversal depth (root is depth 0).
    #[arg(long)]
    max_depth: Option<usize>,

    /// Exclude glob patterns (repeatable).
    #[arg(long = "exclude", value_name = "GLOB", num_args = 1.., action = ArgAction::Append)]
    exclude: Vec<String>,

    /// Skip duplicate detection.
    #[arg(long)]
    no_dedupe: bool,

    /// Ignore files smaller than this during dedupe.
    #[arg(long, default_value_t = 1, value_name = "BYTES")]
    dedupe_min_size: u64,

    /// Skip project cluster detection.
    #[arg(long)]
    no_clusters: bool,

    /// Emit progress log lines while scanning.
    #[arg(long)]
    progress: bool,

    /// Optional markdown summary output file.
    #[arg(long, value_name = "FILE")]
    md: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct OrganizeArgs {
    /// Input report file.
    #[arg(long, value_name = "FILE")]
    report: PathBuf,

    /// Base directory that named destinations resolve under.
    #[arg(long, value_name = "DIR", default_value = ".")]
    base: PathBuf,
}

#[derive(Debug, Args)]
struct DuplicatesArgs {
    /// Input report file.
    #[arg(long, value_name = "FILE")]
    report: PathBuf,
}

#[derive(Debug, Args)]
struct ClustersArgs {
    /// Mark a cluster as organized.
    #[arg(long, value_name = "ID", conflicts_with = "dismiss")]
    organize: Option<String>,

    /// Dismiss a cluster suggestion.
    #[arg(long, value_name = "ID")]
    dismiss: Option<String>,
}

#[derive(Debug, Args)]
struct ParseArgs {
    /// The request text, e.g. "move .pdf files older than 30 days to /archive".
    text: String,

    /// Resolve an ambiguous time phrase to this many days.
    #[arg(long, value_name = "DAYS")]
    resolve_days: Option<i64>,

    /// Resolve an ambiguous grouping phrase.
    #[arg(long, value_name = "STRATEGY")]
    resolve_grouping: Option<CliGrouping>,

    /// Save the parse as a named rule in the state file.
    #[arg(long, value_name = "NAME")]
    save_as: Option<String>,
}

#[derive(Debug, Copy, Clone, ValueEnum)]
enum CliGrouping {
    CreatedMonth,
    ModifiedMonth,
}

impl From<CliGrouping> for GroupingStrategy {
    fn from(value: CliGrouping) -> Self {
        match value {
            CliGrouping::CreatedMonth => GroupingStrategy::CreatedMonth,
            CliGrouping::ModifiedMonth => GroupingStrategy::ModifiedMonth,
        }
    }
}

#[derive(Debug, Args)]
struct SuggestArgs {
    /// Promote the suggestion for this extension into a rule.
    #[arg(long, value_name = "EXT", requires = "destination")]
    promote: Option<String>,

    /// Destination path of the suggestion being promoted.
    #[arg(long, value_name = "PATH")]
    destination: Option<String>,
}

#[derive(Debug, Args)]
struct FeedbackArgs {
    /// File extension the feedback applies to.
    #[arg(long, value_name = "EXT")]
    extension: String,

    /// Destination path the feedback applies to.
    #[arg(long, value_name = "PATH")]
    destination: String,

    /// The user filed a matching file there by hand.
    #[arg(long, conflicts_with = "reject")]
    accept: bool,

    /// The user declined a suggestion built from this habit.
    #[arg(long)]
    reject: bool,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Scan(args) => run_scan_command(&cli.state, &cli.clusters, args),
        Commands::Organize(args) => run_organize_command(args),
        Commands::Duplicates(args) => run_duplicates_command(args),
        Commands::Clusters(args) => run_clusters_command(&cli.clusters, args),
        Commands::Parse(args) => run_parse_command(&cli.state, args),
        Commands::Suggest(args) => run_suggest_command(&cli.state, args),
        Commands::Feedback(args) => run_feedback_command(&cli.state, args),
    }
}

fn run_scan_command(state_path: &Path, clusters_path: &Path, args: ScanArgs) -> Result<()> {
    let mut state = load_state(state_path)?;
    let mut store = ClusterStore::load(clusters_path)?;

    let mut learner = PatternLearner::new(std::mem::take(&mut state.patterns), LearnConfig::default());
    learner.begin_scan();
    state.patterns = learner.patterns;
    save_state(state_path, &state)?;

    let options = ScanOptions {
        paths: args.paths,
        max_depth: args.max_depth,
        excludes: args.exclude,
        dedupe: !args.no_dedupe,
        dedupe_min_size: args.dedupe_min_size,
        detect_clusters: !args.no_clusters,
        progress: args.progress,
        ..ScanOptions::default()
    };

    let report = run_scan(&options, &state.rules, store.clusters())?;
    let added = store.absorb(report.clusters.clone())?;

    let payload = serde_json::to_string_pretty(&report).context("failed to serialize report")?;
    fs::write(&args.output, payload)
        .with_context(|| format!("failed to write report to {}", args.output.display()))?;

    println!("Report written to {}", args.output.display());
    println!(
        "Scanned {} root(s), {} file(s) ({}), elapsed {} ms.",
        report.scan.roots.len(),
        report.scan_metrics.scanned_files,
        format_bytes(report.scan_metrics.scanned_bytes),
        report.scan_metrics.elapsed_ms
    );
    println!(
        "Matched {} file(s) against {} rule(s); {} unmatched; {} duplicate group(s); {} new cluster suggestion(s); {} warning(s).",
        report.scan_metrics.matched_files,
        report.scan.rule_count,
        report.scan_metrics.unmatched_files,
        report.duplicates.len(),
        added,
        report.warnings.len()
    );

    if let Some(md_path) = args.md {
        let markdown = render_markdown_summary(&report);
        fs::write(&md_path, markdown)
            .with_context(|| format!("failed to write markdown summary to {}", md_path.display()))?;
        println!("Markdown summary written to {}", md_path.display());
    }

    Ok(())
}

fn run_organize_command(args: OrganizeArgs) -> Result<()> {
    let report = read_report(&args.report)?;

    if report.planned.is_empty() {
        println!("No planned actions in {}", args.report.display());
        return Ok(());
    }

    let plan = OrganizePlan {
        planned: report.planned.clone(),
        unmatched_files: report.scan_metrics.unmatched_files,
    };
    let resolver = NamedFolderResolver {
        base: args.base.clone(),
    };
    let mut applier = DryRunApplier::default();
    let warnings = apply_plan(&plan, &resolver, &mut applier);

    println!(
        "Dry run: {} action(s) from {}:",
        applier.applied.len(),
        args.report.display()
    );
    for (action, target) in &applier.applied {
        match target {
            Some(path) => println!(
                "- [{:?}] {} -> {} ({})",
                action.action,
                action.path,
                path.display(),
                action.reasoning
            ),
            None => println!("- [{:?}] {} ({})", action.action, action.path, action.reasoning),
        }
    }
    for warning in warnings {
        println!("Warning: {warning}");
    }

    Ok(())
}

fn run_duplicates_command(args: DuplicatesArgs) -> Result<()> {
    let report = read_report(&args.report)?;

    if report.duplicates.is_empty() {
        println!("No duplicate groups in {}", args.report.display());
        return Ok(());
    }

    for group in &report.duplicates {
        println!(
            "- [{:?} | {:?}] {} ({} file(s), reclaimable ~{})",
            group.group_type,
            group.suggested_action,
            group.description,
            group.files.len(),
            format_bytes(group.potential_savings_bytes)
        );
        for file in &group.files {
            println!("    {}", file.path);
        }
    }
    println!(
        "Total reclaimable estimate: {}",
        format_bytes(total_potential_savings(&report.duplicates))
    );

    Ok(())
}

fn run_clusters_command(clusters_path: &Path, args: ClustersArgs) -> Result<()> {
    let mut store = ClusterStore::load(clusters_path)?;

    if let Some(id) = args.organize {
        store.mark_organized(&id)?;
        println!("Cluster {id} marked organized.");
        return Ok(());
    }
    if let Some(id) = args.dismiss {
        store.dismiss(&id)?;
        println!("Cluster {id} dismissed.");
        return Ok(());
    }

    let pending: Vec<_> = store.pending().collect();
    if pending.is_empty() {
        println!("No pending cluster suggestions.");
        return Ok(());
    }
    for cluster in pending {
        println!(
            "- {} [{:?}] -> `{}`: {}",
            cluster.id, cluster.cluster_type, cluster.suggested_folder_name, cluster.description
        );
        for path in &cluster.member_paths {
            println!("    {path}");
        }
    }
    let settled = store
        .clusters()
        .iter()
        .filter(|cluster| cluster.state != ClusterState::Pending)
        .count();
    if settled > 0 {
        println!("({settled} previously resolved suggestion(s) on record.)");
    }

    Ok(())
}

fn run_parse_command(state_path: &Path, args: ParseArgs) -> Result<()> {
    let mut parsed = nlparse::parse(&args.text);
    if let Some(days) = args.resolve_days {
        parsed = nlparse::resolve_time_phrase(&parsed, days);
    }
    if let Some(strategy) = args.resolve_grouping {
        parsed = nlparse::resolve_grouping(&parsed, strategy.into());
    }

    let payload = serde_json::to_string_pretty(&parsed).context("failed to serialize parse")?;
    println!("{payload}");

    for tag in parsed.outstanding_ambiguities() {
        println!("Needs clarification: {tag:?}");
    }

    if let Some(name) = args.save_as {
        let rule = nlparse::to_rule(&parsed, &name, None)
            .map_err(|err| anyhow::anyhow!("cannot save rule: {err}"))?;
        validate_rule(&rule).map_err(|err| anyhow::anyhow!("cannot save rule: {err}"))?;

        let mut state = load_state(state_path)?;
        state.rules.push(rule);
        save_state(state_path, &state)?;
        println!("Rule '{name}' saved to {}", state_path.display());
    }

    Ok(())
}

fn run_suggest_command(state_path: &Path, args: SuggestArgs) -> Result<()> {
    let mut state = load_state(state_path)?;
    let mut learner = PatternLearner::new(std::mem::take(&mut state.patterns), LearnConfig::default());

    if let (Some(extension), Some(destination)) = (args.promote, args.destination) {
        match learner.promote(&extension, &destination, Destination::named(&destination)) {
            Some(rule) => {
                println!("Promoted suggestion into rule '{}'.", rule.name);
                state.rules.push(rule);
            }
            None => println!("No learned pattern for .{extension} -> {destination}."),
        }
        state.patterns = learner.patterns;
        save_state(state_path, &state)?;
        return Ok(());
    }

    let suggestions = learner.suggestable_patterns();
    if suggestions.is_empty() {
        println!("No suggestions yet; keep filing files and feedback will accumulate.");
    } else {
        for pattern in suggestions {
            println!(
                "- .{} -> {} (seen {} time(s), confidence {:.2}): {}",
                pattern.extension,
                pattern.destination_path,
                pattern.occurrence_count,
                pattern.confidence,
                pattern.description
            );
        }
    }

    state.patterns = learner.patterns;
    Ok(())
}

fn run_feedback_command(state_path: &Path, args: FeedbackArgs) -> Result<()> {
    if !args.accept && !args.reject {
        anyhow::bail!("pass --accept or --reject");
    }

    let mut state = load_state(state_path)?;
    let mut learner = PatternLearner::new(std::mem::take(&mut state.patterns), LearnConfig::default());

    if args.accept {
        learner.record_acceptance(&args.extension, &args.destination);
        println!("Recorded acceptance for .{} -> {}.", args.extension, args.destination);
    } else {
        learner.record_rejection(&args.extension, &args.destination);
        println!("Recorded rejection for .{} -> {}.", args.extension, args.destination);
    }

    state.patterns = learner.patterns;
    save_state(state_path, &state)?;
    Ok(())
}

fn read_report(path: &Path) -> Result<Report> {
    let data =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("failed to parse {}", path.display()))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
