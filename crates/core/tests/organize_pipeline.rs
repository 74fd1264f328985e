use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use forma_core::{
    run_scan, run_scan_with_callback, run_scan_with_events, ActionType, Destination,
    DuplicateGroupType, LogicalOperator, Rule, RuleCondition, ScanOptions, ScanPhase,
};
use tempfile::TempDir;

fn pdf_rule() -> Rule {
    Rule {
        id: "move-pdfs".to_string(),
        name: "PDFs to Documents".to_string(),
        enabled: true,
        conditions: vec![RuleCondition::ExtensionIs {
            extension: "pdf".to_string(),
        }],
        operator: LogicalOperator::All,
        action: ActionType::Move,
        destination: Destination::named("Documents"),
    }
}

#[test]
fn scan_plans_actions_and_groups_duplicates() -> Result<()> {
    let temp = TempDir::new()?;
    fs::write(temp.path().join("report.pdf"), b"annual report body")?;
    fs::write(temp.path().join("notes.txt"), b"plain notes")?;
    fs::write(temp.path().join("copy-a.bin"), b"identical payload bytes")?;
    fs::write(temp.path().join("copy-b.bin"), b"identical payload bytes")?;

    let options = ScanOptions {
        paths: vec![temp.path().to_path_buf()],
        ..ScanOptions::default()
    };
    let report = run_scan(&options, &[pdf_rule()], &[])?;

    assert_eq!(report.scan_metrics.scanned_files, 4);
    assert_eq!(report.scan_metrics.matched_files, 1);
    assert_eq!(report.scan_metrics.unmatched_files, 3);

    let planned = &report.planned[0];
    assert!(planned.path.ends_with("report.pdf"));
    assert_eq!(planned.destination.display_name, "Documents");
    assert!(planned.reasoning.contains("extension is .pdf"));

    let exact = report
        .duplicates
        .iter()
        .find(|group| group.group_type == DuplicateGroupType::ExactDuplicate)
        .expect("exact duplicate group");
    assert_eq!(exact.files.len(), 2);
    assert_eq!(exact.potential_savings_bytes, b"identical payload bytes".len() as u64);

    assert!(report.scan_progress_summary.completed);
    Ok(())
}

#[test]
fn progress_events_walk_every_phase_in_order() -> Result<()> {
    let temp = TempDir::new()?;
    fs::write(temp.path().join("one.pdf"), b"one")?;

    let options = ScanOptions {
        paths: vec![temp.path().to_path_buf()],
        emit_progress_events: true,
        ..ScanOptions::default()
    };
    let output = run_scan_with_events(&options, &[pdf_rule()], &[])?;

    let seqs: Vec<u64> = output.events.iter().map(|event| event.seq).collect();
    let mut sorted = seqs.clone();
    sorted.sort_unstable();
    assert_eq!(seqs, sorted);

    for phase in [
        ScanPhase::WalkingFiles,
        ScanPhase::Matching,
        ScanPhase::Dedupe,
        ScanPhase::Clustering,
        ScanPhase::Done,
    ] {
        assert!(
            output.events.iter().any(|event| event.phase == phase),
            "missing phase {phase:?}"
        );
    }
    Ok(())
}

#[test]
fn pre_cancelled_scan_returns_a_partial_report() -> Result<()> {
    let temp = TempDir::new()?;
    fs::write(temp.path().join("one.pdf"), b"one")?;

    let cancel = Arc::new(AtomicBool::new(true));
    let options = ScanOptions {
        paths: vec![temp.path().to_path_buf()],
        cancel_flag: Some(cancel),
        ..ScanOptions::default()
    };
    let report = run_scan(&options, &[pdf_rule()], &[])?;

    assert!(!report.scan_progress_summary.completed);
    assert!(report
        .warnings
        .iter()
        .any(|warning| warning.contains("canceled")));
    assert!(report.duplicates.is_empty());
    assert!(report.clusters.is_empty());
    Ok(())
}

#[test]
fn cancelling_between_roots_keeps_walked_files_but_plans_nothing() -> Result<()> {
    let first = TempDir::new()?;
    let second = TempDir::new()?;
    fs::write(first.path().join("one.pdf"), b"one")?;
    fs::write(second.path().join("two.pdf"), b"two")?;

    let cancel = Arc::new(AtomicBool::new(false));
    let options = ScanOptions {
        paths: vec![first.path().to_path_buf(), second.path().to_path_buf()],
        emit_progress_events: true,
        cancel_flag: Some(Arc::clone(&cancel)),
        ..ScanOptions::default()
    };

    // Cancel as soon as the first root's walk reports in.
    let flag = Arc::clone(&cancel);
    let report = run_scan_with_callback(&options, &[pdf_rule()], &[], |event| {
        if event.phase == ScanPhase::WalkingFiles && event.current_path.is_some() {
            flag.store(true, Ordering::Relaxed);
        }
    })?;

    assert!(!report.scan_progress_summary.completed);
    assert!(report
        .warnings
        .iter()
        .any(|warning| warning.contains("canceled")));

    // The first root's files survive as partial data, but nothing past the
    // cancel point runs: no planned actions, no dedupe, no clusters.
    assert_eq!(report.scan_metrics.scanned_files, 1);
    assert!(report.files[0].path.ends_with("one.pdf"));
    assert!(report.planned.is_empty());
    assert_eq!(report.scan_metrics.matched_files, 0);
    assert!(report.duplicates.is_empty());
    assert!(report.clusters.is_empty());
    Ok(())
}

#[test]
fn excludes_remove_subtrees_from_the_walk() -> Result<()> {
    let temp = TempDir::new()?;
    fs::create_dir(temp.path().join("node_modules"))?;
    fs::write(temp.path().join("node_modules/dep.js"), b"module")?;
    fs::write(temp.path().join("keep.pdf"), b"kept")?;

    let options = ScanOptions {
        paths: vec![temp.path().to_path_buf()],
        excludes: vec!["node_modules".to_string()],
        ..ScanOptions::default()
    };
    let report = run_scan(&options, &[], &[])?;

    assert_eq!(report.scan_metrics.scanned_files, 1);
    assert!(report.files[0].path.ends_with("keep.pdf"));
    Ok(())
}
