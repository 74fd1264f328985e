use crate::dedupe::total_potential_savings;
use crate::model::{format_bytes, ClusterState, Report};

pub fn render_markdown_summary(report: &Report) -> String {
    let mut out = String::new();
    out.push_str("# Forma Scan Summary\n\n");
    out.push_str(&format!(
        "- Report version: `{}`\n- Generated at: `{}`\n- Scan roots: `{}`\n- Scan elapsed: `{} ms`\n- Files scanned: {} ({})\n- Matched / unmatched: {} / {}\n\n",
        report.report_version,
        report.generated_at,
        report.scan.roots.join("`, `"),
        report.scan_metrics.elapsed_ms,
        report.scan_metrics.scanned_files,
        format_bytes(report.scan_metrics.scanned_bytes),
        report.scan_metrics.matched_files,
        report.scan_metrics.unmatched_files
    ));

    out.push_str("## Planned Actions\n\n");
    if report.planned.is_empty() {
        out.push_str("No files matched an enabled rule.\n\n");
    } else {
        for action in report.planned.iter().take(50) {
            out.push_str(&format!(
                "- `{}` -> `{}` via rule `{}`: {}\n",
                action.path, action.destination.display_name, action.rule_name, action.reasoning
            ));
        }
        if report.planned.len() > 50 {
            out.push_str(&format!(
                "- ... and {} more\n",
                report.planned.len() - 50
            ));
        }
        out.push('\n');
    }

    out.push_str("## Duplicate Highlights\n\n");
    if report.duplicates.is_empty() {
        out.push_str("No duplicate groups were detected.\n\n");
    } else {
        for group in report.duplicates.iter().take(20) {
            out.push_str(&format!(
                "- {} ({:?}): {} file(s), reclaimable ~{}\n",
                group.description,
                group.group_type,
                group.files.len(),
                format_bytes(group.potential_savings_bytes)
            ));
        }
        out.push_str(&format!(
            "\nTotal reclaimable estimate: {}\n\n",
            format_bytes(total_potential_savings(&report.duplicates))
        ));
    }

    out.push_str("## Project Cluster Suggestions\n\n");
    let pending: Vec<_> = report
        .clusters
        .iter()
        .filter(|cluster| cluster.state == ClusterState::Pending)
        .collect();
    if pending.is_empty() {
        out.push_str("No new clusters were suggested.\n\n");
    } else {
        for cluster in pending {
            out.push_str(&format!(
                "- `{}` ({} file(s)): {}\n",
                cluster.suggested_folder_name,
                cluster.member_paths.len(),
                cluster.description
            ));
        }
        out.push('\n');
    }

    out.push_str("## Warnings\n\n");
    if report.warnings.is_empty() {
        out.push_str("None.\n");
    } else {
        for warning in &report.warnings {
            out.push_str(&format!("- {warning}\n"));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::render_markdown_summary;
    use crate::model::{
        Report, ScanMetadata, ScanMetrics, ScanProgressSummary, REPORT_VERSION,
    };

    fn empty_report() -> Report {
        Report {
            report_version: REPORT_VERSION.to_string(),
            generated_at: Utc::now().to_rfc3339(),
            scan_id: "test".to_string(),
            scan: ScanMetadata {
                roots: vec!["/tmp".to_string()],
                max_depth: None,
                excludes: Vec::new(),
                dedupe: true,
                dedupe_min_size: 1,
                detect_clusters: true,
                rule_count: 0,
                emit_progress_events: false,
            },
            scan_metrics: ScanMetrics::default(),
            scan_progress_summary: ScanProgressSummary::default(),
            files: Vec::new(),
            planned: Vec::new(),
            duplicates: Vec::new(),
            clusters: Vec::new(),
            warnings: vec!["walk error under /tmp: denied".to_string()],
        }
    }

    #[test]
    fn summary_renders_all_sections_even_when_empty() {
        let rendered = render_markdown_summary(&empty_report());
        assert!(rendered.contains("# Forma Scan Summary"));
        assert!(rendered.contains("## Planned Actions"));
        assert!(rendered.contains("No files matched an enabled rule."));
        assert!(rendered.contains("## Duplicate Highlights"));
        assert!(rendered.contains("## Project Cluster Suggestions"));
        assert!(rendered.contains("walk error under /tmp: denied"));
    }
}
