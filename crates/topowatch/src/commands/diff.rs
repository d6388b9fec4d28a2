//! `topowatch diff`: offline link classification.

use tabled::Tabled;

use topowatch_core::{LinkDiff, compute_link_diff};

use crate::cli::{DiffArgs, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::fixture;
use crate::output;

#[derive(Debug, Tabled)]
struct DiffRow {
    #[tabled(rename = "Category")]
    category: &'static str,
    #[tabled(rename = "Link")]
    link: String,
    #[tabled(rename = "Detail")]
    detail: String,
}

pub fn handle(args: &DiffArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let baseline = fixture::load_links(&args.baseline)?;
    let actual = fixture::load_links(&args.actual)?;
    let diff = compute_link_diff(baseline, actual);

    let rendered = output::render(global.output, &diff, rows, |d| {
        rows(d)
            .into_iter()
            .map(|r| format!("{}\t{}", r.category, r.link))
            .collect()
    })?;
    output::print_output(&rendered, global.quiet);

    if matches!(global.output, OutputFormat::Table) {
        let color = output::should_color(global.color);
        output::print_output(&summary(&diff, color), global.quiet);
    }
    Ok(())
}

fn rows(diff: &LinkDiff) -> Vec<DiffRow> {
    let mut rows = Vec::new();
    let row = |category, link: &String, detail: String| DiffRow {
        category,
        link: link.clone(),
        detail,
    };

    rows.extend(diff.unchanged.keys().map(|k| row("unchanged", k, String::new())));
    rows.extend(diff.removed.keys().map(|k| row("removed", k, String::new())));
    rows.extend(diff.new.keys().map(|k| {
        let detail = if diff.is_rewired(k) { "rewired" } else { "" };
        row("new", k, detail.into())
    }));
    rows.extend(
        diff.invalid_baseline
            .iter()
            .map(|(k, inv)| row("invalid baseline", k, inv.reason.to_string())),
    );
    rows.extend(
        diff.invalid_actual
            .iter()
            .map(|(k, inv)| row("invalid actual", k, inv.reason.to_string())),
    );
    for (category, conflicts) in [
        ("baseline conflict", &diff.baseline_port_conflicts),
        ("actual conflict", &diff.actual_port_conflicts),
    ] {
        for (endpoint, links) in conflicts {
            rows.extend(links.iter().map(|l| DiffRow {
                category,
                link: l.to_string(),
                detail: format!("shares {endpoint}"),
            }));
        }
    }
    rows
}

fn summary(diff: &LinkDiff, color: bool) -> String {
    let invalid = diff.invalid_baseline.len() + diff.invalid_actual.len();
    format!(
        "{} unchanged, {} removed, {} new ({} rewired), {} invalid",
        output::ok(&diff.unchanged.len().to_string(), color),
        output::bad(&diff.removed.len().to_string(), color),
        output::attention(&diff.new.len().to_string(), color),
        output::attention(&diff.rewired.len().to_string(), color),
        output::bad(&invalid.to_string(), color),
    )
}
