//! Output formatting: table, JSON, YAML, plain.
//!
//! Renders data in the format selected by `--output`. Table uses `tabled`,
//! structured formats use serde, plain emits one line per item.

use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use tabled::{Table, Tabled, settings::Style};

use crate::cli::{ColorMode, OutputFormat};
use crate::error::CliError;

// ── Color helpers ────────────────────────────────────────────────────

/// Determine whether color output should be enabled.
pub fn should_color(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

/// Highlight a label as good news.
pub fn ok(text: &str, color: bool) -> String {
    if color {
        text.green().bold().to_string()
    } else {
        text.to_owned()
    }
}

/// Highlight a label as needing attention.
pub fn attention(text: &str, color: bool) -> String {
    if color {
        text.yellow().bold().to_string()
    } else {
        text.to_owned()
    }
}

/// Highlight a label as broken.
pub fn bad(text: &str, color: bool) -> String {
    if color {
        text.red().bold().to_string()
    } else {
        text.to_owned()
    }
}

// ── Render dispatchers ───────────────────────────────────────────────

/// Render serde data in the chosen format.
///
/// `table_fn` builds the table view, `plain_fn` the line-per-item view;
/// structured formats serialize `data` directly.
pub fn render<T, R>(
    format: OutputFormat,
    data: &T,
    table_fn: impl FnOnce(&T) -> Vec<R>,
    plain_fn: impl FnOnce(&T) -> Vec<String>,
) -> Result<String, CliError>
where
    T: serde::Serialize,
    R: Tabled,
{
    match format {
        OutputFormat::Table => Ok(render_table(&table_fn(data))),
        OutputFormat::Json => render_json(data, false),
        OutputFormat::JsonCompact => render_json(data, true),
        OutputFormat::Yaml => Ok(serde_yaml::to_string(data)?),
        OutputFormat::Plain => Ok(plain_fn(data).join("\n")),
    }
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

/// Write one line and flush, for streamed output.
pub fn print_line(line: &str) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{line}")?;
    stdout.flush()?;
    Ok(())
}

// ── Format-specific renderers ────────────────────────────────────────

fn render_table<R: Tabled>(rows: &[R]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

pub fn render_json<T: serde::Serialize + ?Sized>(data: &T, compact: bool) -> Result<String, CliError> {
    let text = if compact {
        serde_json::to_string(data)?
    } else {
        serde_json::to_string_pretty(data)?
    };
    Ok(text)
}
