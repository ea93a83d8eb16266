//! Rendering of insight answers: JSON, Table, and Markdown output.

use quarry_core::{AnalysisType, CsvTable, Insight};
use serde_json::Value;

/// Output format for insight answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Markdown,
}

/// Render a raw insight answer for `prompt`.
///
/// Answers without any of the insight keys fall back to pretty JSON.
#[must_use]
pub fn format_insight(prompt: &str, answer: &Value, format: OutputFormat) -> String {
    let insight = match (format, Insight::from_value(answer)) {
        (OutputFormat::Json, _) | (_, None) => return pretty(answer),
        (_, Some(insight)) => insight,
    };
    let kind = AnalysisType::detect(prompt);
    match format {
        OutputFormat::Table => format_text(&insight, kind),
        _ => format_markdown(&insight, kind),
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn analysis_label(kind: AnalysisType) -> String {
    serde_json::to_value(kind)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| "general".to_string())
}

fn format_text(insight: &Insight, kind: AnalysisType) -> String {
    let mut output = format!("Analysis: {}\n\n", analysis_label(kind));

    if !insight.generate_sql.trim().is_empty() {
        output.push_str("SQL:\n");
        output.push_str(insight.generate_sql.trim());
        output.push_str("\n\n");
    }

    output.push_str(&format_table(&insight.table()));

    let lines = insight.insight_lines();
    if !lines.is_empty() {
        output.push_str("\nInsights:\n");
        for line in lines {
            output.push_str("- ");
            output.push_str(&line);
            output.push('\n');
        }
    }
    output
}

/// Fixed-width table with a `-+-` separator under the header.
#[must_use]
pub fn format_table(table: &CsvTable) -> String {
    if table.is_empty() {
        return "(no results)\n".to_string();
    }

    let mut widths: Vec<usize> = table.columns.iter().map(|c| c.chars().count()).collect();
    for row in &table.rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(cell.chars().count());
            }
        }
    }

    let line = |cells: &[String]| -> String {
        widths
            .iter()
            .enumerate()
            .map(|(i, &width)| {
                let cell = cells.get(i).map_or("", String::as_str);
                format!("{cell:width$}")
            })
            .collect::<Vec<_>>()
            .join(" | ")
            .trim_end()
            .to_string()
    };

    let mut output = line(&table.columns);
    output.push('\n');
    let sep: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    output.push_str(&sep.join("-+-"));
    output.push('\n');
    for row in &table.rows {
        output.push_str(&line(row));
        output.push('\n');
    }
    output
}

fn format_markdown(insight: &Insight, kind: AnalysisType) -> String {
    let mut output = format!("**Analysis:** {}\n\n", analysis_label(kind));

    if !insight.generate_sql.trim().is_empty() {
        output.push_str("```sql\n");
        output.push_str(insight.generate_sql.trim());
        output.push_str("\n```\n\n");
    }

    let table = insight.table();
    if table.is_empty() {
        output.push_str("*No results*\n");
    } else {
        output.push_str("| ");
        output.push_str(&table.columns.join(" | "));
        output.push_str(" |\n| ");
        let seps: Vec<&str> = table.columns.iter().map(|_| "---").collect();
        output.push_str(&seps.join(" | "));
        output.push_str(" |\n");
        for row in &table.rows {
            output.push_str("| ");
            output.push_str(&row.join(" | "));
            output.push_str(" |\n");
        }
    }

    for line in insight.insight_lines() {
        output.push_str("\n- ");
        output.push_str(&line);
    }
    if !output.ends_with('\n') {
        output.push('\n');
    }
    output
}
