use crate::scanner::ScanSummary;
use std::fmt::Write;
use std::str::FromStr;

const HEADERS: [&str; 5] = ["user", "mes", "not mes", "total", "sparks"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Table,
    Json,
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" | "text" => Ok(ReportFormat::Table),
            "json" => Ok(ReportFormat::Json),
            _ => Err(format!("unknown report format {s:?}, expected 'table' or 'json'")),
        }
    }
}

pub fn render(summary: &ScanSummary, format: ReportFormat) -> anyhow::Result<String> {
    match format {
        ReportFormat::Table => Ok(render_table(summary)),
        ReportFormat::Json => Ok(serde_json::to_string_pretty(summary)?),
    }
}

/// Plain-text report: header line, ranked tally table and totals.
pub fn render_table(summary: &ScanSummary) -> String {
    let rows: Vec<[String; 5]> = summary
        .tallies
        .iter()
        .map(|t| {
            [
                t.name.clone(),
                t.mes.to_string(),
                t.not_mes.to_string(),
                t.total().to_string(),
                t.sparks.to_string(),
            ]
        })
        .collect();

    let mut widths = HEADERS.map(|h| h.chars().count());
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    match &summary.earliest {
        Some(ts) => {
            let _ = writeln!(out, "gap check since: {}", ts.format("%Y-%m-%d %H:%M:%S%:z"));
        }
        None => {
            let _ = writeln!(out, "gap check since: (no messages)");
        }
    }
    out.push('\n');

    push_row(&mut out, &HEADERS.map(str::to_string), &widths);
    push_row(&mut out, &widths.map(|w| "-".repeat(w)), &widths);
    for row in &rows {
        push_row(&mut out, row, &widths);
    }

    out.push('\n');
    let _ = writeln!(out, "total claims: {}", summary.total_claims);
    let _ = writeln!(
        out,
        "lost capacity (approx., {} expired): {}",
        summary.expired, summary.lost_capacity
    );
    if summary.decode_failures > 0 {
        let _ = writeln!(out, "undecodable messages: {}", summary.decode_failures);
    }
    out
}

/// First column left-aligned, counts right-aligned.
fn push_row(out: &mut String, cells: &[String; 5], widths: &[usize; 5]) {
    let mut line = String::new();
    for (i, (cell, width)) in cells.iter().zip(widths).enumerate() {
        if i > 0 {
            line.push_str("  ");
        }
        if i == 0 {
            let _ = write!(line, "{:<width$}", cell, width = width);
        } else {
            let _ = write!(line, "{:>width$}", cell, width = width);
        }
    }
    out.push_str(line.trim_end());
    out.push('\n');
}
