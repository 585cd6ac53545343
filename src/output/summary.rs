use std::collections::BTreeMap;
use std::fmt::Write;

use chrono::{DateTime, Utc};
use comfy_table::{Cell, Color as TableColor};
use log::error;

use crate::error::PulseError;
use crate::metrics::{FieldValue, Fields, Metric, MetricSink, Tags};

use super::styling::{bright, bright_green, bright_red, bright_yellow, cyan, dim};
use super::tables::{color_coded_approvals_cell, color_coded_state_cell, create_table, cyan_header};

const TOP_ROWS: usize = 10;

/// Sink that keeps the gathered records to print them as tables afterwards.
#[derive(Default)]
pub struct SummarySink {
    metrics: Vec<Metric>,
    errors: Vec<String>,
}

impl MetricSink for SummarySink {
    fn add_fields(
        &mut self,
        measurement: &str,
        fields: Fields,
        tags: Tags,
        timestamp: DateTime<Utc>,
    ) {
        self.metrics.push(Metric {
            name: measurement.to_string(),
            fields,
            tags,
            timestamp,
        });
    }

    fn add_error(&mut self, error: &PulseError) {
        error!("{error}");
        self.errors.push(error.to_string());
    }
}

impl SummarySink {
    pub fn records(&self) -> usize {
        self.metrics.len()
    }

    pub fn errors(&self) -> usize {
        self.errors.len()
    }

    /// Prints a human-readable summary of the gathered pull requests to stdout.
    pub fn print(&self, owner: &str) {
        println!("{}", self.render(owner));
    }

    fn render(&self, owner: &str) -> String {
        let mut output = String::new();

        add_section_header(&mut output, "📊", "Overview");

        let collected_at = self
            .metrics
            .first()
            .map_or_else(Utc::now, |m| m.timestamp);
        let errors_display = if self.errors.is_empty() {
            bright_green(0)
        } else {
            bright_red(self.errors.len())
        };

        let _ = write!(
            output,
            "  {} {}\n  {} {}\n  {} {}\n  {} {}\n\n",
            dim("Owner:"),
            cyan(owner),
            dim("Pull requests:"),
            bright_yellow(self.metrics.len()),
            dim("Errors:"),
            errors_display,
            dim("Collected at:"),
            dim(collected_at.format("%Y-%m-%d %H:%M UTC"))
        );

        if self.metrics.is_empty() {
            let _ = writeln!(output, "{}", bright_yellow("No pull requests found."));
            return output;
        }

        self.render_states(&mut output);
        self.render_repositories(&mut output);
        self.render_awaiting_approval(&mut output);

        output
    }

    fn render_states(&self, output: &mut String) {
        add_section_header(output, "📋", "Pull Requests by State");

        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for metric in &self.metrics {
            let state = metric.tags.get("state").map_or("", String::as_str);
            *counts.entry(state).or_default() += 1;
        }

        let mut table = create_table();
        table.set_header(cyan_header(&["State", "Count", "Share"]));
        for (state, count) in counts {
            table.add_row(vec![
                color_coded_state_cell(state),
                Cell::new(count),
                Cell::new(format!("{:.1}%", percentage(count, self.metrics.len()))),
            ]);
        }

        let _ = writeln!(output, "{table}\n");
    }

    fn render_repositories(&self, output: &mut String) {
        add_section_header(output, "📦", "Top Source Repositories");

        // repo -> (total, open, approvals)
        let mut repos: BTreeMap<&str, (usize, usize, i64)> = BTreeMap::new();
        for metric in &self.metrics {
            let repo = metric.tags.get("source_repo").map_or("", String::as_str);
            let entry = repos.entry(repo).or_default();
            entry.0 += 1;
            if metric.tags.get("state").is_some_and(|s| s == "OPEN") {
                entry.1 += 1;
            }
            entry.2 += int_field(&metric.fields, "approval_count");
        }

        let mut sorted: Vec<_> = repos.into_iter().collect();
        sorted.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then(a.0.cmp(b.0)));

        let mut table = create_table();
        table.set_header(cyan_header(&["Repository", "PRs", "Open", "Avg Approvals"]));
        for (repo, (total, open, approvals)) in sorted.iter().take(TOP_ROWS) {
            #[allow(clippy::cast_precision_loss)]
            let average = *approvals as f64 / *total as f64;
            table.add_row(vec![
                Cell::new(repo),
                Cell::new(total),
                Cell::new(open),
                color_coded_approvals_cell(average),
            ]);
        }

        if sorted.len() > TOP_ROWS {
            table.add_row(vec![
                Cell::new(format!("... and {} more", sorted.len() - TOP_ROWS))
                    .fg(TableColor::DarkGrey),
                Cell::new(""),
                Cell::new(""),
                Cell::new(""),
            ]);
        }

        let _ = writeln!(output, "{table}\n");
    }

    fn render_awaiting_approval(&self, output: &mut String) {
        let waiting: Vec<&Metric> = self
            .metrics
            .iter()
            .filter(|m| m.tags.get("state").is_some_and(|s| s == "OPEN"))
            .filter(|m| int_field(&m.fields, "approval_count") == 0)
            .collect();

        if waiting.is_empty() {
            return;
        }

        add_section_header(output, "⏳", "Open Without Approval");

        let mut table = create_table();
        table.set_header(cyan_header(&["Title", "Author", "Reviewers", "Link"]));
        for metric in waiting.iter().take(TOP_ROWS) {
            table.add_row(vec![
                Cell::new(str_field(&metric.fields, "title")),
                Cell::new(str_field(&metric.fields, "author")),
                Cell::new(str_field(&metric.fields, "reviewers")),
                Cell::new(str_field(&metric.fields, "link")),
            ]);
        }

        let _ = writeln!(output, "{table}\n");
    }
}

fn add_section_header(output: &mut String, emoji: &str, title: &str) {
    let _ = writeln!(output, "{} {}", bright(emoji), bright(title).underlined());
}

fn int_field(fields: &Fields, key: &str) -> i64 {
    match fields.get(key) {
        Some(FieldValue::Int(n)) => *n,
        _ => 0,
    }
}

fn str_field<'a>(fields: &'a Fields, key: &str) -> &'a str {
    match fields.get(key) {
        Some(FieldValue::Str(s)) => s,
        _ => "",
    }
}

#[allow(clippy::cast_precision_loss)]
fn percentage(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}
