use std::collections::BTreeSet;

use serde::Serialize;

use super::outcome::{MutantVerdict, OutcomeRecord, RunStatus, TestOutcome};
use super::registry::{MutantKey, MutantKind};

/// Supported output formats for session reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    /// Markdown summary.
    Markdown,
    /// JSON summary with all outcomes inline.
    Json,
    /// JUnit XML format for CI systems.
    Junit,
}

/// Outcomes of one mutation session, in registration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MutationReport {
    /// One record per processed mutant.
    pub outcomes: Vec<OutcomeRecord>,
    /// Whether the session stopped early on an interrupt.
    pub interrupted: bool,
}

/// Per-mutant counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MutantSummary {
    /// Mutant.
    pub mutant: MutantKey,
    /// Mutation kind.
    pub kind: MutantKind,
    /// Verdict.
    pub verdict: MutantVerdict,
    /// Passing tests.
    pub passed: usize,
    /// Failing tests.
    pub failed: usize,
    /// Tests run.
    pub total: usize,
}

impl MutationReport {
    /// Mutants no test detected.
    pub fn survivors(&self) -> BTreeSet<&MutantKey> {
        self.outcomes
            .iter()
            .filter(|record| record.verdict() == MutantVerdict::Survived)
            .map(|record| &record.mutant)
            .collect()
    }

    /// Tests that failed while `mutant` was active, in run order.
    pub fn killers_of(&self, mutant: &MutantKey) -> Vec<&str> {
        self.outcome(mutant)
            .map(|record| {
                record
                    .test_results()
                    .iter()
                    .filter(|result| result.failed())
                    .map(|result| result.name.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Per-mutant counts in registration order.
    pub fn summary(&self) -> Vec<MutantSummary> {
        self.outcomes
            .iter()
            .map(|record| {
                let results = record.test_results();
                let failed = results
                    .iter()
                    .filter(|result| result.outcome == TestOutcome::Fail)
                    .count();
                MutantSummary {
                    mutant: record.mutant.clone(),
                    kind: record.kind,
                    verdict: record.verdict(),
                    passed: results.len() - failed,
                    failed,
                    total: results.len(),
                }
            })
            .collect()
    }

    /// Outcome recorded for `mutant`.
    pub fn outcome(&self, mutant: &MutantKey) -> Option<&OutcomeRecord> {
        self.outcomes.iter().find(|record| &record.mutant == mutant)
    }

    /// True if any mutant's run failed.
    pub fn has_run_failures(&self) -> bool {
        self.outcomes
            .iter()
            .any(|record| record.verdict() == MutantVerdict::RunFailed)
    }
}

/// Aggregated session counts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    /// Processed mutants.
    pub total: usize,
    /// Mutation score (killed / testable mutants), percentage.
    pub mutation_score: f64,
    /// Killed mutants.
    pub killed: usize,
    /// Survived mutants.
    pub survived: usize,
    /// Mutants whose run failed.
    pub run_failed: usize,
}

impl RunSummary {
    /// Build summary from a report.
    pub fn from_report(report: &MutationReport) -> Self {
        let mut out = Self {
            total: report.outcomes.len(),
            mutation_score: 0.0,
            killed: 0,
            survived: 0,
            run_failed: 0,
        };

        for record in &report.outcomes {
            match record.verdict() {
                MutantVerdict::Killed => out.killed += 1,
                MutantVerdict::Survived => out.survived += 1,
                MutantVerdict::RunFailed => out.run_failed += 1,
            }
        }

        let testable = out.killed + out.survived;
        if testable > 0 {
            out.mutation_score = (out.killed as f64) * 100.0 / (testable as f64);
        } else {
            out.mutation_score = 100.0;
        }

        out
    }
}

fn verdict_to_str(verdict: MutantVerdict) -> &'static str {
    match verdict {
        MutantVerdict::Killed => "killed",
        MutantVerdict::Survived => "survived",
        MutantVerdict::RunFailed => "run failed",
    }
}

/// Render a session report in the requested format.
pub fn render_report(report: &MutationReport, format: ReportFormat) -> String {
    let summary = RunSummary::from_report(report);

    match format {
        ReportFormat::Json => serde_json::to_string_pretty(&serde_json::json!({
            "interrupted": report.interrupted,
            "summary": summary,
            "mutants": report.summary(),
            "outcomes": report.outcomes,
        }))
        .unwrap_or_else(|err| format!("{{\"error\": \"{err}\"}}")),
        ReportFormat::Markdown => render_markdown(report, &summary),
        ReportFormat::Junit => render_junit_report(report),
    }
}

fn render_markdown(report: &MutationReport, summary: &RunSummary) -> String {
    let mut out = String::from("# Mutation Report\n\n");
    if report.interrupted {
        out.push_str("- interrupted: true\n\n");
    }

    out.push_str("## Summary\n\n| metric | count |\n|---|---:|\n");
    out.push_str(&format!("| total | {} |\n", summary.total));
    out.push_str(&format!("| killed | {} |\n", summary.killed));
    out.push_str(&format!("| survived | {} |\n", summary.survived));
    out.push_str(&format!("| run failed | {} |\n", summary.run_failed));
    out.push_str(&format!(
        "| mutation score | {:.2}% |\n",
        summary.mutation_score
    ));

    if report.outcomes.is_empty() {
        return out;
    }

    out.push_str("\n## Mutants\n\n| mutant | kind | status | passed | failed | total |\n");
    out.push_str("|---|---|---|---:|---:|---:|\n");
    for entry in report.summary() {
        let kind = match entry.kind {
            MutantKind::WholeFunction => "function",
            MutantKind::InlineChoice => "inline",
        };
        out.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} |\n",
            entry.mutant,
            kind,
            verdict_to_str(entry.verdict),
            entry.passed,
            entry.failed,
            entry.total
        ));
    }

    for record in &report.outcomes {
        let killers = report.killers_of(&record.mutant);
        if !killers.is_empty() {
            out.push_str(&format!("\n### {}\n\n**killed by**:\n", record.mutant));
            for name in killers {
                out.push_str(&format!("- {name}\n"));
            }
        } else if let RunStatus::RunFailed { message } = &record.status {
            out.push_str(&format!("\n### {}\n\n**run failed**: {message}\n", record.mutant));
        }
    }

    out
}

fn render_junit_report(report: &MutationReport) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str("<testsuites>\n");
    out.push_str(&format!(
        "  <testsuite name=\"mutation\" tests=\"{}\">\n",
        report.outcomes.len()
    ));

    for record in &report.outcomes {
        let classname = xml_escape(record.mutant.target.as_str());
        let name = xml_escape(record.mutant.id.as_str());
        match &record.status {
            RunStatus::RunFailed { message } => {
                out.push_str(&format!(
                    "    <testcase classname=\"{classname}\" name=\"{name}\">\n"
                ));
                out.push_str(&format!(
                    "      <error message=\"Run failed\">{}</error>\n",
                    xml_escape(message)
                ));
                out.push_str("    </testcase>\n");
            }
            _ if record.verdict() == MutantVerdict::Survived => {
                out.push_str(&format!(
                    "    <testcase classname=\"{classname}\" name=\"{name}\">\n"
                ));
                out.push_str(&format!(
                    "      <failure message=\"Mutant survived\">{}</failure>\n",
                    xml_escape(&record.mutant.to_string())
                ));
                out.push_str("    </testcase>\n");
            }
            _ => {
                out.push_str(&format!(
                    "    <testcase classname=\"{classname}\" name=\"{name}\"/>\n"
                ));
            }
        }
    }

    out.push_str("  </testsuite>\n");
    out.push_str("</testsuites>\n");
    out
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
