use crate::t;
use crate::types::{CaseStatus, ExecutionResult, SuiteSummary};
use colored::Colorize;
use std::fmt::Write;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputKind {
    /// Every case plus the full summary block
    #[default]
    Normal,
    /// Every case plus a one-line total
    Compact,
    /// Only cases that did not pass, plus a one-line total
    Terse,
    /// Only the one-line total
    Final,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReportOptions {
    pub kind: OutputKind,
    pub verbose: bool,
    pub hide_fails: bool,
    pub hide_passes: bool,
}

fn secs(d: Duration) -> String {
    format!("{:.2}s", d.as_secs_f64())
}

impl ReportOptions {
    /// Whether a case line for `result` belongs in the report.
    pub fn shows(&self, result: &ExecutionResult) -> bool {
        let passed = result.status == CaseStatus::Passed;
        match self.kind {
            OutputKind::Final => false,
            OutputKind::Terse if passed => false,
            _ if passed => !self.hide_passes,
            _ => !self.hide_fails,
        }
    }
}

pub fn render_case(result: &ExecutionResult, verbose: bool) -> String {
    let mut out = String::new();
    let elapsed = secs(result.execution_time);
    match result.status {
        CaseStatus::Passed => {
            let _ = writeln!(out, "{} {} ({elapsed})", "[OK]".green().bold(), result.name.green());
        }
        CaseStatus::Failed => {
            let _ = writeln!(
                out,
                "{} {} ({elapsed})",
                "[FAIL]".red().bold(),
                result.name.red().bold()
            );
            let failed: Vec<&str> = result.failed_checks().iter().map(|c| c.as_str()).collect();
            let _ = writeln!(out, "  {} {}", t!("report-validation-failed").bold(), failed.join(", "));
        }
        CaseStatus::Error => {
            let _ = writeln!(
                out,
                "{} {} ({elapsed})",
                "[ERROR]".yellow().bold(),
                result.name.yellow().bold()
            );
            if let Some(err) = &result.error {
                let _ = writeln!(out, "  {} {}", t!("report-error").bold(), err.red());
            }
        }
    }
    if verbose || result.status == CaseStatus::Failed {
        let _ = writeln!(out, "  {} {}", t!("report-input").bold(), result.input);
        if let Some(output) = &result.output {
            let _ = writeln!(out, "  {} {}", t!("report-output").bold(), output.trim());
        }
        if verbose && !result.tools_used.is_empty() {
            let _ = writeln!(out, "  {} {}", t!("report-tools").bold(), result.tools_used.join(", "));
        }
    }
    out
}

/// One line: counts, rate and timing.
pub fn render_totals(summary: &SuiteSummary) -> String {
    let failed = if summary.failed > 0 {
        summary.failed.to_string().red().bold().to_string()
    } else {
        summary.failed.to_string().green().to_string()
    };
    let errors = if summary.errors > 0 {
        summary.errors.to_string().yellow().bold().to_string()
    } else {
        summary.errors.to_string().green().to_string()
    };
    format!(
        "{}: {} {}, {} {}, {} {}, {} {}, {:.1}%, {}\n",
        summary.name.bold(),
        t!("report-total"),
        summary.total_tests,
        t!("report-passed"),
        summary.passed.to_string().green(),
        t!("report-failed"),
        failed,
        t!("report-errors"),
        errors,
        summary.success_rate,
        secs(summary.total_execution_time),
    )
}

/// The multi-line block printed after a suite in `Normal` mode.
pub fn render_summary_block(summary: &SuiteSummary) -> String {
    let rule = "=".repeat(60);
    let mut out = String::new();
    let _ = writeln!(out, "\n{rule}");
    let _ = writeln!(out, "{} - {}", summary.name.bold(), t!("report-summary-title"));
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "{:<22}{}", t!("report-total"), summary.total_tests);
    let _ = writeln!(
        out,
        "{:<22}{} ({:.1}%)",
        t!("report-passed"),
        summary.passed.to_string().green(),
        summary.success_rate
    );
    let _ = writeln!(out, "{:<22}{}", t!("report-failed"), summary.failed);
    let _ = writeln!(out, "{:<22}{}", t!("report-errors"), summary.errors);
    let _ = writeln!(out, "{:<22}{}", t!("report-total-time"), secs(summary.total_execution_time));
    let _ = writeln!(out, "{:<22}{}", t!("report-avg-time"), secs(summary.average_execution_time));
    if !summary.tools_used.is_empty() {
        let tools: Vec<&str> = summary.tools_used.iter().map(String::as_str).collect();
        let _ = writeln!(out, "{:<22}{}", t!("report-tools-used"), tools.join(", "));
    }
    if !summary.validation_failures.is_empty() {
        let _ = writeln!(out, "\n{}", t!("report-common-failures").red().bold());
        for (check, count) in &summary.validation_failures {
            let _ = writeln!(out, "   - {check}: {count}");
        }
    }
    out
}

/// What follows the case lines for the chosen output kind.
pub fn render_footer(summary: &SuiteSummary, kind: OutputKind) -> String {
    match kind {
        OutputKind::Normal => render_summary_block(summary),
        _ => render_totals(summary),
    }
}

pub fn render_human(summary: &SuiteSummary, opts: &ReportOptions) -> String {
    let mut out = String::new();
    for result in summary.results.iter().filter(|r| opts.shows(r)) {
        out.push_str(&render_case(result, opts.verbose));
    }
    out.push_str(&render_footer(summary, opts.kind));
    out
}

pub fn print_human(summary: &SuiteSummary, opts: &ReportOptions) {
    print!("{}", render_human(summary, opts));
}

/// Side-by-side table of several suites.
pub fn render_comparison(summaries: &[SuiteSummary]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\n{}", t!("report-comparison-title").bold());
    let _ = writeln!(
        out,
        "{:<28} {:<12} {:<10} {:<12}",
        t!("report-col-suite"),
        t!("report-col-rate"),
        t!("report-col-avg"),
        t!("report-col-total")
    );
    let _ = writeln!(out, "{}", "-".repeat(64));
    for s in summaries {
        let _ = writeln!(
            out,
            "{:<28} {:<12} {:<10} {:<12}",
            s.name,
            format!("{:.1}%", s.success_rate),
            secs(s.average_execution_time),
            s.total_tests
        );
    }
    out
}
