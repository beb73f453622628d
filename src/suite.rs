use crate::agent::Agent;
use crate::engine::run_case;
use crate::t_args;
use crate::types::{Case, CaseError, CaseStatus, ExecutionResult, SuiteSummary};
use anyhow::{Context, Result};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Runs cases one after another against a single agent and keeps the result log.
pub struct EvalSuite<A> {
    agent: A,
    name: String,
    results: Vec<ExecutionResult>,
}

impl<A: Agent> EvalSuite<A> {
    pub fn new(agent: A, name: impl Into<String>) -> Self {
        Self {
            agent,
            name: name.into(),
            results: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn results(&self) -> &[ExecutionResult] {
        &self.results
    }

    /// Runs one case and records it.
    pub fn run_single(&mut self, case: &Case) -> &ExecutionResult {
        debug!(case = %case.name, "running case");
        let result = run_case(&self.agent, case);
        match result.status {
            CaseStatus::Error => warn!(
                case = %result.name,
                error = result.error.as_deref().unwrap_or_default(),
                "agent invocation failed"
            ),
            status => debug!(
                case = %result.name,
                %status,
                elapsed_ms = result.execution_time.as_millis() as u64,
                "case finished"
            ),
        }
        self.results.push(result);
        &self.results[self.results.len() - 1]
    }

    pub fn run_suite(&mut self, cases: &[Case]) -> Result<SuiteSummary, CaseError> {
        self.run_suite_with_progress(cases, |_, _, _| {})
    }

    /// Like [`EvalSuite::run_suite`], calling `progress(index, total, result)` after each case.
    ///
    /// Every case is checked before any runs; a malformed case aborts the whole call.
    pub fn run_suite_with_progress<F>(
        &mut self,
        cases: &[Case],
        mut progress: F,
    ) -> Result<SuiteSummary, CaseError>
    where
        F: FnMut(usize, usize, &ExecutionResult),
    {
        check_cases(cases)?;
        info!(suite = %self.name, count = cases.len(), "starting suite");

        let total = cases.len();
        let start = self.results.len();
        for (idx, case) in cases.iter().enumerate() {
            let result = self.run_single(case);
            progress(idx + 1, total, result);
        }

        // Only this call's results; earlier runs stay in the log.
        let summary = self.summarize(&self.results[start..], total);
        info!(
            suite = %self.name,
            passed = summary.passed,
            failed = summary.failed,
            errors = summary.errors,
            "suite finished"
        );
        Ok(summary)
    }

    /// Summary over everything recorded since the last reset.
    pub fn summary(&self) -> SuiteSummary {
        self.summarize(&self.results, self.results.len())
    }

    fn summarize(&self, results: &[ExecutionResult], total_tests: usize) -> SuiteSummary {
        let count = |status: CaseStatus| results.iter().filter(|r| r.status == status).count();
        let passed = count(CaseStatus::Passed);
        let failed = count(CaseStatus::Failed);
        let errors = count(CaseStatus::Error);

        let success_rate = if total_tests == 0 {
            0.0
        } else {
            passed as f64 / total_tests as f64 * 100.0
        };

        let total_execution_time: Duration = results.iter().map(|r| r.execution_time).sum();
        let average_execution_time = match u32::try_from(results.len()) {
            Ok(0) => Duration::ZERO,
            Ok(n) => total_execution_time / n,
            Err(_) => Duration::from_secs_f64(
                total_execution_time.as_secs_f64() / results.len() as f64,
            ),
        };

        let tools_used: BTreeSet<String> = results
            .iter()
            .flat_map(|r| r.tools_used.iter().cloned())
            .collect();

        let mut validation_failures = BTreeMap::new();
        for result in results.iter().filter(|r| r.status == CaseStatus::Failed) {
            for check in result.failed_checks() {
                *validation_failures.entry(check).or_insert(0) += 1;
            }
        }

        SuiteSummary {
            name: self.name.clone(),
            total_tests,
            passed,
            failed,
            errors,
            success_rate,
            total_execution_time,
            average_execution_time,
            tools_used,
            validation_failures,
            results: results.to_vec(),
        }
    }

    /// Writes the current summary as pretty-printed JSON.
    pub fn save_results(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.summary())
            .context(t_args!("suite-serialize-failed", "suite" => &self.name))?;
        fs::write(path, json)
            .with_context(|| t_args!("suite-write-failed", "file" => path.display()))?;
        info!(suite = %self.name, file = %path.display(), "results saved");
        Ok(())
    }

    pub fn reset(&mut self) {
        self.results.clear();
    }
}

/// Where suite `index` (0-based) of `count` saves its results: `base` itself for a single
/// suite, otherwise `stem-<index+1>.ext` next to it.
pub fn numbered_save_path(base: &Path, index: usize, count: usize) -> PathBuf {
    if count <= 1 {
        return base.to_path_buf();
    }
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "results".to_string());
    let name = match base.extension() {
        Some(ext) => format!("{stem}-{}.{}", index + 1, ext.to_string_lossy()),
        None => format!("{stem}-{}", index + 1),
    };
    base.with_file_name(name)
}

fn check_cases(cases: &[Case]) -> Result<(), CaseError> {
    let mut seen = HashSet::new();
    for case in cases {
        case.validate()?;
        if !seen.insert(case.name.as_str()) {
            return Err(CaseError::DuplicateName(case.name.clone()));
        }
    }
    Ok(())
}
