use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Time budget used when a case does not set one.
pub const DEFAULT_TIME_BUDGET: Duration = Duration::from_secs(30);

/// Opaque annotations carried along with a case. Never interpreted.
pub type Metadata = IndexMap<String, serde_json::Value>;

/// One evaluation trial: an input for the agent plus what the answer must satisfy.
#[derive(Debug, Clone, PartialEq)]
pub struct Case {
    pub name: String,
    pub input: String,
    /// Substrings that must all appear in the output, ignoring case.
    pub expected_contains: Option<Vec<String>>,
    /// Whole-output match, ignoring case and surrounding whitespace.
    pub expected_exact: Option<String>,
    /// Tools that must be among those the agent reports using.
    pub required_tools: Option<Vec<String>>,
    pub time_budget: Duration,
    pub metadata: Metadata,
}

impl Case {
    pub fn new(name: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            input: input.into(),
            expected_contains: None,
            expected_exact: None,
            required_tools: None,
            time_budget: DEFAULT_TIME_BUDGET,
            metadata: Metadata::new(),
        }
    }

    pub fn expect_contains<I, S>(mut self, needles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expected_contains = Some(needles.into_iter().map(Into::into).collect());
        self
    }

    pub fn expect_exact(mut self, expected: impl Into<String>) -> Self {
        self.expected_exact = Some(expected.into());
        self
    }

    pub fn require_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_tools = Some(tools.into_iter().map(Into::into).collect());
        self
    }

    pub fn time_budget(mut self, budget: Duration) -> Self {
        self.time_budget = budget;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Rejects cases the harness cannot meaningfully run.
    pub fn validate(&self) -> Result<(), CaseError> {
        if self.name.trim().is_empty() {
            return Err(CaseError::EmptyName);
        }
        if self.time_budget.is_zero() {
            return Err(CaseError::NonPositiveBudget(self.name.clone()));
        }
        Ok(())
    }
}

/// Defects in the cases handed to the harness, as opposed to misbehaving agents.
#[derive(Debug, Error, PartialEq)]
pub enum CaseError {
    #[error("case name must not be empty")]
    EmptyName,

    #[error("case '{0}' has a non-positive time budget")]
    NonPositiveBudget(String),

    #[error("case name '{0}' is used more than once in the suite")]
    DuplicateName(String),
}

/// Named validation predicates, in the order they are evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Check {
    ExecutionTimeOk,
    ContainsExpected,
    ExactMatch,
    CorrectToolsUsed,
    NonEmptyResponse,
}

impl Check {
    pub fn as_str(&self) -> &'static str {
        match self {
            Check::ExecutionTimeOk => "execution_time_ok",
            Check::ContainsExpected => "contains_expected",
            Check::ExactMatch => "exact_match",
            Check::CorrectToolsUsed => "correct_tools_used",
            Check::NonEmptyResponse => "non_empty_response",
        }
    }
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CaseStatus {
    Passed,
    Failed,
    Error,
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CaseStatus::Passed => "PASSED",
            CaseStatus::Failed => "FAILED",
            CaseStatus::Error => "ERROR",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResult {
    #[serde(rename = "test_name")]
    pub name: String,
    pub input: String,
    pub status: CaseStatus,
    #[serde(serialize_with = "as_secs")]
    pub execution_time: Duration,
    /// Absent when the invocation itself failed.
    #[serde(rename = "agent_response")]
    pub output: Option<String>,
    pub tools_used: Vec<String>,
    /// Empty for `Error` results.
    pub validation_results: IndexMap<Check, bool>,
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn failed_checks(&self) -> Vec<Check> {
        self.validation_results
            .iter()
            .filter(|(_, ok)| !**ok)
            .map(|(check, _)| *check)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuiteSummary {
    #[serde(rename = "test_suite_name")]
    pub name: String,
    pub total_tests: usize,
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
    /// Percentage in `0.0..=100.0`.
    pub success_rate: f64,
    #[serde(serialize_with = "as_secs")]
    pub total_execution_time: Duration,
    #[serde(serialize_with = "as_secs")]
    pub average_execution_time: Duration,
    pub tools_used: BTreeSet<String>,
    /// How many failed cases tripped each check.
    pub validation_failures: BTreeMap<Check, usize>,
    #[serde(rename = "detailed_results")]
    pub results: Vec<ExecutionResult>,
}

impl SuiteSummary {
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.errors == 0
    }

    /// Cases per second of accumulated agent time.
    pub fn throughput(&self) -> f64 {
        let secs = self.total_execution_time.as_secs_f64();
        if secs > 0.0 {
            self.results.len() as f64 / secs
        } else {
            0.0
        }
    }
}

fn as_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}
