use crate::agent::{Agent, AgentResponse};
use crate::types::{Case, CaseStatus, Check, ExecutionResult};
use indexmap::IndexMap;
use std::any::Any;
use std::collections::BTreeSet;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

/// Runs one case and judges the answer. Agent failures become `Error` results; nothing escapes.
pub fn run_case<A: Agent + ?Sized>(agent: &A, case: &Case) -> ExecutionResult {
    let start = Instant::now();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| agent.invoke(&case.input)));
    let elapsed = start.elapsed();

    let response = match outcome {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            let mut message = format!("{e:#}");
            if message.trim().is_empty() {
                message = "agent invocation failed".to_string();
            }
            return error_result(case, elapsed, message);
        }
        Err(payload) => return error_result(case, elapsed, panic_message(&*payload)),
    };

    let validation_results = validate_response(case, &response, elapsed);
    let failed: Vec<&str> = validation_results
        .iter()
        .filter(|(_, ok)| !**ok)
        .map(|(check, _)| check.as_str())
        .collect();
    let (status, error) = if failed.is_empty() {
        (CaseStatus::Passed, None)
    } else {
        (CaseStatus::Failed, Some(failed.join(", ")))
    };

    ExecutionResult {
        name: case.name.clone(),
        input: case.input.clone(),
        status,
        execution_time: elapsed,
        output: Some(response.output),
        tools_used: response.tools_used,
        validation_results,
        error,
    }
}

/// Evaluates every applicable check, in [`Check`] order.
pub fn validate_response(
    case: &Case,
    response: &AgentResponse,
    elapsed: Duration,
) -> IndexMap<Check, bool> {
    let mut checks = IndexMap::new();
    let output = response.output.to_lowercase();

    checks.insert(Check::ExecutionTimeOk, elapsed <= case.time_budget);

    if let Some(needles) = case.expected_contains.as_ref().filter(|v| !v.is_empty()) {
        let all_found = needles
            .iter()
            .all(|needle| output.contains(&needle.to_lowercase()));
        checks.insert(Check::ContainsExpected, all_found);
    }

    if let Some(expected) = case.expected_exact.as_ref().filter(|s| !s.is_empty()) {
        checks.insert(
            Check::ExactMatch,
            output.trim() == expected.to_lowercase().trim(),
        );
    }

    if let Some(required) = case.required_tools.as_ref().filter(|v| !v.is_empty()) {
        checks.insert(
            Check::CorrectToolsUsed,
            tools_subset(required, &response.tools_used),
        );
    }

    checks.insert(Check::NonEmptyResponse, !output.trim().is_empty());
    checks
}

/// Extra tools are fine; every required one must have been used.
fn tools_subset(required: &[String], used: &[String]) -> bool {
    let used: BTreeSet<&str> = used.iter().map(|s| s.as_str()).collect();
    let required: BTreeSet<&str> = required.iter().map(|s| s.as_str()).collect();
    required.is_subset(&used)
}

fn error_result(case: &Case, elapsed: Duration, message: String) -> ExecutionResult {
    ExecutionResult {
        name: case.name.clone(),
        input: case.input.clone(),
        status: CaseStatus::Error,
        execution_time: elapsed,
        output: None,
        tools_used: Vec::new(),
        validation_results: IndexMap::new(),
        error: Some(message),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("agent panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("agent panicked: {s}")
    } else {
        "agent panicked".to_string()
    }
}
