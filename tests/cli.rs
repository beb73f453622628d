use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::tempdir;

fn run(args: &[&str]) -> Result<Output> {
    Ok(Command::new(env!("CARGO_BIN_EXE_agent-eval"))
        .args(args)
        .env_remove("AGENT_EVAL_AGENT_CMD")
        .env_remove("AGENT_EVAL_INVOKE_TIMEOUT")
        .env_remove("AGENT_EVAL_TIME_BUDGET")
        .env("LANG", "C")
        .output()?)
}

fn demo(name: &str) -> String {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("demos")
        .join(name)
        .to_string_lossy()
        .into_owned()
}

fn write_suite(dir: &Path, body: &str) -> Result<String> {
    let path = dir.join("suite.yaml");
    fs::write(&path, body)?;
    Ok(path.to_string_lossy().into_owned())
}

const SCRIPTED: &str = r#"
Config:
  Agent:
    Scripted:
      - Pattern: "."
        Output: "pong"
Tests:
  - name: ping
    input: ping
    expected_contains: [EXPECTED]
"#;

#[test]
fn passing_suite_exits_zero() -> Result<()> {
    let out = run(&["-q", &demo("weather_agent.yaml")])?;
    assert_eq!(out.status.code(), Some(0));
    Ok(())
}

#[test]
fn failing_case_exits_one() -> Result<()> {
    let dir = tempdir()?;
    let suite = write_suite(dir.path(), &SCRIPTED.replace("EXPECTED", "nothing-like-pong"))?;
    let out = run(&["-q", &suite])?;
    assert_eq!(out.status.code(), Some(1));
    Ok(())
}

#[test]
fn bad_time_budget_flag_exits_two() -> Result<()> {
    let out = run(&["-q", "--time-budget=0", &demo("weather_agent.yaml")])?;
    assert_eq!(out.status.code(), Some(2));
    Ok(())
}

#[test]
fn invalid_suite_file_exits_two() -> Result<()> {
    let dir = tempdir()?;
    let body = SCRIPTED.replace("EXPECTED", "pong").replace(
        "    input: ping\n",
        "    input: ping\n    max_execution_time: 0\n",
    );
    let suite = write_suite(dir.path(), &body)?;
    let out = run(&["-q", &suite])?;
    assert_eq!(out.status.code(), Some(2));
    assert!(!out.stderr.is_empty());
    Ok(())
}

#[test]
fn missing_suite_file_exits_two() -> Result<()> {
    let dir = tempdir()?;
    let missing = dir.path().join("nope.yaml");
    let out = run(&["-q", &missing.to_string_lossy()])?;
    assert_eq!(out.status.code(), Some(2));
    Ok(())
}
