use crate::agent::{CommandAgent, ScriptRule, ScriptedAgent};
use crate::types::{Case, CaseError, DEFAULT_TIME_BUDGET, Metadata};
use crate::{t, t_args};
use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use walkdir::WalkDir;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "PascalCase")]
pub struct RawAgentConfig {
    #[serde(alias = "command")]
    pub command: Option<String>,
    #[serde(alias = "args", default)]
    pub args: Vec<String>,
    /// Seconds before a command agent is killed.
    #[serde(alias = "timeout")]
    pub timeout: Option<f64>,
    #[serde(alias = "scripted", default)]
    pub scripted: Vec<RawRule>,
    #[serde(alias = "fallback")]
    pub fallback: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "PascalCase")]
pub struct RawRule {
    #[serde(alias = "pattern")]
    pub pattern: String,
    #[serde(alias = "output")]
    pub output: String,
    #[serde(alias = "tools", default)]
    pub tools: Vec<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "PascalCase")]
pub struct RawDefaults {
    #[serde(alias = "max_execution_time", alias = "time_budget")]
    pub max_execution_time: Option<f64>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "PascalCase")]
pub struct RawConfig {
    #[serde(alias = "agent")]
    pub agent: Option<RawAgentConfig>,
    #[serde(alias = "defaults")]
    pub defaults: Option<RawDefaults>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RawCase {
    pub name: String,
    pub input: String,
    pub expected_contains: Option<Vec<String>>,
    pub expected_exact: Option<String>,
    #[serde(alias = "required_tools")]
    pub should_use_tools: Option<Vec<String>>,
    #[serde(alias = "time_budget")]
    pub max_execution_time: Option<f64>,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "PascalCase")]
pub struct RawSpec {
    #[serde(alias = "name", alias = "test_suite_name")]
    pub name: Option<String>,
    #[serde(alias = "config")]
    pub config: Option<RawConfig>,
    #[serde(alias = "tests", alias = "test_cases")]
    pub tests: Vec<RawCase>,
}

/// Which agent a suite file asks for.
#[derive(Debug, Clone)]
pub enum AgentChoice {
    Command(CommandAgent),
    Scripted(ScriptedAgent),
}

#[derive(Debug, Clone)]
pub struct SuiteWithConfig {
    pub name: String,
    pub path: PathBuf,
    pub cases: Vec<Case>,
    /// `None` when the file leaves the agent to the command line.
    pub agent: Option<AgentChoice>,
}

fn trim_owned(s: &str) -> String {
    s.trim().to_string()
}

fn trim_all(v: &[String]) -> Vec<String> {
    v.iter().map(|s| trim_owned(s)).collect()
}

/// Converts a seconds value from a file or the command line into a budget.
pub fn parse_budget(secs: f64) -> Result<Duration> {
    if !secs.is_finite() || secs <= 0.0 {
        return Err(anyhow!(t_args!("spec-bad-budget", "value" => secs)));
    }
    Duration::try_from_secs_f64(secs).map_err(|_| anyhow!(t_args!("spec-bad-budget", "value" => secs)))
}

fn is_suite_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml" | "yml" | "json")
    )
}

pub fn load_specs(paths: &[PathBuf]) -> Result<Vec<SuiteWithConfig>> {
    let mut files = Vec::new();
    for p in paths {
        if p.is_dir() {
            let mut found = Vec::new();
            for entry in WalkDir::new(p) {
                let entry = entry?;
                if entry.file_type().is_file() && is_suite_file(entry.path()) {
                    found.push(entry.path().to_path_buf());
                }
            }
            found.sort();
            files.extend(found);
        } else {
            files.push(p.clone());
        }
    }

    let mut out = Vec::new();
    for f in files {
        let content = fs::read_to_string(&f)
            .with_context(|| t_args!("spec-failed-to-read", "file" => f.display()))?;
        let raw = parse_raw(&f, &content)?;
        let suite = build_suite(raw, &f)
            .with_context(|| t_args!("spec-invalid", "file" => f.display()))?;
        out.push(suite);
    }
    Ok(out)
}

fn parse_raw(path: &Path, content: &str) -> Result<RawSpec> {
    let is_json = path.extension().and_then(|e| e.to_str()) == Some("json");
    if is_json {
        serde_json::from_str(content)
            .with_context(|| t_args!("spec-json-error", "file" => path.display()))
    } else {
        serde_yaml::from_str(content)
            .with_context(|| t_args!("spec-yaml-error", "file" => path.display()))
    }
}

fn build_suite(raw: RawSpec, path: &Path) -> Result<SuiteWithConfig> {
    let config = raw.config.unwrap_or_default();
    let default_budget = match config.defaults.and_then(|d| d.max_execution_time) {
        Some(secs) => parse_budget(secs)?,
        None => DEFAULT_TIME_BUDGET,
    };

    let mut seen = HashSet::new();
    let mut cases = Vec::with_capacity(raw.tests.len());
    for rc in raw.tests {
        let case = build_case(rc, default_budget)?;
        case.validate()?;
        if !seen.insert(case.name.clone()) {
            return Err(CaseError::DuplicateName(case.name).into());
        }
        cases.push(case);
    }

    let agent = match config.agent {
        Some(agent) => resolve_agent(agent, path)?,
        None => None,
    };

    let name = match raw.name {
        Some(n) if !n.trim().is_empty() => trim_owned(&n),
        _ => path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "suite".to_string()),
    };

    Ok(SuiteWithConfig {
        name,
        path: path.to_path_buf(),
        cases,
        agent,
    })
}

fn build_case(rc: RawCase, default_budget: Duration) -> Result<Case> {
    let time_budget = match rc.max_execution_time {
        Some(secs) => parse_budget(secs)?,
        None => default_budget,
    };
    Ok(Case {
        name: trim_owned(&rc.name),
        input: trim_owned(&rc.input),
        expected_contains: rc.expected_contains.as_deref().map(trim_all),
        expected_exact: rc.expected_exact.as_deref().map(trim_owned),
        required_tools: rc.should_use_tools.as_deref().map(trim_all),
        time_budget,
        metadata: rc.metadata,
    })
}

fn resolve_agent(raw: RawAgentConfig, yaml_file_path: &Path) -> Result<Option<AgentChoice>> {
    if let Some(cmd) = raw.command {
        let timeout = raw.timeout.map(parse_budget).transpose()?;
        let command = resolve_path_relative_to_spec(cmd.trim(), yaml_file_path);
        return Ok(Some(AgentChoice::Command(CommandAgent {
            command,
            args: raw.args,
            timeout,
            quiet: false,
        })));
    }
    if raw.scripted.is_empty() {
        if raw.fallback.is_some() {
            return Err(anyhow!(t!("spec-fallback-without-rules")));
        }
        return Ok(None);
    }
    let rules = raw
        .scripted
        .into_iter()
        .map(|r| ScriptRule::new(&r.pattern, r.output, trim_all(&r.tools)))
        .collect::<Result<Vec<_>>>()?;
    let mut agent = ScriptedAgent::new(rules);
    if let Some(fallback) = raw.fallback {
        agent = agent.with_fallback(fallback);
    }
    Ok(Some(AgentChoice::Scripted(agent)))
}

/// Relative command paths (`./agent`, `bin/agent`) are resolved against the suite file; bare names are left for `PATH`.
fn resolve_path_relative_to_spec(cmd: &str, spec_path: &Path) -> String {
    let p = Path::new(cmd);
    if p.is_absolute() || !cmd.contains(['/', '\\']) {
        return cmd.to_string();
    }
    match spec_path.parent() {
        Some(dir) => dir.join(p).to_string_lossy().into_owned(),
        None => cmd.to_string(),
    }
}

/// Expands each case into `n` copies named `<name> #<i>`; `n <= 1` returns the cases unchanged.
///
/// Stripping the trailing ` #<i>` recovers the original name, so distinct names stay distinct.
pub fn repeat_cases(cases: &[Case], n: usize) -> Vec<Case> {
    if n <= 1 {
        return cases.to_vec();
    }
    let mut out = Vec::with_capacity(cases.len() * n);
    for i in 1..=n {
        for c in cases {
            let mut copy = c.clone();
            copy.name = format!("{} #{i}", c.name);
            out.push(copy);
        }
    }
    out
}
