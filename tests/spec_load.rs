use agent_eval::agent::{Agent, AgentResponse, FnAgent};
use agent_eval::spec::{AgentChoice, load_specs, repeat_cases};
use agent_eval::suite::EvalSuite;
use agent_eval::types::{Case, DEFAULT_TIME_BUDGET};
use anyhow::Result;
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::tempdir;

#[test]
fn trims_and_applies_defaults_from_yaml() -> Result<()> {
    let dir = tempdir()?;
    let file = dir.path().join("suite.yaml");
    let yaml = r#"
Config:
  Defaults:
    MaxExecutionTime: 12.5
Tests:
  - name: "  Weather  "
    input: "  what is the weather in sf   "
    expected_contains: [" sunny ", "sf  "]
  - name: Math
    input: What is 25 * 4?
    expected_contains: ["100"]
    should_use_tools: [" simple_calculator "]
    max_execution_time: 5
    metadata:
      category: calculation
"#;
    fs::write(&file, yaml)?;
    let suites = load_specs(&[file.clone()])?;
    assert_eq!(suites.len(), 1);
    let swc = &suites[0];
    assert_eq!(swc.name, "suite.yaml");
    assert!(swc.agent.is_none());

    let weather = &swc.cases[0];
    assert_eq!(weather.name, "Weather");
    assert_eq!(weather.input, "what is the weather in sf");
    assert_eq!(
        weather.expected_contains,
        Some(vec!["sunny".to_string(), "sf".to_string()])
    );
    assert_eq!(weather.time_budget, Duration::from_secs_f64(12.5));

    let math = &swc.cases[1];
    assert_eq!(math.required_tools, Some(vec!["simple_calculator".to_string()]));
    assert_eq!(math.time_budget, Duration::from_secs(5));
    assert_eq!(math.metadata["category"], serde_json::json!("calculation"));
    Ok(())
}

#[test]
fn reads_json_case_files() -> Result<()> {
    let dir = tempdir()?;
    let file = dir.path().join("cases.json");
    let json = r#"{
        "test_suite_name": "From JSON",
        "test_cases": [
            {"name": "Basic Calculation", "input": "What is 15 * 24?",
             "expected_contains": ["360"], "should_use_tools": ["calculator"]},
            {"name": "Exact", "input": "Say hi", "expected_exact": "hi", "time_budget": 2}
        ]
    }"#;
    fs::write(&file, json)?;
    let suites = load_specs(&[file])?;
    let swc = &suites[0];
    assert_eq!(swc.name, "From JSON");
    assert_eq!(swc.cases.len(), 2);
    assert_eq!(swc.cases[0].time_budget, DEFAULT_TIME_BUDGET);
    assert_eq!(swc.cases[1].expected_exact.as_deref(), Some("hi"));
    assert_eq!(swc.cases[1].time_budget, Duration::from_secs(2));
    Ok(())
}

#[test]
fn scripted_agent_from_config_answers_cases() -> Result<()> {
    let dir = tempdir()?;
    let file = dir.path().join("scripted.yml");
    let yaml = r#"
Name: Scripted
Config:
  Agent:
    Scripted:
      - Pattern: "weather in (\\w+)"
        Output: "It's always sunny in $1!"
        Tools: [get_weather]
    Fallback: "no idea"
Tests:
  - name: Paris
    input: weather in Paris
    expected_contains: [sunny, paris]
    should_use_tools: [get_weather]
  - name: Unknown
    input: tell me a joke
    expected_exact: no idea
"#;
    fs::write(&file, yaml)?;
    let suites = load_specs(&[file])?;
    let swc = &suites[0];
    let Some(AgentChoice::Scripted(agent)) = swc.agent.clone() else {
        panic!("expected a scripted agent, got {:?}", swc.agent);
    };
    assert_eq!(agent.invoke("weather in Oslo")?.output, "It's always sunny in Oslo!");

    let mut suite = EvalSuite::new(agent, swc.name.clone());
    let summary = suite.run_suite(&swc.cases)?;
    assert_eq!(summary.passed, 2);
    Ok(())
}

#[test]
fn relative_command_resolves_next_to_the_file() -> Result<()> {
    let dir = tempdir()?;
    let file = dir.path().join("cmd.yaml");
    let yaml = r#"
Config:
  Agent:
    Command: ./bin/agent
    Args: ["--json"]
    Timeout: 3
Tests:
  - name: one
    input: hi
"#;
    fs::write(&file, yaml)?;
    let suites = load_specs(&[file])?;
    let Some(AgentChoice::Command(agent)) = &suites[0].agent else {
        panic!("expected a command agent");
    };
    assert_eq!(PathBuf::from(&agent.command), dir.path().join("./bin/agent"));
    assert_eq!(agent.args, vec!["--json".to_string()]);
    assert_eq!(agent.timeout, Some(Duration::from_secs(3)));
    Ok(())
}

#[test]
fn directories_are_walked_in_path_order() -> Result<()> {
    let dir = tempdir()?;
    let nested = dir.path().join("nested");
    fs::create_dir(&nested)?;
    fs::write(dir.path().join("b.yaml"), "Tests:\n  - {name: b, input: x}\n")?;
    fs::write(nested.join("a.json"), r#"{"tests": [{"name": "a", "input": "x"}]}"#)?;
    fs::write(dir.path().join("notes.txt"), "not a suite")?;

    let suites = load_specs(&[dir.path().to_path_buf()])?;
    let names: Vec<&str> = suites.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["b.yaml", "a.json"]);
    Ok(())
}

#[test]
fn bad_files_are_rejected() -> Result<()> {
    let dir = tempdir()?;
    let cases = [
        ("negative.yaml", "Tests:\n  - {name: a, input: x, max_execution_time: -1}\n"),
        ("zero.yaml", "Tests:\n  - {name: a, input: x, max_execution_time: 0}\n"),
        ("dupes.yaml", "Tests:\n  - {name: a, input: x}\n  - {name: a, input: y}\n"),
        ("unnamed.yaml", "Tests:\n  - {name: '  ', input: x}\n"),
        ("broken.json", "{\"tests\": ["),
        ("pattern.yaml", "Config:\n  Agent:\n    Scripted:\n      - {Pattern: '(', Output: x}\nTests: []\n"),
        ("fallback.yaml", "Config:\n  Agent:\n    Fallback: x\nTests: []\n"),
    ];
    for (name, content) in cases {
        let file = dir.path().join(name);
        fs::write(&file, content)?;
        assert!(load_specs(&[file]).is_err(), "{name} should not load");
    }
    assert!(load_specs(&[dir.path().join("missing.yaml")]).is_err());
    Ok(())
}

#[test]
fn repeat_expands_cases_with_numbered_names() {
    let cases = vec![Case::new("a", "1"), Case::new("b", "2")];
    assert_eq!(repeat_cases(&cases, 1), cases);
    let names: Vec<String> = repeat_cases(&cases, 2).into_iter().map(|c| c.name).collect();
    assert_eq!(names, vec!["a #1", "b #1", "a #2", "b #2"]);
}

#[test]
fn repeated_names_stay_unique_even_for_numbered_names() -> Result<()> {
    let cases = vec![
        Case::new("a", "1"),
        Case::new("a #1", "2"),
        Case::new("a #11", "3"),
        Case::new("b", "4"),
    ];
    let repeated = repeat_cases(&cases, 11);
    assert_eq!(repeated.len(), 44);
    let names: HashSet<&str> = repeated.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names.len(), 44, "{names:?}");

    let agent = FnAgent::new(|input: &str| Ok(AgentResponse::text(input)));
    let summary = EvalSuite::new(agent, "repeat").run_suite(&repeated)?;
    assert_eq!(summary.total_tests, 44);
    Ok(())
}

#[test]
fn bundled_demo_suites_load() -> Result<()> {
    let demos = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos");
    let suites = load_specs(&[demos])?;
    assert_eq!(suites.len(), 2);
    for swc in suites {
        let Some(AgentChoice::Scripted(agent)) = swc.agent else {
            panic!("demo {} should carry a scripted agent", swc.name);
        };
        let mut suite = EvalSuite::new(agent, swc.name.clone());
        let summary = suite.run_suite(&swc.cases)?;
        assert!(summary.is_success(), "demo {} failed: {:?}", swc.name, summary.results);
    }
    Ok(())
}
