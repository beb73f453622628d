use crate::{t, t_args};
use anyhow::{Context, Result, anyhow};
use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use std::io::{ErrorKind, Read, Write};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::time::Duration;
use wait_timeout::ChildExt;

/// What an agent answered, plus the tools it says it used (possibly none).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentResponse {
    pub output: String,
    pub tools_used: Vec<String>,
}

impl AgentResponse {
    pub fn text(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            tools_used: Vec::new(),
        }
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools_used = tools.into_iter().map(Into::into).collect();
        self
    }
}

/// The system under test. Blocking; one call per case.
pub trait Agent {
    fn invoke(&self, input: &str) -> Result<AgentResponse>;
}

impl<A: Agent + ?Sized> Agent for &A {
    fn invoke(&self, input: &str) -> Result<AgentResponse> {
        (**self).invoke(input)
    }
}

impl<A: Agent + ?Sized> Agent for Box<A> {
    fn invoke(&self, input: &str) -> Result<AgentResponse> {
        (**self).invoke(input)
    }
}

/// Adapts a closure into an [`Agent`].
pub struct FnAgent<F>(pub F);

impl<F> FnAgent<F>
where
    F: Fn(&str) -> Result<AgentResponse>,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> Agent for FnAgent<F>
where
    F: Fn(&str) -> Result<AgentResponse>,
{
    fn invoke(&self, input: &str) -> Result<AgentResponse> {
        (self.0)(input)
    }
}

#[derive(Debug, Clone)]
pub struct ScriptRule {
    pattern: Regex,
    output: String,
    tools: Vec<String>,
}

impl ScriptRule {
    /// `pattern` is matched case-insensitively; `output` may refer to captures as `$1` or `${name}`.
    pub fn new(pattern: &str, output: impl Into<String>, tools: Vec<String>) -> Result<Self> {
        let pattern = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .with_context(|| t_args!("agent-bad-pattern", "pattern" => pattern))?;
        Ok(Self {
            pattern,
            output: output.into(),
            tools,
        })
    }
}

/// Answers from a fixed rule list. The first matching rule wins.
#[derive(Debug, Clone, Default)]
pub struct ScriptedAgent {
    rules: Vec<ScriptRule>,
    fallback: Option<String>,
}

impl ScriptedAgent {
    pub fn new(rules: Vec<ScriptRule>) -> Self {
        Self {
            rules,
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = Some(fallback.into());
        self
    }

    pub fn rule(mut self, pattern: &str, output: &str, tools: &[&str]) -> Result<Self> {
        let tools = tools.iter().map(|t| t.to_string()).collect();
        self.rules.push(ScriptRule::new(pattern, output, tools)?);
        Ok(self)
    }
}

impl Agent for ScriptedAgent {
    fn invoke(&self, input: &str) -> Result<AgentResponse> {
        for rule in &self.rules {
            if let Some(caps) = rule.pattern.captures(input) {
                let mut output = String::new();
                caps.expand(&rule.output, &mut output);
                return Ok(AgentResponse {
                    output,
                    tools_used: rule.tools.clone(),
                });
            }
        }
        match &self.fallback {
            Some(text) => Ok(AgentResponse::text(text.clone())),
            None => Err(anyhow!(t_args!("agent-no-rule", "input" => input))),
        }
    }
}

/// Runs an external program per invocation: input on stdin, answer on stdout.
///
/// Stdout is either plain text or a JSON object `{"output": ..., "tools_used": [...]}`.
#[derive(Debug, Clone)]
pub struct CommandAgent {
    pub command: String,
    pub args: Vec<String>,
    /// Kill the process at this deadline. `None` waits indefinitely.
    pub timeout: Option<Duration>,
    pub quiet: bool, // silence agent stderr when true
}

#[derive(Deserialize)]
struct WireResponse {
    output: String,
    #[serde(default)]
    tools_used: Vec<String>,
}

/// Interprets what a command agent printed.
pub fn parse_agent_stdout(raw: &str) -> AgentResponse {
    let trimmed = raw.trim();
    if trimmed.starts_with('{') {
        if let Ok(wire) = serde_json::from_str::<WireResponse>(trimmed) {
            return AgentResponse {
                output: wire.output,
                tools_used: wire.tools_used,
            };
        }
    }
    AgentResponse::text(raw)
}

impl CommandAgent {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            timeout: None,
            quiet: false,
        }
    }

    /// Fails when the command cannot be found, so misconfiguration surfaces before any case runs.
    pub fn validate(&self) -> Result<()> {
        let looks_like_path = self.command.contains(std::path::MAIN_SEPARATOR)
            || self.command.starts_with("./")
            || self.command.starts_with(".\\");
        if looks_like_path {
            if Path::new(&self.command).is_file() {
                return Ok(());
            }
        } else if which::which(&self.command).is_ok() {
            return Ok(());
        }
        Err(anyhow!(t_args!("agent-not-found", "cmd" => &self.command)))
    }
}

impl Agent for CommandAgent {
    fn invoke(&self, input: &str) -> Result<AgentResponse> {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(if self.quiet {
                Stdio::null()
            } else {
                Stdio::inherit()
            });

        let mut child = cmd
            .spawn()
            .with_context(|| t_args!("agent-failed-to-start", "cmd" => &self.command))?;

        // Drain stdout concurrently so a chatty agent cannot block on a full pipe.
        let Some(mut stdout) = child.stdout.take() else {
            kill_and_reap(&mut child);
            return Err(anyhow!(t!("agent-missing-stdout")));
        };
        let reader = std::thread::spawn(move || {
            let mut buf = Vec::new();
            stdout.read_to_end(&mut buf).map(|_| buf)
        });

        let Some(mut stdin) = child.stdin.take() else {
            kill_and_reap(&mut child);
            return Err(anyhow!(t!("agent-missing-stdin")));
        };
        // Written off-thread so an agent that never reads cannot stall the deadline.
        let payload = format!("{input}\n");
        let writer = std::thread::spawn(move || {
            // Dropping stdin at the end signals EOF
            match stdin.write_all(payload.as_bytes()) {
                // The agent may legitimately exit without reading its input.
                Err(e) if e.kind() == ErrorKind::BrokenPipe => Ok(()),
                other => other,
            }
        });

        let waited = match self.timeout {
            Some(timeout) => child.wait_timeout(timeout),
            None => child.wait().map(Some),
        };
        let status = match (waited, self.timeout) {
            (Ok(Some(status)), _) => status,
            (Ok(None), timeout) => {
                kill_and_reap(&mut child);
                let secs = timeout.unwrap_or_default().as_secs_f64();
                return Err(anyhow!(
                    t_args!("agent-timeout", "secs" => format!("{secs:.2}"))
                ));
            }
            (Err(e), _) => {
                kill_and_reap(&mut child);
                return Err(e).context(t!("agent-wait-failed"));
            }
        };

        writer
            .join()
            .map_err(|_| anyhow!(t!("agent-writer-panicked")))?
            .context(t!("agent-write-failed"))?;
        let stdout = reader
            .join()
            .map_err(|_| anyhow!(t!("agent-reader-panicked")))?
            .context(t!("agent-read-failed"))?;
        let stdout = String::from_utf8_lossy(&stdout);

        if !status.success() {
            return Err(anyhow!(t_args!("agent-exit-status", "status" => status)));
        }

        Ok(parse_agent_stdout(&stdout))
    }
}

/// Kills the child and waits for it so no process or reader thread outlives the call.
fn kill_and_reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_agent_expands_captures() -> Result<()> {
        let agent = ScriptedAgent::default().rule(
            r"weather in (\w[\w ]*)\??$",
            "It's always sunny in $1!",
            &["get_weather"],
        )?;
        let res = agent.invoke("What's the weather in Paris?")?;
        assert_eq!(res.output, "It's always sunny in Paris!");
        assert_eq!(res.tools_used, vec!["get_weather".to_string()]);
        Ok(())
    }

    #[test]
    fn scripted_agent_first_rule_wins() -> Result<()> {
        let agent = ScriptedAgent::default()
            .rule("calc", "first", &[])?
            .rule("calc", "second", &[])?;
        assert_eq!(agent.invoke("CALC 2+2")?.output, "first");
        Ok(())
    }

    #[test]
    fn scripted_agent_without_match_errors_unless_fallback() -> Result<()> {
        let agent = ScriptedAgent::default().rule("^never$", "x", &[])?;
        assert!(agent.invoke("hello").is_err());

        let agent = agent.with_fallback("I don't know");
        assert_eq!(agent.invoke("hello")?, AgentResponse::text("I don't know"));
        Ok(())
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        assert!(ScriptRule::new("(unclosed", "x", vec![]).is_err());
    }

    #[test]
    fn stdout_json_is_structured_response() {
        let res = parse_agent_stdout("{\"output\": \"4\", \"tools_used\": [\"calculator\"]}\n");
        assert_eq!(res.output, "4");
        assert_eq!(res.tools_used, vec!["calculator".to_string()]);
    }

    #[test]
    fn stdout_plain_text_has_no_tools() {
        let res = parse_agent_stdout("{not json at all\n");
        assert_eq!(res.output, "{not json at all\n");
        assert!(res.tools_used.is_empty());
    }
}
