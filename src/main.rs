use agent_eval::agent::{Agent, CommandAgent};
use agent_eval::i18n;
use agent_eval::report::{
    OutputKind, ReportOptions, render_case, render_comparison, render_footer,
};
use agent_eval::spec::{AgentChoice, SuiteWithConfig, load_specs, parse_budget, repeat_cases};
use agent_eval::suite::{EvalSuite, numbered_save_path};
use agent_eval::telemetry::{init_tracing, route_panics_to_tracing};
use agent_eval::types::SuiteSummary;
use agent_eval::{t, t_args};
use anyhow::Result;
use clap::{CommandFactory, Parser, ValueEnum, error::ErrorKind};
use colored::Colorize;
use colored::control::set_override as set_color_override;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::{error, info};

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Compact,
    Terse,
    Final,
    Normal,
}

impl From<OutputFormat> for OutputKind {
    fn from(v: OutputFormat) -> Self {
        match v {
            OutputFormat::Normal => OutputKind::Normal,
            OutputFormat::Compact => OutputKind::Compact,
            OutputFormat::Terse => OutputKind::Terse,
            OutputFormat::Final => OutputKind::Final,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug, Clone)]
#[command(version, author, about = t!("cli-about"))]
struct Cli {
    // TEST_PATHS: suite files (YAML/JSON) or directories containing them
    #[arg(value_name = "TEST_PATHS", required = true)]
    tests: Vec<PathBuf>,

    // Command agent, overrides the suite file
    #[arg(
        long = "agent-cmd",
        value_name = "CMD",
        env = "AGENT_EVAL_AGENT_CMD",
        help = t!("cli-agent-cmd")
    )]
    agent_cmd: Option<String>,

    #[arg(
        long = "agent-arg",
        value_name = "ARG",
        allow_hyphen_values = true,
        requires = "agent_cmd",
        help = t!("cli-agent-arg")
    )]
    agent_args: Vec<String>,

    // Hard deadline per invocation, in seconds
    #[arg(
        long = "invoke-timeout",
        value_name = "SECS",
        env = "AGENT_EVAL_INVOKE_TIMEOUT",
        help = t!("cli-invoke-timeout")
    )]
    invoke_timeout: Option<f64>,

    // Replaces every case's time budget
    #[arg(
        long = "time-budget",
        value_name = "SECS",
        env = "AGENT_EVAL_TIME_BUDGET",
        help = t!("cli-time-budget")
    )]
    time_budget: Option<f64>,

    #[arg(
        long = "repeat",
        value_name = "N",
        default_value_t = 1,
        help = t!("cli-repeat")
    )]
    repeat: usize,

    #[arg(long = "save", value_name = "FILE", help = t!("cli-save"))]
    save: Option<PathBuf>,

    #[arg(short = 'q', long = "silent", help = t!("cli-silent"))]
    silent: bool,

    #[arg(short = 'c', long = "color", alias = "colour", help = t!("cli-color"))]
    color: bool,

    #[arg(long = "no-color", conflicts_with = "color", help = t!("cli-no-color"))]
    no_color: bool,

    #[arg(short = 'v', long = "verbose", help = t!("cli-verbose"))]
    verbose: bool,

    #[arg(
        short = 'f',
        long = "hide-fails",
        conflicts_with = "hide_passes",
        help = t!("cli-hide-fails")
    )]
    hide_fails: bool,

    #[arg(
        short = 'p',
        long = "hide-passes",
        conflicts_with = "hide_fails",
        help = t!("cli-hide-passes")
    )]
    hide_passes: bool,

    // -t/--test: number (1..N) or exact case name. 0 / list prints all cases and exits.
    #[arg(short = 't', long = "test", value_name = "TEST", help = t!("cli-test"))]
    test: Option<String>,

    #[arg(
        short = 'o',
        long = "output",
        value_enum,
        default_value = "normal",
        help = t!("cli-output")
    )]
    output: OutputFormat,

    #[arg(
        long = "log-format",
        value_enum,
        default_value = "text",
        help = t!("cli-log-format")
    )]
    log_format: LogFormat,
}

fn display_path(path: &str) -> String {
    match std::fs::canonicalize(Path::new(path)) {
        Ok(p) => p.to_string_lossy().into_owned(),
        Err(_) => path.to_string(),
    }
}

fn resolve_command_path(cmd: &str) -> String {
    if cmd.contains(std::path::MAIN_SEPARATOR) || cmd.starts_with("./") || cmd.starts_with(".\\") {
        return display_path(cmd);
    }
    match which::which(cmd) {
        Ok(p) => p.to_string_lossy().into_owned(),
        Err(_) => cmd.to_string(),
    }
}

/// Bold CLI flags at the start of help lines
fn format_flags_bold(text: &str) -> String {
    let Ok(flag_regex) = Regex::new(r"(?m)^(\s*)(--?\w+(?:-\w+[^<\n]*)*)") else {
        return text.to_string();
    };
    flag_regex
        .replace_all(text, |caps: &regex::Captures| {
            format!("{}{}", &caps[1], caps[2].bold())
        })
        .to_string()
}

fn localize_clap_text(mut text: String) -> String {
    text = text.replace("Usage:", &t!("cli-usage").bold().underline().to_string());
    text = text.replace("Arguments:", &t!("cli-help-arguments").bold().underline().to_string());
    text = text.replace("Options:", &t!("cli-help-options").bold().underline().to_string());
    text = text.replace("[default:", &format!("[{}:", t!("cli-help-default")));
    text = text.replace("[possible values:", &format!("[{}:", t!("cli-help-possible-values")));
    text = text.replace("[env:", &format!("[{}:", t!("cli-help-env")));
    text = text.replace("Print help", &t!("cli-help-print-help"));
    text = text.replace("Print version", &t!("cli-help-print-version"));
    text = text.replace("error:", &t!("cli-error-label").red().bold().to_string());
    text = text.replace("For more information, try '--help'.", &t!("cli-error-help-info"));
    text = text.replace("agent-eval", &"agent-eval".bold().to_string());
    format_flags_bold(&text)
}

fn parse_cli() -> Cli {
    match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) => match error.kind() {
            ErrorKind::DisplayHelp => {
                let help = Cli::command().render_long_help().to_string();
                println!("{}", localize_clap_text(help));
                std::process::exit(0);
            }
            ErrorKind::DisplayVersion => {
                println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            _ => {
                eprintln!("{}", localize_clap_text(error.to_string()));
                std::process::exit(2);
            }
        },
    }
}

fn print_case_list(suites: &[SuiteWithConfig], to_stderr: bool) {
    let lines = std::iter::once(t!("available-tests")).chain(
        suites
            .iter()
            .flat_map(|s| s.cases.iter().map(move |c| (s, c)))
            .enumerate()
            .map(|(idx, (s, c))| {
                t_args!("test-list-item",
                    "index" => (idx + 1),
                    "name" => &c.name,
                    "suite" => &s.name
                )
            }),
    );
    for line in lines {
        if to_stderr {
            eprintln!("{line}");
        } else {
            println!("{line}");
        }
    }
}

/// Keeps only the selected case. Returns false when nothing matched.
fn select_case(suites: &mut Vec<SuiteWithConfig>, selector: &str) -> bool {
    let total: usize = suites.iter().map(|s| s.cases.len()).sum();
    let matched = if let Ok(n) = selector.parse::<usize>() {
        if n == 0 || n > total {
            error!(
                "{}",
                t_args!("error-invalid-test-number", "number" => n, "max" => total)
            );
            return false;
        }
        let mut offset = 0;
        for s in suites.iter_mut() {
            let len = s.cases.len();
            if n > offset && n <= offset + len {
                let keep = s.cases[n - offset - 1].clone();
                s.cases = vec![keep];
            } else {
                s.cases.clear();
            }
            offset += len;
        }
        true
    } else {
        let mut found = false;
        for s in suites.iter_mut() {
            s.cases.retain(|c| c.name == selector);
            found |= !s.cases.is_empty();
        }
        if !found {
            error!("{}", t_args!("error-test-not-found", "test" => selector));
        }
        found
    };
    suites.retain(|s| !s.cases.is_empty());
    matched
}

fn resolve_agent(swc: &SuiteWithConfig, cli: &Cli) -> Result<Option<Box<dyn Agent>>> {
    let timeout = cli.invoke_timeout.map(parse_budget).transpose()?;
    if let Some(cmd) = &cli.agent_cmd {
        let agent = CommandAgent {
            command: cmd.trim().to_string(),
            args: cli.agent_args.clone(),
            timeout,
            quiet: cli.silent,
        };
        return checked_command(agent, cli).map(Some);
    }
    match swc.agent.clone() {
        Some(AgentChoice::Command(mut agent)) => {
            agent.quiet = cli.silent;
            if timeout.is_some() {
                agent.timeout = timeout;
            }
            checked_command(agent, cli).map(Some)
        }
        Some(AgentChoice::Scripted(agent)) => {
            if cli.verbose && !cli.silent {
                info!("{}", t_args!("info-agent-scripted", "suite" => &swc.name));
            }
            Ok(Some(Box::new(agent)))
        }
        None => Ok(None),
    }
}

fn checked_command(agent: CommandAgent, cli: &Cli) -> Result<Box<dyn Agent>> {
    if cli.verbose && !cli.silent {
        info!(
            "{}",
            t_args!("info-agent-command", "path" => resolve_command_path(&agent.command))
        );
    }
    agent.validate()?;
    Ok(Box::new(agent))
}

fn main() -> Result<()> {
    i18n::init();
    let cli = parse_cli();

    let filter = if cli.verbose {
        "agent_eval=info"
    } else {
        "agent_eval=warn"
    };
    init_tracing(cli.log_format == LogFormat::Json, filter);
    route_panics_to_tracing();

    // Colors: auto by default, -c forces on, --no-color forces off
    if cli.no_color {
        set_color_override(false);
    } else if cli.color {
        set_color_override(true);
    }

    let mut suites = match load_specs(&cli.tests) {
        Ok(suites) => suites,
        Err(e) => {
            error!("{e:#}");
            std::process::exit(2);
        }
    };
    if let Some(secs) = cli.time_budget {
        let budget = match parse_budget(secs) {
            Ok(budget) => budget,
            Err(e) => {
                error!("{e:#}");
                std::process::exit(2);
            }
        };
        for swc in &mut suites {
            for case in &mut swc.cases {
                case.time_budget = budget;
            }
        }
    }
    suites.retain(|swc| !swc.cases.is_empty());
    if suites.is_empty() {
        error!("{}", t!("error-no-tests"));
        std::process::exit(2);
    }

    if let Some(sel) = &cli.test {
        let trimmed = sel.trim();
        if trimmed == "0" || trimmed.eq_ignore_ascii_case("list") {
            print_case_list(&suites, false);
            return Ok(());
        }
        let all = suites.clone();
        if !select_case(&mut suites, trimmed) {
            print_case_list(&all, true);
            std::process::exit(2);
        }
    }

    if cli.verbose && !cli.silent {
        info!(
            "{}",
            t_args!("info-version",
                "name" => env!("CARGO_PKG_NAME"),
                "version" => env!("CARGO_PKG_VERSION")
            )
        );
    }

    let opts = ReportOptions {
        kind: cli.output.into(),
        verbose: cli.verbose,
        hide_fails: cli.hide_fails,
        hide_passes: cli.hide_passes,
    };

    let suite_count = suites.len();
    let mut summaries: Vec<SuiteSummary> = Vec::with_capacity(suite_count);
    for (idx, swc) in suites.iter().enumerate() {
        let agent = match resolve_agent(swc, &cli) {
            Ok(Some(agent)) => agent,
            Ok(None) => {
                error!("{}", t_args!("error-no-agent", "suite" => &swc.name));
                std::process::exit(2);
            }
            Err(e) => {
                error!("{}", t_args!("error-agent-config", "suite" => &swc.name, "error" => format!("{e:#}")));
                std::process::exit(2);
            }
        };

        let cases = repeat_cases(&swc.cases, cli.repeat);
        if cli.verbose && !cli.silent {
            info!(
                "{}",
                t_args!("info-starting-tests", "name" => &swc.name, "count" => cases.len())
            );
        }

        let mut suite = EvalSuite::new(agent, swc.name.clone());
        let run = suite.run_suite_with_progress(&cases, |_, _, result| {
            if !cli.silent && opts.shows(result) {
                print!("{}", render_case(result, cli.verbose));
            }
        });
        let summary = match run {
            Ok(summary) => summary,
            Err(e) => {
                error!("{}", t_args!("error-invalid-cases", "suite" => &swc.name, "error" => e));
                std::process::exit(2);
            }
        };

        if !cli.silent {
            print!("{}", render_footer(&summary, opts.kind));
            if cli.repeat > 1 {
                println!(
                    "{}",
                    t_args!("report-throughput", "rate" => format!("{:.2}", summary.throughput()))
                );
            }
        }

        if let Some(base) = &cli.save {
            let path = numbered_save_path(base, idx, suite_count);
            suite.save_results(&path)?;
            if !cli.silent {
                println!("{}", t_args!("info-saved", "file" => path.display()));
            }
        }

        summaries.push(summary);
    }

    if summaries.len() > 1 && !cli.silent {
        print!("{}", render_comparison(&summaries));
    }

    if summaries.iter().any(|s| !s.is_success()) {
        std::process::exit(1);
    }
    Ok(())
}
