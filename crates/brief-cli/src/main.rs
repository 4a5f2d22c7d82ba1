//! `brief`: research a topic from the command line

use anyhow::Context;
use brief_core::{BriefConfig, ChannelSink, ProgressEvent};
use brief_pipeline::{Orchestrator, RunOutcome};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

const EXIT_OK: i32 = 0;
const EXIT_FAILED: i32 = 1;
const EXIT_INVALID: i32 = 2;

fn cli() -> Command {
    Command::new("brief")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Research a topic and write a cited brief")
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .env("BRIEF_CONFIG")
                .value_parser(value_parser!(PathBuf))
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .env("BRIEF_LOG_JSON")
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines on stderr"),
        )
        .subcommand(
            Command::new("research")
                .about("Run the research pipeline for a topic")
                .arg(Arg::new("topic").required(true).help("Research topic"))
                .arg(
                    Arg::new("max-rounds")
                        .long("max-rounds")
                        .env("BRIEF_MAX_ROUNDS")
                        .value_parser(value_parser!(u32))
                        .help("Retrieve/synthesize/verify rounds"),
                )
                .arg(
                    Arg::new("per-domain-cap")
                        .long("per-domain-cap")
                        .env("BRIEF_PER_DOMAIN_CAP")
                        .value_parser(value_parser!(usize))
                        .help("Documents kept per domain"),
                )
                .arg(
                    Arg::new("fetch-timeout")
                        .long("fetch-timeout")
                        .env("BRIEF_FETCH_TIMEOUT")
                        .value_parser(parse_secs)
                        .help("Seconds allowed for one page fetch"),
                )
                .arg(
                    Arg::new("robots-timeout")
                        .long("robots-timeout")
                        .env("BRIEF_ROBOTS_TIMEOUT")
                        .value_parser(parse_secs)
                        .help("Seconds allowed for one robots.txt verdict"),
                )
                .arg(
                    Arg::new("max-revisions")
                        .long("max-revisions")
                        .env("BRIEF_MAX_REVISIONS")
                        .value_parser(value_parser!(u32))
                        .help("Extra write passes triggered by critique"),
                )
                .arg(
                    Arg::new("budget")
                        .long("budget")
                        .env("BRIEF_BUDGET")
                        .value_parser(parse_secs)
                        .help("Wall-clock budget for the run, in seconds"),
                )
                .arg(
                    Arg::new("format")
                        .long("format")
                        .env("BRIEF_FORMAT")
                        .default_value("markdown")
                        .value_parser(["markdown", "json"])
                        .help("Report output format"),
                )
                .arg(
                    Arg::new("output")
                        .long("output")
                        .short('o')
                        .env("BRIEF_OUTPUT")
                        .value_parser(value_parser!(PathBuf))
                        .help("Write the report here instead of stdout"),
                )
                .arg(
                    Arg::new("no-critic")
                        .long("no-critic")
                        .env("BRIEF_NO_CRITIC")
                        .action(ArgAction::SetTrue)
                        .help("Skip the critique and revision pass"),
                ),
        )
        .subcommand(Command::new("config").about("Print the effective configuration as TOML"))
}

fn parse_secs(raw: &str) -> Result<Duration, String> {
    let secs: f64 = raw.parse().map_err(|e| format!("{raw:?} is not a number: {e}"))?;
    if !secs.is_finite() || secs <= 0.0 {
        return Err(format!("{raw:?} must be a positive number of seconds"));
    }
    Ok(Duration::from_secs_f64(secs))
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.with_target(false).init();
    }
}

fn load_config(args: &ArgMatches) -> anyhow::Result<BriefConfig> {
    match args.get_one::<PathBuf>("config") {
        Some(path) => BriefConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => Ok(BriefConfig::default()),
    }
}

/// Apply command-line overrides on top of the file values
fn apply_overrides(config: &mut BriefConfig, args: &ArgMatches) {
    let limits = &mut config.constraints;
    if let Some(rounds) = args.get_one::<u32>("max-rounds") {
        limits.max_rounds = *rounds;
    }
    if let Some(cap) = args.get_one::<usize>("per-domain-cap") {
        limits.per_domain_cap = *cap;
    }
    if let Some(timeout) = args.get_one::<Duration>("fetch-timeout") {
        limits.fetch_timeout = *timeout;
    }
    if let Some(timeout) = args.get_one::<Duration>("robots-timeout") {
        limits.robots_timeout = *timeout;
    }
    if let Some(revisions) = args.get_one::<u32>("max-revisions") {
        limits.max_revisions = *revisions;
    }
    if let Some(budget) = args.get_one::<Duration>("budget") {
        limits.wall_clock_budget = *budget;
    }
}

fn render(outcome: &RunOutcome, format: &str) -> anyhow::Result<String> {
    if format == "json" {
        let dump = serde_json::json!({
            "report": outcome.report,
            "state": outcome.state,
        });
        return serde_json::to_string_pretty(&dump).context("serializing report");
    }
    Ok(outcome.report.to_markdown())
}

fn write_output(text: &str, output: Option<&PathBuf>) -> anyhow::Result<()> {
    match output {
        Some(path) => std::fs::write(path, text)
            .with_context(|| format!("writing report to {}", path.display())),
        None => {
            println!("{text}");
            Ok(())
        }
    }
}

async fn print_progress(mut rx: mpsc::Receiver<ProgressEvent>) {
    while let Some(event) = rx.recv().await {
        match &event.detail {
            Some(detail) => tracing::debug!(
                stage = %event.stage,
                round = event.round,
                percent = event.percent,
                %detail,
                "progress"
            ),
            None => tracing::info!(
                stage = %event.stage,
                round = event.round,
                percent = event.percent,
                "progress"
            ),
        }
    }
}

async fn research(args: &ArgMatches) -> i32 {
    let mut config = match load_config(args) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!("{err:#}");
            return EXIT_INVALID;
        }
    };
    apply_overrides(&mut config, args);
    if let Err(err) = config.validate() {
        tracing::error!("invalid configuration: {err}");
        return EXIT_INVALID;
    }

    let orchestrator = match Orchestrator::from_config(&config) {
        Ok(orchestrator) => orchestrator,
        Err(err) => {
            tracing::error!("cannot set up providers: {err}");
            return EXIT_INVALID;
        }
    };
    let orchestrator = if args.get_flag("no-critic") {
        orchestrator.without_critic()
    } else {
        orchestrator
    };

    let (sink, rx) = ChannelSink::new(256);
    let orchestrator = orchestrator.with_sink(Arc::new(sink));
    let printer = tokio::spawn(print_progress(rx));

    let topic = args.get_one::<String>("topic").map(String::as_str).unwrap_or_default();
    let result = orchestrator.run(topic, config.constraints.clone()).await;
    drop(orchestrator);
    if let Err(err) = printer.await {
        tracing::warn!("progress printer stopped: {err}");
    }

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(failure) if failure.is_invalid_input() => {
            tracing::error!("{failure}");
            return EXIT_INVALID;
        }
        Err(failure) => {
            tracing::error!(kind = %failure.failure.kind, "run failed: {failure}");
            return EXIT_FAILED;
        }
    };

    let format = args
        .get_one::<String>("format")
        .map_or("markdown", String::as_str);
    let written = render(&outcome, format)
        .and_then(|text| write_output(&text, args.get_one::<PathBuf>("output")));
    if let Err(err) = written {
        tracing::error!("{err:#}");
        return EXIT_FAILED;
    }
    tracing::info!(
        claims = outcome.report.coverage.claims_total,
        covered = outcome.report.coverage.claims_covered,
        references = outcome.report.references.len(),
        failures = outcome.state.partial_failures.len(),
        "brief ready"
    );
    EXIT_OK
}

fn show_config(args: &ArgMatches) -> i32 {
    let rendered = load_config(args).and_then(|config| {
        config
            .to_toml_string()
            .context("rendering configuration")
    });
    match rendered {
        Ok(text) => {
            print!("{text}");
            EXIT_OK
        }
        Err(err) => {
            tracing::error!("{err:#}");
            EXIT_INVALID
        }
    }
}

#[tokio::main]
async fn main() {
    let matches = cli().get_matches();
    init_logging(matches.get_flag("log-json"));

    let code = match matches.subcommand() {
        Some(("research", args)) => research(args).await,
        Some(("config", args)) => show_config(args),
        _ => {
            if let Err(err) = cli().print_help() {
                tracing::error!("{err}");
            }
            EXIT_INVALID
        }
    };
    std::process::exit(code);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_definition_is_consistent() {
        cli().debug_assert();
    }

    #[test]
    fn flags_override_file_values() {
        let matches = cli()
            .try_get_matches_from([
                "brief",
                "research",
                "solid-state batteries",
                "--max-rounds",
                "2",
                "--per-domain-cap",
                "1",
                "--budget",
                "30.5",
            ])
            .unwrap();
        let (_, args) = matches.subcommand().unwrap();
        let mut config = BriefConfig::default();
        apply_overrides(&mut config, args);
        assert_eq!(config.constraints.max_rounds, 2);
        assert_eq!(config.constraints.per_domain_cap, 1);
        assert_eq!(config.constraints.wall_clock_budget, Duration::from_millis(30_500));
        assert_eq!(config.constraints.fetch_timeout, Duration::from_secs(15));
    }

    #[test]
    fn seconds_must_be_positive() {
        assert!(parse_secs("0").is_err());
        assert!(parse_secs("-3").is_err());
        assert!(parse_secs("soon").is_err());
        assert_eq!(parse_secs("2.5"), Ok(Duration::from_millis(2_500)));
    }

    #[test]
    fn unknown_format_is_rejected() {
        let parsed = cli().try_get_matches_from(["brief", "research", "topic", "--format", "pdf"]);
        assert!(parsed.is_err());
    }
}
