use anyhow::{bail, Context, Error};
use clap::{App, Arg, SubCommand};
use httpdiff::config::Config;
use httpdiff::dispatcher::Dispatcher;
use httpdiff::interrupt;
use httpdiff::timing::fmt_duration;
use httpdiff_client::{HttpClient, JsonClient};
use httpdiff_metrics::Stopwatch;
use slog::{info, o, Drain, Level};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;
use tokio::runtime::Runtime;

const DEFAULT_CONFIG: &str = "./config/config.toml";

fn with_level<D>(drain: D, level: Level) -> slog::Logger
where
    D: Drain<Ok = (), Err = slog::Never> + Send + 'static,
{
    let async_drain = slog_async::Async::new(drain).build().fuse();
    let level_filter = slog::LevelFilter(async_drain, level).fuse();
    slog::Logger::root(level_filter, o!())
}

fn root_logger(level: Level, path: Option<&Path>) -> Result<slog::Logger, Error> {
    let logger = match path {
        Some(p) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(p)
                .with_context(|| format!("could not open log file {}", p.display()))?;
            let decorator = slog_term::PlainDecorator::new(file);
            with_level(slog_term::FullFormat::new(decorator).build().fuse(), level)
        }
        None => {
            let decorator = slog_term::TermDecorator::new().stdout().build();
            with_level(slog_term::FullFormat::new(decorator).build().fuse(), level)
        }
    };
    Ok(logger)
}

fn client(config: &Config) -> Arc<dyn HttpClient> {
    Arc::new(JsonClient::new(config.http.clone()))
}

/// Validate the config and payload files without sending anything.
fn check(logger: &slog::Logger, config: Config) -> Result<(), Error> {
    let client = client(&config);
    let dispatcher = Dispatcher::create(config.tasks, client, logger)?;
    for m in dispatcher.monitors() {
        println!("{}: {} payload lines", m.name(), m.statistics().total());
    }
    Ok(())
}

async fn run(logger: slog::Logger, config: Config) -> Result<(), Error> {
    let interrupted = interrupt::register().context("could not install Ctrl+C handler")?;
    let client = client(&config);
    let dispatcher = Dispatcher::create(config.tasks, client, &logger)?;
    info!(logger, "starting"; "app" => &config.app_name, "tasks" => dispatcher.monitors().len());

    let timer = Stopwatch::new();
    let done = dispatcher.done();
    let handle = dispatcher.start(interrupted.receiver());
    tokio::select! {
        _ = done.fired() => {}
        _ = interrupted.wait() => info!(logger, "interrupted, waiting for tasks to stop"),
    }
    let reports = handle.await.context("dispatcher crashed")?;
    info!(logger, "run finished"; "elapsed" => fmt_duration(&timer.elapsed()));

    let failed: Vec<&str> = reports
        .iter()
        .filter(|r| r.result.is_err())
        .map(|r| r.name.as_str())
        .collect();
    if !failed.is_empty() {
        bail!("tasks failed: {}", failed.join(", "));
    }
    Ok(())
}

fn start(logger: slog::Logger, config: Config) -> Result<(), Error> {
    let rt = Runtime::new().context("could not start runtime")?;
    rt.block_on(run(logger, config))
}

fn main() {
    let matches = App::new("http-diff")
        .version("1.0")
        .about("Compare the responses of two HTTP endpoints over recorded payloads")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("Path to config file")
                .default_value(DEFAULT_CONFIG)
                .takes_value(true),
        )
        .arg(
            Arg::with_name("v")
                .short("v")
                .multiple(true)
                .help("Sets verbosity level"),
        )
        .subcommand(SubCommand::with_name("start").about("run every configured comparison"))
        .subcommand(
            SubCommand::with_name("check").about("validate the config and count payload lines"),
        )
        .get_matches();
    let config_path = matches.value_of("config").unwrap_or(DEFAULT_CONFIG);
    let config = match Config::load(config_path) {
        Ok(conf) => conf,
        Err(e) => {
            eprintln!("Could not load config: {}", e);
            std::process::exit(1);
        }
    };
    let level = match matches.occurrences_of("v") {
        0 => config.log.level.unwrap_or(Level::Warning),
        1 => Level::Info,
        2 => Level::Debug,
        3 => Level::Trace,
        _ => {
            eprintln!("WARNING: more than -vvv is ignored");
            Level::Trace
        }
    };
    let logger = match root_logger(level, config.log.path.as_deref()) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("{:#}", e);
            std::process::exit(1);
        }
    };
    let result = match matches.subcommand_name() {
        Some("check") => check(&logger, config),
        _ => start(logger.clone(), config),
    };
    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        drop(logger);
        std::process::exit(1);
    }
}
