// ═══════════════════════════════════════════════════════════
// whereami — command line and interactive prompt
// ═══════════════════════════════════════════════════════════

use std::io::{self, Stdout};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rustyline::error::ReadlineError;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use whereami::batch::{self, BatchMode};
use whereami::config::{self, Config};
use whereami::{
    Fetcher, FixedPosition, Geolocation, LocationQuery, RenderContext, Resolver, Scheduler, TerminalRenderer,
    Trigger, UreqTransport,
};

const LOG_ENV: &str = "WHEREAMI_LOG";

#[derive(Parser)]
#[command(name = "whereami", version, about = "Find out which country you are in, and who its neighbours are")]
struct Cli {
    /// Config file (defaults to <config dir>/whereami/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Per-stage lookup timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<f64>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Show a country and its first neighbour
    Country { name: String },
    /// Reverse-geocode coordinates and show the country there
    Locate {
        /// Coordinates as LAT,LNG
        #[arg(allow_hyphen_values = true)]
        position: LocationQuery,
    },
    /// Look up several countries at once
    Batch {
        #[arg(long, value_enum, default_value_t = BatchMode::All)]
        mode: BatchMode,
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Interactive prompt (default)
    Repl,
}

type Terminal = RenderContext<TerminalRenderer<Stdout>>;

fn init_tracing() {
    let env_filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(env_filter)
        .init();
}

fn build_resolver(scheduler: &Scheduler, config: &Config) -> Resolver {
    let transport = UreqTransport::new(config.connect_timeout(), config.read_timeout());
    let fetcher = Fetcher::new(scheduler, Arc::new(transport));
    Resolver::new(fetcher, config.endpoints()).with_stage_timeout(config.stage_timeout())
}

fn terminal() -> Terminal {
    RenderContext::new(TerminalRenderer::new(io::stdout()))
}

/// Runs one trigger to completion. Returns whether the chain succeeded.
fn dispatch(resolver: &Resolver, trigger: Trigger, ctx: &Terminal) -> bool {
    let scheduler = resolver.scheduler().clone();
    match trigger {
        Trigger::Country(name) => {
            let chain = resolver.country_and_neighbour(&name, ctx);
            scheduler.run();
            matches!(chain.outcome(), Some(Ok(_)))
        }
        Trigger::Position(query) => {
            let position = FixedPosition(query).current_position(&scheduler);
            let chain = resolver.where_am_i(position, ctx);
            scheduler.run();
            match chain.outcome() {
                Some(Ok(greeting)) => {
                    println!("{}", greeting);
                    true
                }
                _ => false,
            }
        }
    }
}

fn run(cli: Cli) -> Result<bool> {
    let mut config = Config::load(cli.config.as_deref())?;
    config.apply_overrides(std::env::var(config::AUTH_ENV).ok(), cli.timeout);
    tracing::debug!(?config, "configuration");

    let scheduler = Scheduler::new();
    let resolver = build_resolver(&scheduler, &config);
    let ctx = terminal();

    match cli.command.unwrap_or(Command::Repl) {
        Command::Country { name } => Ok(dispatch(&resolver, Trigger::Country(name), &ctx)),
        Command::Locate { position } => Ok(dispatch(&resolver, Trigger::Position(position), &ctx)),
        Command::Batch { mode, names } => {
            let combined = batch::lookup(&resolver, &names, mode, &ctx);
            scheduler.run();
            Ok(matches!(combined.outcome(), Some(Ok(_))))
        }
        Command::Repl => {
            repl(&resolver, &ctx)?;
            Ok(true)
        }
    }
}

// ── REPL ──────────────────────────────────────────────────────────────────────

fn history_path() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("whereami").join("history.txt"))
}

fn print_help() {
    println!("  <country name>   show a country and its first neighbour");
    println!("  <lat>,<lng>      show the country at these coordinates");
    println!("  :help            this message");
    println!("  :quit            exit");
}

fn repl(resolver: &Resolver, ctx: &Terminal) -> Result<()> {
    let mut editor = rustyline::DefaultEditor::new().context("could not start line editor")?;
    let history = history_path();
    if let Some(path) = &history {
        if editor.load_history(path).is_err() {
            tracing::debug!(path = %path.display(), "no history yet");
        }
    }

    println!("whereami: type a country or coordinates, :help for help, :quit to exit");

    loop {
        let line = match editor.readline("whereami> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e).context("could not read input"),
        };

        match line.trim() {
            ":quit" | ":q" | ":exit" => break,
            ":help" | ":h" => {
                print_help();
                continue;
            }
            _ => {}
        }

        let Some(trigger) = Trigger::parse(&line) else { continue };
        if let Err(e) = editor.add_history_entry(line.trim()) {
            tracing::debug!(error = %e, "could not record history entry");
        }
        dispatch(resolver, trigger, ctx);
    }

    if let Some(path) = &history {
        let saved = path
            .parent()
            .map_or(Ok(()), std::fs::create_dir_all)
            .map_err(ReadlineError::from)
            .and_then(|_| editor.save_history(path));
        if let Err(e) = saved {
            tracing::warn!(path = %path.display(), error = %e, "could not save history");
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
