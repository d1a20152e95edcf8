// src/main.rs

mod analyzer;
mod blame;
mod cli;
mod config;
mod format;
mod messages;
mod model;
mod renderer;
mod stack;
mod template;
mod trace;
mod ui;
mod viewport;

use analyzer::{analyze, Resolver};
use anyhow::{bail, Context, Result};
use blame::GitBlamer;
use clap::Parser;
use cli::Args;
use config::Config;
use format::Format;
use indicatif::{ProgressBar, ProgressStyle};
use renderer::Styles;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::time::Instant;
use trace::AnnotatedTrace;
use tracing::{debug, info};

/// Set up logging. The viewer owns the terminal, so it only logs to a file.
fn configure_tracing(args: &Args, interactive: bool) -> Result<()> {
    use tracing_subscriber::fmt::writer::BoxMakeWriter;
    use tracing_subscriber::{filter::LevelFilter, EnvFilter};

    let level_filter = if args.quiet {
        LevelFilter::ERROR
    } else {
        match args.verbose {
            0 => LevelFilter::WARN,
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    };

    let env_filter = EnvFilter::builder()
        .with_default_directive(level_filter.into())
        .with_env_var("BLAME_TRACE_LOG")
        .from_env()
        .context("Failed to parse filters from BLAME_TRACE_LOG environment variable")?;

    let (writer, ansi) = match &args.log_file {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            (BoxMakeWriter::new(std::sync::Mutex::new(file)), false)
        }
        None if interactive => (BoxMakeWriter::new(io::sink), false),
        None => (BoxMakeWriter::new(io::stderr), io::stderr().is_terminal()),
    };

    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_ansi(ansi)
        .with_env_filter(env_filter)
        .with_writer(writer)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}

/// Work tree of the repository containing `configured`, or the current directory when unset
fn locate_repository(configured: &Path) -> Result<PathBuf> {
    let start = if configured.as_os_str().is_empty() {
        std::env::current_dir().context("Failed to get current directory")?
    } else {
        configured.to_path_buf()
    };
    match blame::discover_repository(&start) {
        Some(repository) => Ok(repository),
        None => bail!("No git repository found at {}", start.display()),
    }
}

fn read_input(path: Option<&Path>) -> Result<Vec<u8>> {
    match path {
        Some(path) => {
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
        }
        None => {
            let mut raw = Vec::new();
            io::stdin()
                .lock()
                .read_to_end(&mut raw)
                .context("Failed to read dump from stdin")?;
            Ok(raw)
        }
    }
}

fn progress_bar(args: &Args) -> Result<ProgressBar> {
    if args.quiet {
        return Ok(ProgressBar::hidden());
    }
    let bar = ProgressBar::new(0);
    bar.set_style(ProgressStyle::with_template("{msg} {wide_bar} {pos}/{len} [{elapsed}]")?);
    bar.set_message("Blaming source lines");
    Ok(bar)
}

fn try_main(args: &Args) -> Result<()> {
    let interactive = !args.print && io::stdout().is_terminal();
    configure_tracing(args, interactive).context("Failed to initialize logging")?;

    let config_path = args.config.clone().unwrap_or_else(config::default_config_path);
    let mut config = Config::load(&config_path)?;
    if let Some(repo) = &args.repo {
        config.source.repository = repo.clone();
    }
    if let Some(revision) = &args.revision {
        config.source.revision = Some(revision.clone());
    }
    config.source.repository = locate_repository(&config.source.repository)?;
    debug!(
        "Blaming in {} at {}",
        config.source.repository.display(),
        config.source.revision_spec()
    );

    let format = Format::compile(&config.format).context("Invalid format configuration")?;
    let raw = read_input(args.input.as_deref())?;
    let resolver = Resolver::new(args.jobs)?;
    let blamer = GitBlamer::new(config.source.repository.clone());

    if interactive {
        let styles = Styles::from_palette(&config.format.colors)?;
        let source = config.source;
        return ui::run(format, styles, move || {
            analyze(&source, &raw, &blamer, &resolver, &ProgressBar::hidden())
        });
    }

    let t1 = Instant::now();
    let dump = analyze(&config.source, &raw, &blamer, &resolver, &progress_bar(args)?)?;
    info!("Processed dump in {:.2?}", t1.elapsed());

    let trace = AnnotatedTrace::build(&dump, &format);
    renderer::print_plain(&mut io::stdout().lock(), &trace, &dump, &format)
        .context("Failed to write output")
}

fn main() {
    let args = &Args::parse();
    if let Err(e) = try_main(args) {
        // -vv and up get the full error chain with a backtrace
        if args.verbose > 1 {
            eprintln!("Error: {e:?}");
        } else {
            eprintln!("Error: {e:#}");
        }
        std::process::exit(2);
    }
}
