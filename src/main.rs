use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use scholar_harvest::config::{find_config_file, load_config, Settings};
use scholar_harvest::harvest::{build_single, run_single, Orchestrator, RunMode};
use scholar_harvest::models::QueryOptions;
use scholar_harvest::sources::LibraryRegistry;
use scholar_harvest::store::ResultsStore;
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Scholar Harvest - resumable batch queries against academic digital libraries
#[derive(Parser, Debug)]
#[command(name = "scholar-harvest")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Query digital libraries in resumable batches and collect the results", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (can be used multiple times for more verbosity: -v, -vv)
    #[arg(long, short, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output (before the subcommand: `scholar-harvest -q auto ...`)
    #[arg(long, short)]
    quiet: bool,

    /// Configuration file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the supported digital libraries
    #[command(alias = "list")]
    Libraries,

    /// Show the query options a library understands
    Describe {
        /// Library name or alias
        library: String,
    },

    /// Run a single query against one library
    Query {
        /// Library name or alias
        #[arg(long, short)]
        library: String,

        /// API key (defaults to the library's environment variable)
        #[arg(long, short)]
        key: Option<String>,

        /// Extra request option passed to the library as-is (KEY=VALUE)
        #[arg(long = "option", short = 'o', value_parser = parse_key_value)]
        options: Vec<(String, String)>,

        /// Query option (KEY=VALUE), e.g. -q query_text=rust -q year=2021
        #[arg(long = "query", short = 'q', value_parser = parse_key_value, required = true)]
        query: Vec<(String, String)>,

        /// Results file; existing results are kept and extended
        #[arg(long, short)]
        results: PathBuf,

        /// Number of results to skip
        #[arg(long, default_value_t = 0)]
        start: u64,

        /// Results per request (defaults to the library's page size)
        #[arg(long)]
        page_size: Option<u64>,

        /// Maximum number of requests (default: until exhausted)
        #[arg(long, short)]
        batches: Option<usize>,
    },

    /// Run a plan, resuming from its status file
    Auto {
        /// Plan file (JSON)
        #[arg(long, short)]
        plan: PathBuf,

        /// Status file; created on first run
        #[arg(long, short)]
        status: PathBuf,

        /// Results file
        #[arg(long, short)]
        output: PathBuf,

        /// Number of sweeps (default: until every query is complete)
        #[arg(long, short)]
        batches: Option<usize>,
    },

    /// Print the effective settings as TOML
    Settings,
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}

fn progress_bar(quiet: bool) -> ProgressBar {
    if quiet || !std::io::stderr().is_terminal() {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(0);
    if let Ok(style) =
        ProgressStyle::with_template("{spinner:.cyan} [{elapsed_precise}] {wide_bar:.cyan/blue} {pos}/{len} {msg}")
    {
        bar.set_style(style.progress_chars("█▉▊▋▌▍▎▏ "));
    }
    bar
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let path = match &cli.config {
        Some(path) => Some(path.clone()),
        None => find_config_file(),
    };
    if let Some(path) = &path {
        tracing::info!("Using config file: {}", path.display());
    }
    load_config(path.as_deref()).context("failed to load configuration")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing based on verbosity
    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let env_filter = if cli.quiet { "error" } else { log_level };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("scholar_harvest={}", env_filter)),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let settings = load_settings(&cli)?;
    let registry = LibraryRegistry::new();

    match cli.command {
        Commands::Libraries => {
            for entry in registry.all() {
                println!("{:<16} {}", entry.provider.id(), entry.provider.description());
                println!("{:<16} aliases: {}", "", entry.aliases.join(", "));
                if let Some(var) = &entry.env_var {
                    println!("{:<16} key: {}", "", var);
                }
            }
        }

        Commands::Describe { library } => {
            let entry = registry.get_required(&library)?;
            println!("{}", entry.provider.description());
            print!("{}", entry.provider.describe_options());
        }

        Commands::Query {
            library,
            key,
            options,
            query,
            results,
            start,
            page_size,
            batches,
        } => {
            let options: QueryOptions = options.into_iter().collect();
            let query: QueryOptions = query.into_iter().collect();

            let mut library = build_single(&registry, &library, key.as_deref(), &options, &query)?;
            library.set_start(start);
            if let Some(page_size) = page_size {
                library.set_page_size(page_size);
            }
            library.set_rate_limit_pause(settings.rate_limit_pause());

            let transport = settings.http_client()?;
            let mut store = ResultsStore::open(&results, settings.store.save_every)?;
            let summary = run_single(&mut library, &transport, &mut store, &query, batches).await?;

            if !cli.quiet {
                eprintln!(
                    "{} requests, {} new records, {} in {}",
                    summary.pages,
                    summary.new_records,
                    summary.total_records,
                    results.display()
                );
            }
            if let Some(error) = library.error() {
                bail!("{} stopped: {}", library.name(), error);
            }
        }

        Commands::Auto {
            plan,
            status,
            output,
            batches,
        } => {
            let transport = settings.http_client()?;
            let mode = match batches {
                Some(rounds) => RunMode::Rounds(rounds),
                None => RunMode::UntilComplete,
            };

            let mut orchestrator = Orchestrator::open(
                &plan,
                &status,
                &output,
                settings.store.save_every,
                &registry,
                &transport,
            )?
            .with_rate_limit_pause(settings.rate_limit_pause())
            .with_progress(progress_bar(cli.quiet));

            let summary = orchestrator.run(mode).await?;
            if !cli.quiet {
                eprintln!(
                    "{} rounds, {} requests, {} new records, {} in {}, {} queries left",
                    summary.rounds,
                    summary.pages,
                    summary.new_records,
                    summary.total_records,
                    output.display(),
                    summary.incomplete
                );
            }
        }

        Commands::Settings => {
            print!("{}", settings.to_toml()?);
        }
    }

    Ok(())
}
