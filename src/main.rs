use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use futures_util::StreamExt;
use scimesh::config::{default_config_path, find_config_file, load_config, Config};
use scimesh::models::{OnError, Paper, SearchResult};
use scimesh::query::parse;
use scimesh::search::{Federation, SearchEvent};
use scimesh::sources::{CitationDirection, PaperLookup};
use scimesh::utils::normalize;
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// scimesh - one query, many bibliographic providers
#[derive(Parser, Debug)]
#[command(name = "scimesh")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Federated search across academic metadata providers", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (-v, -vv)
    #[arg(long, short, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    /// Configuration file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Request timeout in seconds (overrides the config file)
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Show supported environment variables and exit
    #[arg(long)]
    env: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Output format for papers
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    /// One JSON object per line
    Json,
    /// Human-readable text
    Plain,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ErrorPolicy {
    Fail,
    Warn,
    Ignore,
}

impl From<ErrorPolicy> for OnError {
    fn from(policy: ErrorPolicy) -> Self {
        match policy {
            ErrorPolicy::Fail => OnError::Fail,
            ErrorPolicy::Warn => OnError::Warn,
            ErrorPolicy::Ignore => OnError::Ignore,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Direction {
    /// Papers citing the given one
    In,
    /// Papers the given one cites
    Out,
    Both,
}

impl From<Direction> for CitationDirection {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::In => CitationDirection::In,
            Direction::Out => CitationDirection::Out,
            Direction::Both => CitationDirection::Both,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Search the selected providers with a Scopus-style query
    #[command(visible_alias = "s")]
    Search {
        /// Query, e.g. 'TITLE-ABS-KEY("graph neural") AND PUBYEAR >= 2020'
        query: String,

        /// Provider to query (repeatable); defaults to the configured list or all
        #[arg(long = "provider", short = 'p')]
        providers: Vec<String>,

        /// Maximum records taken from each provider
        #[arg(long, short = 'n')]
        max_results: Option<usize>,

        /// Maximum unique papers overall
        #[arg(long, short = 't')]
        total: Option<usize>,

        /// What to do when a provider fails
        #[arg(long, value_enum)]
        on_error: Option<ErrorPolicy>,

        /// Print papers as soon as they are confirmed unique
        #[arg(long)]
        stream: bool,

        /// Keep every provider record as its own paper
        #[arg(long)]
        no_dedupe: bool,

        #[arg(long, short, value_enum, default_value_t = OutputFormat::Json)]
        output: OutputFormat,
    },

    /// Fetch one paper by DOI, arXiv DOI or provider id
    Get {
        paper_id: String,

        /// Provider to ask (semantic_scholar or openalex)
        #[arg(long = "provider", short = 'p', default_value = "semantic_scholar")]
        provider: String,

        #[arg(long, short, value_enum, default_value_t = OutputFormat::Json)]
        output: OutputFormat,
    },

    /// List papers citing a paper, cited by it, or both
    Citations {
        paper_id: String,

        #[arg(long, short, value_enum, default_value_t = Direction::Both)]
        direction: Direction,

        /// Provider to ask (semantic_scholar or openalex)
        #[arg(long = "provider", short = 'p', default_value = "openalex")]
        provider: String,

        #[arg(long, short = 'n', default_value_t = 100)]
        max_results: usize,

        #[arg(long, short, value_enum, default_value_t = OutputFormat::Json)]
        output: OutputFormat,
    },

    /// List compiled-in providers and what they search natively
    Providers,

    /// Parse a query and print its tree and canonical form
    Parse {
        query: String,
    },

    /// Write a default configuration file
    InitConfig {
        /// Destination (defaults to the user config directory)
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn print_env_vars() {
    println!("scimesh reads configuration from a TOML file and SCIMESH__* variables.");
    println!("Nested keys are separated by a double underscore.");
    println!();
    println!("Search defaults:");
    println!("  SCIMESH__SEARCH__MAX_RESULTS_PER_PROVIDER   Records per provider (default: 100)");
    println!("  SCIMESH__SEARCH__TOTAL_MAX_RESULTS          Overall cap on unique papers");
    println!("  SCIMESH__SEARCH__ON_ERROR                   fail | warn | ignore (default: warn)");
    println!();
    println!("Providers (arxiv, openalex, crossref, semantic_scholar, scopus):");
    println!("  SCIMESH__PROVIDER__<ID>__API_KEY            API key or token");
    println!("  SCIMESH__PROVIDER__<ID>__CONTACT            Contact e-mail for polite pools");
    println!("  SCIMESH__PROVIDER__<ID>__PAGE_SIZE          Page size");
    println!("  SCIMESH__PROVIDER__<ID>__REQUESTS_PER_SECOND Client-side rate limit");
    println!("  SCOPUS_API_KEY, SEMANTIC_SCHOLAR_API_KEY    Used when no key is configured");
    println!();
    println!("HTTP:");
    println!("  SCIMESH__HTTP__TIMEOUT_SECS                 Request timeout (default: 30)");
    println!();
    println!("Other Settings:");
    println!("  RUST_LOG                                    Log filter (e.g., scimesh=debug)");
}

fn init_tracing(cli: &Cli) {
    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let level = if cli.quiet { "error" } else { level };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("scimesh={}", level)));

    let (plain, json) = if cli.log_json {
        (None, Some(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)))
    } else {
        (Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)), None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(plain)
        .with(json)
        .init();
}

fn load(cli: &Cli) -> Result<Config> {
    let mut config = if let Some(path) = &cli.config {
        load_config(path).with_context(|| format!("failed to load {}", path.display()))?
    } else if let Some(path) = find_config_file() {
        tracing::info!("Using config file: {}", path.display());
        load_config(&path).with_context(|| format!("failed to load {}", path.display()))?
    } else {
        Config::from_env()?
    };
    if let Some(timeout) = cli.timeout {
        config.http.timeout_secs = timeout;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.env {
        print_env_vars();
        return Ok(());
    }

    init_tracing(&cli);
    let config = load(&cli)?;

    match cli.command {
        Some(Commands::Search {
            ref query,
            ref providers,
            max_results,
            total,
            on_error,
            stream,
            no_dedupe,
            output,
        }) => {
            let mut options = config.search_options();
            if let Some(max) = max_results {
                options.max_results_per_provider = max;
            }
            if total.is_some() {
                options.total_max_results = total;
            }
            if let Some(policy) = on_error {
                options.on_error = policy.into();
            }
            options.stream = options.stream || stream;
            options.dedupe = options.dedupe && !no_dedupe;

            let query = parse(query)?;
            let federation = Federation::from_config(config)?;
            let selected: Vec<&str> = providers.iter().map(String::as_str).collect();

            let result = if options.stream {
                let mut events = federation.search_stream(&query, &selected, &options)?;
                while let Some(event) = events.next().await {
                    match event? {
                        SearchEvent::Paper(paper) => print_paper(&paper, output)?,
                        SearchEvent::CapabilityGap(gap) => {
                            if !cli.quiet {
                                eprintln!("warning: {}", gap);
                            }
                        }
                    }
                }
                events.finish().await?
            } else {
                let result = federation.search(&query, &selected, &options).await?;
                for paper in &result.papers {
                    print_paper(paper, output)?;
                }
                if !cli.quiet {
                    for gap in &result.warnings {
                        eprintln!("warning: {}", gap);
                    }
                }
                result
            };

            if !cli.quiet {
                print_summary(&result)?;
            }
        }

        Some(Commands::Get {
            ref paper_id,
            ref provider,
            output,
        }) => {
            let federation = Federation::from_config(config)?;
            let options = federation.config().provider(provider);
            match lookup_source(&federation, provider)?.get(paper_id, &options).await? {
                Some(record) => print_paper(&normalize(record), output)?,
                None => anyhow::bail!("{} not found on {}", paper_id, provider),
            }
        }

        Some(Commands::Citations {
            ref paper_id,
            direction,
            ref provider,
            max_results,
            output,
        }) => {
            let federation = Federation::from_config(config)?;
            let options = federation.config().provider(provider);
            let records = lookup_source(&federation, provider)?
                .citations(paper_id, direction.into(), max_results, &options)
                .await?;
            if records.is_empty() && !cli.quiet {
                eprintln!("no linked papers found for {}", paper_id);
            }
            for record in records {
                print_paper(&normalize(record), output)?;
            }
        }

        Some(Commands::Providers) => {
            let federation = Federation::from_config(config)?;
            let registry = federation.registry();
            for id in registry.ids() {
                let Some(source) = registry.get(id) else {
                    continue;
                };
                let fields: Vec<String> = source
                    .capabilities()
                    .fields()
                    .iter()
                    .map(|f| f.to_string())
                    .collect();
                println!("{:<18} {:<18} {}", id, source.name(), fields.join(", "));
            }
        }

        Some(Commands::Parse { ref query }) => {
            let query = parse(query)?;
            println!("{}", serde_json::to_string_pretty(&query)?);
            println!("{}", query);
        }

        Some(Commands::InitConfig { ref path, force }) => {
            let path = match path.clone().or_else(default_config_path) {
                Some(path) => path,
                None => anyhow::bail!("no config directory on this platform, pass a path"),
            };
            if path.exists() && !force {
                anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
            }
            config.save(&path)?;
            if !cli.quiet {
                eprintln!("Wrote {}", path.display());
            }
        }

        None => {
            use clap::CommandFactory;
            Cli::command().print_help()?;
        }
    }

    Ok(())
}

fn lookup_source<'a>(federation: &'a Federation, id: &str) -> Result<&'a dyn PaperLookup> {
    federation
        .registry()
        .get_required(id)?
        .lookup()
        .with_context(|| format!("{} does not support paper lookup", id))
}

fn print_paper(paper: &Paper, format: OutputFormat) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    match format {
        OutputFormat::Json => writeln!(stdout, "{}", serde_json::to_string(paper)?)?,
        OutputFormat::Plain => {
            let year = paper.year.map(|y| y.to_string()).unwrap_or_else(|| "n.d.".to_string());
            writeln!(stdout, "{} ({})", paper.title, year)?;
            if !paper.authors.is_empty() {
                writeln!(stdout, "  {}", paper.authors.join("; "))?;
            }
            if let Some(journal) = &paper.journal {
                writeln!(stdout, "  {}", journal)?;
            }
            if let Some(doi) = &paper.doi {
                writeln!(stdout, "  DOI: {}", doi)?;
            }
            if let Some(count) = paper.citation_count {
                writeln!(stdout, "  Cited by: {}", count)?;
            }
            writeln!(stdout, "  From: {}", paper.providers().join(", "))?;
            writeln!(stdout)?;
        }
    }
    Ok(())
}

fn print_summary(result: &SearchResult) -> Result<()> {
    eprintln!("{}", serde_json::to_string(&result.summary())?);
    for failure in &result.failures {
        eprintln!("error: {}", failure);
    }
    if result.partial {
        eprintln!("note: overall cap reached, results are partial");
    }
    Ok(())
}
