use anyhow::{Context, Result};
use citation_auditor::audit::{Auditor, CitingPaper};
use citation_auditor::config::{find_config_file, get_config, load_config, Config};
use citation_auditor::lookup::CitationLookup;
use citation_auditor::models::{CitationRecord, ReferenceEntry};
use citation_auditor::utils::API_LOG_TARGET;
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Citation Auditor - verify that cited works exist and support their claims
#[derive(Parser, Debug)]
#[command(name = "citation-auditor")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Look up citations in bibliographic databases and audit reference lists", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (can be used multiple times for more verbosity: -v, -vv)
    #[arg(long, short, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Configuration file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Look up a single citation
    #[command(alias = "l")]
    Lookup {
        /// Work title
        #[arg(long, short)]
        title: Option<String>,

        /// Author name, repeat for several authors ("Last, First" or "First Last")
        #[arg(long, short)]
        author: Vec<String>,

        /// Publication year
        #[arg(long, short)]
        year: Option<i32>,

        /// Digital Object Identifier
        #[arg(long)]
        doi: Option<String>,

        /// PubMed identifier
        #[arg(long)]
        pmid: Option<String>,

        /// arXiv identifier
        #[arg(long)]
        arxiv: Option<String>,

        /// Skip the fallback tier
        #[arg(long)]
        no_fallbacks: bool,
    },

    /// Look up every citation in a JSON array or JSONL file
    #[command(alias = "b")]
    Batch {
        /// Input file of citation records
        file: PathBuf,

        /// Skip the fallback tier
        #[arg(long)]
        no_fallbacks: bool,

        /// Citations looked up concurrently (default: audit.max_concurrent)
        #[arg(long, short)]
        concurrency: Option<usize>,
    },

    /// Audit a paper's reference list
    #[command(alias = "a")]
    Audit {
        /// JSON array or JSONL file of reference entries
        file: PathBuf,

        /// Title of the citing paper
        #[arg(long)]
        paper_title: String,

        /// Abstract of the citing paper
        #[arg(long)]
        paper_abstract: Option<String>,

        /// Skip the fallback tier
        #[arg(long)]
        no_fallbacks: bool,
    },

    /// Print the effective configuration as TOML
    Config,
}

/// Read a JSON array, or one JSON value per line
fn read_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let trimmed = text.trim_start();
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed)
            .with_context(|| format!("{} is not a valid JSON array", path.display()));
    }

    trimmed
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("{}:{}: invalid JSON", path.display(), i + 1))
        })
        .collect()
}

fn load(cli_path: Option<&Path>) -> Result<(Config, Option<PathBuf>)> {
    let path = cli_path.map(Path::to_path_buf).or_else(find_config_file);
    let config = match &path {
        Some(path) => load_config(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => get_config().context("Failed to load configuration")?,
    };
    Ok((config, path))
}

/// Human-readable logs on stderr, API call records as JSON lines
fn init_logging(cli: &Cli, config: &Config) -> Result<()> {
    let level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => config.logging.level.as_str(),
            1 => "debug",
            _ => "trace",
        }
    };

    let api_writer = match &config.logging.api_log_path {
        Some(path) => {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create {}", dir.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open API log {}", path.display()))?;
            BoxMakeWriter::new(Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("citation_auditor={},{}=info", level, API_LOG_TARGET))
    });

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(filter_fn(|meta| meta.target() != API_LOG_TARGET));
    let api_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(api_writer)
        .with_filter(filter_fn(|meta| meta.target() == API_LOG_TARGET));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(api_layer)
        .init();
    Ok(())
}

/// Configuration with API keys masked
fn redacted(config: &Config) -> Config {
    let mut config = config.clone();
    let mask = |key: &mut Option<String>| {
        if key.is_some() {
            *key = Some("********".to_string());
        }
    };
    mask(&mut config.api_keys.semantic_scholar);
    mask(&mut config.api_keys.ncbi);
    config
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, config_path) = load(cli.config.as_deref())?;

    if let Commands::Config = cli.command {
        print!("{}", toml::to_string_pretty(&redacted(&config))?);
        return Ok(());
    }

    init_logging(&cli, &config)?;
    if let Some(path) = &config_path {
        tracing::info!("Using config file: {}", path.display());
    }

    let lookup = CitationLookup::from_config(&config)?;

    match cli.command {
        Commands::Lookup {
            title,
            author,
            year,
            doi,
            pmid,
            arxiv,
            no_fallbacks,
        } => {
            let mut builder = CitationRecord::builder()
                .title(title.unwrap_or_default())
                .authors(author)
                .year_opt(year);
            if let Some(doi) = doi {
                builder = builder.doi(doi);
            }
            if let Some(pmid) = pmid {
                builder = builder.pmid(pmid);
            }
            if let Some(arxiv) = arxiv {
                builder = builder.arxiv_id(arxiv);
            }
            let query = builder.build();
            if query.title_text().is_none() && !query.has_identifiers() {
                anyhow::bail!("Provide a title or a valid DOI, PMID or arXiv ID");
            }

            let enable_fallbacks = config.lookup.enable_fallbacks && !no_fallbacks;
            let result = lookup.lookup_default(&query, enable_fallbacks).await;
            print_json(&result)?;
        }

        Commands::Batch {
            file,
            no_fallbacks,
            concurrency,
        } => {
            let queries: Vec<CitationRecord> = read_records(&file)?;
            let concurrency = concurrency.unwrap_or(config.audit.max_concurrent);
            let enable_fallbacks = config.lookup.enable_fallbacks && !no_fallbacks;

            tracing::info!("Looking up {} citations from {}", queries.len(), file.display());
            let results = lookup
                .lookup_many(&queries, enable_fallbacks, concurrency)
                .await;

            let found = results.iter().filter(|r| r.found()).count();
            if !cli.quiet {
                eprintln!("Found {} of {} citations", found, results.len());
            }
            print_json(&results)?;
        }

        Commands::Audit {
            file,
            paper_title,
            paper_abstract,
            no_fallbacks,
        } => {
            let entries: Vec<ReferenceEntry> = read_records(&file)?;
            let mut paper = CitingPaper::new(paper_title);
            if let Some(abstract_text) = paper_abstract {
                paper = paper.with_abstract(abstract_text);
            }

            let auditor = Auditor::new(lookup, &config)
                .with_fallbacks(config.lookup.enable_fallbacks && !no_fallbacks);
            let report = auditor.audit(&paper, entries).await;

            if !cli.quiet {
                eprintln!(
                    "{} citations: {} pass, {} suspect, {} missing",
                    report.total_citations,
                    report.passed_count,
                    report.suspect_count,
                    report.missing_count
                );
            }
            print_json(&report)?;
        }

        // printed before logging setup
        Commands::Config => {}
    }

    Ok(())
}
