///
/// This module implements the command-line interface for doge-report: argument
/// parsing, the `run` entrypoint, and the user-visible progress and error output.
///
/// Retrieval, retry policy and export all live in [`doge-report-core`]. This
/// module only resolves configuration, wires the core stages together and
/// reports what happened.
///
/// ## How To Use
/// - From a shell: `doge-report grants --format csv --output grants.csv`.
/// - Programmatically or from integration tests: build a [`Cli`] and call [`run`],
///   or call [`execute`] with any [`PageSource`] to skip the HTTP layer.
///
/// [`doge-report-core`]: ../../doge-report-core/
use crate::load_config::{load_config, RunConfig};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use doge_report_core::config::{Endpoint, ExportFormat};
use doge_report_core::contract::PageSource;
use doge_report_core::executor::RequestExecutor;
use doge_report_core::exporter::{export, DirectorySink, ExportOutcome};
use doge_report_core::paginator::{Datasets, Paginator};
use std::fmt::Display;
use std::path::PathBuf;

/// CLI for doge-report: download DOGE API data and save it as JSON or CSV.
#[derive(Debug, Parser)]
#[clap(
    name = "doge-report",
    version,
    about = "Retrieve every page of a DOGE API collection and save it as JSON or CSV"
)]
pub struct Cli {
    /// API collection to retrieve
    #[clap(value_enum)]
    pub endpoint: EndpointArg,

    /// Output file (default: doge_<endpoint>_data.<format> in the output directory)
    #[clap(short, long)]
    pub output: Option<PathBuf>,

    /// Directory for default-named output files
    #[clap(short = 'd', long)]
    pub output_dir: Option<PathBuf>,

    /// API key sent as a bearer token
    #[clap(short = 'k', long)]
    pub api_key: Option<String>,

    /// Maximum number of retries for failed requests [default: 3]
    #[clap(short, long)]
    pub retries: Option<u32>,

    /// Request timeout in seconds [default: 30]
    #[clap(short, long)]
    pub timeout: Option<u64>,

    /// Proxy URL (falls back to HTTP_PROXY, then HTTPS_PROXY)
    #[clap(short, long)]
    pub proxy: Option<String>,

    /// Output format [default: json]
    #[clap(short, long, value_enum)]
    pub format: Option<FormatArg>,

    /// API base URL [default: https://api.doge.gov]
    #[clap(long)]
    pub base_url: Option<String>,

    /// Optional YAML file with `api` and `export` sections
    #[clap(long)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EndpointArg {
    Grants,
    Contracts,
    Leases,
    Payments,
    Statistics,
}

impl From<EndpointArg> for Endpoint {
    fn from(arg: EndpointArg) -> Self {
        match arg {
            EndpointArg::Grants => Endpoint::Grants,
            EndpointArg::Contracts => Endpoint::Contracts,
            EndpointArg::Leases => Endpoint::Leases,
            EndpointArg::Payments => Endpoint::Payments,
            EndpointArg::Statistics => Endpoint::Statistics,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    Json,
    Csv,
}

impl From<FormatArg> for ExportFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Json => ExportFormat::Json,
            FormatArg::Csv => ExportFormat::Csv,
        }
    }
}

/// What a completed run retrieved and wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub endpoint: Endpoint,
    pub pages: u32,
    pub records: usize,
    pub outputs: Vec<PathBuf>,
}

/// Async CLI entrypoint for main() and integration tests.
pub async fn run(cli: Cli) -> Result<RunSummary> {
    let config = load_config(&cli)?;
    config.fetch.trace_loaded();
    config.export.trace_loaded();

    let executor = match RequestExecutor::new(&config.fetch) {
        Ok(executor) => executor,
        Err(e) => return Err(report(e)).context("Failed to construct HTTP client"),
    };
    execute(&config, executor).await
}

/// Paginate `config.endpoint` through `source` and write the results.
pub async fn execute<S: PageSource>(config: &RunConfig, source: S) -> Result<RunSummary> {
    let endpoint = config.endpoint;
    println!("Retrieving data from {}", endpoint.path());
    tracing::info!(command = endpoint.name(), "Starting retrieval");

    let paginator = Paginator::new(source, config.fetch.base_url.as_str());
    let sink = DirectorySink::new(config.export.format, config.export.output_dir.clone());

    let harvest = match paginator.fetch_all(endpoint, &sink).await {
        Ok(harvest) => harvest,
        Err(e) => {
            let hint = e.hint();
            let err = report(e);
            if let Some(hint) = hint {
                eprintln!("{hint}");
            }
            return Err(err).with_context(|| format!("Failed to retrieve {endpoint}"));
        }
    };

    let mut outputs = Vec::new();
    let records = match &harvest.datasets {
        Datasets::Single(records) => {
            let target = config.export.target_for(endpoint.name());
            let outcome = export(records, &target)
                .map_err(report)
                .with_context(|| format!("Failed to save data to {}", target.path.display()))?;
            match outcome {
                ExportOutcome::Written { path, .. } => {
                    println!("Data saved to {}", path.display());
                    outputs.push(path);
                }
                ExportOutcome::SkippedEmpty => println!("No data to save"),
            }
            records.len()
        }
        Datasets::Dimensions(dimensions) => {
            // Already written page by page through the sink.
            for dimension in dimensions {
                match &dimension.outcome {
                    ExportOutcome::Written { path, .. } => {
                        println!("Data saved to {}", path.display());
                        outputs.push(path.clone());
                    }
                    ExportOutcome::SkippedEmpty => {
                        println!("No data to save for {}", dimension.name)
                    }
                }
            }
            dimensions.iter().map(|d| d.records.len()).sum()
        }
    };

    let summary = RunSummary {
        endpoint,
        pages: harvest.pages_fetched,
        records,
        outputs,
    };
    tracing::info!(command = endpoint.name(), ?summary, "Retrieval complete");
    Ok(summary)
}

/// Print a fatal diagnostic to stderr and hand the error back for propagation.
fn report<E: Display>(e: E) -> E {
    eprintln!("[ERROR] {e}");
    tracing::error!(error = %e, "Run failed");
    e
}
