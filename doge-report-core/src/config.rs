use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::ExportError;

pub const DEFAULT_BASE_URL: &str = "https://api.doge.gov";
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
/// Maximum page size accepted by the API.
pub const PER_PAGE: u32 = 500;
pub const USER_AGENT: &str = "DOGE-Report-Utility/0.1.0";

/// Breakdowns the statistics endpoint republishes in full on every page.
pub const STATISTICS_DIMENSIONS: &[&str] = &["agency", "request_date", "org_names"];

/// The API collections this tool knows how to retrieve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Grants,
    Contracts,
    Leases,
    Payments,
    Statistics,
}

/// How an endpoint lays out its `result` object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultShape {
    /// One item list stored under `key`.
    Single { key: &'static str },
    /// Several independent lists, persisted as `<prefix>_<name>` each page.
    Dimensions {
        prefix: &'static str,
        names: &'static [&'static str],
    },
}

impl Endpoint {
    pub const ALL: [Endpoint; 5] = [
        Endpoint::Grants,
        Endpoint::Contracts,
        Endpoint::Leases,
        Endpoint::Payments,
        Endpoint::Statistics,
    ];

    /// Name used on the command line and in default file names.
    pub fn name(&self) -> &'static str {
        match self {
            Endpoint::Grants => "grants",
            Endpoint::Contracts => "contracts",
            Endpoint::Leases => "leases",
            Endpoint::Payments => "payments",
            Endpoint::Statistics => "statistics",
        }
    }

    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::Grants => "/savings/grants",
            Endpoint::Contracts => "/savings/contracts",
            Endpoint::Leases => "/savings/leases",
            Endpoint::Payments => "/payments",
            Endpoint::Statistics => "/payments/statistics",
        }
    }

    /// The trailing path segment, which names the item list in `result`.
    pub fn result_key(&self) -> &'static str {
        let path = self.path();
        path.rsplit('/').next().unwrap_or(path)
    }

    pub fn shape(&self) -> ResultShape {
        match self {
            Endpoint::Statistics => ResultShape::Dimensions {
                prefix: self.result_key(),
                names: STATISTICS_DIMENSIONS,
            },
            _ => ResultShape::Single {
                key: self.result_key(),
            },
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Endpoint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Endpoint::ALL
            .into_iter()
            .find(|e| e.name() == s)
            .ok_or_else(|| format!("unknown endpoint: {s}"))
    }
}

/// Network settings shared by every request of a run. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub proxy: Option<String>,
    pub timeout: Duration,
    /// Retry budget for transport failures and 5xx responses. 429s do not count.
    pub max_retries: u32,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            proxy: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl FetchConfig {
    pub fn trace_loaded(&self) {
        info!(
            base_url = %self.base_url,
            api_key_set = self.api_key.is_some(),
            proxy = self.proxy.as_deref().unwrap_or("none"),
            timeout_secs = self.timeout.as_secs(),
            max_retries = self.max_retries,
            "Loaded fetch configuration"
        );
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            _ => Err(ExportError::UnsupportedFormat(s.to_string())),
        }
    }
}

/// Where and how one dataset is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportTarget {
    pub format: ExportFormat,
    pub path: PathBuf,
}

impl ExportTarget {
    pub fn new(format: ExportFormat, path: impl Into<PathBuf>) -> Self {
        Self {
            format,
            path: path.into(),
        }
    }

    /// `doge_<name>_data.<ext>` inside `dir`.
    pub fn default_for(name: &str, format: ExportFormat, dir: &Path) -> Self {
        Self::new(format, dir.join(default_file_name(name, format)))
    }
}

pub fn default_file_name(name: &str, format: ExportFormat) -> String {
    format!("doge_{}_data.{}", name, format.extension())
}

/// Export settings resolved for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPlan {
    pub format: ExportFormat,
    /// Explicit output file; only honoured for single-dataset endpoints.
    pub output: Option<PathBuf>,
    pub output_dir: PathBuf,
}

impl Default for ExportPlan {
    fn default() -> Self {
        Self {
            format: ExportFormat::default(),
            output: None,
            output_dir: PathBuf::from("."),
        }
    }
}

impl ExportPlan {
    pub fn target_for(&self, name: &str) -> ExportTarget {
        match &self.output {
            Some(path) => ExportTarget::new(self.format, path.clone()),
            None => ExportTarget::default_for(name, self.format, &self.output_dir),
        }
    }

    pub fn trace_loaded(&self) {
        info!(
            format = %self.format,
            output_dir = %self.output_dir.display(),
            explicit_output = self.output.is_some(),
            "Loaded export plan"
        );
        debug!(?self, "Export plan (full debug)");
    }
}
