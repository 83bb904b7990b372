/// `load_config` module: resolves command-line flags, environment variables and an
/// optional YAML file into the immutable [`RunConfig`] handed to the core.
///
/// Every setting is taken from the first source that provides it:
/// flag, then environment, then YAML file, then the built-in default.
///
/// # Responsibilities
/// - Parse the optional YAML file into loosely-typed sections
/// - Map format names to [`ExportFormat`], rejecting anything but `json`/`csv`
/// - Read secrets and proxies from the environment (`DOGE_API_KEY`,
///   `HTTP_PROXY`/`HTTPS_PROXY`, `DOGE_API_BASE_URL`)
///
/// # Errors
/// All errors use `anyhow::Error` and surface at the CLI boundary.
use crate::cli::Cli;
use anyhow::{Context, Result};
use doge_report_core::config::{
    Endpoint, ExportFormat, ExportPlan, FetchConfig, DEFAULT_BASE_URL, DEFAULT_MAX_RETRIES,
    DEFAULT_TIMEOUT_SECS,
};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info};

pub const API_KEY_ENV: &str = "DOGE_API_KEY";
pub const BASE_URL_ENV: &str = "DOGE_API_BASE_URL";
pub const PROXY_ENVS: [&str; 2] = ["HTTP_PROXY", "HTTPS_PROXY"];

/// Everything one run needs, resolved up front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub endpoint: Endpoint,
    pub fetch: FetchConfig,
    pub export: ExportPlan,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub api: ApiSection,
    pub export: ExportSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ApiSection {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub proxy: Option<String>,
    pub timeout_secs: Option<u64>,
    pub max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ExportSection {
    pub format: Option<String>,
    pub output_dir: Option<PathBuf>,
}

/// Loads the YAML config file. No setting in it is required.
pub fn read_config_file<P: AsRef<Path>>(path: P) -> Result<FileConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            Ok(conf)
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            Err(anyhow::anyhow!("Failed to parse config YAML: {e}"))
        }
    }
}

pub fn load_config(cli: &Cli) -> Result<RunConfig> {
    let file = match &cli.config {
        Some(path) => read_config_file(path)?,
        None => FileConfig::default(),
    };
    let FileConfig { api, export } = file;

    let format = match (cli.format, export.format) {
        (Some(arg), _) => ExportFormat::from(arg),
        (None, Some(name)) => name
            .parse::<ExportFormat>()
            .context("Invalid export.format in config file")?,
        (None, None) => ExportFormat::default(),
    };

    let fetch = FetchConfig {
        base_url: cli
            .base_url
            .clone()
            .or_else(|| env_var(BASE_URL_ENV))
            .or(api.base_url)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        api_key: cli.api_key.clone().or_else(|| env_var(API_KEY_ENV)).or(api.api_key),
        proxy: cli
            .proxy
            .clone()
            .or_else(|| PROXY_ENVS.iter().find_map(|name| env_var(name)))
            .or(api.proxy),
        timeout: Duration::from_secs(
            cli.timeout
                .or(api.timeout_secs)
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
        ),
        max_retries: cli
            .retries
            .or(api.max_retries)
            .unwrap_or(DEFAULT_MAX_RETRIES),
    };

    let export = ExportPlan {
        format,
        output: cli.output.clone(),
        output_dir: cli
            .output_dir
            .clone()
            .or(export.output_dir)
            .unwrap_or_else(|| PathBuf::from(".")),
    };

    let endpoint = Endpoint::from(cli.endpoint);
    if export.output.is_some() && matches!(endpoint, Endpoint::Statistics) {
        info!("--output is ignored for statistics; dimension files go to the output directory");
    }

    Ok(RunConfig {
        endpoint,
        fetch,
        export,
    })
}

/// A set, non-blank environment variable.
fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
