//! Page-by-page retrieval of one endpoint.
//!
//! Starting at page 1 with the fixed [`PER_PAGE`], each envelope is checked
//! for `success`, its items are appended to the aggregate in arrival order,
//! and the loop stops on the first of:
//!   - a page with no items
//!   - `page >= meta.pages` (an absent page count reads as 0)
//!
//! The statistics endpoint republishes its three dimension breakdowns in full
//! on every page. Each page's breakdowns are handed to the [`DatasetSink`]
//! immediately, and the last dimension stands in for "this page's items" in
//! the stop check. The page loop is kept for that endpoint even though its
//! pages carry no new data.
//!
//! A fatal error drops whatever has been aggregated so far.

use reqwest::Url;
use tracing::{debug, info};

use crate::config::{Endpoint, ResultShape, PER_PAGE};
use crate::contract::{DatasetSink, PageSource};
use crate::envelope::{Dataset, PageResponse, Record};
use crate::error::FetchError;
use crate::exporter::ExportOutcome;

/// A dataset persisted under its own name (e.g. `statistics_agency`).
#[derive(Debug, Clone, PartialEq)]
pub struct NamedDataset {
    pub name: String,
    pub records: Dataset,
    /// What the sink did with `records` on the last page.
    pub outcome: ExportOutcome,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Datasets {
    Single(Dataset),
    /// Breakdowns from the last page fetched; already persisted through the sink.
    Dimensions(Vec<NamedDataset>),
}

/// Result of walking an endpoint to completion.
#[derive(Debug, Clone, PartialEq)]
pub struct Harvest {
    pub endpoint: Endpoint,
    pub pages_fetched: u32,
    pub datasets: Datasets,
}

impl Harvest {
    /// Records gathered for a single-dataset endpoint; empty for dimensions.
    pub fn records(&self) -> &[Record] {
        match &self.datasets {
            Datasets::Single(records) => records,
            Datasets::Dimensions(_) => &[],
        }
    }
}

pub struct Paginator<S> {
    source: S,
    base_url: String,
}

impl<S: PageSource> Paginator<S> {
    pub fn new(source: S, base_url: impl Into<String>) -> Self {
        Self {
            source,
            base_url: base_url.into(),
        }
    }

    pub fn page_url(&self, endpoint: Endpoint, page: u32) -> Result<Url, FetchError> {
        let base = format!("{}{}", self.base_url.trim_end_matches('/'), endpoint.path());
        Url::parse_with_params(
            &base,
            &[("page", page.to_string()), ("per_page", PER_PAGE.to_string())],
        )
        .map_err(|e| FetchError::Setup(format!("invalid endpoint URL {base}: {e}")))
    }

    /// Walk `endpoint` until a stop condition fires.
    pub async fn fetch_all(
        &self,
        endpoint: Endpoint,
        sink: &dyn DatasetSink,
    ) -> Result<Harvest, FetchError> {
        let shape = endpoint.shape();
        let mut page: u32 = 1;
        let mut aggregate = Dataset::new();
        let mut dimensions: Vec<NamedDataset> = Vec::new();

        info!(endpoint = endpoint.path(), "Retrieving data");

        loop {
            let url = self.page_url(endpoint, page)?;
            info!(page, url = %url, "Fetching page");
            let response = self.source.fetch(&url).await?;

            if !response.success {
                return Err(FetchError::Api {
                    message: response.message().to_string(),
                });
            }

            let received = match shape {
                ResultShape::Single { key } => {
                    let items = decode_items(&response, key, &url)?;
                    let count = items.len();
                    aggregate.extend(items);
                    count
                }
                ResultShape::Dimensions { prefix, names } => {
                    dimensions = persist_dimensions(&response, prefix, names, sink, &url)?;
                    dimensions.last().map_or(0, |d| d.records.len())
                }
            };

            if received == 0 {
                debug!(page, "Page returned no items, stopping");
                break;
            }

            let total_pages = response.total_pages();
            info!(
                items = received,
                page,
                total_pages,
                "Retrieved {received} items (page {page}/{total_pages})"
            );

            if i64::from(page) >= total_pages {
                break;
            }
            page += 1;
        }

        let datasets = match shape {
            ResultShape::Single { .. } => {
                info!(
                    total = aggregate.len(),
                    endpoint = endpoint.path(),
                    "Retrieved {} total items from {}",
                    aggregate.len(),
                    endpoint.path()
                );
                Datasets::Single(aggregate)
            }
            ResultShape::Dimensions { .. } => Datasets::Dimensions(dimensions),
        };

        Ok(Harvest {
            endpoint,
            pages_fetched: page,
            datasets,
        })
    }
}

fn decode_items(response: &PageResponse, key: &str, url: &Url) -> Result<Dataset, FetchError> {
    response.items(key).map_err(|source| FetchError::Decode {
        url: url.to_string(),
        source,
    })
}

fn persist_dimensions(
    response: &PageResponse,
    prefix: &str,
    names: &[&str],
    sink: &dyn DatasetSink,
    url: &Url,
) -> Result<Vec<NamedDataset>, FetchError> {
    let mut datasets = Vec::with_capacity(names.len());
    for name in names {
        let records = decode_items(response, name, url)?;
        let name = format!("{prefix}_{name}");
        let outcome = sink.persist(&name, &records)?;
        debug!(dataset = %name, records = records.len(), ?outcome, "Persisted dimension");
        datasets.push(NamedDataset {
            name,
            records,
            outcome,
        });
    }
    Ok(datasets)
}
