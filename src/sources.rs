use std::collections::BTreeMap;
use std::sync::Arc;

use camino::Utf8PathBuf;
use chrono::Utc;
use serde_json::Value;

use crate::config::ResolvedConfig;
use crate::dedup::record_count;
use crate::domain::{FetchId, FetchJob, SourceKey};
use crate::error::MedError;
use crate::manifest::{ArtifactWriter, RawWrite};
use crate::transport::Transport;

/// Boundary between the orchestrator and per-source network logic.
/// A fetcher persists one raw artifact (and its manifest) per call and
/// returns the artifact path; the orchestrator never inspects the
/// artifact's internal shape.
pub trait SourceFetcher: Send + Sync {
    fn fetch(&self, job: &FetchJob) -> Result<Utf8PathBuf, MedError>;
}

/// Where a source's artifacts land and which endpoint serves them.
/// `source` overrides the storage directory when several jobs share
/// one source tree (the openfda label/event split).
#[derive(Debug, Clone, Copy)]
pub struct SourceRoute {
    pub endpoint: &'static str,
    pub source: Option<&'static str>,
    pub subdir: Option<&'static str>,
}

pub fn default_route(key: &str) -> Option<SourceRoute> {
    let route = |endpoint, source, subdir| SourceRoute {
        endpoint,
        source,
        subdir,
    };
    match key {
        "orphanet" => Some(route(
            "https://api.orphadata.com/rd-phenotypes",
            None,
            Some("phenotypes"),
        )),
        "pubmed" => Some(route(
            "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esearch.fcgi",
            None,
            None,
        )),
        "pmc" => Some(route(
            "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esearch.fcgi",
            None,
            None,
        )),
        "openfda_label" => Some(route(
            "https://api.fda.gov/drug/label.json",
            Some("openfda"),
            Some("label"),
        )),
        "openfda_event" => Some(route(
            "https://api.fda.gov/drug/event.json",
            Some("openfda"),
            Some("event"),
        )),
        "rxnorm" => Some(route(
            "https://rxnav.nlm.nih.gov/REST/approximateTerm.json",
            None,
            None,
        )),
        "who" => Some(route(
            "https://ghoapi.azureedge.net/api",
            None,
            Some("documents"),
        )),
        "ncbi_bookshelf" => Some(route(
            "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esearch.fcgi",
            None,
            Some("sections"),
        )),
        "openstax" => Some(route(
            "https://openstax.org/apps/cms/api/v2/pages",
            None,
            Some("extracted"),
        )),
        _ => None,
    }
}

/// Generic fetcher for sources that answer plain JSON. Sources needing
/// bespoke response handling implement `SourceFetcher` themselves.
pub struct HttpJsonFetcher {
    transport: Arc<Transport>,
    writer: ArtifactWriter,
    endpoint: String,
    source: SourceKey,
    subdir: Option<String>,
}

impl HttpJsonFetcher {
    pub fn new(
        transport: Arc<Transport>,
        writer: ArtifactWriter,
        endpoint: String,
        source: SourceKey,
        subdir: Option<String>,
    ) -> Self {
        Self {
            transport,
            writer,
            endpoint,
            source,
            subdir,
        }
    }
}

/// Scalar job parameters become query-string pairs; `endpoint` and
/// `subdir` are routing hints, not query parameters.
fn query_pairs(params: &Value) -> Vec<(&str, String)> {
    let Value::Object(map) = params else {
        return Vec::new();
    };
    map.iter()
        .filter(|(key, _)| key.as_str() != "endpoint" && key.as_str() != "subdir")
        .filter_map(|(key, value)| {
            let rendered = match value {
                Value::String(text) => text.clone(),
                Value::Number(number) => number.to_string(),
                Value::Bool(flag) => flag.to_string(),
                _ => return None,
            };
            Some((key.as_str(), rendered))
        })
        .collect()
}

impl SourceFetcher for HttpJsonFetcher {
    fn fetch(&self, job: &FetchJob) -> Result<Utf8PathBuf, MedError> {
        let fetch_id = FetchId::generate(&self.source, Utc::now());
        let params = query_pairs(&job.params);

        let body = self
            .transport
            .request(&job.key, &self.endpoint, &params)
            .and_then(|response| {
                response.json::<Value>().map_err(|err| MedError::SourceHttp {
                    source_name: job.key.as_str().to_string(),
                    message: err.to_string(),
                })
            });

        let body = match body {
            Ok(body) => body,
            Err(err) => {
                let message = err.to_string();
                self.writer.write_failure(
                    &self.source,
                    &fetch_id,
                    &self.endpoint,
                    job.params.clone(),
                    &message,
                )?;
                return Err(MedError::SourceFetch {
                    source_name: job.key.as_str().to_string(),
                    message,
                });
            }
        };

        let counted = record_count(self.source.as_str(), &body);
        let record_count = counted.filter(|count| *count > 0).unwrap_or(1);

        self.writer.write_raw(RawWrite {
            source: &self.source,
            subdir: self.subdir.as_deref(),
            fetch_id: &fetch_id,
            data: &body,
            api_endpoint: &self.endpoint,
            query_params: job.params.clone(),
            record_count,
            total_available: counted,
        })
    }
}

/// Maps job keys to their fetchers. Jobs without a registered fetcher
/// fail their run with `UnknownSource`.
#[derive(Default)]
pub struct SourceRegistry {
    fetchers: BTreeMap<String, Box<dyn SourceFetcher>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, key: SourceKey, fetcher: Box<dyn SourceFetcher>) {
        self.fetchers.insert(key.as_str().to_string(), fetcher);
    }

    pub fn get(&self, key: &SourceKey) -> Option<&dyn SourceFetcher> {
        self.fetchers.get(key.as_str()).map(|fetcher| &**fetcher)
    }

    /// HTTP fetchers for every configured job with a resolvable route.
    /// A job's `endpoint`/`subdir` params override the built-in table.
    pub fn http(
        config: &ResolvedConfig,
        transport: Arc<Transport>,
        writer: ArtifactWriter,
    ) -> Result<Self, MedError> {
        let mut registry = Self::new();
        for job in &config.jobs {
            let route = default_route(job.key.as_str());
            let endpoint = job
                .params
                .get("endpoint")
                .and_then(Value::as_str)
                .map(str::to_string)
                .or_else(|| route.map(|route| route.endpoint.to_string()));
            let Some(endpoint) = endpoint else {
                continue;
            };

            let source: SourceKey = match route.and_then(|route| route.source) {
                Some(source) => source.parse()?,
                None => job.key.clone(),
            };
            let subdir = job
                .params
                .get("subdir")
                .and_then(Value::as_str)
                .map(str::to_string)
                .or_else(|| {
                    route
                        .and_then(|route| route.subdir)
                        .map(str::to_string)
                });

            registry.register(
                job.key.clone(),
                Box::new(HttpJsonFetcher::new(
                    Arc::clone(&transport),
                    writer.clone(),
                    endpoint,
                    source,
                    subdir,
                )),
            );
        }
        Ok(registry)
    }
}
