use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::ClientConfig;
use crate::domain::{DatasetId, GeneSymbol};
use crate::error::FetchError;
use crate::fs_util;

pub const RUN_PARAMS_FILE: &str = "run_params.json";

/// Sidecar describing what a command requested and from where.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunParams {
    pub timestamp: String,
    pub tool: String,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gene: Option<String>,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overwrite: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decompress: Option<bool>,
    pub timeout: u64,
    pub retries: u32,
    pub base_url: String,
    pub endpoints: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outcomes: BTreeMap<String, String>,
}

impl RunParams {
    pub fn new(command: &str, output: &Utf8Path, config: &ClientConfig) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            tool: format!("cfde-kc-fetch/{}", env!("CARGO_PKG_VERSION")),
            command: command.to_string(),
            dataset_id: None,
            gene: None,
            output: output.to_string(),
            overwrite: None,
            decompress: None,
            timeout: config.timeout.as_secs(),
            retries: config.retries,
            base_url: config.base_url.clone(),
            endpoints: Vec::new(),
            outcomes: BTreeMap::new(),
        }
    }

    pub fn dataset(mut self, dataset_id: &DatasetId) -> Self {
        self.dataset_id = Some(dataset_id.to_string());
        self
    }

    pub fn gene(mut self, gene: &GeneSymbol) -> Self {
        self.gene = Some(gene.to_string());
        self
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = Some(overwrite);
        self
    }

    pub fn decompress(mut self, decompress: bool) -> Self {
        self.decompress = Some(decompress);
        self
    }

    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoints.push(url.into());
        self
    }

    pub fn outcome(mut self, name: impl Into<String>, status: impl Into<String>) -> Self {
        self.outcomes.insert(name.into(), status.into());
        self
    }
}

pub fn run_params_path(output_dir: &Utf8Path) -> Utf8PathBuf {
    output_dir.join(RUN_PARAMS_FILE)
}

/// Writes `run_params.json` into `output_dir`, replacing any previous record.
pub fn write_run_params(output_dir: &Utf8Path, params: &RunParams) -> Result<Utf8PathBuf, FetchError> {
    let path = run_params_path(output_dir);
    fs_util::write_json_atomic(&path, params)?;
    info!(path = %path, "saved run parameters");
    Ok(path)
}

pub fn read_run_params(path: &Utf8Path) -> Result<RunParams, FetchError> {
    let content = std::fs::read_to_string(path.as_std_path())
        .map_err(|err| FetchError::Filesystem(format!("read {path}: {err}")))?;
    serde_json::from_str(&content).map_err(|err| FetchError::Filesystem(format!("parse {path}: {err}")))
}
