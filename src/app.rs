use std::time::Instant;

use camino::Utf8PathBuf;
use serde::Serialize;

use crate::assets::{self, AssetReport};
use crate::client::ApiClient;
use crate::domain::{AssetKind, LOGNORM_PATH, REGISTRY_PATH};
use crate::error::FetchError;
use crate::provenance::run_params_path;
use crate::registry::{self, DatasetSummary};
use crate::{fs_util, gene};

pub use crate::progress::{ProgressEvent, ProgressSink};

#[derive(Debug, Clone)]
pub struct ListOptions {
    pub output: Utf8PathBuf,
    pub overwrite: bool,
}

#[derive(Debug, Clone)]
pub struct AssetOptions {
    pub dataset_id: String,
    pub output_dir: Utf8PathBuf,
    pub overwrite: bool,
    pub decompress: bool,
}

#[derive(Debug, Clone)]
pub struct GeneOptions {
    pub dataset_id: String,
    pub gene: String,
    pub output: Utf8PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListResult {
    pub output: Utf8PathBuf,
    pub run_params: Utf8PathBuf,
    pub count: usize,
    pub datasets: Vec<DatasetSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssetsResult {
    pub dataset_id: String,
    pub output_dir: Utf8PathBuf,
    pub run_params: Utf8PathBuf,
    pub complete: bool,
    pub assets: Vec<AssetEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssetEntry {
    pub asset: AssetKind,
    pub url: String,
    pub status: String,
    pub path: Option<Utf8PathBuf>,
    pub decompressed: Option<Utf8PathBuf>,
    pub bytes: Option<u64>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GeneResult {
    pub dataset_id: String,
    pub gene: String,
    pub output: Utf8PathBuf,
    pub run_params: Utf8PathBuf,
    pub key_count: usize,
    pub keys: Vec<String>,
}

/// Runs one top-level command against an [`ApiClient`].
pub struct App<C: ApiClient> {
    client: C,
}

impl<C: ApiClient> App<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn list_datasets(
        &self,
        options: ListOptions,
        sink: &dyn ProgressSink,
    ) -> Result<ListResult, FetchError> {
        sink.event(ProgressEvent::new(format!(
            "phase=Request; GET {}",
            self.client.url(REGISTRY_PATH)
        )));
        let start = Instant::now();
        let registry =
            registry::download_dataset_registry(&options.output, options.overwrite, &self.client)?;
        sink.event(ProgressEvent {
            message: format!("phase=Store; saved {}", options.output),
            elapsed: Some(start.elapsed()),
        });

        // Only object records describe a dataset; stray scalars are not counted.
        let datasets = registry.summaries();
        Ok(ListResult {
            run_params: run_params_path(&fs_util::parent_dir(&options.output)),
            output: options.output,
            count: datasets.len(),
            datasets,
        })
    }

    /// Fails only when no asset could be downloaded; a partial download is
    /// returned with `complete == false`.
    pub fn fetch_assets(
        &self,
        options: AssetOptions,
        sink: &dyn ProgressSink,
    ) -> Result<AssetsResult, FetchError> {
        sink.event(ProgressEvent::new(format!(
            "phase=Request; assets for '{}'",
            options.dataset_id
        )));
        let report = assets::download_single_cell_assets_with_progress(
            &options.dataset_id,
            &options.output_dir,
            options.decompress,
            options.overwrite,
            &self.client,
            sink,
        )?;

        for asset in &report.assets {
            let message = match &asset.outcome {
                Ok(done) => format!("phase=Store; {} -> {}", asset.kind, done.path),
                Err(err) => format!("phase=Warn; {} failed: [{}] {err}", asset.kind, err.kind()),
            };
            sink.event(ProgressEvent::new(message));
        }

        if report.is_total_failure() {
            return Err(report.into_first_error().unwrap_or_else(|| {
                FetchError::Filesystem("no assets were requested".to_string())
            }));
        }
        Ok(assets_result(report))
    }

    pub fn fetch_gene(
        &self,
        options: GeneOptions,
        sink: &dyn ProgressSink,
    ) -> Result<GeneResult, FetchError> {
        sink.event(ProgressEvent::new(format!(
            "phase=Request; GET {}?q={},{}",
            self.client.url(LOGNORM_PATH),
            options.dataset_id,
            options.gene
        )));
        let data = gene::fetch_single_cell_lognorm(
            &options.dataset_id,
            &options.gene,
            &options.output,
            &self.client,
        )?;

        let keys: Vec<String> = data
            .as_object()
            .map(|object| object.keys().cloned().collect())
            .unwrap_or_default();

        Ok(GeneResult {
            run_params: run_params_path(&fs_util::parent_dir(&options.output)),
            dataset_id: options.dataset_id,
            gene: options.gene,
            output: options.output,
            key_count: keys.len(),
            keys,
        })
    }
}

fn assets_result(report: AssetReport) -> AssetsResult {
    let complete = report.is_complete();
    let assets = report
        .assets
        .into_iter()
        .map(|asset| {
            let status = asset.status().to_string();
            match asset.outcome {
                Ok(done) => AssetEntry {
                    asset: asset.kind,
                    url: asset.url,
                    status,
                    path: Some(done.path),
                    decompressed: done.decompressed,
                    bytes: Some(done.bytes),
                    error: None,
                },
                Err(err) => AssetEntry {
                    asset: asset.kind,
                    url: asset.url,
                    status,
                    path: None,
                    decompressed: None,
                    bytes: None,
                    error: Some(err.to_string()),
                },
            }
        })
        .collect();

    AssetsResult {
        dataset_id: report.dataset_id.to_string(),
        output_dir: report.output_dir,
        run_params: report.run_params,
        complete,
        assets,
    }
}
