use camino::{Utf8Path, Utf8PathBuf};
use tracing::{info, warn};

use crate::client::ApiClient;
use crate::domain::{AssetKind, DatasetId};
use crate::error::FetchError;
use crate::progress::{NoProgress, ProgressEvent, ProgressSink};
use crate::provenance::{self, RunParams};
use crate::{fs_util, gzip};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedAsset {
    pub path: Utf8PathBuf,
    pub decompressed: Option<Utf8PathBuf>,
    pub bytes: u64,
}

#[derive(Debug)]
pub struct AssetResult {
    pub kind: AssetKind,
    pub url: String,
    pub outcome: Result<DownloadedAsset, FetchError>,
}

impl AssetResult {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn status(&self) -> &'static str {
        match &self.outcome {
            Ok(_) => "ok",
            Err(err) => err.kind(),
        }
    }
}

/// Per-asset results of one `fetch-assets` call, in request order.
#[derive(Debug)]
pub struct AssetReport {
    pub dataset_id: DatasetId,
    pub output_dir: Utf8PathBuf,
    pub assets: Vec<AssetResult>,
    pub run_params: Utf8PathBuf,
}

impl AssetReport {
    pub fn get(&self, kind: AssetKind) -> Option<&AssetResult> {
        self.assets.iter().find(|asset| asset.kind == kind)
    }

    pub fn written_paths(&self) -> Vec<&Utf8Path> {
        self.assets
            .iter()
            .filter_map(|asset| asset.outcome.as_ref().ok())
            .flat_map(|done| std::iter::once(done.path.as_path()).chain(done.decompressed.as_deref()))
            .collect()
    }

    pub fn succeeded(&self) -> usize {
        self.assets.iter().filter(|asset| asset.is_ok()).count()
    }

    pub fn is_complete(&self) -> bool {
        self.succeeded() == self.assets.len()
    }

    pub fn is_partial(&self) -> bool {
        let ok = self.succeeded();
        ok > 0 && ok < self.assets.len()
    }

    pub fn is_total_failure(&self) -> bool {
        self.succeeded() == 0
    }

    /// Moves out the first asset error, if any.
    pub fn into_first_error(self) -> Option<FetchError> {
        self.assets
            .into_iter()
            .find_map(|asset| asset.outcome.err())
    }
}

/// Downloads every known asset of `dataset_id` into `output_dir`.
///
/// Assets are independent: a failure is recorded for that asset and the
/// remaining ones are still attempted. Only an invalid id or an unusable
/// output directory fails the whole call.
pub fn download_single_cell_assets<C: ApiClient + ?Sized>(
    dataset_id: &str,
    output_dir: &Utf8Path,
    decompress: bool,
    overwrite: bool,
    client: &C,
) -> Result<AssetReport, FetchError> {
    download_single_cell_assets_with_progress(
        dataset_id,
        output_dir,
        decompress,
        overwrite,
        client,
        &NoProgress,
    )
}

/// [`download_single_cell_assets`] reporting transfer progress to `sink`.
pub fn download_single_cell_assets_with_progress<C: ApiClient + ?Sized>(
    dataset_id: &str,
    output_dir: &Utf8Path,
    decompress: bool,
    overwrite: bool,
    client: &C,
    sink: &dyn ProgressSink,
) -> Result<AssetReport, FetchError> {
    let dataset_id: DatasetId = dataset_id.parse()?;
    fs_util::ensure_dir(output_dir)?;

    let mut params = RunParams::new("fetch-assets", output_dir, client.config())
        .dataset(&dataset_id)
        .overwrite(overwrite)
        .decompress(decompress);

    let mut assets = Vec::with_capacity(AssetKind::ALL.len());
    for kind in AssetKind::ALL {
        let path = kind.path(&dataset_id);
        let url = client.url(&path);
        let destination = output_dir.join(kind.file_name());
        sink.event(ProgressEvent::new(format!("[DOWNLOAD] {url} -> {destination}")));
        let outcome = fetch_asset(client, &path, &url, &destination, decompress, overwrite, sink);
        if let Err(err) = &outcome {
            warn!(asset = %kind, url = %url, error_kind = err.kind(), "asset download failed: {err}");
        }
        let result = AssetResult { kind, url, outcome };
        params = params
            .endpoint(result.url.clone())
            .outcome(kind.to_string(), result.status());
        assets.push(result);
    }

    let run_params = provenance::write_run_params(output_dir, &params)?;

    Ok(AssetReport {
        dataset_id,
        output_dir: output_dir.to_path_buf(),
        assets,
        run_params,
    })
}

/// Nothing reaches `destination` unless the whole asset succeeded: the body
/// and its decompressed copy are staged and checked before either is moved
/// into place.
fn fetch_asset<C: ApiClient + ?Sized>(
    client: &C,
    path: &str,
    url: &str,
    destination: &Utf8Path,
    decompress: bool,
    overwrite: bool,
    sink: &dyn ProgressSink,
) -> Result<DownloadedAsset, FetchError> {
    fs_util::ensure_absent(destination, overwrite)?;

    let staging_dir = fs_util::parent_dir(destination);
    let download = client.download(path, &staging_dir, sink)?;

    let inflated = match gzip::decompressed_sibling(destination) {
        Some(target) if decompress => {
            let staged = gzip::decompress_to_staging(download.file.path(), &staging_dir, url)?;
            Some((target, staged))
        }
        _ => None,
    };

    fs_util::persist(download.file, destination)?;
    info!(path = %destination, bytes = download.bytes, "saved asset");

    let decompressed = match inflated {
        Some((target, staged)) => {
            fs_util::persist(staged, &target)?;
            info!(path = %target, "decompressed asset");
            Some(target)
        }
        None => None,
    };

    Ok(DownloadedAsset {
        path: destination.to_path_buf(),
        decompressed,
        bytes: download.bytes,
    })
}

