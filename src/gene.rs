use camino::Utf8Path;
use serde_json::Value;
use tracing::info;

use crate::client::ApiClient;
use crate::domain::{DatasetId, GeneSymbol, LOGNORM_PATH, lognorm_query};
use crate::error::FetchError;
use crate::fs_util;
use crate::provenance::{self, RunParams};

/// Queries log-normalized expression for one gene and writes the response
/// body unchanged to `output_path`.
///
/// A 404 from the query endpoint means the dataset/gene pair is not indexed
/// and is reported as [`FetchError::NotFound`].
pub fn fetch_single_cell_lognorm<C: ApiClient + ?Sized>(
    dataset_id: &str,
    gene: &str,
    output_path: &Utf8Path,
    client: &C,
) -> Result<Value, FetchError> {
    let dataset_id: DatasetId = dataset_id.parse()?;
    let gene: GeneSymbol = gene.parse()?;

    let query = lognorm_query(&dataset_id, &gene);
    let endpoint = format!("{}?q={query}", client.url(LOGNORM_PATH));

    let body = match client.get(LOGNORM_PATH, &[("q", query.as_str())]) {
        Ok(body) => body,
        Err(FetchError::ClientRejected { status: 404, .. }) => {
            return Err(FetchError::NotFound {
                url: endpoint,
                dataset_id: dataset_id.to_string(),
                gene: gene.to_string(),
            });
        }
        Err(err) => return Err(err),
    };

    let data: Value = serde_json::from_slice(&body).map_err(|err| FetchError::DecodeError {
        url: endpoint.clone(),
        message: format!("response is not valid JSON: {err}"),
    })?;

    fs_util::write_bytes_atomic(output_path, &body)?;
    info!(path = %output_path, bytes = body.len(), "saved gene expression");

    let params = RunParams::new("fetch-gene", output_path, client.config())
        .dataset(&dataset_id)
        .gene(&gene)
        .endpoint(endpoint);
    provenance::write_run_params(&fs_util::parent_dir(output_path), &params)?;

    Ok(data)
}
