use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::FetchError;

pub const REGISTRY_PATH: &str = "/api/raw/file/single_cell_metadata/dataset_metadata.json.gz";
pub const LOGNORM_PATH: &str = "/api/bio/query/single-cell-lognorm";

static IDENTIFIER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._-]+$").expect("identifier pattern is a valid regex")
});

fn is_identifier(value: &str) -> bool {
    IDENTIFIER_RE.is_match(value)
}

/// Dataset identifier as used in asset URLs and output file names.
///
/// Only ASCII letters, digits, `.`, `_` and `-` are accepted, so a parsed id
/// can never introduce a path separator into the output directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetId(String);

impl DatasetId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DatasetId {
    type Err = FetchError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if !is_identifier(value) {
            return Err(FetchError::InvalidIdentifier {
                field: "dataset_id",
                value: value.to_string(),
            });
        }
        Ok(Self(value.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GeneSymbol(String);

impl GeneSymbol {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GeneSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GeneSymbol {
    type Err = FetchError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if !is_identifier(value) {
            return Err(FetchError::InvalidIdentifier {
                field: "gene",
                value: value.to_string(),
            });
        }
        Ok(Self(value.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Coordinates,
    Fields,
}

impl AssetKind {
    pub const ALL: [AssetKind; 2] = [AssetKind::Coordinates, AssetKind::Fields];

    pub fn file_name(self) -> &'static str {
        match self {
            AssetKind::Coordinates => "coordinates.tsv.gz",
            AssetKind::Fields => "fields.json.gz",
        }
    }

    pub fn path(self, dataset_id: &DatasetId) -> String {
        format!(
            "/api/raw/file/single_cell/{}/{}",
            dataset_id.as_str(),
            self.file_name()
        )
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetKind::Coordinates => write!(f, "coordinates"),
            AssetKind::Fields => write!(f, "fields"),
        }
    }
}

pub fn lognorm_query(dataset_id: &DatasetId, gene: &GeneSymbol) -> String {
    format!("{},{}", dataset_id.as_str(), gene.as_str())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_dataset_id_valid() {
        for value in ["heart", "lung123", "KIDNEY", "heart-lung-v1", "My_Dataset-v1.0"] {
            let id: DatasetId = value.parse().unwrap();
            assert_eq!(id.as_str(), value);
        }
    }

    #[test]
    fn parse_dataset_id_rejects_traversal() {
        for value in [
            "../etc/passwd",
            "my/../data",
            "path/to/file",
            "my\\windows\\path",
            "data;set",
            "my dataset",
            "data\0set",
            "",
        ] {
            let err = value.parse::<DatasetId>().unwrap_err();
            assert_matches!(
                err,
                FetchError::InvalidIdentifier {
                    field: "dataset_id",
                    ..
                }
            );
        }
    }

    #[test]
    fn parse_gene_symbol() {
        for value in ["CP", "TP53", "HLA-DRB1", "LOC100.1", "GENE_1"] {
            assert!(value.parse::<GeneSymbol>().is_ok());
        }
        for value in ["", "TP53;DROP TABLE", "' OR '1'='1", "gene/../../file"] {
            let err = value.parse::<GeneSymbol>().unwrap_err();
            assert_matches!(err, FetchError::InvalidIdentifier { field: "gene", .. });
        }
    }

    #[test]
    fn asset_paths() {
        let id: DatasetId = "heart".parse().unwrap();
        assert_eq!(
            AssetKind::Coordinates.path(&id),
            "/api/raw/file/single_cell/heart/coordinates.tsv.gz"
        );
        assert_eq!(
            AssetKind::Fields.path(&id),
            "/api/raw/file/single_cell/heart/fields.json.gz"
        );
        let gene: GeneSymbol = "CP".parse().unwrap();
        assert_eq!(lognorm_query(&id, &gene), "heart,CP");
    }
}
