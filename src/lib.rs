pub mod app;
pub mod assets;
pub mod client;
pub mod config;
pub mod domain;
pub mod error;
pub mod fs_util;
pub mod gene;
pub mod gzip;
pub mod output;
pub mod progress;
pub mod provenance;
pub mod registry;

pub use assets::download_single_cell_assets;
pub use client::{ApiClient, CfdeHttpClient};
pub use config::ClientConfig;
pub use error::FetchError;
pub use gene::fetch_single_cell_lognorm;
pub use provenance::write_run_params;
pub use registry::{download_dataset_registry, normalize_dataset_record};
