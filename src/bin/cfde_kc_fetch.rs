use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, CommandFactory, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use cfde_kc_fetch::app::{App, AssetOptions, GeneOptions, ListOptions};
use cfde_kc_fetch::client::CfdeHttpClient;
use cfde_kc_fetch::config::{ClientConfig, DEFAULT_RETRIES, DEFAULT_TIMEOUT_SECS};
use cfde_kc_fetch::error::FetchError;
use cfde_kc_fetch::output::OutputMode;

#[derive(Parser)]
#[command(name = "cfde-kc-fetch")]
#[command(about = "Fetch single-cell datasets from the CFDE Knowledge Center API")]
#[command(after_help = "For API documentation, see: https://cfde.hugeampkpnbi.org/docs")]
#[command(version)]
struct Cli {
    /// Request timeout in seconds
    #[arg(long, global = true, default_value_t = DEFAULT_TIMEOUT_SECS,
          value_parser = clap::value_parser!(u64).range(1..))]
    timeout: u64,

    /// Retry attempts for connection errors and 5xx responses
    #[arg(long, global = true, default_value_t = DEFAULT_RETRIES)]
    retries: u32,

    /// API base URL (defaults to $CFDE_KC_BASE_URL or the public endpoint)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Print the command result as JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging when RUST_LOG is unset
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "List available single-cell datasets")]
    ListDatasets(ListArgs),
    #[command(about = "Download single-cell dataset assets (coordinates, fields)")]
    FetchAssets(FetchAssetsArgs),
    #[command(about = "Fetch log-normalized gene expression data")]
    FetchGene(FetchGeneArgs),
}

#[derive(Args)]
struct ListArgs {
    /// Output path for the registry file
    #[arg(long, default_value = "dataset_metadata.json.gz")]
    out: Utf8PathBuf,

    /// Overwrite existing files
    #[arg(long)]
    overwrite: bool,
}

#[derive(Args)]
struct FetchAssetsArgs {
    /// Dataset identifier (e.g. heart, lung)
    dataset_id: String,

    /// Output directory for downloaded files
    #[arg(long, default_value = ".")]
    out: Utf8PathBuf,

    /// Overwrite existing files
    #[arg(long)]
    overwrite: bool,

    /// Also write decompressed copies next to the .gz files
    #[arg(long)]
    decompress: bool,
}

#[derive(Args)]
struct FetchGeneArgs {
    /// Dataset identifier (e.g. heart, lung)
    dataset_id: String,

    /// Gene symbol (e.g. CP, TP53)
    gene: String,

    /// Output path for the JSON response
    #[arg(long)]
    out: Utf8PathBuf,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(report) => {
            if let Some(err) = report.downcast_ref::<FetchError>() {
                eprintln!("[{}] {report:?}", err.kind());
                return ExitCode::from(map_exit_code(err));
            }
            eprintln!("{report:?}");
            ExitCode::from(1)
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose { "cfde_kc_fetch=debug" } else { "warn" })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn map_exit_code(error: &FetchError) -> u8 {
    match error {
        FetchError::InvalidIdentifier { .. } | FetchError::AlreadyExists(_) => 2,
        FetchError::ClientRejected { .. } | FetchError::NetworkExhausted { .. } => 3,
        FetchError::NotFound { .. } => 4,
        FetchError::DecodeError { .. } => 5,
        FetchError::Filesystem(_) | FetchError::ClientBuild(_) => 1,
    }
}

fn run(cli: Cli) -> miette::Result<ExitCode> {
    let Some(command) = cli.command else {
        Cli::command().print_help().into_diagnostic()?;
        return Ok(ExitCode::from(1));
    };

    let mut config = ClientConfig::from_env()
        .with_timeout_secs(cli.timeout)
        .with_retries(cli.retries);
    if let Some(base_url) = cli.base_url {
        config = config.with_base_url(base_url);
    }
    let app = App::new(CfdeHttpClient::new(config)?);
    let mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    let sink = mode.progress();

    let printed = match command {
        Commands::ListDatasets(args) => {
            let options = ListOptions {
                output: args.out,
                overwrite: args.overwrite,
            };
            mode.print(&app.list_datasets(options, sink)?)
        }
        Commands::FetchAssets(args) => {
            let options = AssetOptions {
                dataset_id: args.dataset_id,
                output_dir: args.out,
                overwrite: args.overwrite,
                decompress: args.decompress,
            };
            mode.print(&app.fetch_assets(options, sink)?)
        }
        Commands::FetchGene(args) => {
            let options = GeneOptions {
                dataset_id: args.dataset_id,
                gene: args.gene,
                output: args.out,
            };
            mode.print(&app.fetch_gene(options, sink)?)
        }
    };
    printed.into_diagnostic()?;
    Ok(ExitCode::SUCCESS)
}
