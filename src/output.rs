use std::io::{self, Write};

use serde::Serialize;

use crate::app::{AssetsResult, GeneResult, ListResult};
use crate::progress::{NoProgress, ProgressEvent, ProgressSink};

const RULE_WIDTH: usize = 80;
const NAME_WIDTH: usize = 47;
const SHOWN_KEYS: usize = 5;

/// How command results and progress reach the terminal.
///
/// `Json` keeps stdout machine-readable: the result is printed as pretty JSON
/// and progress is dropped. `Human` prints a summary and streams progress to
/// stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

impl OutputMode {
    pub fn progress(self) -> &'static dyn ProgressSink {
        match self {
            OutputMode::Human => &StderrProgress,
            OutputMode::Json => &NoProgress,
        }
    }

    pub fn print<R: Summary>(self, result: &R) -> io::Result<()> {
        let mut out = io::stdout().lock();
        self.write(&mut out, result)
    }

    pub fn write<W: Write, R: Summary>(self, out: &mut W, result: &R) -> io::Result<()> {
        match self {
            OutputMode::Human => result.write_summary(out),
            OutputMode::Json => {
                serde_json::to_writer_pretty(&mut *out, result).map_err(io::Error::other)?;
                writeln!(out)
            }
        }
    }
}

/// A command result with a plain-text rendering.
pub trait Summary: Serialize {
    fn write_summary<W: Write>(&self, out: &mut W) -> io::Result<()>;
}

impl Summary for ListResult {
    fn write_summary<W: Write>(&self, out: &mut W) -> io::Result<()> {
        write_list(out, self)
    }
}

impl Summary for AssetsResult {
    fn write_summary<W: Write>(&self, out: &mut W) -> io::Result<()> {
        write_assets(out, self)
    }
}

impl Summary for GeneResult {
    fn write_summary<W: Write>(&self, out: &mut W) -> io::Result<()> {
        write_gene(out, self)
    }
}

pub struct StderrProgress;

impl ProgressSink for StderrProgress {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => eprintln!("{} ({} ms)", event.message, elapsed.as_millis()),
            None => eprintln!("{}", event.message),
        }
    }
}

pub fn write_list<W: Write>(out: &mut W, result: &ListResult) -> io::Result<()> {
    let rule = "=".repeat(RULE_WIDTH);
    writeln!(out, "{rule}")?;
    writeln!(out, "Available Single-Cell Datasets")?;
    writeln!(out, "{rule}")?;

    if result.datasets.is_empty() {
        writeln!(out, "No datasets found in registry.")?;
    } else {
        writeln!(out, "{:<30} {:<50}", "Dataset ID", "Name/Title")?;
        writeln!(out, "{}", "-".repeat(RULE_WIDTH))?;
        for dataset in &result.datasets {
            let id = if dataset.dataset_id.is_empty() {
                "unknown"
            } else {
                dataset.dataset_id.as_str()
            };
            writeln!(out, "{:<30} {:<50}", id, truncate_name(&dataset.name))?;
        }
        writeln!(out, "{}", "-".repeat(RULE_WIDTH))?;
    }
    writeln!(out, "Total datasets: {}", result.count)?;
    writeln!(out, "Registry saved to: {}", result.output)?;
    writeln!(out, "Run parameters: {}", result.run_params)?;
    Ok(())
}

pub fn write_assets<W: Write>(out: &mut W, result: &AssetsResult) -> io::Result<()> {
    let rule = "=".repeat(RULE_WIDTH);
    let ok = result.assets.iter().filter(|asset| asset.path.is_some()).count();
    writeln!(out, "{rule}")?;
    writeln!(
        out,
        "Downloaded {ok} of {} asset(s) for '{}':",
        result.assets.len(),
        result.dataset_id
    )?;
    for asset in &result.assets {
        match (&asset.path, &asset.error) {
            (Some(path), _) => {
                writeln!(out, "  - {}: {path}", asset.asset)?;
                if let Some(decompressed) = &asset.decompressed {
                    writeln!(out, "    decompressed: {decompressed}")?;
                }
            }
            (None, Some(error)) => writeln!(out, "  - {}: FAILED [{}] {error}", asset.asset, asset.status)?,
            (None, None) => writeln!(out, "  - {}: {}", asset.asset, asset.status)?,
        }
    }
    writeln!(out, "Run parameters: {}", result.run_params)?;
    writeln!(out, "{rule}")?;
    Ok(())
}

pub fn write_gene<W: Write>(out: &mut W, result: &GeneResult) -> io::Result<()> {
    let rule = "=".repeat(RULE_WIDTH);
    writeln!(out, "{rule}")?;
    writeln!(out, "Successfully queried gene expression data")?;
    writeln!(out, "  Dataset: {}", result.dataset_id)?;
    writeln!(out, "  Gene: {}", result.gene)?;
    writeln!(out, "  Saved to: {}", result.output)?;
    if result.key_count > 0 {
        writeln!(out, "Response contains {} top-level key(s)", result.key_count)?;
        for key in result.keys.iter().take(SHOWN_KEYS) {
            writeln!(out, "  - {key}")?;
        }
        if result.key_count > SHOWN_KEYS {
            writeln!(out, "  ... and {} more", result.key_count - SHOWN_KEYS)?;
        }
    }
    writeln!(out, "Run parameters: {}", result.run_params)?;
    writeln!(out, "{rule}")?;
    Ok(())
}

fn truncate_name(name: &str) -> String {
    if name.chars().count() > NAME_WIDTH {
        let head: String = name.chars().take(NAME_WIDTH - 3).collect();
        format!("{head}...")
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;

    use super::*;
    use crate::registry::DatasetSummary;

    #[test]
    fn long_names_are_truncated() {
        let long = "x".repeat(60);
        let shown = truncate_name(&long);
        assert_eq!(shown.chars().count(), NAME_WIDTH);
        assert!(shown.ends_with("..."));
        assert_eq!(truncate_name("Heart tissue"), "Heart tissue");
    }

    #[test]
    fn list_table_reports_count() {
        let result = ListResult {
            output: Utf8PathBuf::from("dataset_metadata.json.gz"),
            run_params: Utf8PathBuf::from("./run_params.json"),
            count: 2,
            datasets: vec![
                DatasetSummary {
                    dataset_id: "heart".to_string(),
                    name: "Heart tissue".to_string(),
                },
                DatasetSummary {
                    dataset_id: String::new(),
                    name: String::new(),
                },
            ],
        };
        let mut buf = Vec::new();
        write_list(&mut buf, &result).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("heart"));
        assert!(text.contains("unknown"));
        assert!(text.contains("Total datasets: 2"));
    }

    #[test]
    fn json_mode_prints_the_result_struct() {
        let result = GeneResult {
            dataset_id: "heart".to_string(),
            gene: "CP".to_string(),
            output: Utf8PathBuf::from("CP.json"),
            run_params: Utf8PathBuf::from("./run_params.json"),
            key_count: 1,
            keys: vec!["data".to_string()],
        };
        let mut buf = Vec::new();
        OutputMode::Json.write(&mut buf, &result).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(value["gene"], "CP");
        assert_eq!(value["keys"][0], "data");

        let mut buf = Vec::new();
        OutputMode::Human.write(&mut buf, &result).unwrap();
        assert!(String::from_utf8(buf).unwrap().contains("  Gene: CP"));
    }

    #[test]
    fn gene_summary_limits_keys() {
        let keys: Vec<String> = (0..7).map(|i| format!("k{i}")).collect();
        let result = GeneResult {
            dataset_id: "heart".to_string(),
            gene: "CP".to_string(),
            output: Utf8PathBuf::from("CP.json"),
            run_params: Utf8PathBuf::from("./run_params.json"),
            key_count: keys.len(),
            keys,
        };
        let mut buf = Vec::new();
        write_gene(&mut buf, &result).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("- k4"));
        assert!(!text.contains("- k5"));
        assert!(text.contains("... and 2 more"));
    }
}
