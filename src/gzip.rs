use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};
use flate2::read::GzDecoder;
use tempfile::NamedTempFile;

use crate::error::FetchError;
use crate::fs_util;

pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

pub fn is_gzip(bytes: &[u8]) -> bool {
    bytes.starts_with(&GZIP_MAGIC)
}

/// Inflates a gzip body. Bodies without the gzip magic are returned as-is,
/// since the server may already have removed the transfer encoding.
pub fn decompress(bytes: &[u8], source: &str) -> Result<Vec<u8>, FetchError> {
    if bytes.is_empty() {
        return Err(FetchError::DecodeError {
            url: source.to_string(),
            message: "file is empty".to_string(),
        });
    }
    if !is_gzip(bytes) {
        return Ok(bytes.to_vec());
    }
    let mut decoder = GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|err| FetchError::DecodeError {
            url: source.to_string(),
            message: format!("gzip decompression failed: {err}"),
        })?;
    Ok(out)
}

/// `coordinates.tsv.gz` -> `coordinates.tsv`. Paths without `.gz` have no sibling.
pub fn decompressed_sibling(path: &Utf8Path) -> Option<Utf8PathBuf> {
    let name = path.file_name()?.strip_suffix(".gz")?;
    if name.is_empty() {
        return None;
    }
    Some(path.with_file_name(name))
}

/// Streams the decompressed content of `source_path` into a staging file in
/// `staging_dir`. Like [`decompress`], content without the gzip magic is
/// copied unchanged.
pub fn decompress_to_staging(
    source_path: &Path,
    staging_dir: &Utf8Path,
    source: &str,
) -> Result<NamedTempFile, FetchError> {
    let file = File::open(source_path).map_err(|err| {
        FetchError::Filesystem(format!("read {}: {err}", source_path.display()))
    })?;
    let mut reader = BufReader::new(file);
    let head = reader
        .fill_buf()
        .map_err(|err| FetchError::Filesystem(format!("read {}: {err}", source_path.display())))?;
    if head.is_empty() {
        return Err(FetchError::DecodeError {
            url: source.to_string(),
            message: "file is empty".to_string(),
        });
    }
    let compressed = is_gzip(head);

    let mut staged = fs_util::staging_file(staging_dir)?;
    let copied = if compressed {
        io::copy(&mut GzDecoder::new(reader), staged.as_file_mut())
    } else {
        io::copy(&mut reader, staged.as_file_mut())
    };
    copied.map_err(|err| FetchError::DecodeError {
        url: source.to_string(),
        message: format!("gzip decompression failed: {err}"),
    })?;
    Ok(staged)
}

pub fn decompress_file(gz_path: &Utf8Path, keep_gz: bool) -> Result<Utf8PathBuf, FetchError> {
    let target = decompressed_sibling(gz_path).ok_or_else(|| {
        FetchError::Filesystem(format!("not a .gz file: {gz_path}"))
    })?;
    let staged = decompress_to_staging(gz_path.as_std_path(), &fs_util::parent_dir(gz_path), gz_path.as_str())?;
    fs_util::persist(staged, &target)?;
    if !keep_gz {
        fs::remove_file(gz_path.as_std_path())
            .map_err(|err| FetchError::Filesystem(format!("remove {gz_path}: {err}")))?;
    }
    Ok(target)
}
