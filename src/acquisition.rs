//! Corpus acquisition
//!
//! Streams the filing archive to disk and unpacks it into the data directory.
//! A failed download never touches the data directory, and a bad archive
//! stops the pipeline before ingestion.

use crate::config::Settings;
use crate::error::AgentError;
use crate::Result;
use reqwest::Client;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

/// Download the configured archive and extract it into the data directory
pub async fn download_and_extract(settings: &Settings) -> Result<()> {
    download_archive(
        &settings.corpus_url,
        &settings.data_directory,
        &settings.archive_path,
        settings.download_timeout,
    )
    .await?;

    let extracted = extract_archive(&settings.archive_path, &settings.data_directory).await?;

    info!(
        entries = extracted,
        data_directory = %settings.data_directory.display(),
        "Corpus archive extracted"
    );
    Ok(())
}

/// True when every configured filing already exists on disk
pub fn corpus_present(settings: &Settings) -> bool {
    settings
        .years
        .iter()
        .all(|year| settings.filing_path(*year).is_file())
}

/// Stream `url` into `archive_path`. Returns the number of bytes written.
pub async fn download_archive(
    url: &str,
    data_directory: &Path,
    archive_path: &Path,
    timeout: Duration,
) -> Result<u64> {
    let client = Client::builder()
        .timeout(timeout)
        .build()?;

    info!(url, "Downloading corpus archive");

    let mut response = client.get(url).send().await.map_err(|e| {
        error!("Corpus download request failed: {}", e);
        e
    })?;

    let status = response.status();
    if !status.is_success() {
        error!(url, status = status.as_u16(), "Corpus download failed");
        return Err(AgentError::DownloadFailed {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    tokio::fs::create_dir_all(data_directory).await?;
    if let Some(parent) = archive_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut file = tokio::fs::File::create(archive_path).await?;
    let mut written: u64 = 0;

    let streamed: Result<()> = async {
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(())
    }
    .await;

    if let Err(e) = streamed {
        error!("Corpus download interrupted after {} bytes: {}", written, e);
        drop(file);
        let _ = tokio::fs::remove_file(archive_path).await;
        return Err(e);
    }

    info!(
        bytes = written,
        path = %archive_path.display(),
        "Corpus archive downloaded"
    );
    Ok(written)
}

/// Extract a ZIP archive into `target` on the blocking pool.
/// Returns the number of files written.
pub async fn extract_archive(archive_path: &Path, target: &Path) -> Result<usize> {
    let archive_path = archive_path.to_path_buf();
    let target = target.to_path_buf();

    tokio::task::spawn_blocking(move || extract_archive_blocking(&archive_path, &target))
        .await
        .map_err(|e| AgentError::IoError(io::Error::new(io::ErrorKind::Other, e)))?
}

/// Scratch directory inside the data directory used while extracting
const STAGING_DIR: &str = ".extract-tmp";

fn corrupt(path: &Path, reason: impl ToString) -> AgentError {
    AgentError::CorruptArchive {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Entries that carry no corpus content (Finder metadata)
fn is_metadata_entry(path: &Path) -> bool {
    path.components()
        .next()
        .map(|c| c.as_os_str() == "__MACOSX")
        .unwrap_or(false)
}

/// Single top-level directory shared by every entry, if any
fn common_root(entries: &[(PathBuf, bool)]) -> Option<PathBuf> {
    let mut root: Option<&std::ffi::OsStr> = None;
    for (path, is_dir) in entries {
        let mut components = path.components();
        let first = components.next()?.as_os_str();
        // A file at the archive root means there is no shared directory.
        if components.next().is_none() && !is_dir {
            return None;
        }
        match root {
            None => root = Some(first),
            Some(r) if r == first => {}
            Some(_) => return None,
        }
    }
    root.map(PathBuf::from)
}

fn extract_archive_blocking(archive_path: &Path, target: &Path) -> Result<usize> {
    let file = fs::File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| corrupt(archive_path, e))?;

    // Resolve every entry path up front so an unsafe name aborts before anything is written.
    let mut entries = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let entry = archive.by_index(i).map_err(|e| corrupt(archive_path, e))?;
        let name = entry
            .enclosed_name()
            .map(|p| p.to_path_buf())
            .ok_or_else(|| corrupt(archive_path, format!("unsafe entry path {}", entry.name())))?;
        if is_metadata_entry(&name) {
            continue;
        }
        entries.push((i, name, entry.is_dir()));
    }

    let shapes: Vec<(PathBuf, bool)> = entries
        .iter()
        .map(|(_, name, is_dir)| (name.clone(), *is_dir))
        .collect();
    let root = common_root(&shapes);
    if let Some(root) = &root {
        debug!(root = %root.display(), "Flattening archive root directory");
    }

    fs::create_dir_all(target)?;
    let staging = target.join(STAGING_DIR);
    if staging.exists() {
        fs::remove_dir_all(&staging)?;
    }

    // Nothing lands in `target` until every entry has extracted cleanly.
    let result = stage_entries(&mut archive, archive_path, entries, root.as_deref(), &staging)
        .and_then(|files| promote(&staging, target, &files));

    if let Err(e) = fs::remove_dir_all(&staging) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(path = %staging.display(), error = %e, "Failed to remove extraction staging directory");
        }
    }
    result
}

/// Write every entry under `staging`. Returns the relative paths of the files written.
fn stage_entries(
    archive: &mut zip::ZipArchive<fs::File>,
    archive_path: &Path,
    entries: Vec<(usize, PathBuf, bool)>,
    root: Option<&Path>,
    staging: &Path,
) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for (index, name, is_dir) in entries {
        let relative = match root {
            Some(root) => name.strip_prefix(root).unwrap_or(&name).to_path_buf(),
            None => name,
        };
        if relative.as_os_str().is_empty() {
            continue;
        }
        let outpath = staging.join(&relative);

        if is_dir {
            fs::create_dir_all(&outpath)?;
            continue;
        }
        if let Some(parent) = outpath.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut entry = archive
            .by_index(index)
            .map_err(|e| corrupt(archive_path, e))?;
        let mut outfile = fs::File::create(&outpath)?;
        io::copy(&mut entry, &mut outfile)
            .map_err(|e| corrupt(archive_path, format!("{}: {}", relative.display(), e)))?;

        debug!(path = %relative.display(), "Staged");
        files.push(relative);
    }
    Ok(files)
}

/// Move staged files into `target`, replacing older copies
fn promote(staging: &Path, target: &Path, files: &[PathBuf]) -> Result<usize> {
    for relative in files {
        let outpath = target.join(relative);
        if let Some(parent) = outpath.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(staging.join(relative), &outpath)?;
        debug!(path = %outpath.display(), "Extracted");
    }
    Ok(files.len())
}
