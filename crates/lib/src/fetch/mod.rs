//! Source retrieval: download, checksum verification and unpacking.
//!
//! The orchestrator only talks to the [`Fetcher`] trait; [`HttpFetcher`] is
//! the production implementation. Besides `http(s)://` it accepts `file://`
//! URLs and bare local paths, which are copied into the downloads cache
//! under the same checksum rules.

mod archive;

use std::future::Future;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::util::hash::{ContentHash, hash_bytes, hash_file};

pub use archive::{ArchiveKind, extract_archive};

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
  #[error("failed to fetch {url}: {message}")]
  Download { url: String, message: String },

  #[error("checksum mismatch for {url}: expected {expected}, got {actual}")]
  HashMismatch {
    url: String,
    expected: String,
    actual: String,
  },

  #[error("failed to extract {path}: {message}")]
  Extract { path: PathBuf, message: String },

  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),
}

/// Retrieves and unpacks source archives.
pub trait Fetcher {
  /// Place the archive at `url` in `downloads_dir` and return its path.
  ///
  /// The file's SHA-256 must equal `sha256`; a mismatching file is never
  /// returned.
  fn fetch(&self, url: &str, sha256: &str, downloads_dir: &Path)
  -> impl Future<Output = Result<PathBuf, FetchError>> + Send;

  /// Unpack `archive` into `dest` and return the source root.
  fn extract(&self, archive: &Path, dest: &Path) -> impl Future<Output = Result<PathBuf, FetchError>> + Send;
}

#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
  client: reqwest::Client,
}

impl HttpFetcher {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_client(client: reqwest::Client) -> Self {
    Self { client }
  }

  async fn download(&self, url: &str) -> Result<Vec<u8>, FetchError> {
    let download_err = |e: reqwest::Error| FetchError::Download {
      url: url.to_string(),
      message: e.to_string(),
    };

    let response = self.client.get(url).send().await.map_err(download_err)?;
    if !response.status().is_success() {
      return Err(FetchError::Download {
        url: url.to_string(),
        message: format!("HTTP {}", response.status()),
      });
    }
    Ok(response.bytes().await.map_err(download_err)?.to_vec())
  }
}

impl Fetcher for HttpFetcher {
  async fn fetch(&self, url: &str, sha256: &str, downloads_dir: &Path) -> Result<PathBuf, FetchError> {
    info!(url = %url, "fetching source");
    fs::create_dir_all(downloads_dir).await?;

    let dest = downloads_dir.join(url_to_filename(url));
    if fs::try_exists(&dest).await.unwrap_or(false) {
      let cached = dest.clone();
      let actual = tokio::task::spawn_blocking(move || hash_file(&cached))
        .await
        .map_err(std::io::Error::other)?;
      match actual {
        Ok(actual) if actual.matches(sha256) => {
          info!(path = %dest.display(), "using cached archive");
          return Ok(dest);
        }
        Ok(actual) => debug!(expected = %sha256, actual = %actual, "cached archive stale, fetching again"),
        Err(e) => debug!(error = %e, "cached archive unreadable, fetching again"),
      }
    }

    let bytes = match local_path(url) {
      Some(path) => fs::read(&path).await.map_err(|e| FetchError::Download {
        url: url.to_string(),
        message: e.to_string(),
      })?,
      None => self.download(url).await?,
    };

    let actual = hash_bytes(&bytes);
    verify(url, sha256, &actual)?;

    // Write next to the final name and rename so a crash never leaves a
    // truncated archive under the cached name.
    let partial = dest.with_extension("part");
    let mut file = fs::File::create(&partial).await?;
    file.write_all(&bytes).await?;
    file.flush().await?;
    drop(file);
    fs::rename(&partial, &dest).await?;

    info!(path = %dest.display(), size = bytes.len(), "download complete");
    Ok(dest)
  }

  async fn extract(&self, archive: &Path, dest: &Path) -> Result<PathBuf, FetchError> {
    let archive = archive.to_path_buf();
    let dest = dest.to_path_buf();
    tokio::task::spawn_blocking(move || extract_archive(&archive, &dest))
      .await
      .map_err(std::io::Error::other)?
  }
}

fn verify(url: &str, expected: &str, actual: &ContentHash) -> Result<(), FetchError> {
  if actual.matches(expected) {
    Ok(())
  } else {
    Err(FetchError::HashMismatch {
      url: url.to_string(),
      expected: expected.to_string(),
      actual: actual.0.clone(),
    })
  }
}

/// Filesystem path for `file://` URLs and bare paths.
fn local_path(url: &str) -> Option<PathBuf> {
  if let Some(rest) = url.strip_prefix("file://") {
    return Some(PathBuf::from(rest));
  }
  if url.contains("://") {
    None
  } else {
    Some(PathBuf::from(url))
  }
}

/// Safe file name derived from the last URL path segment.
///
/// Falls back to a digest of the URL when the segment is empty.
pub fn url_to_filename(url: &str) -> String {
  let last = url.rsplit(['/', '\\']).next().unwrap_or_default();
  let last = last.split(['?', '#']).next().unwrap_or_default();

  let sanitized: String = last
    .chars()
    .map(|c| {
      if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
        c
      } else {
        '_'
      }
    })
    .collect();

  if sanitized.is_empty() || sanitized.chars().all(|c| c == '.') {
    format!("download_{}", &hash_bytes(url.as_bytes()).0[..16])
  } else {
    sanitized
  }
}
