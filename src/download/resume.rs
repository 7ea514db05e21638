//! Decide how to handle an offered file: start fresh, resume a partial file, or refuse.

use crate::download::errors::DownloadError;
use crate::session::DccOffer;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};

type Result<T> = std::result::Result<T, DownloadError>;

#[derive(Debug)]
pub enum ResumeDecision {
    /// Nothing usable on disk; `file` is empty and open for writing.
    Fresh { path: PathBuf, file: File },
    /// A partial file of `offset` bytes exists; ask the peer to continue from there.
    Resume { path: PathBuf, offset: u64 },
}

impl ResumeDecision {
    pub fn path(&self) -> &Path {
        match self {
            Self::Fresh { path, .. } | Self::Resume { path, .. } => path,
        }
    }

    pub fn offset(&self) -> u64 {
        match self {
            Self::Fresh { .. } => 0,
            Self::Resume { offset, .. } => *offset,
        }
    }
}

/// Names must stay inside the target directory.
pub fn validate_file_name(name: &str) -> Result<()> {
    let illegal = name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']);
    if illegal {
        return Err(DownloadError::IllegalFileName {
            name: name.to_string(),
        });
    }
    Ok(())
}

pub async fn resolve_offer(target_dir: &Path, offer: &DccOffer) -> Result<ResumeDecision> {
    validate_file_name(&offer.file_name)?;

    if tokio::fs::metadata(target_dir).await.is_err() {
        tracing::info!(dir = %target_dir.display(), "creating download directory");
    }
    tokio::fs::create_dir_all(target_dir)
        .await
        .map_err(|source| DownloadError::io("create directory", target_dir, source))?;

    let path = target_dir.join(&offer.file_name);
    let existing = match tokio::fs::metadata(&path).await {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
        Err(source) => return Err(DownloadError::io("inspect", &path, source)),
    };

    if existing == 0 {
        let file = open_fresh(&path).await?;
        return Ok(ResumeDecision::Fresh { path, file });
    }
    if existing == offer.size {
        return Err(DownloadError::AlreadyDownloaded { path });
    }
    if existing > offer.size {
        return Err(DownloadError::ExistingLarger {
            path,
            existing,
            offered: offer.size,
        });
    }

    tracing::info!(
        path = %path.display(),
        offset = existing,
        size = offer.size,
        "partial file found, resuming"
    );
    Ok(ResumeDecision::Resume {
        path,
        offset: existing,
    })
}

async fn open_fresh(path: &Path) -> Result<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .await
        .map_err(|source| DownloadError::io("create", path, source))
}

/// Open a partial file for appending after the peer accepted the resume.
pub async fn open_for_append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .append(true)
        .open(path)
        .await
        .map_err(|source| DownloadError::io("open for append", path, source))
}
