use crate::download::errors::DownloadError;
use crate::session::{DccOffer, TransferId};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::{fs::File, io::AsyncWriteExt};

type Result<T> = std::result::Result<T, DownloadError>;

/// Per-file state of one accepted offer.
///
/// `received` never decreases and never exceeds `expected`; reaching `expected` is the only
/// completion signal. A resumed record starts without a file handle until the peer
/// acknowledges the resume.
#[derive(Debug)]
pub struct TransferRecord {
    id: TransferId,
    offer: DccOffer,
    path: PathBuf,
    expected: u64,
    received: u64,
    file: Option<File>,
    started_at: Instant,
}

impl TransferRecord {
    pub fn fresh(id: TransferId, offer: DccOffer, path: PathBuf, file: File) -> Self {
        Self::with_offset(id, offer, path, 0, Some(file))
    }

    pub fn resuming(id: TransferId, offer: DccOffer, path: PathBuf, offset: u64) -> Self {
        Self::with_offset(id, offer, path, offset, None)
    }

    fn with_offset(
        id: TransferId,
        offer: DccOffer,
        path: PathBuf,
        offset: u64,
        file: Option<File>,
    ) -> Self {
        Self {
            id,
            expected: offer.size,
            received: offset.min(offer.size),
            offer,
            path,
            file,
            started_at: Instant::now(),
        }
    }

    pub fn id(&self) -> TransferId {
        self.id
    }

    pub fn offer(&self) -> &DccOffer {
        &self.offer
    }

    pub fn file_name(&self) -> &str {
        &self.offer.file_name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn expected(&self) -> u64 {
        self.expected
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn is_complete(&self) -> bool {
        self.received == self.expected
    }

    pub fn has_file(&self) -> bool {
        self.file.is_some()
    }

    /// Hand over the append handle once the peer accepted a resume.
    pub fn attach_file(&mut self, file: File) {
        self.file = Some(file);
    }

    /// Write as much of `data` as still fits and return how many bytes were kept.
    pub async fn append(&mut self, data: &[u8]) -> Result<usize> {
        let Some(file) = self.file.as_mut() else {
            return Ok(0);
        };
        let room = self.expected - self.received;
        let keep = usize::try_from(room).unwrap_or(usize::MAX).min(data.len());
        if keep == 0 {
            return Ok(0);
        }
        file.write_all(&data[..keep])
            .await
            .map_err(|source| DownloadError::io("write", &self.path, source))?;
        self.received += keep as u64;
        Ok(keep)
    }

    /// Flush and drop the handle. A second call is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        let Some(mut file) = self.file.take() else {
            return Ok(());
        };
        file.flush()
            .await
            .map_err(|source| DownloadError::io("flush", &self.path, source))?;
        file.sync_all()
            .await
            .map_err(|source| DownloadError::io("sync", &self.path, source))
    }
}
