//! Checksum announcements and background verification of finished files.
//!
//! Bots often follow a completed transfer with a notice such as
//! `md5sum: 0123...cdef` or `MD5 (file.bin) = 0123...cdef`. The orchestrator extracts the hash
//! with [`extract_md5`] and hands a [`ChecksumTask`] to a [`VerificationSpawner`]. The task is
//! owned by its worker from then on.

use crate::session::VerificationSpawner;
use md5::{Digest, Md5};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const HASH_READ_BUF_LEN: usize = 64 * 1024;
const MD5_HEX_LEN: usize = 32;
const MARKERS: [&str; 2] = ["md5sum", "MD5"];

/// Expected hash plus the file it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumTask {
    expected: String,
    path: PathBuf,
}

impl ChecksumTask {
    pub fn new(expected: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            expected: expected.into(),
            path: path.into(),
        }
    }

    pub fn expected(&self) -> &str {
        &self.expected
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Pull a 32-digit hex MD5 out of a notice. `md5sum` is tried before `MD5`; the first marker
/// present decides, even if no valid hash follows it. A parenthesised file name right after the
/// marker is skipped.
pub fn extract_md5(text: &str) -> Option<String> {
    let rest = MARKERS
        .iter()
        .find_map(|marker| text.find(marker).map(|at| &text[at + marker.len()..]))?;

    let mut rest = rest.trim_start();
    if let Some(named) = rest.strip_prefix('(') {
        rest = &named[named.find(')')? + 1..];
    }
    let rest = rest.trim_start_matches(|c: char| c.is_whitespace() || c.is_ascii_punctuation());
    let candidate = rest.get(..MD5_HEX_LEN)?;
    if candidate.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(candidate.to_string())
    } else {
        None
    }
}

pub trait Hasher: Send + Sync + 'static {
    fn compute_file_hash(&self, path: &Path) -> std::io::Result<String>;

    fn digest_equals(&self, a: &str, b: &str) -> bool {
        a.trim().eq_ignore_ascii_case(b.trim())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Md5Hasher;

impl Hasher for Md5Hasher {
    fn compute_file_hash(&self, path: &Path) -> std::io::Result<String> {
        let mut file = std::fs::File::open(path)?;
        let mut hasher = Md5::new();
        let mut buf = vec![0u8; HASH_READ_BUF_LEN];
        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(hex::encode(hasher.finalize()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    Match,
    Mismatch { actual: String },
    Unreadable { error: String },
}

/// Hash the task's file and log the verdict. Blocking; run it off the control loop.
pub fn verify<H: Hasher + ?Sized>(hasher: &H, task: &ChecksumTask) -> VerifyOutcome {
    let path = task.path();
    let outcome = match hasher.compute_file_hash(path) {
        Ok(actual) if hasher.digest_equals(&actual, task.expected()) => VerifyOutcome::Match,
        Ok(actual) => VerifyOutcome::Mismatch { actual },
        Err(e) => VerifyOutcome::Unreadable {
            error: e.to_string(),
        },
    };

    match &outcome {
        VerifyOutcome::Match => tracing::info!(
            path = %path.display(),
            md5 = %task.expected(),
            "checksum verified"
        ),
        VerifyOutcome::Mismatch { actual } => tracing::error!(
            path = %path.display(),
            expected = %task.expected(),
            actual = %actual,
            "checksum mismatch"
        ),
        VerifyOutcome::Unreadable { error } => tracing::error!(
            path = %path.display(),
            error = %error,
            "could not hash file for verification"
        ),
    }
    outcome
}

/// Runs each verification on the blocking pool. Results only go to the log.
pub struct ChecksumVerifier<H> {
    hasher: Arc<H>,
}

impl<H: Hasher> ChecksumVerifier<H> {
    pub fn new(hasher: H) -> Self {
        Self {
            hasher: Arc::new(hasher),
        }
    }

    pub fn spawn_task(&self, task: ChecksumTask) -> tokio::task::JoinHandle<VerifyOutcome> {
        let hasher = Arc::clone(&self.hasher);
        tracing::info!(path = %task.path().display(), "verifying checksum in background");
        tokio::task::spawn_blocking(move || verify(hasher.as_ref(), &task))
    }
}

impl<H: Hasher> VerificationSpawner for ChecksumVerifier<H> {
    fn spawn_verification(&mut self, task: ChecksumTask) {
        let _ = self.spawn_task(task);
    }
}
