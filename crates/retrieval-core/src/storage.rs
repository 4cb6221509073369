//! Persisted index bundle
//!
//! A bundle is a directory holding two artifacts that are always written and
//! read together:
//! - `index.bin` - the [`VectorIndex`] in its binary format
//! - `corpus.json` - a manifest with the passages plus the index's vector
//!   count, dimension and SHA-256, so a stale or foreign index is caught at
//!   load time instead of at query time
//!
//! Writers take a `.build.lock` file in the directory first; a second build
//! targeting the same directory fails with `ArtifactLocked` while it is held.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::corpus::{Corpus, Passage};
use crate::error::{Result, RetrievalError};
use crate::index::{write_atomic, VectorIndex};

pub const INDEX_FILE: &str = "index.bin";
pub const CORPUS_FILE: &str = "corpus.json";
pub const LOCK_FILE: &str = ".build.lock";

/// Current manifest format version
pub const MANIFEST_FORMAT_VERSION: u32 = 1;

/// Contents of `corpus.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusManifest {
    pub format_version: u32,
    /// Embedding model the index was built with
    pub model: String,
    pub dimension: usize,
    pub passage_count: usize,
    /// Hex SHA-256 of `index.bin`
    pub index_sha256: String,
    pub passages: Vec<Passage>,
}

/// Exclusive claim on a bundle directory, released on drop
#[derive(Debug)]
pub struct BuildLock {
    dir: PathBuf,
    path: PathBuf,
}

impl BuildLock {
    /// Create the lock file, failing if another build holds it.
    ///
    /// The file records the holder's process id. A lock left behind by a
    /// crashed build has to be deleted by hand.
    pub fn acquire(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(LOCK_FILE);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let holder = fs::read_to_string(&path).unwrap_or_default();
                tracing::warn!(
                    "Build lock {} is held (pid {})",
                    path.display(),
                    holder.trim()
                );
                return Err(RetrievalError::ArtifactLocked(path));
            }
            Err(e) => return Err(e.into()),
        };

        let lock = Self {
            dir: dir.to_path_buf(),
            path,
        };
        writeln!(file, "{}", std::process::id())?;
        tracing::debug!("Acquired build lock {}", lock.path.display());
        Ok(lock)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Drop for BuildLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!("Failed to release build lock {}: {}", self.path.display(), e);
        }
    }
}

/// A corpus and the index built from it
#[derive(Debug, Clone)]
pub struct IndexBundle {
    pub corpus: Corpus,
    pub index: VectorIndex,
    pub model: String,
}

impl IndexBundle {
    /// Pair a corpus with its index, checking they are the same size
    pub fn new(corpus: Corpus, index: VectorIndex, model: impl Into<String>) -> Result<Self> {
        if corpus.len() != index.len() {
            return Err(RetrievalError::CorpusIndexMismatch {
                index: index.len(),
                corpus: corpus.len(),
            });
        }
        Ok(Self {
            corpus,
            index,
            model: model.into(),
        })
    }

    /// Write the bundle to `dir`, taking the directory lock for the duration
    pub fn save(&self, dir: &Path) -> Result<()> {
        let lock = BuildLock::acquire(dir)?;
        self.save_locked(&lock)
    }

    /// Write the bundle into the directory claimed by `lock`.
    ///
    /// The index goes first; the manifest rename is the commit point.
    pub fn save_locked(&self, lock: &BuildLock) -> Result<()> {
        let dir = lock.dir();
        let index_bytes = self.index.to_bytes()?;

        let manifest = CorpusManifest {
            format_version: MANIFEST_FORMAT_VERSION,
            model: self.model.clone(),
            dimension: self.index.dimension(),
            passage_count: self.corpus.len(),
            index_sha256: sha256_hex(&index_bytes),
            passages: self.corpus.passages().to_vec(),
        };
        let manifest_bytes = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| RetrievalError::CorruptArtifact(format!("manifest encode failed: {}", e)))?;

        write_atomic(&dir.join(INDEX_FILE), &index_bytes)?;
        write_atomic(&dir.join(CORPUS_FILE), &manifest_bytes)?;

        tracing::info!(
            "Saved bundle to {} ({} passages, dim {}, model {})",
            dir.display(),
            manifest.passage_count,
            manifest.dimension,
            manifest.model
        );
        Ok(())
    }

    /// Load and cross-check a bundle written by [`IndexBundle::save`].
    ///
    /// # Errors
    ///
    /// - `CorpusIndexMismatch` if the index and corpus sizes differ
    /// - `CorruptArtifact` on a bad header, checksum, manifest or payload
    /// - `EmptyCorpus` if the bundle holds no passages
    pub fn load(dir: &Path) -> Result<Self> {
        let manifest_path = dir.join(CORPUS_FILE);
        let manifest_bytes = fs::read(&manifest_path)?;
        let manifest: CorpusManifest = serde_json::from_slice(&manifest_bytes).map_err(|e| {
            RetrievalError::CorruptArtifact(format!("{}: {}", manifest_path.display(), e))
        })?;

        if manifest.format_version != MANIFEST_FORMAT_VERSION {
            return Err(RetrievalError::CorruptArtifact(format!(
                "unsupported manifest format version {} (expected {})",
                manifest.format_version, MANIFEST_FORMAT_VERSION
            )));
        }
        if manifest.passage_count != manifest.passages.len() {
            return Err(RetrievalError::CorruptArtifact(format!(
                "manifest lists {} passages but declares {}",
                manifest.passages.len(),
                manifest.passage_count
            )));
        }

        let index_bytes = fs::read(dir.join(INDEX_FILE))?;
        let index = VectorIndex::from_bytes(&index_bytes)?;

        if index.len() != manifest.passage_count {
            return Err(RetrievalError::CorpusIndexMismatch {
                index: index.len(),
                corpus: manifest.passage_count,
            });
        }
        if sha256_hex(&index_bytes) != manifest.index_sha256 {
            return Err(RetrievalError::CorruptArtifact(
                "index.bin checksum does not match corpus manifest".to_string(),
            ));
        }
        if index.dimension() != manifest.dimension {
            return Err(RetrievalError::CorruptArtifact(format!(
                "index dimension {} does not match manifest dimension {}",
                index.dimension(),
                manifest.dimension
            )));
        }

        let corpus = Corpus::from_passages(manifest.passages).ok_or_else(|| {
            RetrievalError::CorruptArtifact("passage ids are not 0..n in order".to_string())
        })?;

        tracing::info!(
            "Loaded bundle from {} ({} passages, dim {}, model {})",
            dir.display(),
            corpus.len(),
            index.dimension(),
            manifest.model
        );

        Ok(Self {
            corpus,
            index,
            model: manifest.model,
        })
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
