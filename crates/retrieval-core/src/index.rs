//! Exact nearest-neighbour index over passage embeddings
//!
//! Vectors are stored row-major in one flat buffer. Position `i` of the index
//! corresponds to passage id `i` of the corpus it was built from.
//!
//! # Search
//!
//! Every query computes the squared Euclidean distance to every stored vector
//! (O(n·D)) and keeps the `k` smallest with a bounded max-heap. Ties are
//! broken by ascending position so results are deterministic.
//!
//! # Persistence
//!
//! `save`/`load` write a small header (`EGVX` magic + little-endian format
//! version) followed by a bincode payload. The payload stores the raw `f32`
//! values, so a loaded index returns bit-identical distances.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fs;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RetrievalError};

/// Magic bytes opening every persisted index
pub const INDEX_MAGIC: &[u8; 4] = b"EGVX";

/// Current on-disk format version
pub const INDEX_FORMAT_VERSION: u16 = 1;

const HEADER_LEN: usize = INDEX_MAGIC.len() + std::mem::size_of::<u16>();

/// A search hit: index position and squared Euclidean distance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub position: usize,
    pub distance: f32,
}

/// Summary statistics over every stored component
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IndexStats {
    pub count: usize,
    pub dimension: usize,
    pub mean: f32,
    pub std_dev: f32,
    pub min: f32,
    pub max: f32,
}

/// Read-only exact (brute force) vector index
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    dimension: usize,
    data: Vec<f32>,
}

#[derive(Serialize, Deserialize)]
struct IndexPayload {
    dimension: u32,
    count: u64,
    data: Vec<f32>,
}

impl VectorIndex {
    /// Build an index from equal-length vectors.
    ///
    /// # Errors
    ///
    /// - `EmptyCorpus` if `vectors` is empty
    /// - `DimensionMismatch` if any vector differs in length from the first
    ///   (or the first is zero-length)
    pub fn build(vectors: &[Vec<f32>]) -> Result<Self> {
        let first = vectors.first().ok_or(RetrievalError::EmptyCorpus)?;
        let dimension = first.len();
        if dimension == 0 {
            return Err(RetrievalError::DimensionMismatch {
                expected: 1,
                actual: 0,
            });
        }

        let mut data = Vec::with_capacity(dimension * vectors.len());
        for vector in vectors {
            if vector.len() != dimension {
                return Err(RetrievalError::DimensionMismatch {
                    expected: dimension,
                    actual: vector.len(),
                });
            }
            data.extend_from_slice(vector);
        }

        tracing::debug!(
            "Built index with {} vectors of dimension {}",
            vectors.len(),
            dimension
        );
        Ok(Self { dimension, data })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of stored vectors
    pub fn len(&self) -> usize {
        self.data.len() / self.dimension
    }

    /// Always false for a successfully built or loaded index
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Stored vector at `position`
    pub fn vector_at(&self, position: usize) -> Option<&[f32]> {
        let start = position.checked_mul(self.dimension)?;
        self.data.get(start..start + self.dimension)
    }

    /// Find the `k` nearest stored vectors to `query`.
    ///
    /// Returns `min(k, len)` neighbours ordered by ascending distance, ties
    /// broken by ascending position.
    ///
    /// # Errors
    ///
    /// - `InvalidK` if `k == 0`
    /// - `DimensionMismatch` if `query.len() != self.dimension()`
    /// - `EmptyCorpus` if the index holds no vectors
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if k == 0 {
            return Err(RetrievalError::InvalidK(0));
        }
        if query.len() != self.dimension {
            return Err(RetrievalError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if self.is_empty() {
            return Err(RetrievalError::EmptyCorpus);
        }

        let k = k.min(self.len());
        let mut heap: BinaryHeap<Candidate> = BinaryHeap::with_capacity(k + 1);

        for (position, stored) in self.data.chunks_exact(self.dimension).enumerate() {
            let candidate = Candidate {
                distance: squared_euclidean(query, stored),
                position,
            };
            if heap.len() < k {
                heap.push(candidate);
            } else if let Some(worst) = heap.peek() {
                if candidate < *worst {
                    heap.pop();
                    heap.push(candidate);
                }
            }
        }

        Ok(heap
            .into_sorted_vec()
            .into_iter()
            .map(|c| Neighbor {
                position: c.position,
                distance: c.distance,
            })
            .collect())
    }

    /// Mean, standard deviation and range over every stored component
    pub fn stats(&self) -> IndexStats {
        let n = self.data.len() as f64;
        let (sum, min, max) = self.data.iter().fold(
            (0.0f64, f32::INFINITY, f32::NEG_INFINITY),
            |(sum, min, max), &v| (sum + v as f64, min.min(v), max.max(v)),
        );
        let mean = sum / n;
        let variance = self
            .data
            .iter()
            .map(|&v| (v as f64 - mean).powi(2))
            .sum::<f64>()
            / n;

        IndexStats {
            count: self.len(),
            dimension: self.dimension,
            mean: mean as f32,
            std_dev: variance.sqrt() as f32,
            min,
            max,
        }
    }

    /// Serialize the index (header + bincode payload)
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let payload = IndexPayload {
            dimension: self.dimension as u32,
            count: self.len() as u64,
            data: self.data.clone(),
        };
        let body = bincode::serde::encode_to_vec(&payload, bincode::config::standard())
            .map_err(|e| RetrievalError::CorruptArtifact(format!("encode failed: {}", e)))?;

        let mut bytes = Vec::with_capacity(HEADER_LEN + body.len());
        bytes.extend_from_slice(INDEX_MAGIC);
        bytes.extend_from_slice(&INDEX_FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&body);
        Ok(bytes)
    }

    /// Decode an index produced by [`VectorIndex::to_bytes`]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(RetrievalError::CorruptArtifact(
                "index file too small".to_string(),
            ));
        }
        if &bytes[..4] != INDEX_MAGIC {
            return Err(RetrievalError::CorruptArtifact(
                "index file has wrong magic bytes".to_string(),
            ));
        }
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != INDEX_FORMAT_VERSION {
            return Err(RetrievalError::CorruptArtifact(format!(
                "unsupported index format version {} (expected {})",
                version, INDEX_FORMAT_VERSION
            )));
        }

        let (payload, _): (IndexPayload, usize) =
            bincode::serde::decode_from_slice(&bytes[HEADER_LEN..], bincode::config::standard())
                .map_err(|e| RetrievalError::CorruptArtifact(format!("decode failed: {}", e)))?;

        let dimension = payload.dimension as usize;
        let count = usize::try_from(payload.count).map_err(|_| {
            RetrievalError::CorruptArtifact(format!("vector count {} is too large", payload.count))
        })?;
        if count == 0 {
            return Err(RetrievalError::EmptyCorpus);
        }
        let expected = dimension.checked_mul(count).ok_or_else(|| {
            RetrievalError::CorruptArtifact(format!(
                "header size {} x {} overflows",
                count, dimension
            ))
        })?;
        if dimension == 0 || payload.data.len() != expected {
            return Err(RetrievalError::CorruptArtifact(format!(
                "payload holds {} values, header says {} x {}",
                payload.data.len(),
                count,
                dimension
            )));
        }

        Ok(Self {
            dimension,
            data: payload.data,
        })
    }

    /// Write the index to `path`, replacing it atomically
    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = self.to_bytes()?;
        write_atomic(path, &bytes)?;
        tracing::info!(
            "Saved index ({} vectors, dim {}) to {}",
            self.len(),
            self.dimension,
            path.display()
        );
        Ok(())
    }

    /// Read an index written by [`VectorIndex::save`]
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        Self::from_bytes(&bytes)
    }
}

/// Write `bytes` to a temporary sibling of `path`, then rename over `path`
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| RetrievalError::Io(e.error))?;
    Ok(())
}

fn squared_euclidean(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Heap entry ordered by (distance, position); the heap top is the worst kept hit
#[derive(Debug, Clone, Copy)]
struct Candidate {
    distance: f32,
    position: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.position.cmp(&other.position))
    }
}

/// Convert a caller-supplied top-k into a positive count
pub fn validate_k(k: i64) -> Result<usize> {
    if k <= 0 {
        return Err(RetrievalError::InvalidK(k));
    }
    usize::try_from(k).map_err(|_| RetrievalError::InvalidK(k))
}
