//! Exact nearest-neighbour index under Euclidean distance.
//!
//! Vectors are stored row-major in one flat buffer; positions are assigned in
//! insertion order and line up with the corpus chunk list. Reported distances
//! are squared L2.
//!
//! Binary layout (little-endian):
//!
//! ```text
//! magic "LRVI" | version u32 | dimension u32 | count u64 | count × dimension f32
//! ```

use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use thiserror::Error;

const MAGIC: &[u8; 4] = b"LRVI";
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("dimension mismatch: index holds {expected}-d vectors, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("vector dimension must be positive")]
    InvalidDimension,

    #[error("vector {position} has a non-finite component")]
    NonFinite { position: usize },

    #[error("corrupt index data: {0}")]
    Corrupt(String),

    #[error("index I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit {
    pub position: usize,
    pub distance: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    dim: usize,
    data: Vec<f32>,
}

impl VectorIndex {
    pub fn new(dim: usize) -> Result<Self, IndexError> {
        if dim == 0 {
            return Err(IndexError::InvalidDimension);
        }
        Ok(Self { dim, data: Vec::new() })
    }

    pub fn dimension(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.data.len() / self.dim
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Append a batch. The whole batch is checked first, so a failed add
    /// leaves the index untouched. NaN and infinite components are rejected.
    pub fn add(&mut self, vectors: &[Vec<f32>]) -> Result<(), IndexError> {
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dim) {
            return Err(IndexError::DimensionMismatch { expected: self.dim, got: bad.len() });
        }
        if let Some(i) = vectors.iter().position(|v| v.iter().any(|x| !x.is_finite())) {
            return Err(IndexError::NonFinite { position: self.len() + i });
        }
        self.data.reserve(vectors.len() * self.dim);
        for v in vectors {
            self.data.extend_from_slice(v);
        }
        Ok(())
    }

    /// The `k` stored vectors nearest to `query`, closest first. Returns every
    /// stored vector when `k` exceeds the count. Equal distances keep
    /// insertion order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError> {
        if query.len() != self.dim {
            return Err(IndexError::DimensionMismatch { expected: self.dim, got: query.len() });
        }

        let mut hits: Vec<SearchHit> = self
            .data
            .chunks_exact(self.dim)
            .enumerate()
            .map(|(position, row)| SearchHit { position, distance: squared_l2(row, query) })
            .collect();

        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.position.cmp(&b.position)));
        hits.truncate(k);
        Ok(hits)
    }

    pub fn write_to<W: Write>(&self, mut w: W) -> Result<(), IndexError> {
        let dim = u32::try_from(self.dim)
            .map_err(|_| IndexError::Corrupt(format!("dimension {} too large to persist", self.dim)))?;
        w.write_all(MAGIC)?;
        w.write_all(&FORMAT_VERSION.to_le_bytes())?;
        w.write_all(&dim.to_le_bytes())?;
        w.write_all(&(self.len() as u64).to_le_bytes())?;
        for value in &self.data {
            w.write_all(&value.to_le_bytes())?;
        }
        w.flush()?;
        Ok(())
    }

    pub fn read_from<R: Read>(mut r: R) -> Result<Self, IndexError> {
        let mut magic = [0u8; 4];
        read_header(&mut r, &mut magic)?;
        if &magic != MAGIC {
            return Err(IndexError::Corrupt("bad magic".into()));
        }

        let mut word = [0u8; 4];
        read_header(&mut r, &mut word)?;
        let version = u32::from_le_bytes(word);
        if version != FORMAT_VERSION {
            return Err(IndexError::Corrupt(format!("unsupported format version {}", version)));
        }

        read_header(&mut r, &mut word)?;
        let dim = u32::from_le_bytes(word) as usize;
        if dim == 0 {
            return Err(IndexError::Corrupt("zero dimension".into()));
        }

        let mut long = [0u8; 8];
        read_header(&mut r, &mut long)?;
        let count = u64::from_le_bytes(long);

        let byte_len = count
            .checked_mul(dim as u64)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| IndexError::Corrupt("vector count overflows".into()))?;

        let mut payload = Vec::new();
        r.take(byte_len).read_to_end(&mut payload)?;
        if payload.len() as u64 != byte_len {
            return Err(IndexError::Corrupt(format!(
                "truncated payload: expected {} bytes, found {}",
                byte_len,
                payload.len()
            )));
        }

        let data: Vec<f32> = payload
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        if data.iter().any(|v| !v.is_finite()) {
            return Err(IndexError::Corrupt("non-finite vector component".into()));
        }

        Ok(Self { dim, data })
    }

    /// Persist to a file atomically (temp file beside the target, then rename).
    pub fn save(&self, path: &Path) -> Result<(), IndexError> {
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;
        let tmp = tempfile::NamedTempFile::new_in(dir)?;
        self.write_to(BufWriter::new(tmp.as_file()))?;
        tmp.persist(path).map_err(|e| IndexError::Io(e.error))?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, IndexError> {
        let file = std::fs::File::open(path)?;
        Self::read_from(BufReader::new(file))
    }
}

fn read_header<R: Read>(r: &mut R, buf: &mut [u8]) -> Result<(), IndexError> {
    r.read_exact(buf).map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => IndexError::Corrupt("truncated header".into()),
        _ => IndexError::Io(e),
    })
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}
