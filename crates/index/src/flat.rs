use std::fs;
use std::path::Path;

use psyche_core::{PsycheError, Result};

const MAGIC: &[u8; 8] = b"PSYFLAT1";
const HEADER_LEN: usize = MAGIC.len() + 4 + 8;

/// One slot of a top-k answer. Positions are signed so that callers can
/// treat anything below zero as a missing slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub position: i64,
    pub score: f32,
}

/// Exhaustive inner-product index over row-major `f32` vectors.
///
/// Callers store unit vectors, which makes the inner product a cosine
/// similarity. There is no approximate structure: every query scans all rows.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIpIndex {
    dim: usize,
    data: Vec<f32>,
}

impl FlatIpIndex {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            data: Vec::new(),
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        if self.dim == 0 {
            0
        } else {
            self.data.len() / self.dim
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn add(&mut self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dim || self.dim == 0 {
            return Err(PsycheError::DimensionMismatch {
                expected: self.dim,
                actual: vector.len(),
            });
        }
        self.data.extend_from_slice(vector);
        Ok(())
    }

    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        if position >= self.len() {
            return None;
        }
        let start = position * self.dim;
        Some(&self.data[start..start + self.dim])
    }

    /// Returns up to `k` neighbours ordered by descending score, ties broken
    /// by position. Never more slots than stored vectors.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        let k = k.min(self.len());
        let mut neighbors = Vec::with_capacity(k);
        if k > 0 {
            if query.len() != self.dim {
                return Err(PsycheError::DimensionMismatch {
                    expected: self.dim,
                    actual: query.len(),
                });
            }
            let mut scored: Vec<Neighbor> = self
                .data
                .chunks_exact(self.dim)
                .enumerate()
                .map(|(position, row)| Neighbor {
                    position: position as i64,
                    score: row.iter().zip(query).map(|(a, b)| a * b).sum(),
                })
                .collect();
            scored.sort_by(|a, b| {
                b.score
                    .total_cmp(&a.score)
                    .then(a.position.cmp(&b.position))
            });
            scored.truncate(k);
            neighbors.extend(scored);
        }
        Ok(neighbors)
    }

    /// Layout: magic, little-endian `u32` dim, little-endian `u64` count, then
    /// the vectors as native-endian `f32`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let payload: &[u8] = bytemuck::cast_slice(&self.data);
        let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&(self.dim as u32).to_le_bytes());
        out.extend_from_slice(&(self.len() as u64).to_le_bytes());
        out.extend_from_slice(payload);
        out
    }

    pub fn from_bytes(bytes: &[u8], path: &Path) -> Result<Self> {
        let corrupt = |reason: String| PsycheError::CorruptIndex {
            path: path.to_path_buf(),
            reason,
        };
        if bytes.len() < HEADER_LEN || &bytes[..MAGIC.len()] != MAGIC {
            return Err(corrupt("missing PSYFLAT1 header".to_string()));
        }
        let mut dim_raw = [0u8; 4];
        dim_raw.copy_from_slice(&bytes[8..12]);
        let mut count_raw = [0u8; 8];
        count_raw.copy_from_slice(&bytes[12..HEADER_LEN]);
        let dim = u32::from_le_bytes(dim_raw) as usize;
        let count = u64::from_le_bytes(count_raw) as usize;
        let payload = &bytes[HEADER_LEN..];
        let expected = dim
            .checked_mul(count)
            .and_then(|n| n.checked_mul(std::mem::size_of::<f32>()))
            .ok_or_else(|| corrupt(format!("dim {dim} x count {count} overflows")))?;
        if payload.len() != expected {
            return Err(corrupt(format!(
                "expected {expected} payload bytes, found {}",
                payload.len()
            )));
        }
        let data: Vec<f32> = bytemuck::pod_collect_to_vec(payload);
        Ok(Self { dim, data })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_bytes())?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        Self::from_bytes(&bytes, path)
    }
}
