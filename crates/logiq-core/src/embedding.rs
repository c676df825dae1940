//! Fixed-size, unit-length embedding vectors

use thiserror::Error;

/// Dimension of every stored embedding (all-MiniLM-L6-v2 and friends).
pub const EMBEDDING_DIM: usize = 384;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EmbeddingShapeError {
    #[error("expected 384 dimensions, got {0}")]
    WrongDimension(usize),

    #[error("embedding has zero or non-finite norm")]
    Degenerate,
}

/// A 384-dimensional, L2-normalized vector.
///
/// Cosine distance and dot-product ranking agree for these.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    /// Validates the dimension and rescales to unit length.
    pub fn from_raw(mut values: Vec<f32>) -> Result<Self, EmbeddingShapeError> {
        if values.len() != EMBEDDING_DIM {
            return Err(EmbeddingShapeError::WrongDimension(values.len()));
        }
        let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
        if !norm.is_finite() || norm == 0.0 {
            return Err(EmbeddingShapeError::Degenerate);
        }
        for v in values.iter_mut() {
            *v /= norm;
        }
        Ok(Self(values))
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.0
    }
}

/// `1 - cos(a, b)`; for unit vectors that is `1 - a·b`.
pub fn cosine_distance(a: &Embedding, b: &Embedding) -> f32 {
    let dot: f32 = a.0.iter().zip(b.0.iter()).map(|(x, y)| x * y).sum();
    1.0 - dot
}
