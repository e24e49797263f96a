//! Boundary to the audio embedding model.
//!
//! The model itself lives outside this crate. Anything that turns normalized
//! mono PCM into a fixed-width vector can be plugged in through [`Embedder`];
//! the engine only checks that the output width matches its dimension.

use crate::error::EngineError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EmbedError {
    #[error("audio input is empty")]
    EmptyInput,

    #[error("audio input has {0} samples, model needs at least {1}")]
    TooShort(usize, usize),

    #[error("model failure: {0}")]
    Model(String),
}

impl From<EmbedError> for EngineError {
    fn from(e: EmbedError) -> Self {
        EngineError::Embedder(e.to_string())
    }
}

/// Maps PCM samples to an embedding of [`dimension`](Embedder::dimension) floats.
pub trait Embedder: Send + Sync {
    fn dimension(&self) -> usize;

    fn embed(&self, pcm: &[f32]) -> Result<Vec<f32>, EmbedError>;
}

impl<E: Embedder + ?Sized> Embedder for &E {
    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn embed(&self, pcm: &[f32]) -> Result<Vec<f32>, EmbedError> {
        (**self).embed(pcm)
    }
}

impl<E: Embedder + ?Sized> Embedder for Box<E> {
    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn embed(&self, pcm: &[f32]) -> Result<Vec<f32>, EmbedError> {
        (**self).embed(pcm)
    }
}
