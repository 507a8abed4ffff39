//! External collaborator traits.
//!
//! The pipeline reaches every remote service through one of these traits.
//! Each call is a suspension point; nothing else in the core suspends.
//! Implementations must be `Send + Sync` so the processor can drive many
//! calls concurrently from one task.
//!
//! | Trait | Used by |
//! |-------|---------|
//! | [`Transformer`] | chunk processor, once per chunk |
//! | [`Summarizer`] | hierarchical summarizer, once per group |
//! | [`Embedder`] | summary-to-storage path only |

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{TransformOutput, TransformParams};

/// Rewrites one chunk's text through persona/namespace/style parameters.
///
/// # Example
///
/// ```rust
/// use anyhow::Result;
/// use async_trait::async_trait;
/// use narrative_chunker_core::models::{TransformOutput, TransformParams};
/// use narrative_chunker_core::traits::Transformer;
///
/// struct Shout;
///
/// #[async_trait]
/// impl Transformer for Shout {
///     async fn transform(&self, input: &str, _params: &TransformParams) -> Result<TransformOutput> {
///         Ok(TransformOutput::text(input.to_uppercase()))
///     }
/// }
/// ```
#[async_trait]
pub trait Transformer: Send + Sync {
    /// Transform `input`. Errors are captured per chunk by the caller and
    /// never abort sibling chunks.
    async fn transform(&self, input: &str, params: &TransformParams) -> Result<TransformOutput>;
}

/// Compresses a group of texts according to an instruction.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, combined_text: &str, instruction: &str) -> Result<String>;
}

/// Produces fixed-dimension embedding vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// Vector dimensionality.
    fn dims(&self) -> usize;

    /// Embed a batch of texts, returning one vector per input in order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}
