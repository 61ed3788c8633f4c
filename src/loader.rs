//! The document source seam.
//!
//! A [`Loader`] enumerates keys and hands back `(text, metadata)` per key.
//! Loading is failure-tolerant by contract: a key that cannot be read yields
//! empty text and empty metadata, and the pipeline skips it instead of
//! aborting the run. Listing failures are fatal.

use anyhow::Result;
use async_trait::async_trait;

use crate::models::SourceMetadata;

#[async_trait]
pub trait Loader: Send + Sync {
    /// A short name for logs (e.g. `"filesystem"`, `"s3"`).
    fn name(&self) -> &str;

    /// Enumerate the keys this source offers, in deterministic order.
    ///
    /// Eager by choice: sources top out at thousands of keys, and a fully
    /// materialized, sorted `Vec` is what makes run ordering (and therefore
    /// chunk identity) reproducible. The S3 implementation drains all list
    /// pages here for the same reason; do not convert this to a lazy stream
    /// without revisiting that guarantee.
    async fn list(&self) -> Result<Vec<String>>;

    /// Load one key: extracted text plus file-level metadata.
    ///
    /// Never fails: on any read or extraction error the implementation logs
    /// and returns `("", SourceMetadata::default())`, which the pipeline
    /// treats as a skip.
    async fn load(&self, key: &str) -> (String, SourceMetadata);
}
