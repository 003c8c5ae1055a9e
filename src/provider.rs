//! Machine-translation backend interface.

use async_trait::async_trait;

use crate::error::ProviderError;

/// A translation backend.
///
/// One call translates one piece of text. Implementations never retry on
/// their own; they classify failures through `ProviderError::transient`
/// and leave retrying to the worker pool.
#[async_trait]
pub trait TranslationProvider: Send + Sync {
    async fn translate(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<String, ProviderError>;
}
