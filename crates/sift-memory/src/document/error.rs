#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("embedding failed: {0}")]
    Embedding(#[from] crate::embedding::EmbedError),

    #[error("storage error: {0}")]
    Storage(#[from] crate::error::StoreError),
}
