use crate::error::FetchError;
use async_trait::async_trait;

/// Retrieves the raw feed body.
#[async_trait]
pub trait FeedFetcherPort: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedFeed, FetchError>;
}

#[derive(Clone, Debug)]
pub struct FetchedFeed {
    pub status: u16,
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}
